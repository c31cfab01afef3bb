//! Tidemark Migration CLI Tool
//!
//! Command-line interface for inspecting and applying the gateway's schema
//! migrations. Runs the same registry the service applies on startup, so it can
//! be used from CI/CD pipelines ahead of a rollout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::process;
use tidemark::config::TidemarkConfig;
use tidemark::connection::redact_connection_string;
use tidemark::migration::{
    MigrationLockGuard, MigrationRegistry, MigrationStatus, PostgresLedger, Runner, Version,
};
use tidemark::{connect, PostgresExecutor};
use tidemark_migrate::generate::generate_unit;

#[derive(Parser)]
#[command(name = "tidemark-migrate")]
#[command(about = "Migration management tool for the API-key gateway")]
#[command(version)]
struct Cli {
    /// Database connection URL (overrides DATABASE_URL and the config file)
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Configuration file path
    #[arg(long, global = true, default_value = tidemark::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show migration status (applied vs pending)
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply pending migrations
    Up {
        /// Number of migrations to apply (default: all pending)
        #[arg(long)]
        steps: Option<usize>,

        /// Dry run - show what would be applied without running
        #[arg(long)]
        dry_run: bool,
    },

    /// Show detailed migration information
    Info {
        /// Show information for a specific migration version, e.g. 1.2.0
        #[arg(long)]
        version: Option<String>,
    },

    /// Generate a new migration unit
    Generate {
        /// Version of the new unit, e.g. 1.3.0
        version: String,

        /// Unit name, e.g. add_group_weights
        name: String,

        /// Directory the unit file is written to
        #[arg(long, default_value = "src/migrations")]
        dir: PathBuf,
    },
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    match run(&cli) {
        Ok(()) => {
            if !cli.quiet {
                println!("{}", "✅ Success".green());
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{} {e:#}", "❌ Error:".red().bold());
            process::exit(1);
        }
    }
}

/// Everything a database-facing command needs
struct Session {
    config: TidemarkConfig,
    registry: MigrationRegistry,
    executor: PostgresExecutor,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self> {
        let config = TidemarkConfig::load_from(&cli.config)
            .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
        let database_url = cli
            .database_url
            .clone()
            .or_else(|| std::env::var("DATABASE_URL").ok())
            .unwrap_or_else(|| config.database.url.clone());

        // Registration errors surface before any connection is made.
        let registry = tidemark_migrate::registry()?;

        log::info!("Connecting to {}", redact_connection_string(&database_url));
        let client = connect(&database_url).context("connecting to database")?;

        Ok(Self {
            config,
            registry,
            executor: PostgresExecutor::new(client),
        })
    }

    fn ledger(&self) -> Result<PostgresLedger<'_>> {
        Ok(PostgresLedger::from_config(&self.executor, &self.config.migrations)?)
    }

    fn status(&self) -> Result<MigrationStatus> {
        Ok(Runner::new(&self.registry).status(&self.ledger()?)?)
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Status { json } => handle_status(&Session::open(cli)?, *json),
        Commands::Up { steps, dry_run } => handle_up(&Session::open(cli)?, *steps, *dry_run),
        Commands::Info { version } => handle_info(&Session::open(cli)?, version.as_deref()),
        Commands::Generate { version, name, dir } => handle_generate(dir, version, name),
    }
}

fn handle_status(session: &Session, json: bool) -> Result<()> {
    let status = session.status()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("\n📊 Migration Status\n");

    if status.applied.is_empty() {
        println!("✅ Applied Migrations: None");
    } else {
        println!("✅ Applied Migrations ({}):", status.applied_count);
        for entry in &status.applied {
            let time_str = entry
                .execution_time_ms
                .map_or_else(|| "N/A".to_string(), |ms| format!("{ms}ms"));
            println!(
                "  ✓ {} {} ({}, {})",
                entry.version.to_string().green(),
                entry.name,
                entry.applied_at.format("%Y-%m-%d %H:%M:%S"),
                time_str
            );
        }
    }

    println!();

    if status.pending.is_empty() {
        println!("⏳ Pending Migrations: None");
    } else {
        println!("⏳ Pending Migrations ({}):", status.pending_count);
        for pending in &status.pending {
            println!("  ⏳ {} {} (pending)", pending.version.to_string().yellow(), pending.name);
        }
    }

    if !status.unknown.is_empty() {
        println!();
        println!("❓ Recorded but not in this build ({}):", status.unknown.len());
        for entry in &status.unknown {
            println!("  ? {} {}", entry.version.to_string().dimmed(), entry.name);
        }
    }

    println!(
        "\n📈 Summary: {} applied, {} pending",
        status.applied_count, status.pending_count
    );

    Ok(())
}

fn handle_up(session: &Session, steps: Option<usize>, dry_run: bool) -> Result<()> {
    let ledger = session.ledger()?;
    let runner = Runner::new(&session.registry);

    if dry_run {
        let pending = runner.plan(&ledger)?;
        if pending.is_empty() {
            println!("No pending migrations to apply");
            return Ok(());
        }

        let to_apply = steps.unwrap_or(pending.len()).min(pending.len());
        println!("Would apply {to_apply} migration(s):");
        for (i, unit) in pending.iter().take(to_apply).enumerate() {
            println!("  {}. {} {}", i + 1, unit.version, unit.name);
        }
        return Ok(());
    }

    let migrations = &session.config.migrations;
    let _lock = if migrations.use_advisory_lock {
        Some(MigrationLockGuard::acquire(
            &session.executor,
            migrations.lock_key,
            migrations.lock_timeout_seconds,
        )?)
    } else {
        None
    };

    println!("Applying migrations...");
    let report = runner.run_steps(&session.executor, &ledger, steps)?;

    if report.is_noop() {
        println!("✅ No migrations to apply");
    } else {
        println!("✅ Successfully applied {} migration(s)", report.applied_count());
        for entry in &report.applied {
            println!("  ✓ {} {}", entry.version.to_string().green(), entry.name);
        }
    }
    if report.remaining > 0 {
        println!("⏳ {} migration(s) still pending", report.remaining);
    }

    Ok(())
}

fn handle_info(session: &Session, version: Option<&str>) -> Result<()> {
    let status = session.status()?;

    let Some(version) = version else {
        println!("\n📋 Migration System Information\n");
        println!("Ledger Table: {}", session.config.migrations.table_name);
        println!("Total Migrations: {}", status.total());
        println!("Applied: {}", status.applied_count);
        println!("Pending: {}", status.pending_count);
        if !status.unknown.is_empty() {
            println!("Unknown: {}", status.unknown.len());
        }

        if let Some(latest) = status.latest_applied_version() {
            println!("Latest Applied Version: {latest}");
        }
        if let Some(next) = status.next_pending_version() {
            println!("Next Pending Version: {next}");
        }
        return Ok(());
    };

    let version = Version::parse(version)?;

    if let Some(entry) = status
        .applied
        .iter()
        .chain(&status.unknown)
        .find(|entry| entry.version == version)
    {
        println!("\n📋 Migration Information\n");
        println!("Version: {}", entry.version);
        println!("Name: {}", entry.name);
        if let Some(unit) = session.registry.get(&version) {
            println!("Description: {}", unit.description());
        } else {
            println!("Description: (not in this build)");
        }
        println!("Applied At: {}", entry.applied_at.format("%Y-%m-%d %H:%M:%S UTC"));
        if let Some(ms) = entry.execution_time_ms {
            println!("Execution Time: {ms}ms");
        }
    } else if let Some(pending) = status.pending.iter().find(|p| p.version == version) {
        println!("\n📋 Migration Information (Pending)\n");
        println!("Version: {}", pending.version);
        println!("Name: {}", pending.name);
        println!("Description: {}", pending.description);
        println!("Status: Pending");
    } else {
        bail!("no migration with version {version}");
    }

    Ok(())
}

fn handle_generate(dir: &Path, version: &str, name: &str) -> Result<()> {
    let unit = generate_unit(dir, version, name)?;

    println!("✅ Generated migration: {}", unit.path.display());
    println!("   Implement up(), then register it in migrations/mod.rs:");
    println!("     pub mod {};", unit.module_name);
    println!("     .with({}::migration())?", unit.module_name);

    Ok(())
}
