//! `generate` - writes a new, empty migration unit

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tidemark::migration::{Version, VersionError};

static UNIT_TITLE: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::expect_used)] // constant pattern
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("title pattern is valid")
});

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("version {0} has a label; generated units carry plain major.minor.patch versions")]
    LabeledVersion(Version),

    #[error("'{0}' is not a valid unit name (letters, digits and underscores, starting with a letter)")]
    InvalidName(String),

    #[error("{} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// What `generate` produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    pub version: Version,
    /// Declared unit name, e.g. `v1_3_0_AddGroupWeights`
    pub unit_name: String,
    /// Rust module name, e.g. `v1_3_0_add_group_weights`
    pub module_name: String,
    pub path: PathBuf,
}

/// Write a unit template for `version` into `dir`
///
/// `name` may be `snake_case` or `PascalCase`; both produce the same unit.
///
/// # Errors
///
/// Fails if the version or name is malformed, the file already exists, or the
/// directory cannot be written.
pub fn generate_unit(dir: &Path, version: &str, name: &str) -> Result<GeneratedUnit, GenerateError> {
    let version = Version::parse(version)?;
    if version.label.is_some() {
        return Err(GenerateError::LabeledVersion(version));
    }
    if !UNIT_TITLE.is_match(name) {
        return Err(GenerateError::InvalidName(name.to_string()));
    }

    let prefix = format!("v{}_{}_{}", version.major, version.minor, version.patch);
    let unit_name = format!("{prefix}_{}", pascal_case(name));
    let module_name = format!("{prefix}_{}", snake_case(name));
    let path = dir.join(format!("{module_name}.rs"));

    if path.exists() {
        return Err(GenerateError::AlreadyExists(path));
    }

    fs::create_dir_all(dir).map_err(|source| GenerateError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    fs::write(&path, render_template(&unit_name, &version)).map_err(|source| GenerateError::Io {
        path: path.clone(),
        source,
    })?;

    log::debug!("Generated migration {unit_name} at {}", path.display());
    Ok(GeneratedUnit {
        version,
        unit_name,
        module_name,
        path,
    })
}

fn render_template(unit_name: &str, version: &Version) -> String {
    let generated = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
    format!(
        r#"//! Migration: {unit_name}
//! Version: {version}
//! Generated: {generated}

use tidemark::migration::{{FnMigration, SchemaManager}};
use tidemark::DbError;

pub const NAME: &str = "{unit_name}";

pub fn migration() -> FnMigration {{
    FnMigration::new(NAME, "", up)
}}

// Must be safe to run twice: a unit whose ledger write failed is applied again.
fn up(manager: &SchemaManager<'_>) -> Result<(), DbError> {{
    // Example:
    // manager.add_column("groups", sea_query::ColumnDef::new("weight").integer().not_null().default(1).to_owned())?;
    let _ = manager;
    Ok(())
}}
"#
    )
}

fn pascal_case(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
            out.push(c);
        }
    }
    out
}
