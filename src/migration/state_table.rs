//! Ledger table layout

use sea_query::{ColumnDef, Index, IndexCreateStatement, PostgresQueryBuilder, Table, TableCreateStatement};

/// `CREATE TABLE IF NOT EXISTS` for the ledger table
///
/// One row per applied version:
/// - `version`: canonical version string (`1.2.0`, `1.2.0-hotfix`), primary key
/// - `major` / `minor` / `patch`: numeric components, for ordering in plain SQL
/// - `name`: declared name of the unit
/// - `applied_at`: when the runner recorded it (UTC)
/// - `execution_time_ms`: how long `up()` took
pub fn create_state_table(table_name: &str) -> TableCreateStatement {
    Table::create()
        .table(table_name.to_string())
        .if_not_exists()
        .col(ColumnDef::new("version").string().string_len(64).not_null().primary_key())
        .col(ColumnDef::new("major").big_integer().not_null())
        .col(ColumnDef::new("minor").big_integer().not_null())
        .col(ColumnDef::new("patch").big_integer().not_null())
        .col(ColumnDef::new("name").string().string_len(255).not_null())
        .col(ColumnDef::new("applied_at").timestamp().not_null())
        .col(ColumnDef::new("execution_time_ms").big_integer().null())
        .to_owned()
}

/// Index on `applied_at` for history queries
pub fn create_state_table_index(table_name: &str) -> IndexCreateStatement {
    Index::create()
        .if_not_exists()
        .name(format!("idx_{table_name}_applied_at"))
        .table(table_name.to_string())
        .col("applied_at")
        .to_owned()
}

/// Both statements, rendered for PostgreSQL, in execution order
pub fn state_table_ddl(table_name: &str) -> [String; 2] {
    [
        create_state_table(table_name).build(PostgresQueryBuilder),
        create_state_table_index(table_name).build(PostgresQueryBuilder),
    ]
}
