//! Table shapes supplied by the application's model layer
//!
//! A model describes the columns its table should have; migration units call
//! [`SchemaManager::ensure_shape`](crate::migration::SchemaManager::ensure_shape)
//! to bring the database up to that description. Reconciliation only ever adds
//! what is missing: existing columns are never altered or dropped.

use sea_query::{ColumnDef, IndexCreateStatement};

/// Desired shape of one table
pub trait TableShape {
    /// Unqualified table name
    fn table_name() -> &'static str;

    /// Columns that make up the primary key
    ///
    /// Only used when the table is created; they are never added to an existing table.
    fn key_columns() -> Vec<ColumnDef>;

    /// All other columns, in declaration order
    fn columns() -> Vec<ColumnDef>;

    /// Secondary indexes; build them with `if_not_exists()`
    fn indexes() -> Vec<IndexCreateStatement> {
        Vec::new()
    }
}
