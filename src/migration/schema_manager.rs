//! SchemaManager - what a migration unit gets to change the schema with

use crate::migration::TableShape;
use crate::{DbError, SqlExecutor, ToSql};
use sea_query::{
    ColumnDef, IndexCreateStatement, PostgresQueryBuilder, Table, TableAlterStatement, TableCreateStatement,
};
use std::fmt::Display;

/// Borrowed view of the executor with schema helpers
///
/// The helpers that create or add things default to their "ensure present" form so
/// that units built from them can be re-applied safely.
pub struct SchemaManager<'a> {
    executor: &'a dyn SqlExecutor,
}

impl<'a> SchemaManager<'a> {
    pub fn new(executor: &'a dyn SqlExecutor) -> Self {
        Self { executor }
    }

    /// Create a table
    ///
    /// Build the statement with `.if_not_exists()` to keep the unit idempotent.
    ///
    /// ```rust,no_run
    /// use sea_query::{ColumnDef, Table};
    /// # fn example(manager: &tidemark::migration::SchemaManager<'_>) -> Result<(), tidemark::DbError> {
    /// let table = Table::create()
    ///     .table("groups")
    ///     .if_not_exists()
    ///     .col(ColumnDef::new("id").big_integer().not_null().auto_increment().primary_key())
    ///     .col(ColumnDef::new("name").string().string_len(255).not_null())
    ///     .to_owned();
    /// manager.create_table(table)?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    pub fn create_table(&self, table: TableCreateStatement) -> Result<(), DbError> {
        self.run(&table.build(PostgresQueryBuilder))
    }

    /// Alter a table
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    pub fn alter_table(&self, alter: TableAlterStatement) -> Result<(), DbError> {
        self.run(&alter.build(PostgresQueryBuilder))
    }

    /// Create an index; build it with `.if_not_exists()`
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    pub fn create_index(&self, index: IndexCreateStatement) -> Result<(), DbError> {
        self.run(&index.build(PostgresQueryBuilder))
    }

    /// Add a column unless it is already there (`ADD COLUMN IF NOT EXISTS`)
    ///
    /// ```rust,no_run
    /// use sea_query::ColumnDef;
    /// # fn example(manager: &tidemark::migration::SchemaManager<'_>) -> Result<(), tidemark::DbError> {
    /// manager.add_column("api_keys", ColumnDef::new("notes").string().string_len(255).null().to_owned())?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    pub fn add_column<T: Display>(&self, table: T, column: ColumnDef) -> Result<(), DbError> {
        self.add_columns(table, vec![column])
    }

    /// Add several columns in one `ALTER TABLE`, skipping those already present
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    pub fn add_columns<T: Display>(&self, table: T, columns: Vec<ColumnDef>) -> Result<(), DbError> {
        if columns.is_empty() {
            return Ok(());
        }
        let mut alter = Table::alter();
        alter.table(table.to_string());
        for column in columns {
            alter.add_column_if_not_exists(column);
        }
        self.alter_table(alter.to_owned())
    }

    /// Whether `table` has a column named `column` (in the `public` schema)
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the catalog query fails.
    pub fn has_column(&self, table: &str, column: &str) -> Result<bool, DbError> {
        let row = self.executor.query_one(
            "SELECT EXISTS (SELECT 1 FROM information_schema.columns \
             WHERE table_schema = current_schema() AND table_name = $1::text AND column_name = $2::text)",
            &[&table, &column],
        )?;
        Ok(row.try_get(0)?)
    }

    /// Whether `table` exists (in the current schema)
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the catalog query fails.
    pub fn has_table(&self, table: &str) -> Result<bool, DbError> {
        let row = self.executor.query_one(
            "SELECT EXISTS (SELECT 1 FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name = $1::text)",
            &[&table],
        )?;
        Ok(row.try_get(0)?)
    }

    /// Bring a table up to the shape its model declares
    ///
    /// Creates the table if it is missing, then adds any missing non-key column and
    /// any missing index. Safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns the `DbError` of the first failing statement.
    pub fn ensure_shape<S: TableShape>(&self) -> Result<(), DbError> {
        let table_name = S::table_name();
        log::debug!("Ensuring shape of table {table_name}");

        let mut create = Table::create();
        create.table(table_name.to_string()).if_not_exists();
        for column in S::key_columns().into_iter().chain(S::columns()) {
            create.col(column);
        }
        self.create_table(create.to_owned())?;

        self.add_columns(table_name, S::columns())?;

        for index in S::indexes() {
            self.create_index(index)?;
        }
        Ok(())
    }

    /// Execute raw SQL
    ///
    /// ```rust,no_run
    /// # fn example(manager: &tidemark::migration::SchemaManager<'_>) -> Result<(), tidemark::DbError> {
    /// manager.execute("CREATE EXTENSION IF NOT EXISTS pgcrypto", &[])?;
    /// # Ok(())
    /// # }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the statement fails.
    pub fn execute(&self, sql: &str, params: &[&dyn ToSql]) -> Result<(), DbError> {
        self.executor.execute(sql, params).map(|_| ())
    }

    /// Get a reference to the underlying executor
    pub fn executor(&self) -> &'a dyn SqlExecutor {
        self.executor
    }

    fn run(&self, sql: &str) -> Result<(), DbError> {
        log::trace!("DDL: {sql}");
        self.executor.execute(sql, &[]).map(|_| ())
    }
}
