//! `api_keys` - upstream provider keys, grouped and health-tracked

use sea_query::{ColumnDef, Index, IndexCreateStatement};
use tidemark::migration::TableShape;

pub const TABLE: &str = "api_keys";

/// Key status values stored in `api_keys.status`
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_INVALID: &str = "invalid";

/// Shape of the `api_keys` table as of 1.2.0
pub struct ApiKey;

impl TableShape for ApiKey {
    fn table_name() -> &'static str {
        TABLE
    }

    fn key_columns() -> Vec<ColumnDef> {
        vec![ColumnDef::new("id")
            .big_integer()
            .not_null()
            .auto_increment()
            .primary_key()
            .to_owned()]
    }

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("key_value").text().not_null().to_owned(),
            ColumnDef::new("key_hash").string_len(128).to_owned(),
            ColumnDef::new("group_id").big_integer().not_null().to_owned(),
            ColumnDef::new("status")
                .string_len(50)
                .not_null()
                .default(STATUS_ACTIVE)
                .to_owned(),
            ColumnDef::new("request_count").big_integer().not_null().default(0).to_owned(),
            ColumnDef::new("failure_count").big_integer().not_null().default(0).to_owned(),
            ColumnDef::new("last_used_at").timestamp().null().to_owned(),
            ColumnDef::new("created_at")
                .timestamp()
                .not_null()
                .extra("DEFAULT CURRENT_TIMESTAMP")
                .to_owned(),
            ColumnDef::new("updated_at")
                .timestamp()
                .not_null()
                .extra("DEFAULT CURRENT_TIMESTAMP")
                .to_owned(),
            // Added in 1.2.0: outcome of the most recent key validation
            ColumnDef::new("last_validation_status").string_len(50).null().to_owned(),
            ColumnDef::new("last_validation_response").text().null().to_owned(),
        ]
    }

    fn indexes() -> Vec<IndexCreateStatement> {
        vec![
            Index::create()
                .if_not_exists()
                .name("idx_api_keys_group_id")
                .table(TABLE)
                .col("group_id")
                .to_owned(),
            Index::create()
                .if_not_exists()
                .name("idx_api_keys_key_hash")
                .table(TABLE)
                .col("key_hash")
                .to_owned(),
            Index::create()
                .if_not_exists()
                .name("idx_api_keys_status")
                .table(TABLE)
                .col("status")
                .to_owned(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_query::{PostgresQueryBuilder, Table};

    fn create_sql(columns: Vec<ColumnDef>) -> String {
        let mut create = Table::create();
        create.table(TABLE).if_not_exists();
        for column in columns {
            create.col(column);
        }
        create.to_string(PostgresQueryBuilder)
    }

    #[test]
    fn test_validation_result_columns_are_nullable() {
        let sql = create_sql(ApiKey::columns());
        assert!(sql.contains("\"last_validation_status\" varchar(50) NULL"), "{sql}");
        assert!(sql.contains("\"last_validation_response\" text NULL"), "{sql}");
    }

    #[test]
    fn test_key_column_is_kept_apart() {
        assert!(!create_sql(ApiKey::columns()).contains("\"id\""));
        assert!(create_sql(ApiKey::key_columns()).contains("\"id\""));
    }
}
