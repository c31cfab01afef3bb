//! Migration: v1_2_0_AddKeyValidationResult
//! Version: 1.2.0

use crate::models::ApiKey;
use tidemark::migration::{FnMigration, SchemaManager};
use tidemark::DbError;

pub const NAME: &str = "v1_2_0_AddKeyValidationResult";

/// Adds `last_validation_status` and `last_validation_response` to `api_keys`
pub fn migration() -> FnMigration {
    FnMigration::new(
        NAME,
        "adds last_validation_status and last_validation_response to api_keys",
        up,
    )
}

fn up(manager: &SchemaManager<'_>) -> Result<(), DbError> {
    manager.ensure_shape::<ApiKey>()
}
