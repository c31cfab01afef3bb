//! Schema units of the gateway, one file per version
//!
//! Add a unit with `tidemark-migrate generate <version> <name>`, then register it
//! in [`registry`]. Units are applied in version order, not in the order listed here.

use tidemark::migration::{MigrationError, MigrationRegistry};

pub mod v1_2_0_add_key_validation_result;

/// Every unit this build knows about
///
/// # Errors
///
/// Returns `MigrationError::DuplicateVersion` or `MigrationError::InvalidVersion`
/// if two units collide or a unit name carries no version.
pub fn registry() -> Result<MigrationRegistry, MigrationError> {
    MigrationRegistry::new().with(v1_2_0_add_key_validation_result::migration())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark::migration::Version;

    #[test]
    fn test_registry_builds() {
        let registry = registry().unwrap();
        assert_eq!(registry.versions(), [Version::new(1, 2, 0)]);
    }
}
