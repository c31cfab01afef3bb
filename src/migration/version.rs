//! Version identifiers for migration units
//!
//! A unit declares its version inside its name. Two spellings are accepted:
//!
//! - dotted: `1.2.0`, `v1.2.0`, `1.2.0-hotfix` (the part after `-` is a label)
//! - embedded in an identifier: `v1_2_0_AddKeyValidationResult`,
//!   `m1_2_0_add_key_validation_result`, `V1_2_0`
//!
//! For the embedded form the text after the third number is the unit's title, not
//! a label.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Largest component value; the ledger stores components as `BIGINT`
pub const MAX_COMPONENT: u64 = i64::MAX.unsigned_abs();

/// Longest canonical form the ledger's `version` column holds
pub const MAX_VERSION_LEN: usize = 64;

#[allow(clippy::expect_used)] // constant patterns
static DOTTED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[vV]?(\d+)\.(\d+)\.(\d+)(?:-([0-9A-Za-z][0-9A-Za-z.\-]*))?$")
        .expect("dotted version pattern is valid")
});

#[allow(clippy::expect_used)] // constant patterns
static EMBEDDED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[vVmM]?(\d+)_(\d+)_(\d+)(?:_([A-Za-z0-9_]+))?$")
        .expect("embedded version pattern is valid")
});

/// A totally ordered `(major, minor, patch [, label])` identifier
///
/// Ordering compares the numeric triple first. For equal triples an unlabeled
/// version sorts before any labeled one, and labels compare as strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub label: Option<String>,
}

/// Failure to read a version out of a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionError {
    pub input: String,
    pub reason: String,
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid version '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for VersionError {}

/// A unit name split into its version and its (optional) title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitName {
    pub version: Version,
    pub title: Option<String>,
}

impl Version {
    #[must_use]
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            label: None,
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Parse a dotted version (`1.2.0`, `v1.2.0-hotfix`) or an embedded one (`v1_2_0`)
    ///
    /// # Errors
    ///
    /// Returns `VersionError` if `input` matches neither spelling or the result
    /// could not be stored in the ledger (see [`Version::ensure_storable`]).
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        parse_unit_name(input).map(|unit| unit.version)
    }

    /// Check that the ledger can record this version
    ///
    /// # Errors
    ///
    /// Returns `VersionError` if a component exceeds [`MAX_COMPONENT`] or the
    /// canonical form is longer than [`MAX_VERSION_LEN`] characters.
    pub fn ensure_storable(&self) -> Result<(), VersionError> {
        let canonical = self.to_string();
        for value in [self.major, self.minor, self.patch] {
            if value > MAX_COMPONENT {
                return Err(VersionError {
                    input: canonical,
                    reason: format!("component {value} is out of range (max {MAX_COMPONENT})"),
                });
            }
        }
        let len = canonical.chars().count();
        if len > MAX_VERSION_LEN {
            return Err(VersionError {
                input: canonical,
                reason: format!("canonical form is {len} characters long (max {MAX_VERSION_LEN})"),
            });
        }
        Ok(())
    }
}

/// Split a unit's declared name into version and title
///
/// # Errors
///
/// Returns `VersionError` if the name carries no recognizable version, or one the
/// ledger could not store.
pub fn parse_unit_name(name: &str) -> Result<UnitName, VersionError> {
    let trimmed = name.trim();

    if let Some(caps) = DOTTED.captures(trimmed) {
        let version = Version {
            major: component(trimmed, &caps[1])?,
            minor: component(trimmed, &caps[2])?,
            patch: component(trimmed, &caps[3])?,
            label: caps.get(4).map(|m| m.as_str().to_string()),
        };
        version.ensure_storable().map_err(|e| VersionError {
            input: name.to_string(),
            reason: e.reason,
        })?;
        return Ok(UnitName {
            version,
            title: None,
        });
    }

    if let Some(caps) = EMBEDDED.captures(trimmed) {
        let version = Version::new(
            component(trimmed, &caps[1])?,
            component(trimmed, &caps[2])?,
            component(trimmed, &caps[3])?,
        );
        return Ok(UnitName {
            version,
            title: caps.get(4).map(|m| m.as_str().to_string()),
        });
    }

    Err(VersionError {
        input: name.to_string(),
        reason: "expected major.minor.patch[-label] or an identifier like v1_2_0_Title".to_string(),
    })
}

fn component(input: &str, digits: &str) -> Result<u64, VersionError> {
    match digits.parse::<u64>() {
        Ok(value) if value <= MAX_COMPONENT => Ok(value),
        _ => Err(VersionError {
            input: input.to_string(),
            reason: format!("component '{digits}' is out of range (max {MAX_COMPONENT})"),
        }),
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Version::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if let Some(label) = &self.label {
            write!(f, "-{label}")?;
        }
        Ok(())
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dotted_forms() {
        assert_eq!(Version::parse("1.2.0").unwrap(), Version::new(1, 2, 0));
        assert_eq!(Version::parse("v10.0.3").unwrap(), Version::new(10, 0, 3));
        assert_eq!(
            Version::parse("1.2.0-hotfix.1").unwrap(),
            Version::new(1, 2, 0).with_label("hotfix.1")
        );
    }

    #[test]
    fn test_parse_embedded_unit_names() {
        let unit = parse_unit_name("V1_2_0_AddKeyValidationResult").unwrap();
        assert_eq!(unit.version, Version::new(1, 2, 0));
        assert_eq!(unit.title.as_deref(), Some("AddKeyValidationResult"));

        let unit = parse_unit_name("m2_10_1_add_group_weights").unwrap();
        assert_eq!(unit.version, Version::new(2, 10, 1));
        assert_eq!(unit.title.as_deref(), Some("add_group_weights"));

        let unit = parse_unit_name("v3_0_0").unwrap();
        assert_eq!(unit.version, Version::new(3, 0, 0));
        assert_eq!(unit.title, None);
    }

    #[test]
    fn test_rejects_malformed_names() {
        for bad in ["", "1.2", "AddKeyValidationResult", "1.2.x", "v1_2", "1.2.0-", "x1_2_0"] {
            assert!(Version::parse(bad).is_err(), "should reject {bad:?}");
        }
    }

    #[test]
    fn test_rejects_out_of_range_component() {
        let err = Version::parse("99999999999999999999.0.0").unwrap_err();
        assert!(err.reason.contains("out of range"));
    }

    #[test]
    fn test_rejects_component_above_bigint() {
        let err = Version::parse("9223372036854775808.0.0").unwrap_err();
        assert!(err.reason.contains("out of range"), "{}", err.reason);
        assert!(parse_unit_name("v1_9223372036854775808_0_Title").is_err());

        let max = Version::parse("9223372036854775807.0.0").unwrap();
        assert_eq!(max.major, MAX_COMPONENT);
    }

    #[test]
    fn test_rejects_version_longer_than_ledger_column() {
        // "1.2.0-" plus 58 characters is exactly 64.
        let fits = format!("1.2.0-{}", "a".repeat(58));
        assert!(Version::parse(&fits).is_ok());

        let too_long = format!("1.2.0-{}", "a".repeat(59));
        let err = Version::parse(&too_long).unwrap_err();
        assert!(err.reason.contains("max 64"), "{}", err.reason);
    }

    #[test]
    fn test_ensure_storable_checks_built_versions() {
        assert!(Version::new(u64::MAX, 0, 0).ensure_storable().is_err());
        assert!(Version::new(1, 0, 0).with_label("x".repeat(80)).ensure_storable().is_err());
        assert!(Version::new(1, 2, 0).with_label("hotfix").ensure_storable().is_ok());
    }

    #[test]
    fn test_ordering_is_numeric_not_lexical() {
        let mut versions = vec![
            Version::parse("2.0.0").unwrap(),
            Version::parse("1.10.0").unwrap(),
            Version::parse("1.2.0").unwrap(),
            Version::parse("1.2.0-b").unwrap(),
            Version::parse("1.2.0-a").unwrap(),
        ];
        versions.sort();
        let rendered: Vec<String> = versions.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["1.2.0", "1.2.0-a", "1.2.0-b", "1.10.0", "2.0.0"]);
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        let version = Version::new(1, 2, 0).with_label("rc1");
        assert_eq!(version.to_string(), "1.2.0-rc1");
        assert_eq!(version.to_string().parse::<Version>().unwrap(), version);
    }

    #[test]
    fn test_serializes_as_canonical_string() {
        let json = serde_json::to_string(&Version::new(1, 2, 0)).unwrap();
        assert_eq!(json, "\"1.2.0\"");
    }
}
