//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use proptest::prelude::*;

    /// Generate an already-normalized package name (lowercase, single hyphens)
    pub fn package_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9]{0,10}(-[a-z0-9]{1,8}){0,2}"
    }

    /// Generate a release version such as `2.31.0`
    pub fn pep440_version() -> impl Strategy<Value = String> {
        prop_oneof![
            (0u32..50, 0u32..50).prop_map(|(major, minor)| format!("{major}.{minor}")),
            (0u32..50, 0u32..50, 0u32..50)
                .prop_map(|(major, minor, patch)| format!("{major}.{minor}.{patch}")),
        ]
    }

    /// Generate a cron field value within `min..=max`
    pub fn cron_value(min: u32, max: u32) -> impl Strategy<Value = u32> {
        min..=max
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_package_name_generator(name in package_name()) {
            prop_assert!(!name.is_empty());
            prop_assert!(!name.ends_with('-'));
            prop_assert!(!name.contains("--"));
            prop_assert_eq!(crate::core::lockfile::normalize_name(&name), name.clone());
        }

        #[test]
        fn test_pep440_version_generator(version in pep440_version()) {
            let parts: Vec<&str> = version.split('.').collect();
            prop_assert!(parts.len() == 2 || parts.len() == 3);
            for part in parts {
                prop_assert!(part.parse::<u32>().is_ok());
            }
        }
    }
}
