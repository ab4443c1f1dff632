//! Version-prefix policy deciding which manifest targets a build reaches.

use crate::domain::ManifestTarget;

/// Whether `version` should be rolled out to `target`.
///
/// Empty and `latest` never qualify. Exclude prefixes win over include
/// prefixes; an empty include list accepts everything not excluded.
/// Matching is case-sensitive.
pub fn should_process(target: &ManifestTarget, version: &str) -> bool {
    if version.is_empty() || version == "latest" {
        return false;
    }
    let filters = &target.filters;
    if filters
        .exclude_prefixes
        .iter()
        .any(|prefix| version.starts_with(prefix.as_str()))
    {
        return false;
    }
    filters.include_prefixes.is_empty()
        || filters
            .include_prefixes
            .iter()
            .any(|prefix| version.starts_with(prefix.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Filters;

    fn target(include: &[&str], exclude: &[&str]) -> ManifestTarget {
        ManifestTarget {
            env: "prod".to_string(),
            filters: Filters {
                include_prefixes: include.iter().map(|s| s.to_string()).collect(),
                exclude_prefixes: exclude.iter().map(|s| s.to_string()).collect(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_rejects_empty_and_latest() {
        let t = target(&[], &[]);
        assert!(!should_process(&t, ""));
        assert!(!should_process(&t, "latest"));
        assert!(should_process(&t, "latest-1"));
    }

    #[test]
    fn test_empty_include_accepts() {
        assert!(should_process(&target(&[], &[]), "abc123"));
    }

    #[test]
    fn test_include_prefixes() {
        let t = target(&["v", "release-"], &[]);
        assert!(should_process(&t, "v1.2.3"));
        assert!(should_process(&t, "release-7"));
        assert!(!should_process(&t, "abc123"));
    }

    #[test]
    fn test_exclude_wins() {
        let t = target(&["v"], &["v0."]);
        assert!(should_process(&t, "v1.0.0"));
        assert!(!should_process(&t, "v0.9.0"));

        let excl_only = target(&[], &["v"]);
        assert!(!should_process(&excl_only, "v2"));
        assert!(should_process(&excl_only, "2.0"));
    }

    #[test]
    fn test_case_sensitive() {
        let t = target(&["v"], &[]);
        assert!(!should_process(&t, "V1"));
    }
}
