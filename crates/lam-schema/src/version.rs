//! Semantic version helpers for release tags.

use semver::Version;

/// Parses a release tag such as `v1.4`, `1.4.0` or `1.4.0-beta.1`.
///
/// A leading `v` is ignored and missing minor/patch components are filled
/// with zero, so `1.4` and `1.4.0` compare equal.
///
/// # Errors
///
/// Returns the underlying [`semver::Error`] if the tag is not a version.
pub fn parse_tag(tag: &str) -> Result<Version, semver::Error> {
    let raw = tag.trim().trim_start_matches(['v', 'V']);
    let (core, rest) = match raw.find(['-', '+']) {
        Some(idx) => raw.split_at(idx),
        None => (raw, ""),
    };
    let dots = core.matches('.').count();
    let padded = match dots {
        0 => format!("{core}.0.0{rest}"),
        1 => format!("{core}.0{rest}"),
        _ => raw.to_string(),
    };
    Version::parse(&padded)
}

/// Whether `latest` is strictly newer than `current`.
pub fn is_newer(current: &Version, latest: &Version) -> bool {
    latest > current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tag_variants() {
        assert_eq!(parse_tag("v1.4.0").unwrap(), Version::new(1, 4, 0));
        assert_eq!(parse_tag("1.4").unwrap(), Version::new(1, 4, 0));
        assert_eq!(parse_tag("2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(parse_tag("1.4-beta.1").unwrap().pre.as_str(), "beta.1");
        assert!(parse_tag("latest").is_err());
    }

    #[test]
    fn test_is_newer() {
        let current = Version::new(1, 3, 0);
        assert!(is_newer(&current, &Version::new(1, 4, 0)));
        assert!(!is_newer(&current, &Version::new(1, 3, 0)));
        assert!(!is_newer(&current, &Version::new(1, 2, 9)));
        // A pre-release of the running version is older than the release.
        assert!(!is_newer(&current, &parse_tag("1.3.0-rc.1").unwrap()));
    }
}
