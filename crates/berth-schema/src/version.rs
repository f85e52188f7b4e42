//! Build-tool plugin version parsing.
//!
//! Version strings are expected to be dot-delimited with a numeric leading
//! component (`"4.1.0"` parses, `"4-SNAPSHOT"` does not — the leading
//! component must parse as a whole). Anything that does not fit yields
//! `None`, which the compatibility gate treats as ineligible.

/// Parse the major component of a declared version string.
///
/// Returns `None` when the leading dot-delimited component is not a plain
/// non-negative integer.
pub fn parse_major_version(declared: &str) -> Option<u32> {
    let major = declared.split('.').next()?;
    major.trim().parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_major() {
        assert_eq!(parse_major_version("4"), Some(4));
        assert_eq!(parse_major_version("4.1.0"), Some(4));
        assert_eq!(parse_major_version("10.0.0.RELEASE"), Some(10));
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        assert_eq!(parse_major_version(" 4.1.0"), Some(4));
    }

    #[test]
    fn malformed_major_fails_closed() {
        assert_eq!(parse_major_version(""), None);
        assert_eq!(parse_major_version("v4.1.0"), None);
        assert_eq!(parse_major_version("4-SNAPSHOT.1"), None);
        assert_eq!(parse_major_version("four.one"), None);
        assert_eq!(parse_major_version("-1.0"), None);
    }
}
