//! Bare-hostname validation for site ids.
//!
//! A site id must be a plain DNS hostname: no URL scheme, no port, no path.
//! Labels follow RFC 1123 — alphanumeric plus interior hyphens, 63 octets
//! max per label, 253 octets total.

use crate::error::StoreError;

/// Validate `domain` as a bare hostname, returning it as the site id.
pub fn validate(domain: &str) -> Result<(), StoreError> {
    if is_valid_hostname(domain) {
        Ok(())
    } else {
        Err(StoreError::InvalidHostname {
            domain: domain.to_owned(),
        })
    }
}

/// RFC 1123 hostname check. Rejects schemes, ports, paths, and empty input.
pub fn is_valid_hostname(domain: &str) -> bool {
    if domain.is_empty() || domain.len() > 253 {
        return false;
    }
    // Scheme, port, or path separators disqualify outright.
    if domain.contains(':') || domain.contains('/') {
        return false;
    }

    let trimmed = domain.strip_suffix('.').unwrap_or(domain);
    if trimmed.is_empty() {
        return false;
    }

    trimmed.split('.').all(valid_label)
}

fn valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    let bytes = label.as_bytes();
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_domains_pass() {
        assert!(is_valid_hostname("example.com"));
        assert!(is_valid_hostname("sub.example.com"));
        assert!(is_valid_hostname("my-site.example.co.uk"));
        assert!(is_valid_hostname("example.com."));
        assert!(is_valid_hostname("localhost"));
    }

    #[test]
    fn scheme_is_rejected() {
        assert!(!is_valid_hostname("https://hashostname.com"));
        assert!(!is_valid_hostname("http://example.com"));
    }

    #[test]
    fn port_is_rejected() {
        assert!(!is_valid_hostname("hasport.com:3030"));
    }

    #[test]
    fn path_is_rejected() {
        assert!(!is_valid_hostname("example.com/path"));
    }

    #[test]
    fn malformed_labels_are_rejected() {
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("."));
        assert!(!is_valid_hostname("-leading.example.com"));
        assert!(!is_valid_hostname("trailing-.example.com"));
        assert!(!is_valid_hostname("double..dot.com"));
        assert!(!is_valid_hostname("under_score.com"));
        let long_label = format!("{}.com", "a".repeat(64));
        assert!(!is_valid_hostname(&long_label));
    }

    #[test]
    fn validate_produces_invalid_hostname_error() {
        let err = validate("https://hashostname.com").unwrap_err();
        assert!(err.to_string().contains("no https://"));
        assert!(validate("example.com").is_ok());
    }
}
