//! Input validation utilities.
//!
//! Naming-system URLs and the pseudonym placeholder are substituted literally into serialized
//! bundles, so they must be plain ASCII without characters that JSON would escape.

use crate::{TransferError, TransferResult};

/// Validates that `value` is usable as a naming-system URL.
///
/// - Rejects empty or whitespace-only strings
/// - Bounds the length to avoid pathological inputs
/// - Requires an absolute `http`/`https` URL made of printable ASCII
/// - Rejects `"` and `\`, which JSON rendering would escape
///
/// # Errors
///
/// Returns [`TransferError::InvalidConfig`] naming `field` if the value is invalid.
pub fn validate_naming_system_url(field: &str, value: &str) -> TransferResult<()> {
    const MAX_URL_LEN: usize = 2048;

    if value.trim().is_empty() {
        return Err(TransferError::InvalidConfig(format!("{field} cannot be empty")));
    }

    if value.len() > MAX_URL_LEN {
        return Err(TransferError::InvalidConfig(format!(
            "{field} exceeds maximum length of {MAX_URL_LEN} characters"
        )));
    }

    if !(value.starts_with("http://") || value.starts_with("https://")) {
        return Err(TransferError::InvalidConfig(format!(
            "{field} must be an absolute http(s) URL"
        )));
    }

    let ok = value
        .bytes()
        .all(|b| b.is_ascii_graphic() && b != b'"' && b != b'\\');

    if !ok {
        return Err(TransferError::InvalidConfig(format!(
            "{field} contains invalid characters (printable ASCII without quotes or backslashes)"
        )));
    }

    Ok(())
}

/// Validates the placeholder substituted for redacted pseudonyms.
pub fn validate_placeholder(value: &str) -> TransferResult<()> {
    if value.is_empty() {
        return Err(TransferError::InvalidConfig(
            "pseudonym placeholder cannot be empty".into(),
        ));
    }

    if value.chars().any(|c| c == '"' || c == '\\' || c.is_control()) {
        return Err(TransferError::InvalidConfig(
            "pseudonym placeholder must not contain quotes, backslashes or control characters"
                .into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_naming_system_urls() {
        validate_naming_system_url("system", "http://www.example.org/sid/dic-pseudonym")
            .expect("valid url");
        validate_naming_system_url("system", "https://example.org/sid/x|1.0").expect("valid url");
    }

    #[test]
    fn rejects_bad_naming_system_urls() {
        for bad in ["", "   ", "urn:oid:1.2.3", "http://exa mple.org", "http://x.org/\"q\""] {
            assert!(
                validate_naming_system_url("system", bad).is_err(),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_bad_placeholders() {
        assert!(validate_placeholder("").is_err());
        assert!(validate_placeholder("a\"b").is_err());
        assert!(validate_placeholder("<PSEUDONYM>").is_ok());
    }
}
