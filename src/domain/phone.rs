//! Phone number normalization.
//!
//! Every phone number that crosses a component boundary is normalized into
//! E.164-style form so that provider records, webhook payloads, and persisted
//! transcripts all compare by simple equality.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized phone number.
///
/// Normalization rules:
/// - strip every non-digit character
/// - 10 digits get a `+1` country prefix (US local form)
/// - anything else, including 11 digits starting with `1`, gets a bare `+`
///
/// The function is total: garbage input produces `+` plus whatever digits
/// survived, which simply never matches a real number downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize a raw phone number string.
    ///
    /// Idempotent: normalizing an already-normalized number is a no-op.
    pub fn normalize(raw: &str) -> Self {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();

        let normalized = if digits.len() == 10 {
            format!("+1{digits}")
        } else {
            format!("+{digits}")
        };

        Self(normalized)
    }

    /// The normalized form, e.g. `+15551234567`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digit-only search patterns for fuzzy filename matching.
    ///
    /// A US number yields its `+1`-prefixed, 10-digit and 11-digit
    /// spellings; anything else the `+`-prefixed and bare-digit forms.
    /// These are the substrings a recording filename is expected to
    /// contain when no sidecar metadata exists.
    pub fn search_patterns(&self) -> Vec<String> {
        let digits: String = self.0.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.len() == 11 && digits.starts_with('1') {
            vec![format!("+{digits}"), digits[1..].to_string(), digits]
        } else {
            vec![format!("+{digits}"), digits]
        }
    }
}

impl From<String> for PhoneNumber {
    fn from(raw: String) -> Self {
        Self::normalize(&raw)
    }
}

impl From<&str> for PhoneNumber {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ten_digits_get_us_prefix() {
        assert_eq!(PhoneNumber::normalize("5551234567").as_str(), "+15551234567");
    }

    #[test]
    fn test_eleven_digits_with_leading_one() {
        assert_eq!(PhoneNumber::normalize("15551234567").as_str(), "+15551234567");
    }

    #[test]
    fn test_formatting_is_stripped() {
        assert_eq!(
            PhoneNumber::normalize("(555) 123-4567").as_str(),
            "+15551234567"
        );
        assert_eq!(
            PhoneNumber::normalize("+1 555 123 4567").as_str(),
            "+15551234567"
        );
    }

    #[test]
    fn test_other_lengths_get_bare_plus() {
        assert_eq!(PhoneNumber::normalize("442071234567").as_str(), "+442071234567");
        assert_eq!(PhoneNumber::normalize("123").as_str(), "+123");
    }

    #[test]
    fn test_garbage_input_is_total() {
        assert_eq!(PhoneNumber::normalize("").as_str(), "+");
        assert_eq!(PhoneNumber::normalize("ext. only").as_str(), "+");
    }

    #[test]
    fn test_normalization_is_idempotent() {
        for raw in ["5551234567", "(555) 123-4567", "+442071234567", ""] {
            let once = PhoneNumber::normalize(raw);
            let twice = PhoneNumber::normalize(once.as_str());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_deserialization_normalizes() {
        let parsed: PhoneNumber = serde_json::from_str("\"(555) 123-4567\"").unwrap();
        assert_eq!(parsed.as_str(), "+15551234567");
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&PhoneNumber::normalize("5551234567")).unwrap();
        assert_eq!(json, "\"+15551234567\"");
    }

    #[test]
    fn test_search_patterns() {
        let patterns = PhoneNumber::normalize("5551234567").search_patterns();
        assert!(patterns.contains(&"+15551234567".to_string()));
        assert!(patterns.contains(&"5551234567".to_string()));
    }
}
