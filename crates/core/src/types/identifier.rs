//! Login identifier type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`LoginIdentifier`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentifierError {
    /// The input is empty or only whitespace.
    #[error("identifier cannot be empty")]
    Empty,
    /// The input is too long.
    #[error("identifier must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains whitespace between characters.
    #[error("identifier cannot contain whitespace")]
    ContainsWhitespace,
}

/// The identifier a cashier types on the login screen (usually an email).
///
/// Identifiers are compared case-insensitively, so the parsed form is
/// trimmed and lower-cased. The same normalization is applied when a
/// profile is written to the local replica and when it is looked up.
///
/// ## Examples
///
/// ```
/// use balcao_core::LoginIdentifier;
///
/// let id = LoginIdentifier::parse("  Caixa@Loja.com ").unwrap();
/// assert_eq!(id.as_str(), "caixa@loja.com");
///
/// assert!(LoginIdentifier::parse("").is_err());
/// assert!(LoginIdentifier::parse("two words").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct LoginIdentifier(String);

impl LoginIdentifier {
    /// Maximum length of an identifier (RFC 5321 limit for emails).
    pub const MAX_LENGTH: usize = 254;

    /// Parse and normalize an identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, longer than 254
    /// characters, or contains inner whitespace.
    pub fn parse(s: &str) -> Result<Self, IdentifierError> {
        let trimmed = s.trim();

        if trimmed.is_empty() {
            return Err(IdentifierError::Empty);
        }

        if trimmed.len() > Self::MAX_LENGTH {
            return Err(IdentifierError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if trimmed.chars().any(char::is_whitespace) {
            return Err(IdentifierError::ContainsWhitespace);
        }

        Ok(Self(trimmed.to_lowercase()))
    }

    /// Returns the normalized identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for LoginIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for LoginIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for LoginIdentifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case_and_whitespace() {
        let id = LoginIdentifier::parse(" Gerente@Example.COM\n").unwrap();
        assert_eq!(id.as_str(), "gerente@example.com");
    }

    #[test]
    fn test_parse_accepts_plain_usernames() {
        assert_eq!(LoginIdentifier::parse("caixa01").unwrap().as_str(), "caixa01");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(LoginIdentifier::parse("   "), Err(IdentifierError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = "a".repeat(255);
        assert!(matches!(
            LoginIdentifier::parse(&long),
            Err(IdentifierError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_inner_whitespace() {
        assert_eq!(
            LoginIdentifier::parse("ana maria@loja.com"),
            Err(IdentifierError::ContainsWhitespace)
        );
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = LoginIdentifier::parse("user@example.com").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"user@example.com\"");
    }
}
