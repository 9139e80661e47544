//! Input validation for account registration and login.
//!
//! Each newtype can only be constructed from a value that passed its
//! checks.

use crate::error::ApiError;
use once_cell::sync::Lazy;
use regex::Regex;

const MIN_PASSWORD_LENGTH: usize = 8;
const MAX_PASSWORD_LENGTH: usize = 128;
const MAX_DISPLAY_NAME_LENGTH: usize = 32;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9][a-z0-9_.]{0,30}[a-z0-9]$").expect("valid regex")
});

// RFC 5322 addr-spec, dot-atom local part only.
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(?:\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)*$",
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Username(String);

impl Username {
    /// Lower-cases, then requires 2 to 32 characters of `[a-z0-9_.]`
    /// starting and ending with a letter or digit.
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        if raw.is_empty() {
            return Err(ApiError::Validation("Invalid username".into()));
        }
        let lowered = raw.to_lowercase();
        if !USERNAME_RE.is_match(&lowered) {
            return Err(ApiError::Validation("Invalid username".into()));
        }
        Ok(Self(lowered))
    }

    /// A random `guest_` username for anonymous accounts.
    pub fn generate() -> Result<Self, ApiError> {
        let mut bytes = [0u8; 6];
        getrandom::fill(&mut bytes).map_err(ApiError::internal)?;
        Self::parse(&format!("guest_{}", hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > 254 || !EMAIL_RE.is_match(trimmed) {
            return Err(ApiError::Validation("Invalid email".into()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

pub struct Password(String);

impl Password {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        let len = raw.chars().count();
        if raw.is_empty() {
            return Err(ApiError::Validation("Invalid password".into()));
        }
        if !(MIN_PASSWORD_LENGTH..=MAX_PASSWORD_LENGTH).contains(&len) {
            return Err(ApiError::Validation(format!(
                "Invalid password length, must be {MIN_PASSWORD_LENGTH} to {MAX_PASSWORD_LENGTH} characters"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        if raw.trim().is_empty() {
            return Err(ApiError::Validation("Invalid display name".into()));
        }
        if raw.chars().count() > MAX_DISPLAY_NAME_LENGTH {
            return Err(ApiError::Validation(format!(
                "Invalid display name length, must not be longer than {MAX_DISPLAY_NAME_LENGTH} characters"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

/// A username or an email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Login {
    Username(Username),
    Email(Email),
}

impl Login {
    pub fn parse(raw: &str) -> Result<Self, ApiError> {
        if let Ok(username) = Username::parse(raw) {
            return Ok(Login::Username(username));
        }
        if let Ok(email) = Email::parse(raw) {
            return Ok(Login::Email(email));
        }
        Err(ApiError::Validation("Invalid login".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usernames() {
        assert_eq!(Username::parse("Alice.B_2").unwrap().as_str(), "alice.b_2");
        assert!(Username::parse("ab").is_ok());
        assert!(Username::parse("a").is_err());
        assert!(Username::parse("_alice").is_err());
        assert!(Username::parse("alice.").is_err());
        assert!(Username::parse("al ice").is_err());
        assert!(Username::parse(&"a".repeat(33)).is_err());
        assert!(Username::parse(&"a".repeat(32)).is_ok());
    }

    #[test]
    fn generated_usernames_are_valid_and_distinct() {
        let a = Username::generate().unwrap();
        let b = Username::generate().unwrap();
        assert!(a.as_str().starts_with("guest_"));
        assert_ne!(a, b);
    }

    #[test]
    fn emails() {
        assert!(Email::parse("alice@example.org").is_ok());
        assert!(Email::parse("a.b+tag@sub.example.org").is_ok());
        assert!(Email::parse("root@localhost").is_ok());
        assert!(Email::parse("").is_err());
        assert!(Email::parse("alice").is_err());
        assert!(Email::parse("alice@").is_err());
        assert!(Email::parse("a..b@example.org").is_err());
        assert!(Email::parse("alice@-example.org").is_err());
    }

    #[test]
    fn passwords() {
        assert!(Password::parse("").is_err());
        assert!(Password::parse("short").is_err());
        assert!(Password::parse("eight888").is_ok());
        assert!(Password::parse(&"x".repeat(128)).is_ok());
        assert!(Password::parse(&"x".repeat(129)).is_err());
    }

    #[test]
    fn display_names() {
        assert!(DisplayName::parse("Alice").is_ok());
        assert!(DisplayName::parse("   ").is_err());
        assert!(DisplayName::parse(&"x".repeat(33)).is_err());
    }

    #[test]
    fn login_accepts_username_or_email() {
        assert!(matches!(Login::parse("Alice"), Ok(Login::Username(_))));
        assert!(matches!(
            Login::parse("alice@example.org"),
            Ok(Login::Email(_))
        ));
        assert!(Login::parse("not valid!").is_err());
    }
}
