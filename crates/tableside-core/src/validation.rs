//! # Validation Module
//!
//! Input checks that run before any store access.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: HTTP extractors (serde)      shape of the JSON body          │
//! │  Layer 2: THIS MODULE                  names, identifiers, quantities  │
//! │  Layer 3: tableside-core::pricing      catalog membership rules        │
//! │  Layer 4: SQLite                       NOT NULL, UNIQUE, FK, partial   │
//! │                                        unique index on active sessions │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use tableside_core::types::Identifier;
//! use tableside_core::validation::{parse_identifier, validate_quantity};
//!
//! assert!(validate_quantity(2, 99).is_ok());
//! assert_eq!(
//!     parse_identifier(" Asha@Example.com ").unwrap(),
//!     Identifier::Email("asha@example.com".to_string())
//! );
//! ```

use crate::error::ValidationError;
use crate::types::Identifier;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_NAME_LEN: usize = 100;
const MAX_KEY_LEN: usize = 64;
const MAX_INSTRUCTIONS_LEN: usize = 500;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an opaque key such as an organization id, session id or table number.
///
/// Returns the trimmed value.
pub fn validate_key<'a>(field: &str, value: &'a str) -> ValidationResult<&'a str> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.len() > MAX_KEY_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_KEY_LEN,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(value)
}

/// Validates a customer's display name and returns it trimmed.
pub fn validate_customer_name(name: &str) -> ValidationResult<String> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.chars().count() > MAX_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: MAX_NAME_LEN,
        });
    }

    Ok(name.to_string())
}

/// Parses a sign-in identifier.
///
/// ## Rules
/// - Contains `@`: email, lowercased, needs a non-empty local part and a dotted domain
/// - Otherwise: phone, spaces and dashes stripped, optional leading `+`, 7 to 15 digits
pub fn parse_identifier(raw: &str) -> ValidationResult<Identifier> {
    let raw = raw.trim();

    if raw.is_empty() {
        return Err(ValidationError::Required {
            field: "identifier".to_string(),
        });
    }

    if raw.contains('@') {
        let email = raw.to_lowercase();
        let valid = match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
        if !valid || email.len() > 254 {
            return Err(ValidationError::InvalidFormat {
                field: "email".to_string(),
                reason: "not a valid email address".to_string(),
            });
        }
        return Ok(Identifier::Email(email));
    }

    let phone: String = raw.chars().filter(|c| *c != ' ' && *c != '-').collect();
    let digits = phone.strip_prefix('+').unwrap_or(&phone);
    if digits.len() < 7 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "phone".to_string(),
            reason: "must be 7 to 15 digits, optionally starting with +".to_string(),
        });
    }

    Ok(Identifier::Phone(phone))
}

/// Normalizes free-text kitchen instructions.
///
/// Blank input becomes `None` so "no note" and "empty note" compare equal
/// when cart lines are merged.
pub fn normalize_instructions(text: Option<&str>) -> ValidationResult<Option<String>> {
    let text = match text.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => return Ok(None),
    };

    if text.chars().count() > MAX_INSTRUCTIONS_LEN {
        return Err(ValidationError::TooLong {
            field: "specialInstructions".to_string(),
            max: MAX_INSTRUCTIONS_LEN,
        });
    }

    Ok(Some(text.to_string()))
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a cart line quantity against `1..=max`.
pub fn validate_quantity(qty: i64, max: i64) -> ValidationResult<()> {
    if qty < 1 || qty > max {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max,
        });
    }

    Ok(())
}

/// Validates the shape of a submitted OTP: exactly `len` ASCII digits.
pub fn validate_otp_format(code: &str, len: usize) -> ValidationResult<()> {
    let code = code.trim();
    if code.len() != len || !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::InvalidFormat {
            field: "otp".to_string(),
            reason: format!("must be {} digits", len),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key() {
        assert_eq!(validate_key("tableNumber", " T1 ").unwrap(), "T1");
        assert!(validate_key("tableNumber", "").is_err());
        assert!(validate_key("tableNumber", "T 1").is_err());
        assert!(validate_key("org", &"a".repeat(65)).is_err());
    }

    #[test]
    fn test_customer_name() {
        assert_eq!(validate_customer_name("  Asha ").unwrap(), "Asha");
        assert!(validate_customer_name("   ").is_err());
        assert!(validate_customer_name(&"x".repeat(101)).is_err());
    }

    #[test]
    fn test_parse_email() {
        assert_eq!(
            parse_identifier("Guest@Mail.COM").unwrap(),
            Identifier::Email("guest@mail.com".into())
        );
        assert!(parse_identifier("@mail.com").is_err());
        assert!(parse_identifier("guest@mail").is_err());
        assert!(parse_identifier("a@b@c.com").is_err());
    }

    #[test]
    fn test_parse_phone() {
        assert_eq!(
            parse_identifier("+91 98765-43210").unwrap(),
            Identifier::Phone("+919876543210".into())
        );
        assert!(parse_identifier("12345").is_err());
        assert!(parse_identifier("98765abc10").is_err());
        assert!(parse_identifier("").is_err());
    }

    #[test]
    fn test_instructions() {
        assert_eq!(normalize_instructions(None).unwrap(), None);
        assert_eq!(normalize_instructions(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_instructions(Some(" less spicy ")).unwrap(),
            Some("less spicy".to_string())
        );
        assert!(normalize_instructions(Some(&"x".repeat(501))).is_err());
    }

    #[test]
    fn test_quantity_bounds() {
        assert!(validate_quantity(1, 99).is_ok());
        assert!(validate_quantity(99, 99).is_ok());
        assert!(validate_quantity(0, 99).is_err());
        assert!(validate_quantity(-1, 99).is_err());
        assert!(validate_quantity(100, 99).is_err());
    }

    #[test]
    fn test_otp_format() {
        assert!(validate_otp_format("123456", 6).is_ok());
        assert!(validate_otp_format("12345", 6).is_err());
        assert!(validate_otp_format("12a456", 6).is_err());
    }
}
