//! Validation patterns shared across the compiler and runtime.
//!
//! Identifiers, durations and other surface syntax are validated once here so
//! every crate rejects malformed input the same way.

use once_cell::sync::Lazy;
use regex::Regex;

/// Rule name / sensor identifier pattern: `^[A-Za-z_][A-Za-z0-9_]*$`.
pub const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Duration literal pattern: `^\d+(ms|s|m|h|d)$`.
pub const DURATION_PATTERN: &str = r"^(\d+)(ms|s|m|h|d)$";

pub static IDENTIFIER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(IDENTIFIER_PATTERN).expect("invalid IDENTIFIER_PATTERN"));

pub static DURATION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(DURATION_PATTERN).expect("invalid DURATION_PATTERN"));

/// Validate a rule name or sensor identifier.
pub fn is_valid_identifier(s: &str) -> bool {
    IDENTIFIER_REGEX.is_match(s)
}

/// Validate a duration literal (e.g. `"10s"`, `"500ms"`).
pub fn is_valid_duration_literal(s: &str) -> bool {
    DURATION_REGEX.is_match(s)
}
