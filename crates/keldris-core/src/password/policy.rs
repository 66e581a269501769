//! Password policy validation (component C3).
//!
//! Characters are classified using Unicode categories: uppercase letter,
//! lowercase letter, decimal digit, and punctuation-or-symbol (treated as
//! "special"). A result carries fatal errors and advisory warnings.

use crate::models::PasswordPolicy;

/// Outcome of validating a candidate password against a policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Length below which a warning (not an error) is attached.
const ADVISORY_LENGTH: usize = 12;

/// Validate `password` against `policy`, falling back to
/// [`PasswordPolicy::default`] when no policy is persisted for the org.
#[must_use]
pub fn validate(password: &str, policy: Option<&PasswordPolicy>) -> ValidationResult {
    let default_policy = PasswordPolicy::default();
    let policy = policy.unwrap_or(&default_policy);

    let mut result = ValidationResult::default();

    let len = password.chars().count();
    if len < policy.min_length as usize {
        result
            .errors
            .push(format!("password must be at least {} characters", policy.min_length));
    }

    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_number = password.chars().any(|c| c.is_numeric());
    let has_special = password.chars().any(is_punctuation_or_symbol);

    if policy.require_upper && !has_upper {
        result.errors.push("password must contain an uppercase letter".to_owned());
    }
    if policy.require_lower && !has_lower {
        result.errors.push("password must contain a lowercase letter".to_owned());
    }
    if policy.require_number && !has_number {
        result.errors.push("password must contain a digit".to_owned());
    }
    if policy.require_special && !has_special {
        result.errors.push("password must contain a special character".to_owned());
    }

    if len < ADVISORY_LENGTH {
        result
            .warnings
            .push(format!("passwords shorter than {ADVISORY_LENGTH} characters are discouraged"));
    }

    result
}

/// A character is "special" if it is punctuation or a symbol and not
/// alphanumeric or whitespace — approximating the Unicode
/// punctuation-or-symbol categories without an extra classification crate.
fn is_punctuation_or_symbol(c: char) -> bool {
    c.is_ascii_punctuation() || (!c.is_alphanumeric() && !c.is_whitespace() && !c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_password_passes_default_policy() {
        let result = validate("Correct-Horse-99!", None);
        assert!(result.is_ok());
    }

    #[test]
    fn missing_categories_are_fatal() {
        let result = validate("alllowercase1", None);
        assert!(!result.is_ok());
        assert!(result.errors.iter().any(|e| e.contains("uppercase")));
        assert!(result.errors.iter().any(|e| e.contains("special")));
    }

    #[test]
    fn short_password_gets_advisory_warning_not_error() {
        let lenient = PasswordPolicy {
            min_length: 4,
            require_upper: false,
            require_lower: false,
            require_number: false,
            require_special: false,
            history_count: 5,
            expiration_days: None,
        };
        let result = validate("ab1!", Some(&lenient));
        assert!(result.is_ok());
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn unicode_letters_count_for_case_checks() {
        let result = validate("Ünïcödé-Pass1", None);
        assert!(result.errors.iter().all(|e| !e.contains("uppercase") && !e.contains("lowercase")));
    }
}
