use std::{collections::BTreeMap, sync::LazyLock};

use regex::Regex;

pub static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern is valid")
});

/// Validator
///
/// Collects form errors. Field errors are keyed by form field name; non-field
/// errors describe the submission as a whole (e.g. rejected credentials).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validator {
    pub field_errors: BTreeMap<String, Vec<String>>,
    pub non_field_errors: Vec<String>,
}

impl Validator {
    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    pub fn add_field_error(&mut self, key: &str, message: &str) {
        self.field_errors
            .entry(key.to_string())
            .or_default()
            .push(format!("{message}."));
    }

    pub fn add_non_field_error(&mut self, message: &str) {
        self.non_field_errors.push(message.to_string());
    }

    pub fn check_field(&mut self, ok: bool, key: &str, message: &str) {
        if !ok {
            self.add_field_error(key, message);
        }
    }

    pub fn field_error(&self, key: &str) -> Option<&str> {
        self.field_errors
            .get(key)
            .and_then(|errors| errors.first())
            .map(String::as_str)
    }
}

pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

pub fn min_word_count(value: &str, n: usize) -> bool {
    value.split_whitespace().count() >= n
}

pub fn max_word_count(value: &str, n: usize) -> bool {
    value.split_whitespace().count() <= n
}

pub fn permitted_value<T: PartialEq>(value: T, permitted: &[T]) -> bool {
    permitted.contains(&value)
}

pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_field_records_messages_with_trailing_period() {
        let mut validator = Validator::default();
        validator.check_field(true, "title", "never recorded");
        validator.check_field(false, "title", "This field cannot be blank");
        validator.check_field(false, "title", "This field is too long");

        assert!(!validator.valid());
        assert_eq!(
            validator.field_errors["title"],
            vec!["This field cannot be blank.", "This field is too long."]
        );
        assert_eq!(validator.field_error("title"), Some("This field cannot be blank."));
    }

    #[test]
    fn non_field_errors_invalidate_the_form() {
        let mut validator = Validator::default();
        validator.add_non_field_error("Email or password is incorrect");

        assert!(!validator.valid());
        assert!(validator.field_errors.is_empty());
    }

    #[test]
    fn character_counts_use_unicode_scalars() {
        assert!(max_chars("héllo", 5));
        assert!(min_chars("héllo", 5));
        assert!(!min_chars("héllo", 6));
        assert!(!not_blank("   \t"));
    }

    #[test]
    fn word_counts_split_on_whitespace() {
        assert!(min_word_count("one two  three\nfour five", 5));
        assert!(!min_word_count("one two", 5));
        assert!(max_word_count("one two", 2));
    }

    #[test]
    fn email_pattern() {
        assert!(matches("alice@example.com", &EMAIL_RX));
        assert!(!matches("alice@", &EMAIL_RX));
        assert!(!matches("not an email", &EMAIL_RX));
        assert!(permitted_value(7, &[1, 7, 365]));
        assert!(!permitted_value(30, &[1, 7, 365]));
    }
}
