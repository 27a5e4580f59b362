//! Required-field validation.

use crate::record::Record;

/// Checks records for the presence of required fields.
///
/// A field counts as present only when it carries a non-empty value:
/// absent keys, empty strings and empty lists all fail the check, while
/// `false` and `0` pass (they are values, not absences).
#[derive(Debug, Clone)]
pub struct Validator {
    required: Vec<String>,
}

impl Validator {
    /// Builds a validator from the configured required-field list.
    #[must_use]
    pub fn new(required: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the names of required fields the record is missing, in the
    /// configured order. Empty means the record is valid.
    #[must_use]
    pub fn missing_fields(&self, record: &Record) -> Vec<&str> {
        self.required
            .iter()
            .filter(|field| !record.has_non_empty(field))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> Validator {
        Validator::new(["hash_id", "name"])
    }

    #[test]
    fn test_complete_record_passes() {
        let mut record = Record::new();
        record.insert("hash_id", json!(1));
        record.insert("name", json!("Listing"));
        assert!(validator().missing_fields(&record).is_empty());
    }

    #[test]
    fn test_absent_field_reported() {
        let mut record = Record::new();
        record.insert("hash_id", json!(1));
        assert_eq!(validator().missing_fields(&record), vec!["name"]);
    }

    #[test]
    fn test_empty_string_counts_as_missing() {
        let mut record = Record::new();
        record.insert("hash_id", json!(1));
        record.insert("name", json!(""));
        assert_eq!(validator().missing_fields(&record), vec!["name"]);
    }

    #[test]
    fn test_all_missing_reported_in_order() {
        let record = Record::new();
        assert_eq!(validator().missing_fields(&record), vec!["hash_id", "name"]);
    }

    #[test]
    fn test_false_and_zero_are_values() {
        let validator = Validator::new(["new", "price"]);
        let mut record = Record::new();
        record.insert("new", json!(false));
        record.insert("price", json!(0));
        assert!(validator.missing_fields(&record).is_empty());
    }
}
