//! Flat listing record and extraction from the raw API shape.
//!
//! The upstream API returns deeply nested estate objects (`seo`,
//! `price_czk` with a nested `alt`, `_links` with `self`/`iterator`/`images`,
//! `gps`, `_embedded.company`). [`extract_record`] flattens one of those into
//! a [`Record`]: an ordered field-name -> value map using underscore-joined
//! key paths, plus run metadata (scrape timestamp, source category, source
//! page).
//!
//! The record stays map-shaped rather than a fixed struct because the API
//! drifts: fields appear and disappear between records, and the flat-file
//! backend needs to observe that drift instead of silently erasing it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Field name holding the globally unique listing identifier.
pub const ID_FIELD: &str = "hash_id";

/// Field name holding the display name.
pub const NAME_FIELD: &str = "name";

/// One flattened listing record.
///
/// Fields are kept in insertion-independent sorted order so every consumer
/// (CSV header, SQL column mapping, tests) sees a deterministic layout.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, Value>,
}

/// Run metadata attached to every record a page task emits.
#[derive(Debug, Clone)]
pub struct RecordMeta {
    /// When the page carrying this record was fetched.
    pub scraped_at: DateTime<Utc>,
    /// Name of the category partition the record came from.
    pub source_category: String,
    /// Page number (1-indexed) within that partition.
    pub source_page: u32,
}

impl Record {
    /// Creates an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a field, skipping JSON `null` values.
    ///
    /// Nulls are treated as "field absent" so validation's non-empty check
    /// and the CSV drift tracking both see a consistent picture.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        if !value.is_null() {
            self.fields.insert(name.into(), value);
        }
    }

    /// Returns the raw value of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns the unique listing identifier, if present.
    ///
    /// The API serves `hash_id` as a JSON number; a string holding digits is
    /// accepted too since older exports round-tripped through text.
    #[must_use]
    pub fn hash_id(&self) -> Option<i64> {
        match self.fields.get(ID_FIELD)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Returns a field as a string slice, if it is a string.
    #[must_use]
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Returns a field as an integer, if it is numeric.
    #[must_use]
    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    /// Returns a field as a float, if it is numeric.
    #[must_use]
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(Value::as_f64)
    }

    /// Returns a field as a boolean, if it is one.
    #[must_use]
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.fields.get(name).and_then(Value::as_bool)
    }

    /// Returns a list-valued field as owned strings.
    ///
    /// Non-string list elements are rendered through [`flatten_value`].
    #[must_use]
    pub fn get_str_list(&self, name: &str) -> Option<Vec<String>> {
        let list = self.fields.get(name)?.as_array()?;
        Some(list.iter().map(flatten_value).collect())
    }

    /// Whether a field is present and non-empty.
    ///
    /// Empty means: absent, an empty string, or an empty list. `false` and
    /// `0` are values, not absences.
    #[must_use]
    pub fn has_non_empty(&self, name: &str) -> bool {
        match self.fields.get(name) {
            None => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(_) => true,
        }
    }

    /// Iterates field names in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of fields present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Renders a field as a flat string for delimited output.
    ///
    /// Absent fields render as the empty string; lists are joined with `;`.
    #[must_use]
    pub fn flat_field(&self, name: &str) -> String {
        self.fields.get(name).map(flatten_value).unwrap_or_default()
    }

    /// Iterates `(name, value)` pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Renders a JSON value as a flat string.
///
/// Lists are joined with `;`, nested objects fall back to compact JSON.
#[must_use]
pub fn flatten_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .map(flatten_value)
            .collect::<Vec<_>>()
            .join(";"),
        Value::Object(_) => value.to_string(),
    }
}

/// Flattens one raw estate object into a [`Record`].
///
/// Key paths follow the persisted schema: nested sub-objects join with `_`
/// (`price_czk.alt.value_raw` becomes `price_czk_alt_value_raw`), and the
/// image link list collapses to the list of `href` values.
#[must_use]
pub fn extract_record(raw: &Value, meta: &RecordMeta) -> Record {
    let mut record = Record::new();

    // Top-level scalars
    record.insert(ID_FIELD, raw.get("hash_id").cloned().unwrap_or(Value::Null));
    for field in [
        "name",
        "exclusively_at_rk",
        "category",
        "has_floor_plan",
        "locality",
        "new",
        "type",
        "price",
    ] {
        record.insert(field, raw.get(field).cloned().unwrap_or(Value::Null));
    }
    // Upstream spells this one in camelCase
    record.insert(
        "labels_all",
        raw.get("labelsAll").cloned().unwrap_or(Value::Null),
    );

    // seo.*
    for field in ["category_main_cb", "category_sub_cb", "category_type_cb", "locality"] {
        record.insert(
            format!("seo_{field}"),
            nested(raw, &["seo", field]).cloned().unwrap_or(Value::Null),
        );
    }

    // price_czk.* and price_czk.alt.*
    for field in ["value_raw", "unit"] {
        record.insert(
            format!("price_czk_{field}"),
            nested(raw, &["price_czk", field])
                .cloned()
                .unwrap_or(Value::Null),
        );
        record.insert(
            format!("price_czk_alt_{field}"),
            nested(raw, &["price_czk", "alt", field])
                .cloned()
                .unwrap_or(Value::Null),
        );
    }

    // _links.self / _links.iterator hrefs
    record.insert(
        "links_self_href",
        nested(raw, &["_links", "self", "href"])
            .cloned()
            .unwrap_or(Value::Null),
    );
    record.insert(
        "links_iterator_href",
        nested(raw, &["_links", "iterator", "href"])
            .cloned()
            .unwrap_or(Value::Null),
    );

    // _links.images is a list of {href} objects; keep just the hrefs
    let images = nested(raw, &["_links", "images"])
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|img| img.get("href").cloned())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    if !images.is_empty() {
        record.insert("links_images", Value::Array(images));
    }

    // gps.*
    record.insert(
        "gps_lat",
        nested(raw, &["gps", "lat"]).cloned().unwrap_or(Value::Null),
    );
    record.insert(
        "gps_lon",
        nested(raw, &["gps", "lon"]).cloned().unwrap_or(Value::Null),
    );

    // _embedded.company.*
    for field in ["url", "id", "name", "logo_small"] {
        record.insert(
            format!("embedded_company_{field}"),
            nested(raw, &["_embedded", "company", field])
                .cloned()
                .unwrap_or(Value::Null),
        );
    }

    // Run metadata
    record.insert("scraped_at", Value::String(meta.scraped_at.to_rfc3339()));
    record.insert(
        "source_category",
        Value::String(meta.source_category.clone()),
    );
    record.insert("source_page", Value::from(meta.source_page));

    record
}

/// Walks a nested key path through JSON objects.
fn nested<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = value;
    for key in path {
        current = current.get(key)?;
    }
    Some(current)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> RecordMeta {
        RecordMeta {
            scraped_at: DateTime::parse_from_rfc3339("2026-02-19T12:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            source_category: "flats-sale".to_string(),
            source_page: 3,
        }
    }

    /// A representative raw estate object in the upstream wire shape.
    fn sample_estate() -> Value {
        json!({
            "hash_id": 123456789,
            "name": "Prodej bytu 2+kk 45 m²",
            "labelsAll": [["new_building", "personal"]],
            "exclusively_at_rk": false,
            "category": 1,
            "has_floor_plan": true,
            "locality": "Praha 4 - Nusle",
            "new": false,
            "type": 1,
            "price": 7_500_000,
            "seo": {
                "category_main_cb": 1,
                "category_sub_cb": 3,
                "category_type_cb": 1,
                "locality": "praha-4-nusle"
            },
            "price_czk": {
                "value_raw": 7_500_000,
                "unit": "",
                "alt": { "value_raw": 290_000, "unit": "EUR" }
            },
            "_links": {
                "self": { "href": "/cs/v2/estates/123456789" },
                "iterator": { "href": "/cs/v2/estates/iterator/1" },
                "images": [
                    { "href": "https://img.example/1.jpg" },
                    { "href": "https://img.example/2.jpg" }
                ]
            },
            "gps": { "lat": 50.0596, "lon": 14.4656 },
            "_embedded": {
                "company": {
                    "url": "https://rk.example",
                    "id": 4242,
                    "name": "Example Reality",
                    "logo_small": "https://img.example/logo.png"
                }
            }
        })
    }

    #[test]
    fn test_extract_flattens_nested_paths() {
        let record = extract_record(&sample_estate(), &meta());

        assert_eq!(record.hash_id(), Some(123_456_789));
        assert_eq!(record.get_str("name"), Some("Prodej bytu 2+kk 45 m²"));
        assert_eq!(record.get_i64("seo_category_main_cb"), Some(1));
        assert_eq!(record.get_str("seo_locality"), Some("praha-4-nusle"));
        assert_eq!(record.get_i64("price_czk_value_raw"), Some(7_500_000));
        assert_eq!(record.get_i64("price_czk_alt_value_raw"), Some(290_000));
        assert_eq!(record.get_str("price_czk_alt_unit"), Some("EUR"));
        assert_eq!(
            record.get_str("links_self_href"),
            Some("/cs/v2/estates/123456789")
        );
        assert_eq!(record.get_f64("gps_lat"), Some(50.0596));
        assert_eq!(record.get_i64("embedded_company_id"), Some(4242));
    }

    #[test]
    fn test_extract_collapses_image_links() {
        let record = extract_record(&sample_estate(), &meta());
        let images = record.get_str_list("links_images").unwrap();
        assert_eq!(
            images,
            vec!["https://img.example/1.jpg", "https://img.example/2.jpg"]
        );
    }

    #[test]
    fn test_extract_attaches_run_metadata() {
        let record = extract_record(&sample_estate(), &meta());
        assert_eq!(record.get_str("source_category"), Some("flats-sale"));
        assert_eq!(record.get_i64("source_page"), Some(3));
        assert!(record.get_str("scraped_at").unwrap().starts_with("2026-02-19"));
    }

    #[test]
    fn test_extract_tolerates_missing_sub_objects() {
        let raw = json!({ "hash_id": 1, "name": "minimal" });
        let record = extract_record(&raw, &meta());

        assert_eq!(record.hash_id(), Some(1));
        assert!(record.get("gps_lat").is_none());
        assert!(record.get("links_images").is_none());
        assert!(!record.has_non_empty("embedded_company_name"));
    }

    #[test]
    fn test_has_non_empty_semantics() {
        let mut record = Record::new();
        record.insert("empty_string", json!(""));
        record.insert("empty_list", json!([]));
        record.insert("zero", json!(0));
        record.insert("false_value", json!(false));
        record.insert("nullish", Value::Null);

        assert!(!record.has_non_empty("empty_string"));
        assert!(!record.has_non_empty("empty_list"));
        assert!(!record.has_non_empty("nullish"));
        assert!(!record.has_non_empty("absent"));
        assert!(record.has_non_empty("zero"));
        assert!(record.has_non_empty("false_value"));
    }

    #[test]
    fn test_hash_id_accepts_string_digits() {
        let mut record = Record::new();
        record.insert(ID_FIELD, json!("987654"));
        assert_eq!(record.hash_id(), Some(987_654));

        let mut bad = Record::new();
        bad.insert(ID_FIELD, json!("not-a-number"));
        assert_eq!(bad.hash_id(), None);
    }

    #[test]
    fn test_flat_field_joins_lists() {
        let record = extract_record(&sample_estate(), &meta());
        assert_eq!(
            record.flat_field("links_images"),
            "https://img.example/1.jpg;https://img.example/2.jpg"
        );
        assert_eq!(record.flat_field("absent"), "");
        assert_eq!(record.flat_field("exclusively_at_rk"), "false");
    }

    #[test]
    fn test_field_names_are_sorted_and_deterministic() {
        let record = extract_record(&sample_estate(), &meta());
        let names: Vec<&str> = record.field_names().collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(names.contains(&"hash_id"));
        assert!(names.contains(&"labels_all"));
    }
}
