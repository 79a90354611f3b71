//! Field-level checks shared by the request decoders.
//!
//! Request bodies keep user-supplied fields as raw JSON values so that a
//! wrong type or an explicit `null` is reported under the field's own key.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::FieldErrors;

pub const REQUIRED: &str = "This field is required.";
pub const BLANK: &str = "This field may not be blank.";
pub const NULL: &str = "This field may not be null.";
pub const NOT_A_STRING: &str = "Not a valid string.";

/// Longest value accepted by the text columns.
pub const MAX_TEXT_LEN: usize = 255;

pub fn max_length_message(max: usize) -> String {
    format!("Ensure this field has no more than {max} characters.")
}

pub fn min_length_message(min: usize) -> String {
    format!("Ensure this field has at least {min} characters.")
}

/// Use with `#[serde(default, deserialize_with = "present")]`: an absent key
/// stays `None`, while an explicit `null` becomes `Some(Value::Null)`.
pub fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Text content of a JSON string, untrimmed. Any other value is recorded
/// as an error under `field`.
pub fn raw_text(errors: &mut FieldErrors, field: &str, value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Null => {
            errors.add(field, NULL);
            None
        }
        _ => {
            errors.add(field, NOT_A_STRING);
            None
        }
    }
}

/// Trimmed, non-blank text of at most `max` characters.
///
/// Records an error under `field` and returns `None` when the value is
/// missing or invalid.
pub fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&Value>,
    max: usize,
) -> Option<String> {
    let Some(value) = value else {
        errors.add(field, REQUIRED);
        return None;
    };
    let value = raw_text(errors, field, value)?;
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, BLANK);
        return None;
    }
    if value.chars().count() > max {
        errors.add(field, max_length_message(max));
        return None;
    }
    Some(value.to_string())
}

/// Like [`required_text`] but only validates a value that is present.
pub fn optional_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&Value>,
    max: usize,
) -> Option<String> {
    value.and_then(|v| required_text(errors, field, Some(v), max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Body {
        #[serde(default, deserialize_with = "present")]
        name: Option<Value>,
    }

    #[test]
    fn required_text_trims() {
        let mut errors = FieldErrors::new();
        let v = required_text(&mut errors, "name", Some(&json!("  Vegan ")), MAX_TEXT_LEN);
        assert_eq!(v.as_deref(), Some("Vegan"));
        assert!(errors.is_empty());
    }

    #[test]
    fn required_text_reports_missing_blank_and_long() {
        let mut errors = FieldErrors::new();
        assert!(required_text(&mut errors, "a", None, 10).is_none());
        assert!(required_text(&mut errors, "b", Some(&json!("   ")), 10).is_none());
        assert!(required_text(&mut errors, "c", Some(&json!("abcdefghijk")), 10).is_none());
        assert_eq!(errors.get("a").unwrap(), [REQUIRED.to_string()]);
        assert_eq!(errors.get("b").unwrap(), [BLANK.to_string()]);
        assert_eq!(errors.get("c").unwrap(), [max_length_message(10)]);
    }

    #[test]
    fn wrong_types_are_reported_under_the_field() {
        let mut errors = FieldErrors::new();
        assert!(required_text(&mut errors, "a", Some(&Value::Null), 10).is_none());
        assert!(required_text(&mut errors, "b", Some(&json!(true)), 10).is_none());
        assert!(required_text(&mut errors, "c", Some(&json!(["x"])), 10).is_none());
        assert!(required_text(&mut errors, "d", Some(&json!(5)), 10).is_none());
        assert_eq!(errors.get("a").unwrap(), [NULL.to_string()]);
        for field in ["b", "c", "d"] {
            assert_eq!(errors.get(field).unwrap(), [NOT_A_STRING.to_string()]);
        }
    }

    #[test]
    fn optional_text_skips_absent_values() {
        let mut errors = FieldErrors::new();
        assert!(optional_text(&mut errors, "name", None, 10).is_none());
        assert!(errors.is_empty());
        assert!(optional_text(&mut errors, "name", Some(&json!("")), 10).is_none());
        assert!(errors.contains("name"));
    }

    #[test]
    fn explicit_null_is_kept_apart_from_absent() {
        let absent: Body = serde_json::from_value(json!({})).unwrap();
        assert_eq!(absent.name, None);
        let null: Body = serde_json::from_value(json!({"name": null})).unwrap();
        assert_eq!(null.name, Some(Value::Null));
        let wrong: Body = serde_json::from_value(json!({"name": 5})).unwrap();
        assert_eq!(wrong.name, Some(json!(5)));
    }
}
