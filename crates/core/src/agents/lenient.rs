//! # Lenient Fields
//!
//! `deserialize_with` helpers for stage output fields. Models send `null`
//! for empty fields and quote numbers (`"85"`, `"72%"`); these read both
//! instead of failing the whole object.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// `null` reads as the field's default
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Number, or a string holding one (`"85"`, `"72%"`)
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim_end().parse().ok(),
        _ => None,
    }
}

/// Number or numeric string; anything else reads as 0
pub fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(as_number(&value).unwrap_or_default())
}

/// Number or numeric string; anything else reads as `None`
pub fn opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(as_number(&value))
}

fn as_integer<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    let n = as_number(value)?;
    if !n.is_finite() {
        return None;
    }
    T::try_from(n.round() as i64).ok()
}

/// Whole number or numeric string; out of range or unreadable reads as 0
pub fn integer<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64> + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(as_integer(&value).unwrap_or_default())
}

/// Whole number or numeric string; anything else reads as `None`
pub fn opt_integer<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(as_integer(&value))
}

/// Action priority: a rank (1 is most urgent) or a word like "high".
///
/// Unreadable priorities sort last.
pub fn priority<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if let Some(rank) = as_integer::<u8>(&value) {
        return Ok(rank);
    }

    let rank = match value.as_str().map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("high" | "highest" | "critical" | "urgent") => 1,
        Some("medium" | "normal") => 2,
        Some("low") => 3,
        _ => u8::MAX,
    };
    Ok(rank)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    struct Loose {
        #[serde(deserialize_with = "or_default")]
        name: String,
        #[serde(deserialize_with = "or_default")]
        tags: Vec<String>,
        #[serde(deserialize_with = "number")]
        score: f64,
        #[serde(deserialize_with = "opt_number")]
        confidence: Option<f64>,
        #[serde(deserialize_with = "integer")]
        count: u32,
        #[serde(deserialize_with = "opt_integer")]
        index: Option<i64>,
        #[serde(deserialize_with = "priority")]
        priority: u8,
    }

    fn loose(value: Value) -> Loose {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_nulls_read_as_defaults() {
        let parsed = loose(json!({
            "name": null, "tags": null, "score": null,
            "confidence": null, "count": null, "index": null
        }));
        assert_eq!(parsed.name, "");
        assert!(parsed.tags.is_empty());
        assert_eq!(parsed.score, 0.0);
        assert_eq!(parsed.confidence, None);
        assert_eq!(parsed.count, 0);
        assert_eq!(parsed.index, None);
    }

    #[test]
    fn test_quoted_numbers() {
        let parsed = loose(json!({
            "score": "85", "confidence": " 72% ", "count": "120", "index": "2"
        }));
        assert_eq!(parsed.score, 85.0);
        assert_eq!(parsed.confidence, Some(72.0));
        assert_eq!(parsed.count, 120);
        assert_eq!(parsed.index, Some(2));
    }

    #[test]
    fn test_unreadable_numbers_fall_back() {
        let parsed = loose(json!({"score": "high", "confidence": [1], "count": -4}));
        assert_eq!(parsed.score, 0.0);
        assert_eq!(parsed.confidence, None);
        assert_eq!(parsed.count, 0);
    }

    #[test]
    fn test_priority_words_and_ranks() {
        assert_eq!(loose(json!({"priority": 2})).priority, 2);
        assert_eq!(loose(json!({"priority": "3"})).priority, 3);
        assert_eq!(loose(json!({"priority": "High"})).priority, 1);
        assert_eq!(loose(json!({"priority": "medium"})).priority, 2);
        assert_eq!(loose(json!({"priority": "low"})).priority, 3);
        assert_eq!(loose(json!({"priority": "someday"})).priority, u8::MAX);
        assert_eq!(loose(json!({"priority": null})).priority, u8::MAX);
    }
}
