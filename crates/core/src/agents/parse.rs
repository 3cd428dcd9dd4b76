//! # Response Parsing
//!
//! Generators answer in free text. Stages locate the first balanced
//! `{...}` object in that text and normalize it through their output shape.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Why a generator reply yielded no structured output
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in response")]
    NoObject,

    #[error("JSON object starting at byte {start} is never closed")]
    Unbalanced { start: usize },

    #[error("malformed JSON object: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Extract the first balanced JSON object from `text`.
///
/// Braces inside string literals are ignored, including escaped quotes.
pub fn extract_json_object(text: &str) -> Result<Value, ParseError> {
    let start = text.find('{').ok_or(ParseError::NoObject)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return serde_json::from_str(&text[start..end]).map_err(ParseError::Malformed);
                }
            }
            _ => {}
        }
    }

    Err(ParseError::Unbalanced { start })
}

/// Extract the first object and normalize it through `T`.
///
/// The returned value is `T` re-serialized, so missing fields come back
/// with their defaults. An object `T` cannot read is returned as-is; a
/// reply is only rejected when it holds no usable JSON object.
pub fn parse_as<T>(text: &str) -> Result<Value, ParseError>
where
    T: DeserializeOwned + Serialize,
{
    let raw = extract_json_object(text)?;

    match serde_json::from_value::<T>(raw.clone()).and_then(serde_json::to_value) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::warn!(
                shape = std::any::type_name::<T>(),
                error = %e,
                "Reply does not match the output shape, keeping the raw object"
            );
            Ok(raw)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_extracts_object_from_prose() {
        let text = "Sure! Here is the result:\n```json\n{\"a\": 1, \"b\": {\"c\": 2}}\n```\nHope it helps {really}.";
        assert_eq!(
            extract_json_object(text).unwrap(),
            json!({"a": 1, "b": {"c": 2}})
        );
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let text = r#"{"summary": "uses } and { and \" quotes", "n": 3} trailing"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["n"], 3);
        assert_eq!(value["summary"], "uses } and { and \" quotes");
    }

    #[test]
    fn test_no_object() {
        assert!(matches!(
            extract_json_object("I could not find anything."),
            Err(ParseError::NoObject)
        ));
        assert!(matches!(extract_json_object(""), Err(ParseError::NoObject)));
    }

    #[test]
    fn test_unbalanced_object() {
        assert!(matches!(
            extract_json_object("prefix {\"a\": {\"b\": 1}"),
            Err(ParseError::Unbalanced { start: 7 })
        ));
    }

    #[test]
    fn test_malformed_object() {
        assert!(matches!(
            extract_json_object("{not: json}"),
            Err(ParseError::Malformed(_))
        ));
    }

    #[derive(Serialize, Deserialize)]
    struct Scored {
        score: u32,
        #[serde(default)]
        label: String,
    }

    #[test]
    fn test_parse_as_fills_defaults() {
        let value = parse_as::<Scored>("{\"score\": 7}").unwrap();
        assert_eq!(value, json!({"score": 7, "label": ""}));
    }

    #[test]
    fn test_parse_as_keeps_unreadable_object() {
        let value = parse_as::<Scored>("{\"score\": \"high\", \"note\": 1}").unwrap();
        assert_eq!(value, json!({"score": "high", "note": 1}));
    }
}
