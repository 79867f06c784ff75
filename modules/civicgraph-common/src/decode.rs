//! Normalization of collection-like source columns.
//!
//! The same logical field may arrive as a native text array, as delimited text,
//! or as JSON. Each shape is decoded here once so mappers only ever see ordered
//! sequences. Decoding never fails: unreadable input is an empty collection.

use serde_json::Value;
use tracing::warn;

use crate::types::ColumnValue;

/// Default delimiter for comma-separated text fields.
pub const LIST_DELIMITER: char = ',';

/// Decode a list-like column into trimmed, non-empty strings in source order.
///
/// - native list: iterated directly
/// - text: split on `delimiter`
/// - JSON array: one entry per element; JSON string: split like text
/// - any other scalar: a single-element list
pub fn decode_list(value: Option<&ColumnValue>, delimiter: char) -> Vec<String> {
    let raw: Vec<String> = match value {
        None | Some(ColumnValue::Null) => Vec::new(),
        Some(ColumnValue::TextList(items)) => items.clone(),
        Some(ColumnValue::Text(s)) => split(s, delimiter),
        Some(ColumnValue::Json(Value::Array(items))) => items.iter().filter_map(json_scalar).collect(),
        Some(ColumnValue::Json(Value::String(s))) => split(s, delimiter),
        Some(ColumnValue::Json(Value::Null)) => Vec::new(),
        Some(ColumnValue::Json(other)) => json_scalar(other).into_iter().collect(),
        Some(scalar) => scalar.as_text().into_iter().collect(),
    };

    raw.into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Decode a structured column. Text is parsed as JSON; a parse failure yields `None`.
///
/// A JSON column holding a string is double-encoded and gets parsed once more.
pub fn decode_json(value: Option<&ColumnValue>) -> Option<Value> {
    match value? {
        ColumnValue::Json(Value::Null) => None,
        ColumnValue::Json(Value::String(s)) | ColumnValue::Text(s) => parse_structured(s),
        ColumnValue::Json(v) => Some(v.clone()),
        ColumnValue::TextList(items) => Some(Value::Array(
            items.iter().cloned().map(Value::String).collect(),
        )),
        _ => None,
    }
}

fn parse_structured(raw: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Null) => None,
        Ok(v) => Some(v),
        Err(e) => {
            warn!(error = %e, "Unparseable structured field, treating as empty");
            None
        }
    }
}

/// A quote attached to an insight, with its position in the source list.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteItem {
    pub index: usize,
    pub text: String,
    pub speaker: Option<String>,
}

/// Decode a quotes column: a JSON list of strings or `{quote|text, speaker}` objects.
///
/// Entries without text are skipped but keep their slot, so indices stay stable
/// across re-runs of the same row.
pub fn decode_quotes(value: Option<&ColumnValue>) -> Vec<QuoteItem> {
    let Some(Value::Array(items)) = decode_json(value) else {
        return Vec::new();
    };

    items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let (text, speaker) = match item {
                Value::Object(map) => {
                    let text = map
                        .get("quote")
                        .and_then(non_empty_str)
                        .or_else(|| map.get("text").and_then(non_empty_str));
                    let speaker = map.get("speaker").and_then(non_empty_str);
                    (text, speaker)
                }
                Value::Null => (None, None),
                other => (json_scalar(other).filter(|s| !s.trim().is_empty()), None),
            };
            text.map(|text| QuoteItem {
                index,
                text,
                speaker,
            })
        })
        .collect()
}

/// Decode a typed-entities column: a JSON object of `type -> [names]`.
///
/// Returns `(type, names)` pairs in key order; non-list values are ignored.
pub fn decode_typed_entities(value: Option<&ColumnValue>) -> Vec<(String, Vec<String>)> {
    let Some(Value::Object(map)) = decode_json(value) else {
        return Vec::new();
    };

    map.iter()
        .filter_map(|(entity_type, names)| match names {
            Value::Array(items) => {
                let names: Vec<String> = items
                    .iter()
                    .filter_map(json_scalar)
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
                Some((entity_type.clone(), names))
            }
            _ => None,
        })
        .collect()
}

fn split(s: &str, delimiter: char) -> Vec<String> {
    s.split(delimiter).map(str::to_string).collect()
}

fn json_scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn non_empty_str(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn delimited_text_is_split_and_trimmed() {
        let v = ColumnValue::Text(" housing, transit ,, zoning ".into());
        assert_eq!(decode_list(Some(&v), ','), vec!["housing", "transit", "zoning"]);
    }

    #[test]
    fn native_list_is_iterated_directly() {
        let v = ColumnValue::TextList(vec!["a, b".into(), " c ".into(), "".into()]);
        assert_eq!(decode_list(Some(&v), ','), vec!["a, b", "c"]);
    }

    #[test]
    fn json_array_and_scalars() {
        let v = ColumnValue::Json(json!(["x", 3, null, {"k": 1}]));
        assert_eq!(decode_list(Some(&v), ','), vec!["x", "3"]);

        let n = ColumnValue::Int(7);
        assert_eq!(decode_list(Some(&n), ','), vec!["7"]);
        assert!(decode_list(None, ',').is_empty());
        assert!(decode_list(Some(&ColumnValue::Null), ',').is_empty());
    }

    #[test]
    fn unparseable_structured_text_is_empty() {
        let v = ColumnValue::Text("{not json".into());
        assert_eq!(decode_json(Some(&v)), None);
        assert!(decode_quotes(Some(&v)).is_empty());
        assert!(decode_typed_entities(Some(&v)).is_empty());
    }

    #[test]
    fn double_encoded_json_is_parsed_again() {
        let quotes = ColumnValue::Json(Value::String(
            r#"["We can afford this", {"quote": "Not now", "speaker": "Ortiz"}]"#.into(),
        ));
        let decoded = decode_quotes(Some(&quotes));
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[1].speaker.as_deref(), Some("Ortiz"));

        let entities = ColumnValue::Json(Value::String(r#"{"people": ["Ortiz"]}"#.into()));
        assert_eq!(
            decode_typed_entities(Some(&entities)),
            vec![("people".to_string(), vec!["Ortiz".to_string()])]
        );

        let garbage = ColumnValue::Json(Value::String("[not json".into()));
        assert_eq!(decode_json(Some(&garbage)), None);
    }

    #[test]
    fn quotes_keep_their_position() {
        let v = ColumnValue::Json(json!([
            {"quote": "We need more buses", "speaker": "Jane Doe"},
            {"speaker": "No Text"},
            "Same words",
            {"text": "Same words", "speaker": "  "}
        ]));
        let quotes = decode_quotes(Some(&v));
        assert_eq!(quotes.len(), 3);
        assert_eq!(quotes[0].index, 0);
        assert_eq!(quotes[0].speaker.as_deref(), Some("Jane Doe"));
        assert_eq!(quotes[1].index, 2);
        assert_eq!(quotes[1].text, "Same words");
        assert_eq!(quotes[2].index, 3);
        assert_eq!(quotes[2].text, "Same words");
        assert_eq!(quotes[2].speaker, None);
    }

    #[test]
    fn quotes_from_text_json() {
        let v = ColumnValue::Text(r#"["one", "two"]"#.into());
        let quotes = decode_quotes(Some(&v));
        assert_eq!(quotes.iter().map(|q| q.text.as_str()).collect::<Vec<_>>(), vec!["one", "two"]);
    }

    #[test]
    fn typed_entities_by_key() {
        let v = ColumnValue::Json(json!({
            "organizations": ["Metro Transit", " "],
            "people": ["Jane Doe"],
            "note": "ignored"
        }));
        let entities = decode_typed_entities(Some(&v));
        assert_eq!(
            entities,
            vec![
                ("organizations".to_string(), vec!["Metro Transit".to_string()]),
                ("people".to_string(), vec!["Jane Doe".to_string()]),
            ]
        );
    }
}
