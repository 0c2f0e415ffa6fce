//! Pure payload transform
//!
//! Rewrites every item of a payload document so that its `name` carries the
//! configured prefix:
//!
//! ```text
//! {"body":[{"name":"temp","value":42}]}  --prefix "site1"-->  {"body":[{"name":"site1.temp","value":42}]}
//! ```
//!
//! All functions here are pure: no I/O, no logging, no shared state. The
//! transform is deliberately not idempotent, running it twice yields
//! `site1.site1.temp`.

use serde_json::Value;
use thiserror::Error;

/// Key holding the ordered list of items
pub const BODY_FIELD: &str = "body";
/// Key rewritten on every item
pub const NAME_FIELD: &str = "name";
/// Separator placed between the prefix and the original name
pub const PREFIX_SEPARATOR: char = '.';

/// Errors raised while decoding or rewriting a payload
#[derive(Debug, Error, PartialEq)]
pub enum TransformError {
    #[error("Payload is not valid UTF-8: {0}")]
    InvalidUtf8(String),
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("Payload document is not a JSON object")]
    NotAnObject,
    #[error("Payload document has no `body` field")]
    MissingBody,
    #[error("Payload `body` field is not an array")]
    BodyNotArray,
    #[error("Item {index} in `body` is not a JSON object")]
    ItemNotObject { index: usize },
    #[error("Item {index} in `body` has no `name` field")]
    MissingName { index: usize },
    #[error("Item {index} in `body` has a `name` that is not a string")]
    NameNotString { index: usize },
}

impl TransformError {
    /// True when the payload bytes could not be decoded at all
    pub fn is_encoding_error(&self) -> bool {
        matches!(
            self,
            TransformError::InvalidUtf8(_) | TransformError::InvalidJson(_)
        )
    }

    /// True when the payload decoded but does not have the expected shape
    pub fn is_schema_error(&self) -> bool {
        !self.is_encoding_error()
    }
}

/// Build the prefixed form of a single name
pub fn prefixed_name(prefix: &str, name: &str) -> String {
    let mut prefixed = String::with_capacity(prefix.len() + 1 + name.len());
    prefixed.push_str(prefix);
    prefixed.push(PREFIX_SEPARATOR);
    prefixed.push_str(name);
    prefixed
}

/// Prefix the `name` of every item in `document.body`, in place.
///
/// Every item is checked before the first one is touched, so on error the
/// document is left exactly as it was.
pub fn prefix_item_names(document: &mut Value, prefix: &str) -> Result<(), TransformError> {
    let items = body_items_mut(document)?;

    for (index, item) in items.iter().enumerate() {
        validate_item(index, item)?;
    }

    for item in items.iter_mut() {
        if let Some(Value::String(name)) = item.get_mut(NAME_FIELD) {
            let updated = prefixed_name(prefix, name);
            *name = updated;
        }
    }

    Ok(())
}

/// Decode, transform and re-encode a raw payload
pub fn transform_payload(payload: &[u8], prefix: &str) -> Result<Vec<u8>, TransformError> {
    let mut document = decode_payload(payload)?;
    prefix_item_names(&mut document, prefix)?;
    serde_json::to_vec(&document).map_err(|e| TransformError::InvalidJson(e.to_string()))
}

/// Decode raw bytes as UTF-8 JSON text
pub fn decode_payload(payload: &[u8]) -> Result<Value, TransformError> {
    let text =
        std::str::from_utf8(payload).map_err(|e| TransformError::InvalidUtf8(e.to_string()))?;
    serde_json::from_str(text).map_err(|e| TransformError::InvalidJson(e.to_string()))
}

fn body_items_mut(document: &mut Value) -> Result<&mut Vec<Value>, TransformError> {
    let object = document
        .as_object_mut()
        .ok_or(TransformError::NotAnObject)?;
    match object.get_mut(BODY_FIELD) {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(TransformError::BodyNotArray),
        None => Err(TransformError::MissingBody),
    }
}

fn validate_item(index: usize, item: &Value) -> Result<(), TransformError> {
    let object = item
        .as_object()
        .ok_or(TransformError::ItemNotObject { index })?;
    match object.get(NAME_FIELD) {
        Some(Value::String(_)) => Ok(()),
        Some(_) => Err(TransformError::NameNotString { index }),
        None => Err(TransformError::MissingName { index }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefixed_name() {
        assert_eq!(prefixed_name("site1", "temp"), "site1.temp");
        assert_eq!(prefixed_name("", "temp"), ".temp");
        assert_eq!(prefixed_name("a.b", "c"), "a.b.c");
    }

    #[test]
    fn test_prefix_item_names_rewrites_every_item() {
        let mut document = json!({
            "body": [
                {"name": "temp", "value": 42},
                {"name": "pressure", "value": 7}
            ]
        });

        prefix_item_names(&mut document, "site1").unwrap();

        assert_eq!(
            document,
            json!({
                "body": [
                    {"name": "site1.temp", "value": 42},
                    {"name": "site1.pressure", "value": 7}
                ]
            })
        );
    }

    #[test]
    fn test_empty_body_is_accepted() {
        let mut document = json!({"body": []});
        prefix_item_names(&mut document, "site1").unwrap();
        assert_eq!(document, json!({"body": []}));
    }

    #[test]
    fn test_top_level_fields_are_untouched() {
        let mut document = json!({
            "messageId": "abc",
            "body": [{"name": "temp"}],
            "name": "not-an-item"
        });

        prefix_item_names(&mut document, "p").unwrap();

        assert_eq!(document["messageId"], "abc");
        assert_eq!(document["name"], "not-an-item");
        assert_eq!(document["body"][0]["name"], "p.temp");
    }

    #[test]
    fn test_missing_body() {
        let mut document = json!({"items": []});
        assert_eq!(
            prefix_item_names(&mut document, "p"),
            Err(TransformError::MissingBody)
        );
    }

    #[test]
    fn test_body_not_array() {
        let mut document = json!({"body": {"name": "temp"}});
        assert_eq!(
            prefix_item_names(&mut document, "p"),
            Err(TransformError::BodyNotArray)
        );
    }

    #[test]
    fn test_document_not_object() {
        let mut document = json!([{"name": "temp"}]);
        assert_eq!(
            prefix_item_names(&mut document, "p"),
            Err(TransformError::NotAnObject)
        );
    }

    #[test]
    fn test_item_errors_report_index() {
        let mut missing = json!({"body": [{"name": "ok"}, {"value": 1}]});
        assert_eq!(
            prefix_item_names(&mut missing, "p"),
            Err(TransformError::MissingName { index: 1 })
        );

        let mut not_string = json!({"body": [{"name": 5}]});
        assert_eq!(
            prefix_item_names(&mut not_string, "p"),
            Err(TransformError::NameNotString { index: 0 })
        );

        let mut not_object = json!({"body": [{"name": "ok"}, {"name": "ok"}, "temp"]});
        assert_eq!(
            prefix_item_names(&mut not_object, "p"),
            Err(TransformError::ItemNotObject { index: 2 })
        );
    }

    #[test]
    fn test_failed_transform_leaves_document_unchanged() {
        let original = json!({"body": [{"name": "first"}, {"value": 1}]});
        let mut document = original.clone();

        assert!(prefix_item_names(&mut document, "p").is_err());
        assert_eq!(document, original);
    }

    #[test]
    fn test_transform_payload_bytes() {
        let input = br#"{"body":[{"name":"temp","value":42},{"name":"pressure","value":7}]}"#;
        let output = transform_payload(input, "site1").unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            r#"{"body":[{"name":"site1.temp","value":42},{"name":"site1.pressure","value":7}]}"#
        );
    }

    #[test]
    fn test_transform_payload_preserves_key_order() {
        let input = br#"{"body":[{"value":1,"name":"x","quality":3}]}"#;
        let output = transform_payload(input, "p").unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            r#"{"body":[{"value":1,"name":"p.x","quality":3}]}"#
        );
    }

    #[test]
    fn test_transform_payload_encoding_errors() {
        let invalid_utf8 = transform_payload(&[0xff, 0xfe, 0xfd], "p").unwrap_err();
        assert!(matches!(invalid_utf8, TransformError::InvalidUtf8(_)));
        assert!(invalid_utf8.is_encoding_error());

        let invalid_json = transform_payload(b"{not json", "p").unwrap_err();
        assert!(matches!(invalid_json, TransformError::InvalidJson(_)));
        assert!(invalid_json.is_encoding_error());
    }

    #[test]
    fn test_schema_error_classification() {
        assert!(TransformError::MissingBody.is_schema_error());
        assert!(TransformError::BodyNotArray.is_schema_error());
        assert!(TransformError::MissingName { index: 0 }.is_schema_error());
        assert!(!TransformError::InvalidJson("x".to_string()).is_schema_error());
    }
}
