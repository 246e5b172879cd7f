use serde_json::{Map, Value};
use thiserror::Error;

/// The shapes a parsed response envelope can take before validation.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Object(Map<String, Value>),
    /// JSON that was itself serialized into a string
    EncodedString(String),
    /// Parsed fine but is neither of the above
    Other(Value),
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum NormalizeError {
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("payload is not an object (got {0})")]
    NotAnObject(&'static str),
}

impl Payload {
    /// Classify a parsed envelope
    pub fn classify(value: Value) -> Self {
        match value {
            Value::String(s) => Payload::EncodedString(s),
            Value::Object(map) => Payload::Object(map),
            other => Payload::Other(other),
        }
    }
}

/// Resolve raw model output into a JSON object.
///
/// `raw` is the model's own text, not a work item file.
///
/// Exactly one extra decoding step is applied when the envelope turns out
/// to be an encoded string; anything still not an object is rejected.
pub fn normalize(raw: &str) -> Result<Map<String, Value>, NormalizeError> {
    let envelope: Value = serde_json::from_str(raw.trim())
        .map_err(|e| NormalizeError::MalformedEnvelope(e.to_string()))?;

    match Payload::classify(envelope) {
        Payload::Object(map) => Ok(map),
        Payload::EncodedString(inner) => {
            let decoded: Value = serde_json::from_str(inner.trim())
                .map_err(|e| NormalizeError::MalformedPayload(e.to_string()))?;
            match decoded {
                Value::Object(map) => Ok(map),
                other => Err(NormalizeError::NotAnObject(kind_of(&other))),
            }
        }
        Payload::Other(other) => Err(NormalizeError::NotAnObject(kind_of(&other))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        let map = normalize(r#"{"rating": 0.4, "reason_rating": "x"}"#).unwrap();
        assert_eq!(map["rating"], 0.4);
    }

    #[test]
    fn test_double_encoded_string() {
        let raw = r#""{\"rating\": 0.7, \"reason_rating\": \"ok\"}""#;
        let map = normalize(raw).unwrap();

        assert_eq!(map["rating"], 0.7);
        assert_eq!(map["reason_rating"], "ok");
    }

    #[test]
    fn test_object_with_response_field_is_taken_as_is() {
        let raw = r#"{"response": "{\"rating\": 1}", "rating": 0.3}"#;
        let map = normalize(raw).unwrap();
        assert_eq!(map["rating"], 0.3);
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        assert!(normalize("  \n{\"a\": 1}\n ").is_ok());
    }

    #[test]
    fn test_not_json() {
        assert!(matches!(
            normalize("not json"),
            Err(NormalizeError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn test_encoded_garbage() {
        assert!(matches!(
            normalize(r#""{rating: oops""#),
            Err(NormalizeError::MalformedPayload(_))
        ));
    }

    #[test]
    fn test_number_is_not_an_object() {
        assert_eq!(normalize("42"), Err(NormalizeError::NotAnObject("number")));
    }

    #[test]
    fn test_encoded_array_is_not_an_object() {
        assert_eq!(normalize(r#""[1, 2]""#), Err(NormalizeError::NotAnObject("array")));
    }
}
