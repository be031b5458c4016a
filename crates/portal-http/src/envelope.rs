//! The backend response envelope.
//!
//! Every JSON response is wrapped as
//! `{ success, status, message?, data?, errors? }`. Error bodies are not always
//! envelopes, so generic `error`/`detail` fields are picked up as well.

use portal_core::PortalError;
use serde_json::Value;

/// A decoded response envelope.
///
/// Decoding is lenient: unknown or mistyped fields are ignored instead of
/// failing the whole response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Envelope {
    /// Success flag, when present.
    pub success: Option<bool>,
    /// Status echoed in the body, when present.
    pub status: Option<u16>,
    /// Structured backend message.
    pub message: Option<String>,
    /// Payload.
    pub data: Option<Value>,
    /// Field-level error details.
    pub errors: Vec<String>,
    /// Generic message from an `error` or `detail` field.
    pub body_message: Option<String>,
}

impl Envelope {
    /// Decodes an envelope from a JSON body.
    ///
    /// A body that is not a JSON object yields an envelope whose `data` is the
    /// body itself.
    #[must_use]
    pub fn from_value(body: Value) -> Self {
        let mut fields = match body {
            Value::Object(fields) => fields,
            other => {
                return Self {
                    data: Some(other),
                    ..Self::default()
                };
            }
        };

        let text = |value: Option<Value>| match value {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
            _ => None,
        };

        let errors = match fields.remove("errors") {
            Some(Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
            Some(Value::String(s)) => vec![s],
            _ => Vec::new(),
        };

        Self {
            success: fields.get("success").and_then(Value::as_bool),
            status: fields
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|s| u16::try_from(s).ok()),
            message: text(fields.remove("message")),
            data: fields.remove("data").filter(|d| !d.is_null()),
            errors,
            body_message: text(fields.remove("error")).or_else(|| text(fields.remove("detail"))),
        }
    }

    /// Decodes an envelope from raw bytes, or `None` if they are not JSON.
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Value>(bytes)
            .ok()
            .map(Self::from_value)
    }

    /// Builds the HTTP error described by this envelope.
    #[must_use]
    pub fn into_error(self, status: u16) -> PortalError {
        PortalError::Http {
            status,
            message: self.message,
            body_message: self.body_message,
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_success_envelope() {
        let envelope = Envelope::from_value(json!({
            "success": true,
            "status": 200,
            "message": "OK",
            "data": [{ "pk": 1 }]
        }));
        assert_eq!(envelope.success, Some(true));
        assert_eq!(envelope.status, Some(200));
        assert_eq!(envelope.message.as_deref(), Some("OK"));
        assert_eq!(envelope.data, Some(json!([{ "pk": 1 }])));
        assert!(envelope.errors.is_empty());
    }

    #[test]
    fn test_decode_error_body() {
        let envelope = Envelope::from_value(json!({
            "success": false,
            "message": "  ",
            "detail": "Token expired",
            "errors": ["champ requis", { "field": "nom" }]
        }));
        assert_eq!(envelope.message, None);
        assert_eq!(envelope.body_message.as_deref(), Some("Token expired"));
        assert_eq!(envelope.errors, vec!["champ requis", r#"{"field":"nom"}"#]);

        let err = envelope.into_error(422);
        assert_eq!(err.status(), Some(422));
    }

    #[test]
    fn test_bare_payload() {
        let envelope = Envelope::from_value(json!([1, 2]));
        assert_eq!(envelope.data, Some(json!([1, 2])));
        assert_eq!(envelope.success, None);

        assert_eq!(Envelope::from_slice(b"<html>"), None);
    }
}
