//! Pub/Sub push envelope validation.
//!
//! A push request body looks like:
//!
//! ```json
//! { "message": { "data": "<base64>", "attributes": {"deviceId": "..."},
//!                "publishTime": "<RFC3339>", "messageId": "..." },
//!   "subscription": "projects/.../subscriptions/..." }
//! ```
//!
//! Structural problems (not JSON, not an object, no `message`) are reported
//! as `MalformedEnvelope`; absent leaf fields as `MissingField`. An empty body
//! gets its own `EmptyBody` variant so it can be told apart in logs.

use chrono::DateTime;
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::models::PubSubMessage;

// ---

/// Validate a raw push body and extract the inner message.
pub fn validate(body: &[u8]) -> Result<PubSubMessage> {
    // ---
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(PipelineError::EmptyBody);
    }

    let envelope: Value = serde_json::from_slice(body)
        .map_err(|e| PipelineError::MalformedEnvelope(format!("body is not valid JSON: {e}")))?;

    let envelope = envelope.as_object().ok_or_else(|| {
        PipelineError::MalformedEnvelope("body is not a JSON object".to_string())
    })?;

    let message = envelope
        .get("message")
        .ok_or_else(|| {
            PipelineError::MalformedEnvelope("message not contained in envelope".to_string())
        })?
        .as_object()
        .ok_or_else(|| PipelineError::MalformedEnvelope("message is not an object".to_string()))?;

    let data = required_str(message, "data", "message.data")?;

    let device_id = match message.get("attributes") {
        None | Some(Value::Null) => None,
        Some(Value::Object(attributes)) => optional_str(attributes, "deviceId")?,
        Some(_) => {
            return Err(PipelineError::MalformedEnvelope(
                "message.attributes is not an object".to_string(),
            ))
        }
    }
    .filter(|id| !id.is_empty())
    .ok_or(PipelineError::MissingField("message.attributes.deviceId"))?;

    let publish_time = required_str(message, "publishTime", "message.publishTime")?;
    DateTime::parse_from_rfc3339(&publish_time).map_err(|e| {
        PipelineError::MalformedEnvelope(format!(
            "message.publishTime '{publish_time}' is not RFC 3339: {e}"
        ))
    })?;

    let message_id = optional_str(message, "messageId")?;

    Ok(PubSubMessage {
        data,
        device_id,
        publish_time,
        message_id,
    })
}

fn required_str(object: &Map<String, Value>, key: &str, path: &'static str) -> Result<String> {
    // ---
    optional_str(object, key)?.ok_or(PipelineError::MissingField(path))
}

fn optional_str(object: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    // ---
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(PipelineError::MalformedEnvelope(format!(
            "{key} must be a string, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    fn body(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    fn valid_envelope() -> Value {
        // ---
        json!({
            "message": {
                "data": "eyJNb2lzdHVyZVBjdCI6IDQyfQ==",
                "attributes": {"deviceId": "plant-01"},
                "publishTime": "2025-03-26T18:45:00.123Z",
                "messageId": "1234"
            },
            "subscription": "projects/p/subscriptions/s"
        })
    }

    #[test]
    fn test_valid_envelope() {
        // ---
        let message = validate(&body(valid_envelope())).unwrap();

        assert_eq!(message.data, "eyJNb2lzdHVyZVBjdCI6IDQyfQ==");
        assert_eq!(message.device_id, "plant-01");
        assert_eq!(message.publish_time, "2025-03-26T18:45:00.123Z");
        assert_eq!(message.message_id.as_deref(), Some("1234"));
    }

    #[test]
    fn test_empty_body_is_distinct() {
        // ---
        assert_eq!(validate(b""), Err(PipelineError::EmptyBody));
        assert_eq!(validate(b"  \n"), Err(PipelineError::EmptyBody));
    }

    #[test]
    fn test_structural_errors_are_malformed() {
        // ---
        for raw in [
            b"not json".to_vec(),
            body(json!([1, 2, 3])),
            body(json!(null)),
            body(json!({"msg": {}})),
            body(json!({"message": "text"})),
        ] {
            let err = validate(&raw).unwrap_err();
            assert!(
                matches!(err, PipelineError::MalformedEnvelope(_)),
                "expected MalformedEnvelope, got {err:?}"
            );
        }
    }

    #[test]
    fn test_missing_leaf_fields() {
        // ---
        let cases = [
            ("data", "message.data"),
            ("attributes", "message.attributes.deviceId"),
            ("publishTime", "message.publishTime"),
        ];
        for (key, path) in cases {
            let mut envelope = valid_envelope();
            envelope["message"].as_object_mut().unwrap().remove(key);
            assert_eq!(
                validate(&body(envelope)),
                Err(PipelineError::MissingField(path))
            );
        }
    }

    #[test]
    fn test_empty_device_id_is_missing() {
        // ---
        let mut envelope = valid_envelope();
        envelope["message"]["attributes"] = json!({"deviceId": ""});
        assert_eq!(
            validate(&body(envelope)),
            Err(PipelineError::MissingField("message.attributes.deviceId"))
        );
    }

    #[test]
    fn test_wrong_types_are_malformed() {
        // ---
        let mut envelope = valid_envelope();
        envelope["message"]["data"] = json!(42);
        assert!(matches!(
            validate(&body(envelope)),
            Err(PipelineError::MalformedEnvelope(_))
        ));

        let mut envelope = valid_envelope();
        envelope["message"]["publishTime"] = json!("yesterday");
        assert!(matches!(
            validate(&body(envelope)),
            Err(PipelineError::MalformedEnvelope(_))
        ));
    }
}
