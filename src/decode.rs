//! Decoding of the telemetry blob carried in `message.data`.
//!
//! Devices publish a small JSON object, base64-encoded by Pub/Sub. Older
//! firmware spells the fields `MoisturePct`/`MoistureVal`, newer firmware
//! `moisture_pct`/`moisture_value`; [`FIELD_ALIASES`] maps both onto the
//! canonical names.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::models::DeviceTelemetry;

// ---

/// Canonical telemetry field names and the spellings accepted for each.
const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("moisture_pct", &["MoisturePct", "moisture_pct"]),
    ("moisture_value", &["MoistureVal", "moisture_value"]),
];

/// Decode base64 `data` into device telemetry.
///
/// Returns `EmptyPayload` for heartbeats: blank text, or JSON that carries
/// nothing (`null`, `{}`, `[]`, `""`).
pub fn decode_payload(data: &str) -> Result<DeviceTelemetry> {
    // ---
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| PipelineError::DecodeError(format!("invalid base64: {e}")))?;

    let text = String::from_utf8(bytes)
        .map_err(|e| PipelineError::DecodeError(format!("invalid UTF-8: {e}")))?;
    let text = text.trim();

    tracing::debug!("Decoded data: {}", text);

    if text.is_empty() {
        return Err(PipelineError::EmptyPayload);
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|e| PipelineError::DecodeError(format!("invalid JSON: {e}")))?;

    match value {
        Value::Null => Err(PipelineError::EmptyPayload),
        Value::Object(fields) if fields.is_empty() => Err(PipelineError::EmptyPayload),
        Value::Array(items) if items.is_empty() => Err(PipelineError::EmptyPayload),
        Value::String(text) if text.trim().is_empty() => Err(PipelineError::EmptyPayload),
        Value::Object(fields) => {
            let [moisture_pct, moisture_value] = resolve_fields(&fields)?;
            Ok(DeviceTelemetry {
                moisture_pct,
                moisture_value,
            })
        }
        other => Err(PipelineError::SchemaError(format!(
            "telemetry must be a JSON object, got {other}"
        ))),
    }
}

fn resolve_fields(fields: &Map<String, Value>) -> Result<[f64; 2]> {
    // ---
    let mut resolved = [0.0; 2];
    for (slot, (canonical, aliases)) in resolved.iter_mut().zip(FIELD_ALIASES) {
        let raw = aliases
            .iter()
            .find_map(|alias| fields.get(*alias).filter(|v| !v.is_null()))
            .ok_or_else(|| {
                PipelineError::SchemaError(format!(
                    "missing {canonical} (accepted: {})",
                    aliases.join(", ")
                ))
            })?;
        *slot = coerce_number(canonical, raw)?;
    }
    Ok(resolved)
}

/// Accept JSON numbers and numeric strings; reject anything non-finite.
fn coerce_number(field: &str, value: &Value) -> Result<f64> {
    // ---
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    number
        .filter(|n| n.is_finite())
        .ok_or_else(|| PipelineError::SchemaError(format!("{field} is not a number: {value}")))
}
