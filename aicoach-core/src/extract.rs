//! Pulls the structured payload out of free-form model output.

use serde_json::Value;

use crate::error::{CoachError, CoreResult};
use crate::model::ExpectedShape;

const FENCE_JSON: &str = "```json";
const FENCE: &str = "```";

/// Locate and parse the `shape`-delimited JSON payload inside `raw`.
///
/// A leading fenced-code marker is stripped, then the slice between the first
/// opening bracket and the last matching closing bracket is parsed.
pub fn extract_structured(provider: &str, raw: &str, shape: ExpectedShape) -> CoreResult<Value> {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix(FENCE_JSON) {
        text = rest;
    } else if let Some(rest) = text.strip_prefix(FENCE) {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix(FENCE) {
        text = rest;
    }

    let (open, close) = shape.brackets();
    let (start, end) = match (text.find(open), text.rfind(close)) {
        (Some(s), Some(e)) if e > s => (s, e),
        _ => {
            return Err(malformed(
                provider,
                format!("no {shape} structure found"),
                raw,
            ));
        }
    };

    serde_json::from_str(text[start..=end].trim())
        .map_err(|e| malformed(provider, format!("json parse error: {e}"), raw))
}

fn malformed(provider: &str, reason: String, raw: &str) -> CoachError {
    CoachError::MalformedStructure {
        provider: provider.to_string(),
        reason,
        raw: raw.to_string(),
    }
}
