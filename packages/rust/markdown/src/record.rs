//! Flat JSON record → outline text.
//!
//! The title fields become one top-level list item; every remaining field
//! becomes a nested `key: value` item underneath it.

use serde_json::{Map, Value};

use atomizer_shared::{AtomizerError, Result};

/// Parse a JSON document that must be a single object.
pub fn parse_record(json: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AtomizerError::parse(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(AtomizerError::parse(format!("invalid record JSON: {e}"))),
    }
}

/// Render a record as an outline the parser turns into one list tree.
///
/// Missing title fields are skipped. Field order follows the record.
pub fn record_to_markdown(record: &Map<String, Value>, title_fields: &[&str]) -> String {
    let title: Vec<String> = title_fields
        .iter()
        .filter_map(|field| record.get(*field))
        .map(display_value)
        .collect();

    let mut markdown = format!("- {}\n", title.join(" "));

    for (key, value) in record {
        if title_fields.contains(&key.as_str()) {
            continue;
        }
        markdown.push_str(&format!("  - {key}: {}\n", display_value(value)));
    }

    markdown
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
