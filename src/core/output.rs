//! Compact text rendering of command envelopes for terminal output.
//!
//! JSON output prints the envelope as is; text output drops the envelope
//! bookkeeping and prints one bounded line per entity.

use serde_json::Value;

const ENVELOPE_KEYS: &[&str] = &["envelope_version", "ts", "event_id", "cmd", "status"];
const MAX_LINE_CHARS: usize = 160;

/// Collapse newlines/extra whitespace and bound length for terminal display.
pub fn compact_line(input: &str, max_chars: usize) -> String {
    let collapsed = input.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let preview: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

/// Scalar fields of an object as `key=value` pairs; nested values are counted.
fn summarize(value: &Value) -> String {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| match v {
                Value::String(s) => format!("{}={}", k, s),
                Value::Array(items) => format!("{}=[{}]", k, items.len()),
                Value::Object(_) => format!("{}={{..}}", k),
                other => format!("{}={}", k, other),
            })
            .collect::<Vec<_>>()
            .join(" "),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render the payload of a command envelope as text lines.
pub fn render_text(envelope: &Value) -> String {
    let Some(map) = envelope.as_object() else {
        return compact_line(&envelope.to_string(), MAX_LINE_CHARS);
    };
    let mut lines = Vec::new();
    for (key, value) in map.iter().filter(|(k, _)| !ENVELOPE_KEYS.contains(&k.as_str())) {
        match value {
            Value::Array(items) if items.is_empty() => lines.push(format!("{}: (none)", key)),
            Value::Array(items) => {
                lines.push(format!("{}:", key));
                for item in items {
                    lines.push(format!("  {}", compact_line(&summarize(item), MAX_LINE_CHARS)));
                }
            }
            other => lines.push(format!(
                "{}: {}",
                key,
                compact_line(&summarize(other), MAX_LINE_CHARS)
            )),
        }
    }
    lines.join("\n")
}
