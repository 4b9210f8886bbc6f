//! Newline-delimited JSON framing for the worker channel.
//!
//! One message per line, one JSON value per message. A JSON string is carried
//! as its contents; any other JSON value is carried as its compact text.

/// Encodes one message as a framed line (trailing `\n` included).
pub fn encode(message: &str) -> String {
    // Serializing a `str` cannot fail.
    let mut line = serde_json::Value::String(message.to_string()).to_string();
    line.push('\n');
    line
}

/// Decodes one framed line.
///
/// Returns `Ok(None)` for blank lines.
pub fn decode(line: &str) -> Result<Option<String>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let value: serde_json::Value = serde_json::from_str(line)?;
    Ok(Some(match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }))
}
