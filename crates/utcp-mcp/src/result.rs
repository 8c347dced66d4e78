//! Flattening an MCP `CallToolResult`/`ReadResourceResult` into the plain
//! [`serde_json::Value`] the rest of the client deals in.

use serde_json::Value;

/// Parse `text` as JSON when it looks like a JSON value or bare number,
/// falling back to the raw string otherwise.
#[must_use]
pub fn parse_opportunistic(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Prefer structured output; otherwise flatten a single text content block
/// to its opportunistically-parsed body; otherwise collect every text block
/// into a list; otherwise fall through to `Value::Null`.
#[must_use]
pub fn flatten_call_result(result: rmcp::model::CallToolResult) -> Value {
    if let Some(structured) = result.structured_content {
        return structured;
    }
    let texts: Vec<&str> = result
        .content
        .iter()
        .filter_map(|c| c.raw.as_text().map(|t| t.text.as_str()))
        .collect();
    match texts.as_slice() {
        [] => Value::Null,
        [single] => parse_opportunistic(single),
        many => Value::Array(many.iter().map(|t| parse_opportunistic(t)).collect()),
    }
}

/// Flatten a resource read into the same shape: prefer text content parsed
/// opportunistically, otherwise the raw blob as a string.
#[must_use]
pub fn flatten_resource_result(result: rmcp::model::ReadResourceResult) -> Value {
    let mut out = Vec::new();
    for content in result.contents {
        match content {
            rmcp::model::ResourceContents::TextResourceContents { text, .. } => {
                out.push(parse_opportunistic(&text));
            }
            rmcp::model::ResourceContents::BlobResourceContents { blob, .. } => {
                out.push(Value::String(blob));
            }
        }
    }
    match out.len() {
        0 => Value::Null,
        1 => out.into_iter().next().unwrap(),
        _ => Value::Array(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opportunistic_parse_recovers_json_numbers_and_strings() {
        assert_eq!(parse_opportunistic("42"), serde_json::json!(42));
        assert_eq!(parse_opportunistic("{\"a\":1}"), serde_json::json!({"a": 1}));
        assert_eq!(parse_opportunistic("plain text"), serde_json::json!("plain text"));
    }
}
