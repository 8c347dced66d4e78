//! Formatting a tool call's argument object into the bytes sent over
//! TCP/UDP.

use serde_json::Value;

use utcp_types::call_template::RequestDataFormat;

/// The `UTCP_ARG_<name>_UTCP_ARG` placeholder TCP/UDP text templates use
///, distinct from the CLI transport's `_UTCP_END` suffix.
const ARG_PREFIX: &str = "UTCP_ARG_";
const ARG_SUFFIX: &str = "_UTCP_ARG";

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render `args` per `format`: JSON-encode the whole object, or substitute
/// `UTCP_ARG_<name>_UTCP_ARG` placeholders into `template` (falling back to
/// whitespace-joined values when no template is configured).
#[must_use]
pub fn format_request(args: &Value, format: RequestDataFormat, template: Option<&str>) -> Vec<u8> {
    match format {
        RequestDataFormat::Json => serde_json::to_vec(args).unwrap_or_default(),
        RequestDataFormat::Text => match template {
            Some(tpl) => substitute_placeholders(tpl, args).into_bytes(),
            None => whitespace_joined(args).into_bytes(),
        },
    }
}

fn substitute_placeholders(template: &str, args: &Value) -> String {
    let mut out = template.to_string();
    if let Some(obj) = args.as_object() {
        for (k, v) in obj {
            let placeholder = format!("{ARG_PREFIX}{k}{ARG_SUFFIX}");
            out = out.replace(&placeholder, &value_to_plain_string(v));
        }
    }
    out
}

fn whitespace_joined(args: &Value) -> String {
    match args.as_object() {
        Some(obj) => obj.values().map(value_to_plain_string).collect::<Vec<_>>().join(" "),
        None => value_to_plain_string(args),
    }
}

/// Decode a raw response payload per `response_byte_format`: any configured
/// text encoding name decodes the bytes as UTF-8 (lossy); `None` carries
/// the raw bytes through as a lossy UTF-8 string, matching how the
/// streamable HTTP transport surfaces byte chunks that have no native JSON
/// representation.
#[must_use]
pub fn decode_response(bytes: &[u8], response_byte_format: Option<&str>) -> Value {
    match response_byte_format {
        Some(_) | None => Value::String(String::from_utf8_lossy(bytes).to_string()),
    }
}
