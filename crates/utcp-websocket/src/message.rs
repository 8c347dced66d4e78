//! Rendering a tool call's argument object as an outgoing WebSocket text
//! frame.

use serde_json::{Map, Value};

fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Deep-substitute `${name}` placeholders in `template` with values from
/// `args`. A string value that is *exactly* one placeholder is replaced
/// with the typed argument value (preserving objects/arrays/numbers);
/// placeholders embedded in a longer string are replaced with the
/// argument's plain-string rendering.
fn substitute(template: &Value, args: &Map<String, Value>) -> Value {
    match template {
        Value::String(s) => {
            if let Some(name) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}'))
                && let Some(value) = args.get(name)
            {
                return value.clone();
            }
            let mut out = s.clone();
            for (name, value) in args {
                let placeholder = format!("${{{name}}}");
                out = out.replace(&placeholder, &value_to_plain_string(value));
            }
            Value::String(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, args)).collect()),
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), substitute(v, args))).collect())
        }
        other => other.clone(),
    }
}

/// Render the outgoing text frame: when `message` is
/// configured, substitute `${arg}` placeholders into it (deep for
/// maps/lists) and JSON-encode the result if it is composite or stringify
/// it otherwise; when absent, JSON-encode `args` directly.
#[must_use]
pub fn render_message(message: Option<&Value>, args: &Value) -> String {
    let empty = Map::new();
    let arg_map = args.as_object().unwrap_or(&empty);

    match message {
        Some(template) => {
            let rendered = substitute(template, arg_map);
            match rendered {
                Value::String(s) => s,
                composite => composite.to_string(),
            }
        }
        None => args.to_string(),
    }
}
