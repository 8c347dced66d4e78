//! Splitting a tool call's argument object into path parameters, header
//! fields, a body, and remaining query parameters.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::Value;

use utcp_types::UtcpResult;

/// The argument object split into the pieces an HTTP-family request needs.
#[derive(Debug, Default)]
pub struct SplitArgs {
    /// Target URL with `{name}` path placeholders substituted.
    pub url: String,
    /// Arguments routed into request headers.
    pub header_args: BTreeMap<String, Value>,
    /// Remaining arguments sent as query parameters.
    pub query_args: BTreeMap<String, Value>,
    /// The single body value, if `body_field` was configured and present.
    pub body: Option<Value>,
}

/// Render a JSON value as a query/header/path string: strings pass through
/// raw, everything else is JSON-encoded.
#[must_use]
pub fn value_to_plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Split `args`: substitute `{name}` path
/// placeholders in `url_template`, pull out header fields and the body
/// field, and return everything left over as query parameters.
///
/// # Errors
///
/// Returns [`utcp_types::UtcpError::CallFailure`] when the URL references a
/// path parameter `args` does not supply.
pub fn split_args(
    url_template: &str,
    args: &Value,
    header_fields: &[String],
    body_field: Option<&str>,
) -> UtcpResult<SplitArgs> {
    let mut remaining: BTreeMap<String, Value> = args
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    let mut url = String::with_capacity(url_template.len());
    let mut last_end = 0;
    let bytes = url_template.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'{' {
            if let Some(close) = url_template[i..].find('}') {
                let name = &url_template[i + 1..i + close];
                url.push_str(&url_template[last_end..i]);
                let value = remaining.remove(name).ok_or_else(|| {
                    utcp_types::UtcpError::CallFailure(format!(
                        "missing path parameter '{name}' for url '{url_template}'"
                    ))
                })?;
                let encoded = utf8_percent_encode(&value_to_plain_string(&value), NON_ALPHANUMERIC)
                    .to_string();
                url.push_str(&encoded);
                i += close + 1;
                last_end = i;
                continue;
            }
        }
        i += 1;
    }
    url.push_str(&url_template[last_end..]);

    let mut header_args = BTreeMap::new();
    for name in header_fields {
        if let Some(value) = remaining.remove(name) {
            header_args.insert(name.clone(), value);
        }
    }

    let mut body = None;
    if let Some(field) = body_field
        && let Some(value) = remaining.remove(field)
    {
        body = Some(value);
    }

    Ok(SplitArgs {
        url,
        header_args,
        query_args: remaining,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_path_parameters_and_splits_remaining() {
        let args = json!({"petId": "42", "limit": 10, "X-Trace": "abc"});
        let split = split_args(
            "https://api.example.com/pets/{petId}",
            &args,
            &["X-Trace".to_string()],
            None,
        )
        .unwrap();
        assert_eq!(split.url, "https://api.example.com/pets/42");
        assert_eq!(split.header_args.get("X-Trace"), Some(&json!("abc")));
        assert_eq!(split.query_args.get("limit"), Some(&json!(10)));
    }

    #[test]
    fn missing_path_parameter_is_an_error() {
        let args = json!({});
        let result = split_args("https://api.example.com/pets/{petId}", &args, &[], None);
        assert!(result.is_err());
    }

    #[test]
    fn body_field_is_extracted_before_query() {
        let args = json!({"body": {"name": "Rex"}, "dryRun": true});
        let split = split_args("https://api.example.com/pets", &args, &[], Some("body")).unwrap();
        assert_eq!(split.body, Some(json!({"name": "Rex"})));
        assert_eq!(split.query_args.get("dryRun"), Some(&json!(true)));
    }
}
