//! Rewriting legacy `tool_provider`-keyed discovery payloads into the
//! modern `tool_call_template` shape.
//!
//! Older discovery producers emit `{"tool_provider": {"provider_type": ...,
//! ...}}` instead of `{"tool_call_template": {"call_template_type": ...,
//! ...}}`; the two shapes otherwise share field names per kind, so
//! rewriting is a matter of renaming the wrapper key and its discriminator
//! before deserializing with [`utcp_types::CallTemplate`]'s own serializer.

use serde_json::Value;

/// Rewrite every tool object in `tools` (a JSON array) that carries a
/// legacy `tool_provider` key into `tool_call_template`, in place. Tools
/// that already carry `tool_call_template` are left untouched.
pub(crate) fn rewrite_legacy_tools(tools: &mut Value) {
    let Value::Array(items) = tools else {
        return;
    };
    for item in items {
        rewrite_legacy_tool(item);
    }
}

/// Rewrite a single tool object's `tool_provider` into `tool_call_template`
/// when present. No-op if the tool already uses the modern key.
pub(crate) fn rewrite_legacy_tool(tool: &mut Value) {
    let Value::Object(map) = tool else {
        return;
    };
    if map.contains_key("tool_call_template") {
        return;
    }
    let Some(mut provider) = map.remove("tool_provider") else {
        return;
    };
    if let Value::Object(provider_map) = &mut provider {
        if let Some(provider_type) = provider_map.remove("provider_type") {
            provider_map.insert("call_template_type".to_string(), provider_type);
        }
        if !provider_map.contains_key("name") {
            if let Some(tool_name) = map.get("name").cloned() {
                provider_map.insert("name".to_string(), tool_name);
            }
        }
    }
    map.insert("tool_call_template".to_string(), provider);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rewrites_provider_type_to_call_template_type() {
        let mut tool = json!({
            "name": "t",
            "description": "d",
            "inputs": {},
            "outputs": {},
            "tool_provider": {"provider_type": "cli", "command_name": "x"},
        });
        rewrite_legacy_tool(&mut tool);
        assert!(tool.get("tool_provider").is_none());
        let template = &tool["tool_call_template"];
        assert_eq!(template["call_template_type"], "cli");
        assert_eq!(template["command_name"], "x");
        assert_eq!(template["name"], "t");
    }

    #[test]
    fn leaves_modern_tools_untouched() {
        let mut tool = json!({
            "name": "t",
            "tool_call_template": {"call_template_type": "cli", "name": "t", "command_name": "x"},
        });
        let before = tool.clone();
        rewrite_legacy_tool(&mut tool);
        assert_eq!(tool, before);
    }
}
