//! CLI manual discovery.

use std::collections::BTreeMap;

use utcp_types::{Manual, RegisterManualResult, Tool};

use crate::execute::{run_direct, split_command};
use crate::legacy::rewrite_legacy_tools;

/// Discovery's own timeout, independent of the 60s tool-call timeout.
const DISCOVERY_TIMEOUT_MS: u64 = 30_000;

/// Run `command_name`, select stdout/stderr by exit code, and extract a
/// manual from the output.
pub(crate) async fn discover(
    command_name: &str,
    env_vars: &BTreeMap<String, String>,
    working_dir: Option<&str>,
) -> RegisterManualResult {
    let argv = match split_command(command_name) {
        Ok(argv) => argv,
        Err(e) => return failure(command_name, e.to_string()),
    };

    let output = match run_direct(&argv, env_vars, working_dir, DISCOVERY_TIMEOUT_MS).await {
        Ok(output) => output,
        Err(e) => return failure(command_name, e.to_string()),
    };

    let text = if output.success { &output.stdout } else { &output.stderr };
    extract_manual(text, command_name)
}

fn failure(command_name: &str, reason: String) -> RegisterManualResult {
    RegisterManualResult {
        manual_call_template: placeholder_template(command_name),
        manual: Manual::empty(),
        success: false,
        errors: vec![reason],
    }
}

// `extract_manual` never needs the registering template itself (the
// protocol layer fills it in on return); this placeholder only exists to
// satisfy `RegisterManualResult`'s shape when a failure happens before a
// template is known to be valid. The protocol layer overwrites this field.
fn placeholder_template(command_name: &str) -> utcp_types::CallTemplate {
    utcp_types::CallTemplate::Cli {
        name: command_name.to_string(),
        commands: Vec::new(),
        command_name: Some(command_name.to_string()),
        env_vars: BTreeMap::new(),
        working_dir: None,
        auth: None,
        allowed_communication_protocols: Default::default(),
    }
}

/// Try whole-output JSON parse for `{utcp_version, tools}` first; failing
/// that, scan lines for `{...}` JSON objects and either recognize a single
/// embedded manual or aggregate recognized tools.
fn extract_manual(text: &str, command_name: &str) -> RegisterManualResult {
    if let Ok(mut value) = serde_json::from_str::<serde_json::Value>(text.trim()) {
        if value.get("utcp_version").is_some() && value.get("tools").is_some() {
            if let Some(tools) = value.get_mut("tools") {
                rewrite_legacy_tools(tools);
            }
            return match serde_json::from_value::<Manual>(value) {
                Ok(manual) => success(command_name, manual),
                Err(e) => failure(command_name, format!("parsing manual: {e}")),
            };
        }
    }

    // Fall back to scanning individual lines for JSON objects: either a
    // standalone manual, or a sequence of standalone tools to aggregate.
    let mut tools = Vec::new();
    let mut errors = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || !line.starts_with('{') {
            continue;
        }
        let Ok(mut value) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        if value.get("utcp_version").is_some() && value.get("tools").is_some() {
            if let Some(line_tools) = value.get_mut("tools") {
                rewrite_legacy_tools(line_tools);
            }
            return match serde_json::from_value::<Manual>(value) {
                Ok(manual) => success(command_name, manual),
                Err(e) => failure(command_name, format!("parsing manual: {e}")),
            };
        }
        crate::legacy::rewrite_legacy_tool(&mut value);
        match serde_json::from_value::<Tool>(value) {
            Ok(tool) => tools.push(tool),
            Err(e) => errors.push(format!("line not a recognizable tool: {e}")),
        }
    }

    if tools.is_empty() && !errors.is_empty() {
        return failure(command_name, format!("no manual or tools found in output: {errors:?}"));
    }

    success(
        command_name,
        Manual {
            utcp_version: utcp_types::UTCP_VERSION.to_string(),
            manual_version: String::new(),
            tools,
        },
    )
}

fn success(command_name: &str, manual: Manual) -> RegisterManualResult {
    RegisterManualResult {
        manual_call_template: placeholder_template(command_name),
        manual,
        success: true,
        errors: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_whole_output_manual() {
        let text = r#"{"utcp_version":"1.0.0","manual_version":"1.0.0","tools":[]}"#;
        let result = extract_manual(text, "discover");
        assert!(result.success);
        assert!(result.manual.tools.is_empty());
    }

    #[test]
    fn rewrites_legacy_tool_provider_inside_whole_output_manual() {
        let text = r#"{"tools":[{"name":"t","description":"d","inputs":{},"outputs":{},"tool_provider":{"provider_type":"cli","command_name":"x"}}]}"#;
        let result = extract_manual(text, "discover");
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.manual.tools.len(), 1);
        assert!(matches!(
            result.manual.tools[0].tool_call_template,
            utcp_types::CallTemplate::Cli { .. }
        ));
    }

    #[test]
    fn scans_lines_for_standalone_tools() {
        let text = "starting up\n{\"name\":\"t\",\"description\":\"d\",\"inputs\":{},\"outputs\":{},\"tool_call_template\":{\"call_template_type\":\"cli\",\"name\":\"t\",\"command_name\":\"x\"}}\ndone\n";
        let result = extract_manual(text, "discover");
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.manual.tools.len(), 1);
        assert_eq!(result.manual.tools[0].name, "t");
    }
}
