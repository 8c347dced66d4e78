//! MCP manual discovery: `list_tools` (and, optionally, `list_resources`)
//! against every configured server.

use utcp_types::call_template::{CallTemplate, McpConfig};
use utcp_types::{JsonSchema, Manual, RegisterManualResult, Tool};

use crate::naming::RESOURCE_TOOL_PREFIX;
use crate::session::SessionCache;

fn schema_from_value(value: serde_json::Value) -> JsonSchema {
    serde_json::from_value(value).unwrap_or_else(|_| JsonSchema::empty())
}

async fn discover_server(
    cache: &SessionCache,
    server_name: &str,
    config: &utcp_types::call_template::McpServerConfig,
    register_resources_as_tools: bool,
    template: &CallTemplate,
    tools: &mut Vec<Tool>,
    errors: &mut Vec<String>,
) {
    let session = match cache.get_or_create(server_name, config).await {
        Ok(s) => s,
        Err(e) => {
            errors.push(format!("{server_name}: {e}"));
            return;
        }
    };

    match session.list_tools(Default::default()).await {
        Ok(listed) => {
            for tool in listed.tools {
                let input_schema = serde_json::to_value(&*tool.input_schema).unwrap_or_default();
                let output_schema = tool
                    .output_schema
                    .as_ref()
                    .map(|s| serde_json::to_value(&**s).unwrap_or_default());
                tools.push(Tool {
                    name: format!("{server_name}.{}", tool.name),
                    description: tool.description.map(|d| d.to_string()).unwrap_or_default(),
                    inputs: schema_from_value(input_schema),
                    outputs: output_schema.map(schema_from_value).unwrap_or_else(JsonSchema::empty),
                    tags: Vec::new(),
                    tool_call_template: template.clone(),
                    average_response_size: None,
                });
            }
        }
        Err(e) => errors.push(format!("{server_name}: list_tools failed: {e}")),
    }

    if register_resources_as_tools {
        match session.list_resources(Default::default()).await {
            Ok(listed) => {
                for resource in listed.resources {
                    tools.push(Tool {
                        name: format!(
                            "{server_name}.{RESOURCE_TOOL_PREFIX}{}",
                            utcp_core::naming::sanitize_name(&resource.name)
                        ),
                        description: resource.description.clone().unwrap_or_default(),
                        inputs: JsonSchema::empty(),
                        outputs: JsonSchema::empty(),
                        tags: Vec::new(),
                        tool_call_template: template.clone(),
                        average_response_size: None,
                    });
                }
            }
            Err(e) => errors.push(format!("{server_name}: list_resources failed: {e}")),
        }
    }
}

/// Discover tools (and optionally resources) from every server in `config`,
/// packing per-server failures into the result's `errors` without aborting
/// the other servers.
pub async fn register_manual(
    cache: &SessionCache,
    template: &CallTemplate,
    config: &McpConfig,
    register_resources_as_tools: bool,
) -> RegisterManualResult {
    let mut tools = Vec::new();
    let mut errors = Vec::new();

    for (server_name, server_config) in &config.mcp_servers {
        discover_server(
            cache,
            server_name,
            server_config,
            register_resources_as_tools,
            template,
            &mut tools,
            &mut errors,
        )
        .await;
    }

    let manual = Manual {
        utcp_version: utcp_types::UTCP_VERSION.to_string(),
        manual_version: String::new(),
        tools,
    };

    RegisterManualResult {
        manual_call_template: template.clone(),
        success: !manual.tools.is_empty() || config.mcp_servers.is_empty(),
        manual,
        errors,
    }
}
