//! The MCP [`CommunicationProtocol`].

use async_trait::async_trait;
use serde_json::Value;
use tracing::{instrument, warn};

use utcp_transport_traits::fallback::stream_from_unary;
use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
use utcp_types::call_template::McpServerConfig;
use utcp_types::{CallTemplate, RegisterManualResult, UtcpError, UtcpResult};

use crate::naming::{split_server_prefix, RESOURCE_TOOL_PREFIX};
use crate::result::{flatten_call_result, flatten_resource_result};
use crate::session::{is_transport_error, SessionCache};
use crate::{discovery, session::McpSession};

/// The Model-Context-Protocol transport: fans a manual's discovery out over
/// every configured `mcpServers` entry, and caches one session per server
/// for the manual's lifetime.
#[derive(Debug, Default)]
pub struct McpProtocol {
    cache: SessionCache,
}

impl McpProtocol {
    /// A protocol instance with an empty session cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn resolve_server<'a>(
        &self,
        tool_name: &'a str,
        servers: &'a std::collections::BTreeMap<String, McpServerConfig>,
    ) -> UtcpResult<(&'a str, &'a str)> {
        if let (Some(server), local) = split_server_prefix(tool_name, servers) {
            return Ok((server, local));
        }
        for (server_name, config) in servers {
            if self.server_has_tool(server_name, config, tool_name).await {
                return Ok((server_name.as_str(), tool_name));
            }
        }
        Err(UtcpError::ToolNotFound(format!(
            "no configured MCP server exposes tool '{tool_name}'"
        )))
    }

    async fn server_has_tool(&self, server_name: &str, config: &McpServerConfig, local_name: &str) -> bool {
        let Ok(session) = self.cache.get_or_create(server_name, config).await else {
            return false;
        };
        if let Some(suffix) = local_name.strip_prefix(RESOURCE_TOOL_PREFIX) {
            return self
                .list_resources_resilient(server_name, config, &session)
                .await
                .map(|resources| {
                    resources
                        .iter()
                        .any(|r| utcp_core::naming::sanitize_name(&r.name) == suffix)
                })
                .unwrap_or(false);
        }
        self.list_tools_resilient(server_name, config, &session)
            .await
            .map(|tools| tools.iter().any(|t| t.name == local_name))
            .unwrap_or(false)
    }

    async fn list_tools_resilient(
        &self,
        server_name: &str,
        config: &McpServerConfig,
        session: &McpSession,
    ) -> UtcpResult<Vec<rmcp::model::Tool>> {
        match session.list_tools(Default::default()).await {
            Ok(r) => Ok(r.tools),
            Err(e) if is_transport_error(&e.to_string()) => {
                self.cache.close(server_name).await;
                let fresh = self.cache.get_or_create(server_name, config).await?;
                fresh
                    .list_tools(Default::default())
                    .await
                    .map(|r| r.tools)
                    .map_err(|e| UtcpError::CallFailure(e.to_string()))
            }
            Err(e) => Err(UtcpError::CallFailure(e.to_string())),
        }
    }

    async fn list_resources_resilient(
        &self,
        server_name: &str,
        config: &McpServerConfig,
        session: &McpSession,
    ) -> UtcpResult<Vec<rmcp::model::Resource>> {
        match session.list_resources(Default::default()).await {
            Ok(r) => Ok(r.resources),
            Err(e) if is_transport_error(&e.to_string()) => {
                self.cache.close(server_name).await;
                let fresh = self.cache.get_or_create(server_name, config).await?;
                fresh
                    .list_resources(Default::default())
                    .await
                    .map(|r| r.resources)
                    .map_err(|e| UtcpError::CallFailure(e.to_string()))
            }
            Err(e) => Err(UtcpError::CallFailure(e.to_string())),
        }
    }

    async fn do_call(&self, tool_name: &str, args: Value, template: &CallTemplate) -> UtcpResult<Value> {
        let CallTemplate::Mcp { config, .. } = template else {
            return Err(UtcpError::UnsupportedOperation(
                "McpProtocol received a non-Mcp call template".to_string(),
            ));
        };

        let (server_name, local_name) = self.resolve_server(tool_name, &config.mcp_servers).await?;
        let server_config = &config.mcp_servers[server_name];
        let session = self.cache.get_or_create(server_name, server_config).await?;

        if let Some(suffix) = local_name.strip_prefix(RESOURCE_TOOL_PREFIX) {
            let resources = self
                .list_resources_resilient(server_name, server_config, &session)
                .await?;
            let resource = resources
                .into_iter()
                .find(|r| utcp_core::naming::sanitize_name(&r.name) == suffix)
                .ok_or_else(|| UtcpError::ToolNotFound(format!("resource '{suffix}' not found on {server_name}")))?;
            let result = session
                .read_resource(rmcp::model::ReadResourceRequestParam { uri: resource.uri })
                .await
                .map_err(|e| UtcpError::CallFailure(e.to_string()))?;
            return Ok(flatten_resource_result(result));
        }

        let arguments = args.as_object().cloned();
        let result = session
            .call_tool(rmcp::model::CallToolRequestParam {
                name: local_name.to_string().into(),
                arguments,
            })
            .await
            .map_err(|e| UtcpError::CallFailure(e.to_string()))?;
        Ok(flatten_call_result(result))
    }
}

#[async_trait]
impl CommunicationProtocol for McpProtocol {
    #[instrument(skip(self, _ctx, template))]
    async fn register_manual(&self, _ctx: &TransportContext, template: &CallTemplate) -> RegisterManualResult {
        let CallTemplate::Mcp {
            config,
            register_resources_as_tools,
            ..
        } = template
        else {
            return RegisterManualResult::failure(
                template.clone(),
                "McpProtocol received a non-Mcp call template",
            );
        };
        discovery::register_manual(&self.cache, template, config, *register_resources_as_tools).await
    }

    async fn deregister_manual(&self, _ctx: &TransportContext, template: &CallTemplate) -> UtcpResult<()> {
        if let CallTemplate::Mcp { config, .. } = template {
            self.cache.close_all(config.mcp_servers.keys()).await;
        }
        Ok(())
    }

    async fn call_tool(
        &self,
        _ctx: &TransportContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> UtcpResult<Value> {
        self.do_call(tool_name, args, template).await
    }

    async fn call_tool_streaming(
        &self,
        ctx: &TransportContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> UtcpResult<BoxStream<'static, UtcpResult<Value>>> {
        let result = self.call_tool(ctx, tool_name, args, template).await;
        if let Err(e) = &result {
            warn!(tool_name, error = %e, "MCP call failed ahead of streaming fallback");
        }
        Ok(stream_from_unary(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_prefix_constant_matches_spec() {
        assert_eq!(RESOURCE_TOOL_PREFIX, "resource_");
    }
}
