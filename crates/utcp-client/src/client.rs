//! The Client Core: the single entry point that ties
//! variable substitution, auth, the transport table, and the tool
//! repository together into `register_manual`/`call_tool`/`search_tools`.

use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{info, instrument, warn};

use utcp_core::auth::AuthApplier;
use utcp_core::naming::sanitize_name;
use utcp_core::variables::{VariableContext, VariableSubstitutor};
use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
use utcp_types::{CallTemplate, RegisterManualResult, Tool, TransportKind, UtcpError, UtcpResult};

use crate::config::{ClientConfig, PostProcessor};
use crate::repository::ToolRepository;
use crate::search::ToolSearchStrategy;
use crate::transports::default_transports;

/// The client: holds the transport table, the tool repository,
/// and the collaborators configured at `create` time.
pub struct UtcpClient {
    transports: HashMap<TransportKind, Arc<dyn CommunicationProtocol>>,
    repository: Arc<ToolRepository>,
    search_strategy: Arc<dyn ToolSearchStrategy>,
    post_processing: Vec<Arc<dyn PostProcessor>>,
    context: VariableContext,
    transport_context: TransportContext,
}

impl std::fmt::Debug for UtcpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UtcpClient")
            .field("transports", &self.transports.len())
            .field("post_processing", &self.post_processing.len())
            .finish_non_exhaustive()
    }
}

impl UtcpClient {
    /// Build a client from `config`, registering every preloaded manual
    /// call template.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::InvalidConfig`] only when `config.variables`
    /// itself contains an unresolved reference; a preloaded manual's own
    /// discovery failure is instead packed into the returned manual's
    /// registration outcome (logged, not raised — call
    /// [`UtcpClient::register_manual`] again to inspect the failure
    /// directly).
    #[instrument(skip(config))]
    pub async fn create(config: ClientConfig) -> UtcpResult<Self> {
        let auth_applier = AuthApplier::default();
        let context = VariableContext {
            variables: config.variables,
            loaders: config.variable_loaders,
        };

        let client = Self {
            transports: default_transports(&auth_applier),
            repository: config.tool_repository,
            search_strategy: config.tool_search_strategy,
            post_processing: config.post_processing,
            context,
            transport_context: TransportContext::new(config.root_dir),
        };

        for template in config.manual_call_templates {
            let name = template.name().to_string();
            match client.register_manual(template).await {
                Ok(result) if result.success => {
                    info!(manual = %name, tools = result.manual.tools.len(), "registered manual");
                }
                Ok(result) => {
                    warn!(manual = %name, errors = ?result.errors, "manual registered with errors");
                }
                Err(e) => {
                    warn!(manual = %name, error = %e, "failed to register manual");
                }
            }
        }

        Ok(client)
    }

    fn transport_for(&self, kind: TransportKind) -> UtcpResult<&Arc<dyn CommunicationProtocol>> {
        self.transports
            .get(&kind)
            .ok_or_else(|| UtcpError::UnsupportedOperation(format!("no transport registered for {kind}")))
    }

    /// Substitute `template` against a manual-scoped context: the scoped
    /// name (every `_` in `sanitized_name` doubled, then joined to `VAR`
    /// with a single `_`) is preferred, falling back to the bare `VAR`.
    fn substitute_template(&self, sanitized_name: &str, template: &CallTemplate) -> UtcpResult<CallTemplate> {
        let substitutor = VariableSubstitutor::scoped(sanitized_name);
        let value = serde_json::to_value(template).map_err(UtcpError::from)?;
        let substituted = substitutor.substitute(&value, &self.context)?;
        serde_json::from_value(substituted).map_err(UtcpError::from)
    }

    /// Discover `template`'s manual and save its tools, namespaced as
    /// `<sanitized_name>.<tool>`.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::ManualAlreadyRegistered`] when the sanitized
    /// name is already present in the repository, or
    /// [`UtcpError::VariableNotFound`] when the template references an
    /// unresolvable variable. A transport-level discovery failure is
    /// instead carried in the returned [`RegisterManualResult`].
    #[instrument(skip(self, template), fields(manual = template.name()))]
    pub async fn register_manual(&self, template: CallTemplate) -> UtcpResult<RegisterManualResult> {
        let sanitized_name = sanitize_name(template.name());
        if self.repository.get_manual(&sanitized_name).await.is_some() {
            return Err(UtcpError::ManualAlreadyRegistered(sanitized_name));
        }

        let mut substituted = self.substitute_template(&sanitized_name, &template)?;
        substituted.set_name(sanitized_name.clone());

        let transport = self.transport_for(substituted.kind())?;
        let mut result = transport.register_manual(&self.transport_context, &substituted).await;

        if result.success {
            let allowed = substituted.allowed_communication_protocols();
            result.manual.tools.retain(|tool| allowed.contains(&tool.tool_call_template.kind()));
            for tool in &mut result.manual.tools {
                tool.name = format!("{sanitized_name}.{}", tool.name);
            }
            self.repository
                .save_manual(&sanitized_name, substituted.clone(), result.manual.clone())
                .await;
        }
        result.manual_call_template = substituted;
        Ok(result)
    }

    /// Close the transport session for `name` (the sanitized manual name)
    /// and remove it from the repository.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::ManualNotFound`] for an unregistered name, or
    /// whatever the transport's own close fails with.
    pub async fn deregister_manual(&self, name: &str) -> UtcpResult<()> {
        let template = self
            .repository
            .get_manual_call_template(name)
            .await
            .ok_or_else(|| UtcpError::ManualNotFound(name.to_string()))?;

        let transport = self.transport_for(template.kind())?;
        transport.deregister_manual(&self.transport_context, &template).await?;
        self.repository.remove_manual(name).await;
        Ok(())
    }

    /// Prepare a call: resolve the tool, re-substitute variables scoped to
    /// its owning manual, and verify the manual's allowed protocols still
    /// include the tool's own transport kind.
    async fn prepare_call(&self, tool_name: &str) -> UtcpResult<(Tool, CallTemplate)> {
        let tool = self
            .repository
            .get_tool(tool_name)
            .await
            .ok_or_else(|| UtcpError::ToolNotFound(tool_name.to_string()))?;

        let manual_name = tool_name
            .split_once('.')
            .map(|(manual, _)| manual)
            .unwrap_or(tool_name);

        let manual_template = self
            .repository
            .get_manual_call_template(manual_name)
            .await
            .ok_or_else(|| UtcpError::ManualNotFound(manual_name.to_string()))?;

        let allowed = manual_template.allowed_communication_protocols();
        if !allowed.contains(&tool.tool_call_template.kind()) {
            return Err(UtcpError::UnsupportedOperation(format!(
                "tool {tool_name} uses transport {} not permitted by its manual",
                tool.tool_call_template.kind()
            )));
        }

        let substituted = self.substitute_template(manual_name, &tool.tool_call_template)?;
        Ok((tool, substituted))
    }

    /// Invoke `tool_name` with `args`, running `post_processing` hooks in
    /// order over a successful result.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::ToolNotFound`] for an unregistered tool, or
    /// whatever the transport's own call fails with. A post-processing
    /// hook may translate an `Ok` result but never runs over a failed
    /// call.
    #[instrument(skip(self, args), fields(tool = tool_name))]
    pub async fn call_tool(&self, tool_name: &str, args: Value) -> UtcpResult<Value> {
        let (_, template) = self.prepare_call(tool_name).await?;
        let transport = self.transport_for(template.kind())?;
        let mut result = transport.call_tool(&self.transport_context, tool_name, args, &template).await?;
        for hook in &self.post_processing {
            result = hook.process(tool_name, result).await?;
        }
        Ok(result)
    }

    /// Streaming variant of [`UtcpClient::call_tool`]; each yielded
    /// element is independently post-processed.
    ///
    /// # Errors
    ///
    /// Establishing the stream can fail the same way `call_tool` can;
    /// once established, failures surface as error elements instead of
    /// terminating silently.
    #[instrument(skip(self, args), fields(tool = tool_name))]
    pub async fn call_tool_streaming(&self, tool_name: &str, args: Value) -> UtcpResult<BoxStream<'static, UtcpResult<Value>>> {
        let (_, template) = self.prepare_call(tool_name).await?;
        let transport = self.transport_for(template.kind())?.clone();
        let stream = transport
            .call_tool_streaming(&self.transport_context, tool_name, args, &template)
            .await?;

        let post_processing = self.post_processing.clone();
        let tool_name = tool_name.to_string();
        let mapped = stream.then(move |item| {
            let post_processing = post_processing.clone();
            let tool_name = tool_name.clone();
            async move {
                let mut value = item?;
                for hook in &post_processing {
                    value = hook.process(&tool_name, value).await?;
                }
                Ok(value)
            }
        });
        Ok(Box::pin(mapped))
    }

    /// Rank registered tools against `query` using the configured
    /// [`ToolSearchStrategy`].
    pub async fn search_tools(&self, query: &str, limit: usize) -> Vec<Tool> {
        self.search_tools_with_tags(query, limit, &[]).await
    }

    /// [`UtcpClient::search_tools`], additionally restricted to tools
    /// carrying at least one of `any_of_tags_required`.
    pub async fn search_tools_with_tags(&self, query: &str, limit: usize, any_of_tags_required: &[String]) -> Vec<Tool> {
        self.search_strategy
            .search_tools(&self.repository, query, limit, any_of_tags_required)
            .await
    }

    /// Every namespaced variable name `template` references, without
    /// requiring them to already resolve.
    #[must_use]
    pub fn get_required_variables_for_manual_and_tools(&self, template: &CallTemplate) -> Vec<String> {
        let sanitized_name = sanitize_name(template.name());
        let substitutor = VariableSubstitutor::scoped(sanitized_name);
        let value = match serde_json::to_value(template) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };
        substitutor.find_required(&value)
    }

    /// [`UtcpClient::get_required_variables_for_manual_and_tools`] for an
    /// already-registered tool, looked up by fully-qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::ToolNotFound`] for an unregistered name.
    pub async fn get_required_variables_for_registered_tool(&self, tool_name: &str) -> UtcpResult<Vec<String>> {
        let tool = self
            .repository
            .get_tool(tool_name)
            .await
            .ok_or_else(|| UtcpError::ToolNotFound(tool_name.to_string()))?;
        Ok(self.get_required_variables_for_manual_and_tools(&tool.tool_call_template))
    }

    /// The repository backing this client, for direct inspection.
    #[must_use]
    pub fn repository(&self) -> &Arc<ToolRepository> {
        &self.repository
    }
}
