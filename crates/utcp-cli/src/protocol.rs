//! The CLI [`CommunicationProtocol`].

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use utcp_transport_traits::fallback::stream_from_unary;
use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
use utcp_types::call_template::{CallTemplate, CliCommandStep};
use utcp_types::{RegisterManualResult, UtcpError, UtcpResult};

use crate::discovery::discover;
use crate::execute::{parse_or_raw, run_shell, substitute_args};

/// Every tool call is capped at 60s, independent of discovery's 30s.
const CALL_TIMEOUT_MS: u64 = 60_000;

/// The local CLI subprocess transport. Stateless: discovery and calls each
/// spawn their own subprocess, so there is no session to close.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliProtocol;

impl CliProtocol {
    /// A stateless protocol instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Normalize a call template's `commands`/legacy `command_name` into a
/// single ordered script, so both forms share one execution path.
fn resolve_steps(template: &CallTemplate) -> UtcpResult<Vec<CliCommandStep>> {
    let CallTemplate::Cli {
        commands,
        command_name,
        ..
    } = template
    else {
        return Err(UtcpError::UnsupportedOperation(
            "CliProtocol received a non-Cli call template".to_string(),
        ));
    };
    if !commands.is_empty() {
        return Ok(commands.clone());
    }
    if let Some(command_name) = command_name {
        return Ok(vec![CliCommandStep {
            command: command_name.clone(),
            append_to_final_output: true,
        }]);
    }
    Err(UtcpError::InvalidConfig(
        "cli call template has neither `commands` nor `command_name`".to_string(),
    ))
}

#[async_trait]
impl CommunicationProtocol for CliProtocol {
    #[instrument(skip(self, _ctx, template))]
    async fn register_manual(&self, _ctx: &TransportContext, template: &CallTemplate) -> RegisterManualResult {
        let CallTemplate::Cli {
            env_vars,
            working_dir,
            ..
        } = template
        else {
            return RegisterManualResult::failure(template.clone(), "CliProtocol received a non-Cli call template");
        };
        let steps = match resolve_steps(template) {
            Ok(steps) => steps,
            Err(e) => return RegisterManualResult::failure(template.clone(), e.to_string()),
        };
        let Some(first) = steps.first() else {
            return RegisterManualResult::failure(template.clone(), "empty command script");
        };

        let mut result = discover(&first.command, env_vars, working_dir.as_deref()).await;
        result.manual_call_template = template.clone();
        result
    }

    async fn deregister_manual(&self, _ctx: &TransportContext, _template: &CallTemplate) -> UtcpResult<()> {
        // Every call spawns its own subprocess; nothing persists to close.
        Ok(())
    }

    #[instrument(skip(self, _ctx, args, template), fields(tool_name))]
    async fn call_tool(
        &self,
        _ctx: &TransportContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> UtcpResult<Value> {
        let CallTemplate::Cli {
            env_vars,
            working_dir,
            ..
        } = template
        else {
            return Err(UtcpError::UnsupportedOperation(
                "CliProtocol received a non-Cli call template".to_string(),
            ));
        };
        let steps = resolve_steps(template)?;
        let args_map = args.as_object().cloned().unwrap_or_default();

        let mut env = env_vars.clone();
        let mut contributions = Vec::new();
        for (i, step) in steps.iter().enumerate() {
            let command = substitute_args(&step.command, &args_map);
            debug!(tool_name, step = i, "dispatching CLI step");
            let output = run_shell(&command, &env, working_dir.as_deref(), CALL_TIMEOUT_MS).await?;
            if !output.success {
                return Err(UtcpError::CallFailure(format!(
                    "step {i} ({command:?}) exited non-zero: {}",
                    output.stderr
                )));
            }
            env.insert(format!("CMD_{i}_OUTPUT"), output.stdout.trim().to_string());
            if step.append_to_final_output {
                contributions.push(output.stdout);
            }
        }

        let combined = contributions.join("\n");
        Ok(parse_or_raw(&combined))
    }

    async fn call_tool_streaming(
        &self,
        ctx: &TransportContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> UtcpResult<BoxStream<'static, UtcpResult<Value>>> {
        // CLI has no native streaming form: fall back to the unary result
        //.
        let result = self.call_tool(ctx, tool_name, args, template).await;
        Ok(stream_from_unary(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn legacy_template(command_name: &str) -> CallTemplate {
        CallTemplate::Cli {
            name: "tool".into(),
            commands: vec![],
            command_name: Some(command_name.to_string()),
            env_vars: Default::default(),
            working_dir: None,
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn register_manual_discovers_tools_from_stdout() {
        let protocol = CliProtocol::new();
        let ctx = TransportContext::default();
        let template = legacy_template(
            r#"echo {\"utcp_version\":\"1.0.0\",\"manual_version\":\"1.0.0\",\"tools\":[]}"#,
        );
        let result = protocol.register_manual(&ctx, &template).await;
        assert!(result.success, "{:?}", result.errors);
        assert!(result.manual.tools.is_empty());
    }

    #[tokio::test]
    async fn call_tool_substitutes_args_and_parses_json() {
        let protocol = CliProtocol::new();
        let ctx = TransportContext::default();
        let template = legacy_template(r#"echo "{\"sum\": UTCP_ARG_a_UTCP_END}""#);
        let result = protocol
            .call_tool(&ctx, "add", serde_json::json!({"a": 7}), &template)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"sum": 7}));
    }

    #[tokio::test]
    async fn multi_step_script_threads_prior_output_and_filters_final_output() {
        let protocol = CliProtocol::new();
        let ctx = TransportContext::default();
        let template = CallTemplate::Cli {
            name: "tool".into(),
            commands: vec![
                CliCommandStep {
                    command: "echo hidden".into(),
                    append_to_final_output: false,
                },
                CliCommandStep {
                    command: "echo \"got: $CMD_0_OUTPUT\"".into(),
                    append_to_final_output: true,
                },
            ],
            command_name: None,
            env_vars: Default::default(),
            working_dir: None,
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        };
        let result = protocol
            .call_tool(&ctx, "pipeline", serde_json::json!({}), &template)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!("got: hidden"));
    }

    #[tokio::test]
    async fn call_tool_streaming_yields_one_element_equal_to_unary() {
        let protocol = CliProtocol::new();
        let ctx = TransportContext::default();
        let template = legacy_template("echo 42");
        let unary = protocol
            .call_tool(&ctx, "answer", serde_json::json!({}), &template)
            .await
            .unwrap();
        let mut stream = protocol
            .call_tool_streaming(&ctx, "answer", serde_json::json!({}), &template)
            .await
            .unwrap();
        use futures::StreamExt;
        let first = stream.next().await.unwrap().unwrap();
        assert!(stream.next().await.is_none());
        assert_eq!(first, unary);
    }
}
