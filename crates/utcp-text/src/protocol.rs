//! The filesystem [`CommunicationProtocol`].

use async_trait::async_trait;
use serde_json::Value;
use tracing::{instrument, warn};

use utcp_transport_traits::fallback::stream_from_unary;
use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
use utcp_types::call_template::CallTemplate;
use utcp_types::{Manual, RegisterManualResult, UtcpError, UtcpResult};

/// Reads a manual's `file_path` (resolved against [`TransportContext::root_dir`])
/// as a JSON manual on registration, and returns a tool's raw file contents
/// uninterpreted on call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextProtocol;

impl TextProtocol {
    /// A stateless protocol instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn read(&self, ctx: &TransportContext, file_path: &str) -> UtcpResult<String> {
        let path = ctx.resolve(file_path);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| UtcpError::CallFailure(format!("reading {}: {e}", path.display())))
    }
}

#[async_trait]
impl CommunicationProtocol for TextProtocol {
    #[instrument(skip(self, ctx, template))]
    async fn register_manual(&self, ctx: &TransportContext, template: &CallTemplate) -> RegisterManualResult {
        let CallTemplate::Text { file_path, .. } = template else {
            return RegisterManualResult::failure(
                template.clone(),
                "TextProtocol received a non-Text call template",
            );
        };

        let contents = match self.read(ctx, file_path).await {
            Ok(c) => c,
            Err(e) => return RegisterManualResult::failure(template.clone(), e.to_string()),
        };

        match serde_json::from_str::<Manual>(&contents) {
            Ok(manual) => RegisterManualResult::success(template.clone(), manual),
            Err(e) => RegisterManualResult::failure(template.clone(), format!("parsing manual: {e}")),
        }
    }

    async fn deregister_manual(&self, _ctx: &TransportContext, _template: &CallTemplate) -> UtcpResult<()> {
        Ok(())
    }

    async fn call_tool(
        &self,
        ctx: &TransportContext,
        _tool_name: &str,
        _args: Value,
        template: &CallTemplate,
    ) -> UtcpResult<Value> {
        let CallTemplate::Text { file_path, .. } = template else {
            return Err(UtcpError::UnsupportedOperation(
                "TextProtocol received a non-Text call template".to_string(),
            ));
        };
        self.read(ctx, file_path).await.map(Value::String)
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
            warn!(tool_name, error = %e, "text transport read failed");
        }
        Ok(stream_from_unary(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn template(path: &str) -> CallTemplate {
        CallTemplate::Text {
            name: "docs".to_string(),
            file_path: path.to_string(),
            auth: None,
            allowed_communication_protocols: Default::default(),
        }
    }

    #[tokio::test]
    async fn register_manual_parses_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let manual_path = dir.path().join("manual.json");
        let mut f = std::fs::File::create(&manual_path).unwrap();
        write!(f, r#"{{"utcp_version":"1.0.0","manual_version":"1.0.0","tools":[]}}"#).unwrap();

        let ctx = TransportContext::new(dir.path());
        let result = TextProtocol::new()
            .register_manual(&ctx, &template("manual.json"))
            .await;

        assert!(result.success);
        assert!(result.manual.tools.is_empty());
    }

    #[tokio::test]
    async fn register_manual_reports_failure_on_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let manual_path = dir.path().join("manual.json");
        std::fs::write(&manual_path, "not json").unwrap();

        let ctx = TransportContext::new(dir.path());
        let result = TextProtocol::new()
            .register_manual(&ctx, &template("manual.json"))
            .await;

        assert!(!result.success);
        assert!(!result.errors.is_empty());
    }

    #[tokio::test]
    async fn call_tool_returns_raw_contents_uninterpreted() {
        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("note.txt");
        std::fs::write(&doc_path, "hello world").unwrap();

        let ctx = TransportContext::new(dir.path());
        let value = TextProtocol::new()
            .call_tool(&ctx, "read", Value::Null, &template("note.txt"))
            .await
            .unwrap();

        assert_eq!(value, Value::String("hello world".to_string()));
    }

    #[tokio::test]
    async fn call_tool_streaming_yields_single_value() {
        use futures::StreamExt;

        let dir = tempfile::tempdir().unwrap();
        let doc_path = dir.path().join("note.txt");
        std::fs::write(&doc_path, "streamed").unwrap();

        let ctx = TransportContext::new(dir.path());
        let mut stream = TextProtocol::new()
            .call_tool_streaming(&ctx, "read", Value::Null, &template("note.txt"))
            .await
            .unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, Value::String("streamed".to_string()));
        assert!(stream.next().await.is_none());
    }
}
