//! TCP socket transport.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument, warn};

use utcp_transport_traits::fallback::stream_from_unary;
use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
use utcp_types::call_template::CallTemplate;
use utcp_types::{Manual, RegisterManualResult, UtcpError, UtcpResult};

use crate::framing::{encode_frame, read_frame};
use crate::request::{decode_response, format_request};

/// The TCP socket [`CommunicationProtocol`].
///
/// Each call opens its own connection; this module documents framing and
/// discovery but no persistent session, unlike the SSE/WebSocket/MCP
/// transports.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProtocol;

impl TcpProtocol {
    /// A stateless protocol instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn exchange(
        &self,
        template: &CallTemplate,
        payload: &[u8],
    ) -> UtcpResult<Vec<u8>> {
        let CallTemplate::Tcp {
            host,
            port,
            framing_strategy,
            length_prefix_bytes,
            length_prefix_endian,
            message_delimiter,
            fixed_message_length,
            max_response_size,
            timeout: timeout_ms,
            ..
        } = template
        else {
            return Err(UtcpError::UnsupportedOperation(
                "TcpProtocol received a non-Tcp call template".to_string(),
            ));
        };

        let addr = format!("{host}:{port}");
        let connect_timeout = Duration::from_millis(*timeout_ms);
        let mut stream = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| UtcpError::CallFailure(format!("connecting to {addr} timed out")))?
            .map_err(|e| UtcpError::CallFailure(format!("connecting to {addr}: {e}")))?;

        let frame = encode_frame(
            *framing_strategy,
            *length_prefix_bytes,
            length_prefix_endian.0,
            message_delimiter.as_deref(),
            payload,
        );
        timeout(connect_timeout, stream.write_all(&frame))
            .await
            .map_err(|_| UtcpError::CallFailure("writing request timed out".to_string()))?
            .map_err(|e| UtcpError::CallFailure(format!("writing request: {e}")))?;

        timeout(
            connect_timeout,
            read_frame(
                &mut stream,
                *framing_strategy,
                *length_prefix_bytes,
                length_prefix_endian.0,
                message_delimiter.as_deref(),
                *fixed_message_length,
                *max_response_size,
            ),
        )
        .await
        .map_err(|_| UtcpError::CallFailure("reading response timed out".to_string()))?
    }
}

#[async_trait]
impl CommunicationProtocol for TcpProtocol {
    #[instrument(skip(self, _ctx, template))]
    async fn register_manual(&self, _ctx: &TransportContext, template: &CallTemplate) -> RegisterManualResult {
        if !matches!(template, CallTemplate::Tcp { .. }) {
            return RegisterManualResult::failure(
                template.clone(),
                "TcpProtocol received a non-Tcp call template",
            );
        }

        let discovery = json!({"type": "utcp"}).to_string();
        let response = match self.exchange(template, discovery.as_bytes()).await {
            Ok(bytes) => bytes,
            Err(e) => return RegisterManualResult::failure(template.clone(), e.to_string()),
        };

        match serde_json::from_slice::<Manual>(&response) {
            Ok(manual) => RegisterManualResult::success(template.clone(), manual),
            Err(e) => RegisterManualResult::failure(template.clone(), format!("parsing manual: {e}")),
        }
    }

    async fn deregister_manual(&self, _ctx: &TransportContext, _template: &CallTemplate) -> UtcpResult<()> {
        // Connections are per-call; nothing persists to close.
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
        let CallTemplate::Tcp {
            request_data_format,
            request_data_template,
            response_byte_format,
            ..
        } = template
        else {
            return Err(UtcpError::UnsupportedOperation(
                "TcpProtocol received a non-Tcp call template".to_string(),
            ));
        };

        let payload = format_request(&args, request_data_format.0, request_data_template.as_deref());
        debug!(tool_name, "dispatching TCP call");
        let response = self.exchange(template, &payload).await?;
        Ok(decode_response(&response, response_byte_format.as_deref()))
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
            warn!(tool_name, error = %e, "TCP call failed ahead of streaming fallback");
        }
        Ok(stream_from_unary(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tokio::io::{AsyncReadExt, AsyncWriteExt as _};
    use tokio::net::TcpListener;
    use utcp_types::call_template::{
        defaults::{EndianDefault, RequestDataFormatDefault},
        Endian, FramingStrategy,
    };

    fn template(port: u16, strategy: FramingStrategy) -> CallTemplate {
        CallTemplate::Tcp {
            name: "device".into(),
            host: "127.0.0.1".into(),
            port,
            framing_strategy: strategy,
            length_prefix_bytes: 4,
            length_prefix_endian: EndianDefault(Endian::Big),
            message_delimiter: Some("\\n".into()),
            fixed_message_length: None,
            max_response_size: None,
            request_data_format: RequestDataFormatDefault(utcp_types::call_template::RequestDataFormat::Json),
            request_data_template: None,
            response_byte_format: None,
            timeout: 2_000,
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn discovery_round_trips_length_prefixed_manual() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut len_buf = [0u8; 4];
            socket.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut req = vec![0u8; len];
            socket.read_exact(&mut req).await.unwrap();
            assert_eq!(req, br#"{"type":"utcp"}"#);

            let manual = br#"{"utcp_version":"1.0.0","manual_version":"1.0.0","tools":[]}"#;
            socket.write_all(&(manual.len() as u32).to_be_bytes()).await.unwrap();
            socket.write_all(manual).await.unwrap();
        });

        let protocol = TcpProtocol::new();
        let ctx = TransportContext::default();
        let tpl = template(port, FramingStrategy::LengthPrefix);
        let result = protocol.register_manual(&ctx, &tpl).await;
        assert!(result.success, "{:?}", result.errors);
        assert!(result.manual.tools.is_empty());
    }

    #[tokio::test]
    async fn call_tool_sends_and_receives_length_prefixed_payload() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut len_buf = [0u8; 4];
            socket.read_exact(&mut len_buf).await.unwrap();
            let len = u32::from_be_bytes(len_buf) as usize;
            let mut req = vec![0u8; len];
            socket.read_exact(&mut req).await.unwrap();
            let parsed: Value = serde_json::from_slice(&req).unwrap();
            assert_eq!(parsed["channel"], "2/1");

            let reply = b"42.0";
            socket.write_all(&(reply.len() as u32).to_be_bytes()).await.unwrap();
            socket.write_all(reply).await.unwrap();
        });

        let protocol = TcpProtocol::new();
        let ctx = TransportContext::default();
        let tpl = template(port, FramingStrategy::LengthPrefix);
        let result = protocol
            .call_tool(&ctx, "get_value", serde_json::json!({"channel": "2/1"}), &tpl)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!("42.0"));
    }
}
