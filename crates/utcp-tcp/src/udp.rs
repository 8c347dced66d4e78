//! UDP datagram transport.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::net::UdpSocket;
use tokio::time::{timeout, Duration};
use tracing::{debug, instrument, warn};

use utcp_transport_traits::fallback::stream_from_unary;
use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
use utcp_types::call_template::CallTemplate;
use utcp_types::{Manual, RegisterManualResult, UtcpError, UtcpResult};

use crate::request::{decode_response, format_request};

/// A conservative per-datagram read buffer; well above typical MTU-bound
/// UDP payload sizes.
const RECV_BUF_SIZE: usize = 65_536;

/// The UDP datagram [`CommunicationProtocol`].
///
/// Sends exactly one request datagram, then collects
/// `number_of_response_datagrams` reply datagrams, concatenating their
/// payloads before decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpProtocol;

impl UdpProtocol {
    /// A stateless protocol instance.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn exchange(&self, template: &CallTemplate, payload: &[u8]) -> UtcpResult<Vec<u8>> {
        let CallTemplate::Udp {
            host,
            port,
            number_of_response_datagrams,
            timeout: timeout_ms,
            ..
        } = template
        else {
            return Err(UtcpError::UnsupportedOperation(
                "UdpProtocol received a non-Udp call template".to_string(),
            ));
        };

        let addr = format!("{host}:{port}");
        let overall_timeout = Duration::from_millis(*timeout_ms);

        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|e| UtcpError::CallFailure(format!("binding local UDP socket: {e}")))?;
        socket
            .connect(&addr)
            .await
            .map_err(|e| UtcpError::CallFailure(format!("connecting to {addr}: {e}")))?;

        timeout(overall_timeout, socket.send(payload))
            .await
            .map_err(|_| UtcpError::CallFailure("sending datagram timed out".to_string()))?
            .map_err(|e| UtcpError::CallFailure(format!("sending datagram: {e}")))?;

        let expected = (*number_of_response_datagrams).max(1);
        let mut collected = Vec::new();
        let mut buf = vec![0u8; RECV_BUF_SIZE];

        for i in 0..expected {
            // Only the first datagram is bound by the full call timeout;
            // subsequent ones use a short grace window so a server that
            // sends fewer datagrams than configured doesn't stall the call.
            let per_datagram_timeout = if i == 0 {
                overall_timeout
            } else {
                Duration::from_millis(500).min(overall_timeout)
            };

            match timeout(per_datagram_timeout, socket.recv(&mut buf)).await {
                Ok(Ok(n)) => collected.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => {
                    return Err(UtcpError::CallFailure(format!("receiving datagram: {e}")));
                }
                Err(_) if i == 0 => {
                    return Err(UtcpError::CallFailure("receiving datagram timed out".to_string()));
                }
                Err(_) => break,
            }
        }

        Ok(collected)
    }
}

#[async_trait]
impl CommunicationProtocol for UdpProtocol {
    #[instrument(skip(self, _ctx, template))]
    async fn register_manual(&self, _ctx: &TransportContext, template: &CallTemplate) -> RegisterManualResult {
        if !matches!(template, CallTemplate::Udp { .. }) {
            return RegisterManualResult::failure(
                template.clone(),
                "UdpProtocol received a non-Udp call template",
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
        let CallTemplate::Udp {
            request_data_format,
            request_data_template,
            response_byte_format,
            ..
        } = template
        else {
            return Err(UtcpError::UnsupportedOperation(
                "UdpProtocol received a non-Udp call template".to_string(),
            ));
        };

        let payload = format_request(&args, request_data_format.0, request_data_template.as_deref());
        debug!(tool_name, "dispatching UDP call");
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
            warn!(tool_name, error = %e, "UDP call failed ahead of streaming fallback");
        }
        Ok(stream_from_unary(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use utcp_types::call_template::defaults::RequestDataFormatDefault;

    fn template(port: u16, number_of_response_datagrams: usize) -> CallTemplate {
        CallTemplate::Udp {
            name: "device".into(),
            host: "127.0.0.1".into(),
            port,
            number_of_response_datagrams,
            request_data_format: RequestDataFormatDefault(utcp_types::call_template::RequestDataFormat::Json),
            request_data_template: None,
            response_byte_format: None,
            timeout: 1_000,
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn call_tool_sends_single_datagram_and_decodes_reply() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (n, peer) = server.recv_from(&mut buf).await.unwrap();
            let parsed: Value = serde_json::from_slice(&buf[..n]).unwrap();
            assert_eq!(parsed["channel"], "2/1");
            server.send_to(b"42.0", peer).await.unwrap();
        });

        let protocol = UdpProtocol::new();
        let ctx = TransportContext::default();
        let tpl = template(port, 1);
        let result = protocol
            .call_tool(&ctx, "get_value", serde_json::json!({"channel": "2/1"}), &tpl)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!("42.0"));
    }

    #[tokio::test]
    async fn call_tool_concatenates_multiple_datagrams() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();

        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            let (_n, peer) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(b"part1-", peer).await.unwrap();
            server.send_to(b"part2", peer).await.unwrap();
        });

        let protocol = UdpProtocol::new();
        let ctx = TransportContext::default();
        let tpl = template(port, 2);
        let result = protocol
            .call_tool(&ctx, "get_value", serde_json::json!({}), &tpl)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!("part1-part2"));
    }
}
