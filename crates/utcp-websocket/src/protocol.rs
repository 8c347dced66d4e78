//! The WebSocket [`CommunicationProtocol`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, instrument, warn};

use utcp_core::auth::{AuthApplier, RequestState};
use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
use utcp_types::call_template::{CallTemplate, ResponseFormat};
use utcp_types::{Manual, RegisterManualResult, UtcpError, UtcpResult};

use crate::message::render_message;
use crate::security::check_url;
use crate::session::{session_key, SessionCache};

/// Message `type` values that terminate a streaming call.
const TERMINAL_TYPES: [&str; 3] = ["tool_response", "tool_error", "stream_end"];

/// The WebSocket [`CommunicationProtocol`], keyed per
/// `name+url` connection and reused across calls.
#[derive(Debug, Default)]
pub struct WebSocketProtocol {
    auth: AuthApplier,
    sessions: Arc<SessionCache>,
}

impl WebSocketProtocol {
    /// A fresh protocol instance with an empty session cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn handshake_headers(
        &self,
        static_headers: &BTreeMap<String, String>,
        auth: Option<&utcp_types::Auth>,
    ) -> UtcpResult<BTreeMap<String, String>> {
        let mut state = RequestState {
            headers: static_headers.clone().into_iter().collect(),
            ..RequestState::default()
        };
        let mut basic = None;
        if let Some(auth) = auth {
            basic = self.auth.apply(auth, &mut state).await?;
        }
        if let Some(creds) = basic {
            let encoded = BASE64.encode(format!("{}:{}", creds.username, creds.password));
            state.headers.insert("Authorization".to_string(), format!("Basic {encoded}"));
        }
        Ok(state.headers.into_iter().collect())
    }

    async fn send_and_await_text(
        &self,
        key: &str,
        url: &str,
        protocol: Option<&str>,
        headers: &BTreeMap<String, String>,
        payload: Message,
        timeout_ms: u64,
    ) -> UtcpResult<String> {
        let session = self.sessions.get_or_create(key, url, protocol, headers).await?;
        let mut stream = session.lock().await;
        stream
            .send(payload)
            .await
            .map_err(|e| UtcpError::CallFailure(format!("sending WebSocket message: {e}")))?;

        let deadline = Duration::from_millis(timeout_ms);
        loop {
            let next = timeout(deadline, stream.next())
                .await
                .map_err(|_| UtcpError::CallFailure("waiting for WebSocket response timed out".to_string()))?;
            match next {
                Some(Ok(Message::Text(text))) => return Ok(text.to_string()),
                Some(Ok(Message::Binary(bytes))) => return Ok(String::from_utf8_lossy(&bytes).to_string()),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    return Err(UtcpError::CallFailure("WebSocket closed before a response arrived".to_string()));
                }
                Some(Ok(Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(UtcpError::CallFailure(format!("WebSocket read error: {e}"))),
            }
        }
    }
}

fn decode_response(text: &str, format: ResponseFormat) -> Value {
    match format {
        ResponseFormat::Json => serde_json::from_str(text).unwrap_or(Value::String(text.to_string())),
        ResponseFormat::Text | ResponseFormat::Raw => Value::String(text.to_string()),
        ResponseFormat::Unspecified => serde_json::from_str(text).unwrap_or(Value::String(text.to_string())),
    }
}

fn message_type(value: &Value) -> Option<&str> {
    value.get("type").and_then(Value::as_str)
}

#[async_trait]
impl CommunicationProtocol for WebSocketProtocol {
    #[instrument(skip(self, _ctx, template))]
    async fn register_manual(&self, _ctx: &TransportContext, template: &CallTemplate) -> RegisterManualResult {
        let CallTemplate::WebSocket {
            name,
            url,
            protocol,
            headers,
            timeout: timeout_ms,
            auth,
            ..
        } = template
        else {
            return RegisterManualResult::failure(
                template.clone(),
                "WebSocketProtocol received a non-WebSocket call template",
            );
        };

        if let Err(e) = check_url(url) {
            return RegisterManualResult::failure(template.clone(), e.to_string());
        }

        let resolved_headers = match self.handshake_headers(headers, auth.as_ref()).await {
            Ok(h) => h,
            Err(e) => return RegisterManualResult::failure(template.clone(), e.to_string()),
        };

        let key = session_key(name, url);
        let text = match self
            .send_and_await_text(
                &key,
                url,
                protocol.as_deref(),
                &resolved_headers,
                Message::text(r#"{"type":"utcp"}"#),
                *timeout_ms,
            )
            .await
        {
            Ok(t) => t,
            Err(e) => return RegisterManualResult::failure(template.clone(), e.to_string()),
        };

        let body: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => return RegisterManualResult::failure(template.clone(), format!("decoding discovery reply: {e}")),
        };

        if body.get("tools").is_none() {
            return RegisterManualResult::failure(
                template.clone(),
                "WebSocket discovery reply did not contain a 'tools' field",
            );
        }

        match serde_json::from_value::<Manual>(body) {
            Ok(manual) => RegisterManualResult::success(template.clone(), manual),
            Err(e) => RegisterManualResult::failure(template.clone(), format!("parsing manual: {e}")),
        }
    }

    async fn deregister_manual(&self, _ctx: &TransportContext, template: &CallTemplate) -> UtcpResult<()> {
        let CallTemplate::WebSocket { name, url, .. } = template else {
            return Ok(());
        };
        self.sessions.close(&session_key(name, url)).await;
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
        let CallTemplate::WebSocket {
            name,
            url,
            protocol,
            keep_alive,
            headers,
            message,
            response_format,
            timeout: timeout_ms,
            auth,
            ..
        } = template
        else {
            return Err(UtcpError::UnsupportedOperation(
                "WebSocketProtocol received a non-WebSocket call template".to_string(),
            ));
        };

        check_url(url)?;
        let resolved_headers = self.handshake_headers(headers, auth.as_ref()).await?;
        let key = session_key(name, url);
        let payload = render_message(message.as_ref(), &args);

        debug!(tool_name, url, "dispatching WebSocket call");
        let text = self
            .send_and_await_text(
                &key,
                url,
                protocol.as_deref(),
                &resolved_headers,
                Message::text(payload),
                *timeout_ms,
            )
            .await?;

        if !keep_alive {
            self.sessions.close(&key).await;
        }

        Ok(decode_response(&text, *response_format))
    }

    #[instrument(skip(self, _ctx, args, template), fields(tool_name))]
    async fn call_tool_streaming(
        &self,
        _ctx: &TransportContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> UtcpResult<BoxStream<'static, UtcpResult<Value>>> {
        let CallTemplate::WebSocket {
            name,
            url,
            protocol,
            keep_alive,
            headers,
            message,
            response_format,
            timeout: timeout_ms,
            auth,
            ..
        } = template
        else {
            return Err(UtcpError::UnsupportedOperation(
                "WebSocketProtocol received a non-WebSocket call template".to_string(),
            ));
        };

        check_url(url)?;
        let resolved_headers = self.handshake_headers(headers, auth.as_ref()).await?;
        let key = session_key(name, url);
        let payload = render_message(message.as_ref(), &args);

        let session = self.sessions.get_or_create(&key, url, protocol.as_deref(), &resolved_headers).await?;
        {
            let mut stream = session.lock().await;
            stream
                .send(Message::text(payload))
                .await
                .map_err(|e| UtcpError::CallFailure(format!("sending WebSocket message: {e}")))?;
        }

        debug!(tool_name, url, "opening WebSocket streaming call");
        let deadline = Duration::from_millis(*timeout_ms);
        let response_format = *response_format;
        let keep_alive = *keep_alive;
        let sessions = self.sessions.clone();
        let sessions_cache_key = key.clone();

        let stream = async_stream::stream! {
            loop {
                let next = {
                    let mut stream = session.lock().await;
                    timeout(deadline, stream.next()).await
                };
                match next {
                    Ok(Some(Ok(Message::Text(text)))) => {
                        let value = decode_response(&text.to_string(), response_format);
                        let terminal = message_type(&value).is_some_and(|t| TERMINAL_TYPES.contains(&t));
                        yield Ok(value);
                        if terminal {
                            if !keep_alive {
                                sessions.close(&sessions_cache_key).await;
                            }
                            return;
                        }
                    }
                    Ok(Some(Ok(Message::Binary(bytes)))) => {
                        yield Ok(Value::String(String::from_utf8_lossy(&bytes).to_string()));
                    }
                    Ok(Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)))) => continue,
                    Ok(Some(Ok(Message::Close(_)))) | Ok(None) => {
                        if !keep_alive {
                            sessions.close(&sessions_cache_key).await;
                        }
                        return;
                    }
                    Ok(Some(Err(e))) => {
                        yield Err(UtcpError::CallFailure(format!("WebSocket read error: {e}")));
                        if !keep_alive {
                            sessions.close(&sessions_cache_key).await;
                        }
                        return;
                    }
                    Err(_) => {
                        yield Err(UtcpError::CallFailure("waiting for WebSocket message timed out".to_string()));
                        if !keep_alive {
                            sessions.close(&sessions_cache_key).await;
                        }
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use futures::{SinkExt as _, StreamExt as _};
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    fn template(url: String) -> CallTemplate {
        CallTemplate::WebSocket {
            name: "device".into(),
            url,
            protocol: None,
            keep_alive: true,
            headers: BTreeMap::new(),
            message: None,
            response_format: ResponseFormat::Json,
            timeout: 2_000,
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        }
    }

    async fn spawn_echo_server() -> (u16, tokio::task::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let parsed: Value = serde_json::from_str(&text).unwrap();
                if parsed.get("type").and_then(Value::as_str) == Some("utcp") {
                    ws.send(Message::text(r#"{"tools":[]}"#)).await.unwrap();
                } else {
                    ws.send(Message::text(r#"{"echo": true}"#)).await.unwrap();
                }
            }
        });
        (port, handle)
    }

    #[tokio::test]
    async fn register_manual_completes_discovery_handshake() {
        let (port, _server) = spawn_echo_server().await;
        let protocol = WebSocketProtocol::new();
        let ctx = TransportContext::default();
        let tpl = template(format!("ws://127.0.0.1:{port}"));
        let result = protocol.register_manual(&ctx, &tpl).await;
        assert!(result.success, "{:?}", result.errors);
    }

    #[tokio::test]
    async fn call_tool_sends_and_decodes_reply() {
        let (port, _server) = spawn_echo_server().await;
        let protocol = WebSocketProtocol::new();
        let ctx = TransportContext::default();
        let tpl = template(format!("ws://127.0.0.1:{port}"));
        let result = protocol.call_tool(&ctx, "ping", serde_json::json!({"a": 1}), &tpl).await.unwrap();
        assert_eq!(result, serde_json::json!({"echo": true}));
    }

    #[tokio::test]
    async fn insecure_remote_url_is_rejected() {
        let protocol = WebSocketProtocol::new();
        let ctx = TransportContext::default();
        let tpl = template("ws://example.com".to_string());
        let err = protocol.call_tool(&ctx, "ping", serde_json::json!({}), &tpl).await.unwrap_err();
        assert!(matches!(err, UtcpError::SecurityViolation(_)));
    }
}
