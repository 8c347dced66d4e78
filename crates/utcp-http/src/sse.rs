//! Server-Sent Events transport.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use utcp_core::auth::{AuthApplier, RequestState};
use utcp_transport_traits::fallback::{stream_from_unary, unary_from_stream};
use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
use utcp_types::call_template::CallTemplate;
use utcp_types::{Manual, RegisterManualResult, UtcpError, UtcpResult};

use crate::request::split_args;
use crate::security::check_url;

/// A single parsed SSE event record.
#[derive(Debug, Default, Clone)]
struct SseEvent {
    event_type: Option<String>,
    data_lines: Vec<String>,
    #[allow(dead_code)]
    id: Option<String>,
    #[allow(dead_code)]
    retry: Option<u64>,
}

/// Split an SSE text buffer into `(record, rest)` at the first `\n\n`
/// terminator.
fn split_next_record(buffer: &str) -> Option<(&str, &str)> {
    buffer.find("\n\n").map(|pos| (&buffer[..pos], &buffer[pos + 2..]))
}

/// Parse one `\n`-separated SSE record into its fields.
fn parse_record(record: &str) -> SseEvent {
    let mut event = SseEvent::default();
    for line in record.lines() {
        if line.starts_with(':') || line.is_empty() {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => event.event_type = Some(value.to_string()),
            "data" => event.data_lines.push(value.to_string()),
            "id" => event.id = Some(value.to_string()),
            "retry" => event.retry = value.parse().ok(),
            _ => {}
        }
    }
    event
}

/// Decode an event's joined `data:` payload as JSON, falling back to the
/// raw string.
fn decode_event_data(event: &SseEvent) -> Value {
    let joined = event.data_lines.join("\n");
    serde_json::from_str(&joined).unwrap_or(Value::String(joined))
}

/// The SSE [`CommunicationProtocol`], keeping one open
/// response per manual name in an "active connections" map.
#[derive(Debug, Clone)]
pub struct SseProtocol {
    client: reqwest::Client,
    auth: AuthApplier,
    active_connections: Arc<Mutex<HashMap<String, ()>>>,
}

impl Default for SseProtocol {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl SseProtocol {
    /// Build a protocol instance sharing `client`'s connection pool with
    /// the OAuth2 token exchanges `utcp-core` performs.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            auth: AuthApplier::new(client.clone()),
            client,
            active_connections: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl CommunicationProtocol for SseProtocol {
    #[instrument(skip(self, _ctx, template))]
    async fn register_manual(
        &self,
        _ctx: &TransportContext,
        template: &CallTemplate,
    ) -> RegisterManualResult {
        let CallTemplate::Sse { name, url, headers, .. } = template else {
            return RegisterManualResult::failure(
                template.clone(),
                "SseProtocol received a non-Sse call template",
            );
        };

        if let Err(e) = check_url(url) {
            return RegisterManualResult::failure(template.clone(), e.to_string());
        }

        let mut builder = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        for (k, v) in headers {
            builder = builder.header(k, v);
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => return RegisterManualResult::failure(template.clone(), e.to_string()),
        };
        if !response.status().is_success() {
            return RegisterManualResult::failure(
                template.clone(),
                format!("SSE discovery request returned {}", response.status()),
            );
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut collected_body = String::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => {
                    buffer.push_str(&String::from_utf8_lossy(&bytes));
                    while let Some((record, rest)) = split_next_record(&buffer) {
                        let event = parse_record(record);
                        let data = event.data_lines.join("\n");
                        if !data.is_empty() {
                            collected_body = data;
                        }
                        buffer = rest.to_string();
                        if !collected_body.is_empty() {
                            break;
                        }
                    }
                    if !collected_body.is_empty() {
                        break;
                    }
                }
                Err(e) => return RegisterManualResult::failure(template.clone(), e.to_string()),
            }
        }

        self.active_connections
            .lock()
            .await
            .insert(name.clone(), ());

        if collected_body.is_empty() {
            return RegisterManualResult::failure(
                template.clone(),
                "SSE discovery stream closed without an event",
            );
        }

        let body: Value = match serde_json::from_str(&collected_body) {
            Ok(v) => v,
            Err(e) => return RegisterManualResult::failure(template.clone(), e.to_string()),
        };

        let looks_like_manual = body.get("utcp_version").is_some() && body.get("tools").is_some();
        let manual = if looks_like_manual {
            serde_json::from_value::<Manual>(body)
        } else {
            match utcp_openapi::convert(&body, url, template.name(), template.auth()) {
                Ok(manual) => Ok(manual),
                Err(e) => return RegisterManualResult::failure(template.clone(), e.to_string()),
            }
        };

        match manual {
            Ok(manual) => RegisterManualResult::success(template.clone(), manual),
            Err(e) => RegisterManualResult::failure(template.clone(), e.to_string()),
        }
    }

    async fn deregister_manual(&self, _ctx: &TransportContext, template: &CallTemplate) -> UtcpResult<()> {
        self.active_connections.lock().await.remove(template.name());
        Ok(())
    }

    async fn call_tool(
        &self,
        ctx: &TransportContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> UtcpResult<Value> {
        let stream = self.call_tool_streaming(ctx, tool_name, args, template).await?;
        unary_from_stream(stream).await
    }

    #[instrument(skip(self, _ctx, args, template), fields(tool_name))]
    async fn call_tool_streaming(
        &self,
        _ctx: &TransportContext,
        tool_name: &str,
        args: Value,
        template: &CallTemplate,
    ) -> UtcpResult<BoxStream<'static, UtcpResult<Value>>> {
        let CallTemplate::Sse {
            url: url_template,
            headers,
            body_field,
            header_fields,
            event_type,
            auth,
            ..
        } = template
        else {
            return Err(UtcpError::UnsupportedOperation(
                "SseProtocol received a non-Sse call template".to_string(),
            ));
        };

        check_url(url_template)?;
        let split = split_args(url_template, &args, header_fields, body_field.as_deref())?;

        let mut state = RequestState {
            headers: headers.clone(),
            ..RequestState::default()
        };
        let mut basic = None;
        if let Some(auth) = auth {
            basic = self.auth.apply(auth, &mut state).await?;
        }
        for (k, v) in &split.header_args {
            state.headers.insert(k.clone(), crate::request::value_to_plain_string(v));
        }

        let mut builder = self
            .client
            .get(&split.url)
            .query(&split.query_args)
            .header(reqwest::header::ACCEPT, "text/event-stream");
        for (k, v) in &state.headers {
            builder = builder.header(k, v);
        }
        if let Some(creds) = basic {
            builder = builder.basic_auth(creds.username, Some(creds.password));
        }
        if let Some(body) = &split.body {
            builder = builder.json(body);
        }

        debug!(tool_name, url = %split.url, "opening SSE call");
        let response = builder.send().await.map_err(|e| UtcpError::CallFailure(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(UtcpError::CallFailure(format!("SSE call returned {status}: {body}")));
        }

        let event_filter = event_type.clone();
        let stream = async_stream::stream! {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = byte_stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some((record, rest)) = split_next_record(&buffer) {
                            let record = record.to_string();
                            buffer = rest.to_string();
                            let event = parse_record(&record);
                            if event.data_lines.is_empty() {
                                continue;
                            }
                            if let Some(want) = &event_filter
                                && event.event_type.as_deref() != Some(want.as_str())
                            {
                                continue;
                            }
                            yield Ok(decode_event_data(&event));
                        }
                    }
                    Err(e) => {
                        yield Err(UtcpError::CallFailure(e.to_string()));
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
    use std::collections::{BTreeMap, BTreeSet};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn template(url: String) -> CallTemplate {
        CallTemplate::Sse {
            name: "events".into(),
            url,
            headers: BTreeMap::new(),
            body_field: None,
            header_fields: vec![],
            event_type: None,
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        }
    }

    #[test]
    fn parses_comment_and_fields() {
        let record = ": heartbeat\nevent: message\ndata: {\"a\":1}\nid: 7";
        let event = parse_record(record);
        assert_eq!(event.event_type.as_deref(), Some("message"));
        assert_eq!(event.data_lines, vec!["{\"a\":1}".to_string()]);
        assert_eq!(event.id.as_deref(), Some("7"));
    }

    #[test]
    fn multiple_data_lines_join_with_newline() {
        let record = "data: line one\ndata: line two";
        let event = parse_record(record);
        assert_eq!(decode_event_data(&event), Value::String("line one\nline two".to_string()));
    }

    #[tokio::test]
    async fn call_tool_streaming_yields_each_event() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("data: {\"n\":1}\n\ndata: {\"n\":2}\n\n"),
            )
            .mount(&server)
            .await;

        let protocol = SseProtocol::default();
        let ctx = TransportContext::default();
        let tpl = template(format!("{}/stream", server.uri()));
        let mut stream = protocol
            .call_tool_streaming(&ctx, "events", serde_json::json!({}), &tpl)
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(first, serde_json::json!({"n": 1}));
        assert_eq!(second, serde_json::json!({"n": 2}));
    }

    #[tokio::test]
    async fn event_type_filter_drops_non_matching_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string("event: ping\ndata: 1\n\nevent: pong\ndata: 2\n\n"),
            )
            .mount(&server)
            .await;

        let mut tpl = template(format!("{}/stream", server.uri()));
        if let CallTemplate::Sse { event_type, .. } = &mut tpl {
            *event_type = Some("pong".to_string());
        }

        let protocol = SseProtocol::default();
        let ctx = TransportContext::default();
        let mut stream = protocol
            .call_tool_streaming(&ctx, "events", serde_json::json!({}), &tpl)
            .await
            .unwrap();
        let only = stream.next().await.unwrap().unwrap();
        assert_eq!(only, serde_json::json!(2));
        assert!(stream.next().await.is_none());
    }
}
