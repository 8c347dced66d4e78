//! Streamable HTTP (chunked) transport.

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, instrument};

use utcp_core::auth::{AuthApplier, RequestState};
use utcp_transport_traits::fallback::unary_from_stream;
use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
use utcp_types::call_template::{CallTemplate, HttpMethod};
use utcp_types::{Manual, RegisterManualResult, UtcpError, UtcpResult};

use crate::request::split_args;
use crate::security::check_url;

/// The Streamable HTTP (chunked response) [`CommunicationProtocol`].
#[derive(Debug, Clone)]
pub struct StreamableHttpProtocol {
    client: reqwest::Client,
    auth: AuthApplier,
}

impl Default for StreamableHttpProtocol {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl StreamableHttpProtocol {
    /// Build a protocol instance sharing `client`'s connection pool with
    /// the OAuth2 token exchanges `utcp-core` performs.
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            auth: AuthApplier::new(client.clone()),
            client,
        }
    }

    fn method(http_method: HttpMethod) -> reqwest::Method {
        match http_method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

/// Parse one ndjson line into a decoded [`Value`], falling back to the raw
/// bytes as a string when it isn't valid JSON.
fn decode_ndjson_line(line: &str) -> Value {
    serde_json::from_str(line).unwrap_or_else(|_| Value::String(line.to_string()))
}

#[async_trait]
impl CommunicationProtocol for StreamableHttpProtocol {
    #[instrument(skip(self, _ctx, template))]
    async fn register_manual(
        &self,
        _ctx: &TransportContext,
        template: &CallTemplate,
    ) -> RegisterManualResult {
        let CallTemplate::StreamableHttp { url, http_method, .. } = template else {
            return RegisterManualResult::failure(
                template.clone(),
                "StreamableHttpProtocol received a non-StreamableHttp call template",
            );
        };

        if let Err(e) = check_url(url) {
            return RegisterManualResult::failure(template.clone(), e.to_string());
        }

        let response = match self.client.request(Self::method(*http_method), url).send().await {
            Ok(r) => r,
            Err(e) => return RegisterManualResult::failure(template.clone(), e.to_string()),
        };
        if !response.status().is_success() {
            return RegisterManualResult::failure(
                template.clone(),
                format!("discovery request returned {}", response.status()),
            );
        }

        let body: Value = match response.json().await {
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

    async fn deregister_manual(&self, _ctx: &TransportContext, _template: &CallTemplate) -> UtcpResult<()> {
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
        let CallTemplate::StreamableHttp {
            url: url_template,
            http_method,
            content_type,
            headers,
            body_field,
            header_fields,
            chunk_size,
            auth,
            ..
        } = template
        else {
            return Err(UtcpError::UnsupportedOperation(
                "StreamableHttpProtocol received a non-StreamableHttp call template".to_string(),
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
            .request(Self::method(*http_method), &split.url)
            .query(&split.query_args);
        for (k, v) in &state.headers {
            builder = builder.header(k, v);
        }
        if let Some(creds) = basic {
            builder = builder.basic_auth(creds.username, Some(creds.password));
        }
        if let Some(body) = &split.body {
            if content_type.contains("application/json") {
                builder = builder.json(body);
            } else {
                builder = builder
                    .header(reqwest::header::CONTENT_TYPE, content_type.as_str())
                    .body(crate::request::value_to_plain_string(body));
            }
        }

        debug!(tool_name, url = %split.url, "dispatching streamable HTTP call");
        let response = builder.send().await.map_err(|e| UtcpError::CallFailure(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UtcpError::CallFailure(format!("HTTP {status}: {body}")));
        }

        let response_content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();
        let chunk_size = *chunk_size;

        let stream = async_stream::stream! {
            let mut byte_stream = response.bytes_stream();

            if response_content_type.contains("application/x-ndjson") {
                let mut buffer = String::new();
                while let Some(chunk) = byte_stream.next().await {
                    match chunk {
                        Ok(bytes) => {
                            buffer.push_str(&String::from_utf8_lossy(&bytes));
                            while let Some(pos) = buffer.find('\n') {
                                let line = buffer[..pos].to_string();
                                buffer = buffer[pos + 1..].to_string();
                                if !line.trim().is_empty() {
                                    yield Ok(decode_ndjson_line(line.trim()));
                                }
                            }
                        }
                        Err(e) => {
                            yield Err(UtcpError::CallFailure(e.to_string()));
                            return;
                        }
                    }
                }
                if !buffer.trim().is_empty() {
                    yield Ok(decode_ndjson_line(buffer.trim()));
                }
            } else if response_content_type.contains("application/octet-stream") {
                let mut pending = Vec::new();
                while let Some(chunk) = byte_stream.next().await {
                    match chunk {
                        Ok(bytes) => {
                            pending.extend_from_slice(&bytes);
                            while pending.len() >= chunk_size {
                                let rest = pending.split_off(chunk_size);
                                yield Ok(Value::String(lossy_bytes_to_string(&pending)));
                                pending = rest;
                            }
                        }
                        Err(e) => {
                            yield Err(UtcpError::CallFailure(e.to_string()));
                            return;
                        }
                    }
                }
                if !pending.is_empty() {
                    yield Ok(Value::String(lossy_bytes_to_string(&pending)));
                }
            } else if response_content_type.contains("application/json") {
                let mut buffer = Vec::new();
                while let Some(chunk) = byte_stream.next().await {
                    match chunk {
                        Ok(bytes) => buffer.extend_from_slice(&bytes),
                        Err(e) => {
                            yield Err(UtcpError::CallFailure(e.to_string()));
                            return;
                        }
                    }
                }
                match serde_json::from_slice::<Value>(&buffer) {
                    Ok(value) => yield Ok(value),
                    Err(_) => yield Ok(Value::String(String::from_utf8_lossy(&buffer).to_string())),
                }
            } else {
                let mut pending = Vec::new();
                while let Some(chunk) = byte_stream.next().await {
                    match chunk {
                        Ok(bytes) => {
                            pending.extend_from_slice(&bytes);
                            while pending.len() >= chunk_size {
                                let rest = pending.split_off(chunk_size);
                                yield Ok(Value::String(lossy_bytes_to_string(&pending)));
                                pending = rest;
                            }
                        }
                        Err(e) => {
                            yield Err(UtcpError::CallFailure(e.to_string()));
                            return;
                        }
                    }
                }
                if !pending.is_empty() {
                    yield Ok(Value::String(lossy_bytes_to_string(&pending)));
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Raw byte chunks have no native JSON representation; surfaced as a UTF-8
/// lossy string so the rest of the pipeline (which is `Value`-typed end to
/// end) can carry them without a parallel byte-stream API.
fn lossy_bytes_to_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).to_string()
}
