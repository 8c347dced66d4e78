//! HTTP request/response transport.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use utcp_core::auth::{AuthApplier, RequestState};
use utcp_transport_traits::fallback::stream_from_unary;
use utcp_transport_traits::{BoxStream, CommunicationProtocol, TransportContext};
use utcp_types::call_template::{CallTemplate, HttpMethod};
use utcp_types::{Manual, RegisterManualResult, UtcpError, UtcpResult};

use crate::request::split_args;
use crate::security::check_url;

/// The HTTP request/response [`CommunicationProtocol`].
#[derive(Debug, Clone)]
pub struct HttpProtocol {
    client: reqwest::Client,
    auth: AuthApplier,
}

impl Default for HttpProtocol {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl HttpProtocol {
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

    #[instrument(skip(self, args, template), fields(tool_name))]
    async fn do_call(&self, tool_name: &str, args: Value, template: &CallTemplate) -> UtcpResult<Value> {
        let CallTemplate::Http {
            url: url_template,
            http_method,
            content_type,
            headers,
            body_field,
            header_fields,
            auth,
            ..
        } = template
        else {
            return Err(UtcpError::UnsupportedOperation(
                "HttpProtocol received a non-Http call template".to_string(),
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
        if !state.cookies.is_empty() {
            let cookie_header = state
                .cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; ");
            builder = builder.header("Cookie", cookie_header);
        }
        if let Some(creds) = basic.take() {
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

        debug!(tool_name, url = %split.url, "dispatching HTTP call");
        let response = builder.send().await.map_err(|e| UtcpError::CallFailure(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UtcpError::CallFailure(format!("HTTP {status}: {body}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("application/json") {
            response.json::<Value>().await.map_err(|e| UtcpError::CallFailure(e.to_string()))
        } else {
            let text = response.text().await.map_err(|e| UtcpError::CallFailure(e.to_string()))?;
            Ok(Value::String(text))
        }
    }
}

#[async_trait]
impl CommunicationProtocol for HttpProtocol {
    #[instrument(skip(self, _ctx, template))]
    async fn register_manual(
        &self,
        _ctx: &TransportContext,
        template: &CallTemplate,
    ) -> RegisterManualResult {
        let CallTemplate::Http { url, http_method, .. } = template else {
            return RegisterManualResult::failure(
                template.clone(),
                "HttpProtocol received a non-Http call template",
            );
        };

        if let Err(e) = check_url(url) {
            return RegisterManualResult::failure(template.clone(), e.to_string());
        }

        let response = match self
            .client
            .request(Self::method(*http_method), url)
            .send()
            .await
        {
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
        // Stateless request/response transport: nothing to close.
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
            warn!(tool_name, error = %e, "HTTP call failed ahead of streaming fallback");
        }
        Ok(stream_from_unary(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn template(url: String) -> CallTemplate {
        CallTemplate::Http {
            name: "weather".into(),
            url,
            http_method: HttpMethod::Get,
            content_type: "application/json".into(),
            headers: BTreeMap::new(),
            body_field: None,
            header_fields: vec![],
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn call_tool_decodes_json_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"temp": 72})))
            .mount(&server)
            .await;

        let protocol = HttpProtocol::default();
        let ctx = TransportContext::default();
        let tpl = template(format!("{}/forecast/{{city}}", server.uri()));
        let result = protocol
            .call_tool(&ctx, "forecast", serde_json::json!({"city": "42"}), &tpl)
            .await
            .unwrap();
        assert_eq!(result, serde_json::json!({"temp": 72}));
    }

    #[tokio::test]
    async fn non_success_status_is_a_call_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/broken"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let protocol = HttpProtocol::default();
        let ctx = TransportContext::default();
        let tpl = template(format!("{}/broken", server.uri()));
        let err = protocol
            .call_tool(&ctx, "broken", serde_json::json!({}), &tpl)
            .await
            .unwrap_err();
        assert!(matches!(err, UtcpError::CallFailure(_)));
    }

    #[tokio::test]
    async fn insecure_remote_http_url_is_rejected() {
        let protocol = HttpProtocol::default();
        let ctx = TransportContext::default();
        let tpl = template("http://example.com/forecast".to_string());
        let err = protocol
            .call_tool(&ctx, "forecast", serde_json::json!({}), &tpl)
            .await
            .unwrap_err();
        assert!(matches!(err, UtcpError::SecurityViolation(_)));
    }

    #[tokio::test]
    async fn streaming_falls_back_to_single_unary_element() {
        use futures::StreamExt;

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!("pong")))
            .mount(&server)
            .await;

        let protocol = HttpProtocol::default();
        let ctx = TransportContext::default();
        let tpl = template(format!("{}/ping", server.uri()));
        let mut stream = protocol
            .call_tool_streaming(&ctx, "ping", serde_json::json!({}), &tpl)
            .await
            .unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first, serde_json::json!("pong"));
        assert!(stream.next().await.is_none());
    }
}
