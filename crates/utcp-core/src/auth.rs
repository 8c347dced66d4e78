//! Auth Applier: turns an [`Auth`] descriptor into mutated
//! header/query/cookie maps, and runs the OAuth2 client-credentials flow
//! with per-`client_id` token caching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use utcp_types::auth::ApiKeyLocation;
use utcp_types::{Auth, UtcpError, UtcpResult};

/// Basic-auth credentials an HTTP transport applies natively (the
/// transport, not this crate, knows how to attach them to its client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

/// The mutable parts of an outgoing request [`AuthApplier::apply`] writes
/// into.
#[derive(Debug, Clone, Default)]
pub struct RequestState {
    /// Header name -> value.
    pub headers: HashMap<String, String>,
    /// Query parameter name -> value.
    pub query: HashMap<String, String>,
    /// Cookie name -> value.
    pub cookies: HashMap<String, String>,
}

/// A cached OAuth2 access token.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Applies [`Auth`] descriptors to outgoing requests, caching OAuth2 tokens
/// keyed by `client_id`.
///
/// One instance is shared by all calls through a client; the token cache
/// persists for the instance's lifetime (entries are only invalidated by
/// process exit or dropping the applier).
#[derive(Debug, Clone)]
pub struct AuthApplier {
    http: reqwest::Client,
    tokens: Arc<Mutex<HashMap<String, CachedToken>>>,
}

impl Default for AuthApplier {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl AuthApplier {
    /// Build an applier that reuses the given HTTP client for OAuth2 token
    /// exchanges, so connection pooling is shared with the rest of the
    /// caller's traffic.
    #[must_use]
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Apply `auth` to `state`, mutating headers/query/cookies in place.
    /// Returns Basic credentials for the HTTP transport to apply natively
    /// (e.g. via `reqwest::RequestBuilder::basic_auth`), or `None` for the
    /// other variants.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::Other`] when an [`Auth::ApiKey`] carries no
    /// `api_key` value, or when the OAuth2 token exchange fails on both
    /// attempts.
    #[instrument(skip(self, state), fields(auth_kind = auth.kind()))]
    pub async fn apply(
        &self,
        auth: &Auth,
        state: &mut RequestState,
    ) -> UtcpResult<Option<BasicCredentials>> {
        match auth {
            Auth::ApiKey {
                api_key,
                var_name,
                location,
            } => {
                let key = api_key
                    .as_ref()
                    .ok_or_else(|| UtcpError::other("ApiKey auth has no api_key value"))?;
                match location {
                    ApiKeyLocation::Header => {
                        state.headers.insert(var_name.clone(), key.clone());
                    }
                    ApiKeyLocation::Query => {
                        state.query.insert(var_name.clone(), key.clone());
                    }
                    ApiKeyLocation::Cookie => {
                        state.cookies.insert(var_name.clone(), key.clone());
                    }
                }
                Ok(None)
            }
            Auth::Basic { username, password } => Ok(Some(BasicCredentials {
                username: username.clone(),
                password: password.clone(),
            })),
            Auth::OAuth2 { .. } => {
                let token = self.oauth2_token(auth).await?;
                state
                    .headers
                    .insert("Authorization".to_string(), format!("Bearer {token}"));
                Ok(None)
            }
        }
    }

    /// Client-credentials OAuth2 flow with per-`client_id` caching.
    ///
    /// # Errors
    ///
    /// Returns [`UtcpError::Other`] if `auth` is not [`Auth::OAuth2`], or if
    /// both the body-credentials and Basic-header token exchanges fail.
    #[instrument(skip(self, auth))]
    pub async fn oauth2_token(&self, auth: &Auth) -> UtcpResult<String> {
        let Auth::OAuth2 {
            token_url,
            client_id,
            client_secret,
            scope,
        } = auth
        else {
            return Err(UtcpError::other("oauth2_token called with non-OAuth2 auth"));
        };

        let cache_key = format!("{token_url}:{client_id}:{}", scope.as_deref().unwrap_or(""));
        {
            let cache = self.tokens.lock().await;
            if let Some(cached) = cache.get(&cache_key)
                && cached.is_valid()
            {
                debug!(client_id, "reusing cached OAuth2 token");
                return Ok(cached.access_token.clone());
            }
        }

        // Attempt 1: credentials in the request body.
        let mut body = vec![("grant_type", "client_credentials".to_string())];
        body.push(("client_id", client_id.clone()));
        body.push(("client_secret", client_secret.clone()));
        if let Some(scope) = scope {
            body.push(("scope", scope.clone()));
        }

        let body_attempt = self.http.post(token_url).form(&body).send().await;
        let body_result = match body_attempt {
            Ok(resp) if resp.status().is_success() => {
                resp.json::<TokenResponse>().await.map_err(UtcpError::other)
            }
            Ok(resp) => Err(UtcpError::other(format!(
                "token endpoint returned {}",
                resp.status()
            ))),
            Err(e) => Err(UtcpError::other(e)),
        };

        let token_response = match body_result {
            Ok(t) => t,
            Err(body_err) => {
                warn!(error = %body_err, "OAuth2 body-credential attempt failed, retrying with Basic header");
                // Attempt 2: credentials via HTTP Basic, only grant_type +
                // scope in the body.
                let mut retry_body = vec![("grant_type", "client_credentials".to_string())];
                if let Some(scope) = scope {
                    retry_body.push(("scope", scope.clone()));
                }
                let resp = self
                    .http
                    .post(token_url)
                    .basic_auth(client_id, Some(client_secret))
                    .form(&retry_body)
                    .send()
                    .await
                    .map_err(UtcpError::other)?;
                if !resp.status().is_success() {
                    return Err(UtcpError::other(format!(
                        "token endpoint returned {} (after body-credential attempt failed: {body_err})",
                        resp.status()
                    )));
                }
                resp.json::<TokenResponse>().await.map_err(UtcpError::other)?
            }
        };

        let ttl = token_response.expires_in.unwrap_or(300).saturating_sub(10);
        let cached = CachedToken {
            access_token: token_response.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        };
        self.tokens.lock().await.insert(cache_key, cached);
        Ok(token_response.access_token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use utcp_types::auth::ApiKeyLocation;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn api_key_header_is_applied() {
        let applier = AuthApplier::default();
        let auth = Auth::api_key("secret", "X-API-Key", ApiKeyLocation::Header);
        let mut state = RequestState::default();
        let basic = applier.apply(&auth, &mut state).await.unwrap();
        assert!(basic.is_none());
        assert_eq!(state.headers.get("X-API-Key"), Some(&"secret".to_string()));
    }

    #[tokio::test]
    async fn missing_api_key_value_is_an_error() {
        let applier = AuthApplier::default();
        let auth = Auth::ApiKey {
            api_key: None,
            var_name: "X-API-Key".into(),
            location: ApiKeyLocation::Header,
        };
        let mut state = RequestState::default();
        assert!(applier.apply(&auth, &mut state).await.is_err());
    }

    #[tokio::test]
    async fn basic_auth_returns_credentials_without_mutating_state() {
        let applier = AuthApplier::default();
        let auth = Auth::Basic {
            username: "u".into(),
            password: "p".into(),
        };
        let mut state = RequestState::default();
        let creds = applier.apply(&auth, &mut state).await.unwrap().unwrap();
        assert_eq!(creds.username, "u");
        assert!(state.headers.is_empty());
    }

    #[tokio::test]
    async fn oauth2_token_cached_and_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "AT", "expires_in": 3600})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let auth = Auth::OAuth2 {
            token_url: format!("{}/token", server.uri()),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scope: None,
        };
        let applier = AuthApplier::default();
        let first = applier.oauth2_token(&auth).await.unwrap();
        let second = applier.oauth2_token(&auth).await.unwrap();
        assert_eq!(first, "AT");
        assert_eq!(second, "AT");
    }

    #[tokio::test]
    async fn oauth2_falls_back_to_basic_header_on_body_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("client_secret"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"access_token": "AT2", "expires_in": 60})),
            )
            .mount(&server)
            .await;

        let auth = Auth::OAuth2 {
            token_url: format!("{}/token", server.uri()),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scope: None,
        };
        let applier = AuthApplier::default();
        let token = applier.oauth2_token(&auth).await.unwrap();
        assert_eq!(token, "AT2");
    }

    #[tokio::test]
    async fn oauth2_missing_expires_in_defaults_to_290s_ttl() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "AT"})),
            )
            .mount(&server)
            .await;

        let auth = Auth::OAuth2 {
            token_url: format!("{}/token", server.uri()),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scope: None,
        };
        let applier = AuthApplier::default();
        applier.oauth2_token(&auth).await.unwrap();
        let cache = applier.tokens.lock().await;
        let cached = cache.values().next().unwrap();
        let remaining = cached.expires_at.duration_since(Instant::now());
        assert!(remaining.as_secs() <= 290 && remaining.as_secs() > 285);
    }
}
