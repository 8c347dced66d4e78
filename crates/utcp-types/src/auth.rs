//! Authentication descriptors attached to a [`crate::call_template::CallTemplate`].

use serde::{Deserialize, Serialize};

/// Where an API key is placed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    /// Placed in a request header.
    Header,
    /// Placed in the query string.
    Query,
    /// Placed in a cookie.
    Cookie,
}

/// A credential descriptor carried by a call template.
///
/// Tagged on `auth_type`, matching the discriminator the wire format and
/// OpenAPI converter both use to pick a variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum Auth {
    /// A static API key placed in a header, query parameter, or cookie.
    ApiKey {
        /// The key value. `None` is a hard error when applying this auth.
        #[serde(skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        /// Header/query/cookie name the key is placed under.
        var_name: String,
        /// Where to place the key.
        location: ApiKeyLocation,
    },
    /// HTTP Basic authentication.
    Basic {
        /// Basic auth username.
        username: String,
        /// Basic auth password.
        password: String,
    },
    /// OAuth2 client-credentials flow, with token caching keyed by
    /// `client_id`.
    OAuth2 {
        /// Token endpoint URL.
        token_url: String,
        /// OAuth2 client id.
        client_id: String,
        /// OAuth2 client secret.
        client_secret: String,
        /// Optional space-separated scope string.
        #[serde(skip_serializing_if = "Option::is_none")]
        scope: Option<String>,
    },
}

impl Auth {
    /// Convenience constructor for an [`Auth::ApiKey`] variant.
    #[must_use]
    pub fn api_key(
        api_key: impl Into<String>,
        var_name: impl Into<String>,
        location: ApiKeyLocation,
    ) -> Self {
        Auth::ApiKey {
            api_key: Some(api_key.into()),
            var_name: var_name.into(),
            location,
        }
    }

    /// Discriminant name matching the wire `auth_type` tag, used for
    /// OpenAPI-inherited-auth compatibility checks.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Auth::ApiKey { .. } => "api_key",
            Auth::Basic { .. } => "basic",
            Auth::OAuth2 { .. } => "oauth2",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_serializes_with_tag() {
        let auth = Auth::api_key("secret", "X-API-Key", ApiKeyLocation::Header);
        let json = serde_json::to_value(&auth).unwrap();
        assert_eq!(json["auth_type"], "api_key");
        assert_eq!(json["api_key"], "secret");
        assert_eq!(json["location"], "header");
    }

    #[test]
    fn oauth2_round_trips() {
        let auth = Auth::OAuth2 {
            token_url: "https://auth.example/token".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scope: Some("read write".into()),
        };
        let json = serde_json::to_value(&auth).unwrap();
        let back: Auth = serde_json::from_value(json).unwrap();
        assert_eq!(auth, back);
    }
}
