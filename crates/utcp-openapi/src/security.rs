//! OpenAPI security-scheme -> [`Auth`] mapping, including the
//! once-per-scheme-instance placeholder counter.

use serde_json::Value;
use utcp_types::auth::ApiKeyLocation;
use utcp_types::Auth;

/// Generates `${NAME_<n>}` placeholders for auth materialized from an
/// OpenAPI security scheme, incrementing once per scheme instance so that
/// co-acquired values (e.g. Basic's username+password) share a counter
/// step. Reset per conversion.
#[derive(Debug, Default)]
pub struct PlaceholderCounter(u32);

impl PlaceholderCounter {
    /// A fresh counter, starting before the first increment.
    #[must_use]
    pub fn new() -> Self {
        Self(0)
    }

    fn bump(&mut self) -> u32 {
        self.0 += 1;
        self.0
    }

    fn placeholder(&self, name: &str) -> String {
        format!("${{{name}_{}}}", self.0)
    }
}

/// Map a single OpenAPI security scheme object to an [`Auth`] descriptor
/// with placeholder-valued secrets, or `None` when the scheme type/flow
/// isn't one UTCP models.
pub fn auth_from_scheme(scheme: &Value, counter: &mut PlaceholderCounter) -> Option<Auth> {
    let scheme_type = scheme.get("type").and_then(Value::as_str)?.to_lowercase();

    match scheme_type.as_str() {
        "apikey" => {
            let location = match scheme.get("in").and_then(Value::as_str).unwrap_or("header") {
                "query" => ApiKeyLocation::Query,
                "cookie" => ApiKeyLocation::Cookie,
                _ => ApiKeyLocation::Header,
            };
            let var_name = scheme
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Authorization")
                .to_string();
            counter.bump();
            Some(Auth::api_key(counter.placeholder("API_KEY"), var_name, location))
        }
        "basic" => {
            counter.bump();
            Some(Auth::Basic {
                username: counter.placeholder("USERNAME"),
                password: counter.placeholder("PASSWORD"),
            })
        }
        "http" => {
            let http_scheme = scheme
                .get("scheme")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_lowercase();
            match http_scheme.as_str() {
                "basic" => {
                    counter.bump();
                    Some(Auth::Basic {
                        username: counter.placeholder("USERNAME"),
                        password: counter.placeholder("PASSWORD"),
                    })
                }
                "bearer" => {
                    counter.bump();
                    Some(Auth::api_key(
                        format!("Bearer {}", counter.placeholder("API_KEY")),
                        "Authorization",
                        ApiKeyLocation::Header,
                    ))
                }
                _ => None,
            }
        }
        "oauth2" => {
            if let Some(flows) = scheme.get("flows").and_then(Value::as_object) {
                // OpenAPI 3.0: flows nested under named flow types.
                for (flow_type, flow) in flows {
                    if matches!(
                        flow_type.as_str(),
                        "authorizationCode" | "accessCode" | "clientCredentials" | "application"
                    ) && let Some(token_url) = flow.get("tokenUrl").and_then(Value::as_str)
                    {
                        let scope = join_scopes(flow.get("scopes"));
                        counter.bump();
                        return Some(Auth::OAuth2 {
                            token_url: token_url.to_string(),
                            client_id: counter.placeholder("CLIENT_ID"),
                            client_secret: counter.placeholder("CLIENT_SECRET"),
                            scope,
                        });
                    }
                }
                None
            } else {
                // OpenAPI 2.0: flow fields live directly on the scheme.
                let flow_type = scheme.get("flow").and_then(Value::as_str).unwrap_or_default();
                let token_url = scheme.get("tokenUrl").and_then(Value::as_str)?;
                if matches!(flow_type, "accessCode" | "application" | "clientCredentials") {
                    let scope = join_scopes(scheme.get("scopes"));
                    counter.bump();
                    Some(Auth::OAuth2 {
                        token_url: token_url.to_string(),
                        client_id: counter.placeholder("CLIENT_ID"),
                        client_secret: counter.placeholder("CLIENT_SECRET"),
                        scope,
                    })
                } else {
                    None
                }
            }
        }
        _ => None,
    }
}

fn join_scopes(scopes: Option<&Value>) -> Option<String> {
    let keys: Vec<String> = scopes
        .and_then(Value::as_object)
        .map(|m| m.keys().cloned().collect())
        .unwrap_or_default();
    if keys.is_empty() {
        None
    } else {
        Some(keys.join(" "))
    }
}

/// True when `tools_auth` is compatible with `openapi_auth` and should be
/// preferred over the placeholder-valued descriptor.
#[must_use]
pub fn is_compatible(openapi_auth: &Auth, tools_auth: &Auth) -> bool {
    match (openapi_auth, tools_auth) {
        (
            Auth::ApiKey {
                var_name: a_name,
                location: a_loc,
                ..
            },
            Auth::ApiKey {
                var_name: b_name,
                location: b_loc,
                ..
            },
        ) => a_name.eq_ignore_ascii_case(b_name) && a_loc == b_loc,
        (Auth::Basic { .. }, Auth::Basic { .. }) => true,
        (Auth::OAuth2 { .. }, Auth::OAuth2 { .. }) => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_key_scheme_gets_placeholder() {
        let mut counter = PlaceholderCounter::new();
        let scheme = json!({"type": "apiKey", "in": "header", "name": "X-Api-Key"});
        let auth = auth_from_scheme(&scheme, &mut counter).unwrap();
        match auth {
            Auth::ApiKey { api_key, var_name, location } => {
                assert_eq!(api_key.as_deref(), Some("${API_KEY_1}"));
                assert_eq!(var_name, "X-Api-Key");
                assert_eq!(location, ApiKeyLocation::Header);
            }
            _ => panic!("expected ApiKey"),
        }
    }

    #[test]
    fn basic_and_oauth2_counters_increment_once_per_instance() {
        let mut counter = PlaceholderCounter::new();
        let basic = auth_from_scheme(&json!({"type": "basic"}), &mut counter).unwrap();
        if let Auth::Basic { username, password } = basic {
            assert_eq!(username, "${USERNAME_1}");
            assert_eq!(password, "${PASSWORD_1}");
        } else {
            panic!("expected Basic");
        }

        let oauth = auth_from_scheme(
            &json!({"type": "oauth2", "flows": {"clientCredentials": {"tokenUrl": "https://t"}}}),
            &mut counter,
        )
        .unwrap();
        if let Auth::OAuth2 { client_id, client_secret, .. } = oauth {
            assert_eq!(client_id, "${CLIENT_ID_2}");
            assert_eq!(client_secret, "${CLIENT_SECRET_2}");
        } else {
            panic!("expected OAuth2");
        }
    }

    #[test]
    fn bearer_http_scheme_maps_to_authorization_header_api_key() {
        let mut counter = PlaceholderCounter::new();
        let auth = auth_from_scheme(&json!({"type": "http", "scheme": "bearer"}), &mut counter).unwrap();
        if let Auth::ApiKey { api_key, var_name, location } = auth {
            assert_eq!(api_key.as_deref(), Some("Bearer ${API_KEY_1}"));
            assert_eq!(var_name, "Authorization");
            assert_eq!(location, ApiKeyLocation::Header);
        } else {
            panic!("expected ApiKey");
        }
    }

    #[test]
    fn compatibility_requires_matching_var_name_and_location() {
        let openapi = Auth::api_key("${API_KEY_1}", "Authorization", ApiKeyLocation::Header);
        let tools = Auth::api_key("real-secret", "Authorization", ApiKeyLocation::Header);
        assert!(is_compatible(&openapi, &tools));

        let mismatched = Auth::api_key("real-secret", "X-Other", ApiKeyLocation::Header);
        assert!(!is_compatible(&openapi, &mismatched));
    }
}
