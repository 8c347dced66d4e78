//! gRPC call metadata assembly: template-level metadata, per-call
//! `metadata_fields` pulled from tool arguments, and `Auth`.

use std::collections::HashMap;

use serde_json::Value;
use tonic::metadata::{MetadataKey, MetadataValue};
use tonic::Request;

use utcp_core::auth::AuthApplier;
use utcp_types::{Auth, UtcpError, UtcpResult};

/// Build the metadata map for a gNMI call: template's static `metadata`
/// map, then any of `metadata_fields` found among `args` (values coerced
/// to strings), then `Authorization: Bearer <token>` for OAuth2 auth or
/// the api key for `Auth::ApiKey` (Basic is carried as a `Basic` header,
/// matching how HTTP transports would apply it).
pub(crate) async fn build_metadata(
    template_metadata: &std::collections::BTreeMap<String, String>,
    metadata_fields: &[String],
    args: &HashMap<String, Value>,
    auth: Option<&Auth>,
    auth_applier: &AuthApplier,
) -> UtcpResult<HashMap<String, String>> {
    let mut metadata: HashMap<String, String> = template_metadata
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    for field in metadata_fields {
        if let Some(value) = args.get(field) {
            metadata.insert(field.clone(), value_to_string(value));
        }
    }

    if let Some(auth) = auth {
        match auth {
            Auth::ApiKey { api_key, .. } => {
                if let Some(key) = api_key {
                    metadata.insert("authorization".to_string(), key.clone());
                }
            }
            Auth::Basic { username, password } => {
                let encoded = base64::Engine::encode(
                    &base64::engine::general_purpose::STANDARD,
                    format!("{username}:{password}"),
                );
                metadata.insert("authorization".to_string(), format!("Basic {encoded}"));
            }
            Auth::OAuth2 { .. } => {
                let token = auth_applier.oauth2_token(auth).await?;
                metadata.insert("authorization".to_string(), format!("Bearer {token}"));
            }
        }
    }

    Ok(metadata)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Apply an assembled metadata map onto a `tonic::Request`.
pub(crate) fn apply_metadata<T>(
    request: &mut Request<T>,
    metadata: &HashMap<String, String>,
) -> UtcpResult<()> {
    for (key, value) in metadata {
        let key = MetadataKey::from_bytes(key.to_ascii_lowercase().as_bytes())
            .map_err(|e| UtcpError::other(format!("invalid gNMI metadata key {key:?}: {e}")))?;
        let value = MetadataValue::try_from(value.as_str())
            .map_err(|e| UtcpError::other(format!("invalid gNMI metadata value for {key:?}: {e}")))?;
        request.metadata_mut().insert(key, value);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[tokio::test]
    async fn merges_template_metadata_and_requested_fields() {
        let mut template_metadata = BTreeMap::new();
        template_metadata.insert("static-key".to_string(), "static-val".to_string());

        let mut args = HashMap::new();
        args.insert("region".to_string(), Value::String("us-west".to_string()));

        let applier = AuthApplier::default();
        let metadata = build_metadata(
            &template_metadata,
            &["region".to_string()],
            &args,
            None,
            &applier,
        )
        .await
        .unwrap();

        assert_eq!(metadata.get("static-key"), Some(&"static-val".to_string()));
        assert_eq!(metadata.get("region"), Some(&"us-west".to_string()));
    }

    #[tokio::test]
    async fn api_key_auth_sets_authorization() {
        let applier = AuthApplier::default();
        let auth = Auth::ApiKey {
            api_key: Some("secret-token".to_string()),
            var_name: "authorization".to_string(),
            location: utcp_types::auth::ApiKeyLocation::Header,
        };
        let metadata = build_metadata(&BTreeMap::new(), &[], &HashMap::new(), Some(&auth), &applier)
            .await
            .unwrap();
        assert_eq!(metadata.get("authorization"), Some(&"secret-token".to_string()));
    }
}
