//! Client Config Loader: materializes a `ClientConfig`
//! from either an in-memory value or a JSON file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use utcp_core::VariableLoader;
use utcp_types::{CallTemplate, UtcpError, UtcpResult};

use crate::repository::ToolRepository;
use crate::search::{TagSearchStrategy, ToolSearchStrategy};

/// A hook run, in order, over a successful `call_tool` result. Hooks never run over a failed call: errors
/// propagate before post-processing is reached.
#[async_trait]
pub trait PostProcessor: Send + Sync + std::fmt::Debug {
    /// Observe or transform `result`, the decoded output of `tool_name`.
    async fn process(&self, tool_name: &str, result: Value) -> UtcpResult<Value>;
}

/// The client's startup state: preloaded manual
/// templates, the variable map and loaders, and the pluggable
/// repository/search/post-processing collaborators.
pub struct ClientConfig {
    /// Inline variable map, checked before any [`VariableLoader`] or the
    /// process environment.
    pub variables: HashMap<String, String>,
    /// Pluggable variable sources consulted in order after `variables`.
    pub variable_loaders: Vec<Arc<dyn VariableLoader>>,
    /// Manual call templates to register at `create` time.
    pub manual_call_templates: Vec<CallTemplate>,
    /// The tool repository backing this client.
    pub tool_repository: Arc<ToolRepository>,
    /// The default search strategy for `search_tools`.
    pub tool_search_strategy: Arc<dyn ToolSearchStrategy>,
    /// Hooks run over every successful `call_tool` result, in order.
    pub post_processing: Vec<Arc<dyn PostProcessor>>,
    /// Base directory relative file paths (text transport, CLI discovery)
    /// resolve against.
    pub root_dir: PathBuf,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("variables", &self.variables.keys().collect::<Vec<_>>())
            .field("manual_call_templates", &self.manual_call_templates.len())
            .field("post_processing", &self.post_processing.len())
            .field("root_dir", &self.root_dir)
            .finish_non_exhaustive()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            variables: HashMap::new(),
            variable_loaders: Vec::new(),
            manual_call_templates: Vec::new(),
            tool_repository: Arc::new(ToolRepository::new()),
            tool_search_strategy: Arc::new(TagSearchStrategy),
            post_processing: Vec::new(),
            root_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }
}

/// Where a [`ClientConfig`] comes from.
pub enum ClientConfigSource {
    /// An already-constructed configuration, used as-is.
    Inline(ClientConfig),
    /// A JSON file parsed into a configuration. Only the data-shaped
    /// fields (`variables`, `manual_call_templates`, `root_dir`) can come
    /// from JSON; the pluggable repository/search/post-processing
    /// collaborators default and can be overridden afterward.
    File(PathBuf),
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    variables: HashMap<String, String>,
    #[serde(default)]
    manual_call_templates: Vec<CallTemplate>,
    #[serde(default)]
    root_dir: Option<PathBuf>,
}

/// Materialize a [`ClientConfig`] from `source`.
///
/// # Errors
///
/// Returns [`UtcpError::InvalidConfig`] when a `File` source can't be
/// read, isn't valid JSON, or contains a call template that fails its
/// kind-specific validation (tagged-enum deserialization does this for
/// free).
pub async fn load(source: ClientConfigSource) -> UtcpResult<ClientConfig> {
    match source {
        ClientConfigSource::Inline(config) => Ok(config),
        ClientConfigSource::File(path) => load_file(&path).await,
    }
}

async fn load_file(path: &Path) -> UtcpResult<ClientConfig> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| UtcpError::InvalidConfig(format!("reading config file {path:?}: {e}")))?;
    let parsed: ConfigFile = serde_json::from_str(&contents)
        .map_err(|e| UtcpError::InvalidConfig(format!("parsing config file {path:?}: {e}")))?;

    let root_dir = parsed
        .root_dir
        .unwrap_or_else(|| path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")));

    Ok(ClientConfig {
        variables: parsed.variables,
        manual_call_templates: parsed.manual_call_templates,
        root_dir,
        ..ClientConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inline_source_is_returned_unchanged() {
        let mut config = ClientConfig::default();
        config.variables.insert("KEY".to_string(), "value".to_string());
        let loaded = load(ClientConfigSource::Inline(config)).await.unwrap();
        assert_eq!(loaded.variables.get("KEY"), Some(&"value".to_string()));
    }

    #[tokio::test]
    async fn file_source_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let result = load(ClientConfigSource::File(path)).await;
        assert!(matches!(result, Err(UtcpError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn file_source_parses_variables_and_root_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(
            &path,
            serde_json::json!({
                "variables": {"API_KEY": "secret"},
                "manual_call_templates": []
            })
            .to_string(),
        )
        .await
        .unwrap();
        let loaded = load(ClientConfigSource::File(path)).await.unwrap();
        assert_eq!(loaded.variables.get("API_KEY"), Some(&"secret".to_string()));
        assert_eq!(loaded.root_dir, dir.path());
    }
}
