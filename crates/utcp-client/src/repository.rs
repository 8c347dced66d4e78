//! The Tool Repository: a concurrent store of manuals,
//! their registering call templates, and the tools they expose.

use std::collections::HashMap;

use tokio::sync::RwLock;

use utcp_types::{CallTemplate, Manual, Tool};

#[derive(Default)]
struct Inner {
    manuals: HashMap<String, Manual>,
    call_templates: HashMap<String, CallTemplate>,
    tools: HashMap<String, Tool>,
}

/// Concurrent store keyed by manual name and fully-qualified tool name
/// (`<manual>.<tool>`), guarded by a single lock so `save_manual` and
/// `remove_manual` are linearizable: a tool appears, or is removed,
/// atomically alongside its manual.
#[derive(Default)]
pub struct ToolRepository {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for ToolRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRepository").finish_non_exhaustive()
    }
}

impl ToolRepository {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Save `manual` (discovered via `template`) and its tools, replacing
    /// any previous manual and tools under the same name.
    pub async fn save_manual(&self, name: &str, template: CallTemplate, manual: Manual) {
        let mut inner = self.inner.write().await;
        inner.tools.retain(|tool_name, _| !is_owned_by(tool_name, name));
        for tool in &manual.tools {
            inner.tools.insert(tool.name.clone(), tool.clone());
        }
        inner.call_templates.insert(name.to_string(), template);
        inner.manuals.insert(name.to_string(), manual);
    }

    /// Remove a manual and every tool whose name-prefix matches it.
    /// Returns `false` for an unknown manual (not an error,
    /// "deregister on unknown name returns false").
    pub async fn remove_manual(&self, name: &str) -> bool {
        let mut inner = self.inner.write().await;
        let removed = inner.manuals.remove(name).is_some();
        inner.call_templates.remove(name);
        inner.tools.retain(|tool_name, _| !is_owned_by(tool_name, name));
        removed
    }

    /// Remove a single tool by its fully-qualified name, independent of
    /// its owning manual.
    pub async fn remove_tool(&self, name: &str) -> bool {
        self.inner.write().await.tools.remove(name).is_some()
    }

    /// Look up a tool by fully-qualified name.
    pub async fn get_tool(&self, name: &str) -> Option<Tool> {
        self.inner.read().await.tools.get(name).cloned()
    }

    /// All registered tools, across every manual.
    pub async fn get_tools(&self) -> Vec<Tool> {
        self.inner.read().await.tools.values().cloned().collect()
    }

    /// All tools belonging to `manual_name`.
    pub async fn get_tools_by_manual(&self, manual_name: &str) -> Vec<Tool> {
        self.inner
            .read()
            .await
            .tools
            .iter()
            .filter(|(tool_name, _)| is_owned_by(tool_name, manual_name))
            .map(|(_, tool)| tool.clone())
            .collect()
    }

    /// Look up a manual by name.
    pub async fn get_manual(&self, name: &str) -> Option<Manual> {
        self.inner.read().await.manuals.get(name).cloned()
    }

    /// All registered manuals, keyed by name.
    pub async fn get_manuals(&self) -> HashMap<String, Manual> {
        self.inner.read().await.manuals.clone()
    }

    /// The call template a manual was registered with.
    pub async fn get_manual_call_template(&self, name: &str) -> Option<CallTemplate> {
        self.inner.read().await.call_templates.get(name).cloned()
    }

    /// All registered call templates, keyed by manual name.
    pub async fn get_manual_call_templates(&self) -> HashMap<String, CallTemplate> {
        self.inner.read().await.call_templates.clone()
    }
}

/// A tool belongs to `manual_name` when its fully-qualified name starts
/// with `<manual_name>.`.
fn is_owned_by(tool_name: &str, manual_name: &str) -> bool {
    tool_name
        .strip_prefix(manual_name)
        .is_some_and(|rest| rest.starts_with('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use utcp_types::call_template::HttpMethod;

    fn template() -> CallTemplate {
        CallTemplate::Http {
            name: "weather".into(),
            url: "https://api.example/forecast".into(),
            http_method: HttpMethod::Get,
            content_type: "application/json".into(),
            headers: Default::default(),
            body_field: None,
            header_fields: vec![],
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        }
    }

    fn tool(name: &str) -> Tool {
        Tool {
            name: name.to_string(),
            description: String::new(),
            inputs: utcp_types::JsonSchema::empty(),
            outputs: utcp_types::JsonSchema::empty(),
            tags: vec![],
            tool_call_template: template(),
            average_response_size: None,
        }
    }

    #[tokio::test]
    async fn save_and_lookup_round_trip() {
        let repo = ToolRepository::new();
        let manual = Manual {
            utcp_version: "1.0.0".into(),
            manual_version: "1.0.0".into(),
            tools: vec![tool("weather.forecast"), tool("weather.alerts")],
        };
        repo.save_manual("weather", template(), manual).await;

        assert!(repo.get_manual("weather").await.is_some());
        assert_eq!(repo.get_tools_by_manual("weather").await.len(), 2);
        assert!(repo.get_tool("weather.forecast").await.is_some());
    }

    #[tokio::test]
    async fn saving_a_manual_replaces_its_previous_tools() {
        let repo = ToolRepository::new();
        let first = Manual {
            utcp_version: "1.0.0".into(),
            manual_version: "1.0.0".into(),
            tools: vec![tool("weather.old")],
        };
        repo.save_manual("weather", template(), first).await;

        let second = Manual {
            utcp_version: "1.0.0".into(),
            manual_version: "2.0.0".into(),
            tools: vec![tool("weather.new")],
        };
        repo.save_manual("weather", template(), second).await;

        assert!(repo.get_tool("weather.old").await.is_none());
        assert!(repo.get_tool("weather.new").await.is_some());
        assert_eq!(repo.get_tools_by_manual("weather").await.len(), 1);
    }

    #[tokio::test]
    async fn remove_manual_drops_manual_and_prefixed_tools() {
        let repo = ToolRepository::new();
        let manual = Manual {
            utcp_version: "1.0.0".into(),
            manual_version: "1.0.0".into(),
            tools: vec![tool("weather.forecast")],
        };
        repo.save_manual("weather", template(), manual).await;

        assert!(repo.remove_manual("weather").await);
        assert!(repo.get_manual("weather").await.is_none());
        assert!(repo.get_tool("weather.forecast").await.is_none());
        assert!(!repo.remove_manual("weather").await);
    }

    #[tokio::test]
    async fn prefix_match_does_not_collide_across_similarly_named_manuals() {
        let repo = ToolRepository::new();
        repo.save_manual(
            "weather",
            template(),
            Manual {
                utcp_version: "1.0.0".into(),
                manual_version: "1.0.0".into(),
                tools: vec![tool("weather.forecast")],
            },
        )
        .await;
        repo.save_manual(
            "weatherstation",
            template(),
            Manual {
                utcp_version: "1.0.0".into(),
                manual_version: "1.0.0".into(),
                tools: vec![tool("weatherstation.readings")],
            },
        )
        .await;

        repo.remove_manual("weather").await;
        assert!(repo.get_tool("weatherstation.readings").await.is_some());
    }
}
