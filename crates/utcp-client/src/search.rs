//! Tool search strategies.
//!
//! An embedding-vector strategy is named in the original source as an
//! alternative but is an out-of-scope external collaborator here; only
//! its interface is represented, by this same trait.

use async_trait::async_trait;

use utcp_types::Tool;

use crate::repository::ToolRepository;

/// A pluggable ranking strategy for `search_tools`.
#[async_trait]
pub trait ToolSearchStrategy: Send + Sync + std::fmt::Debug {
    /// Rank tools in `repository` against `query`, returning at most
    /// `limit` results in descending relevance order.
    ///
    /// `any_of_tags_required`, when non-empty, restricts results to tools
    /// carrying at least one of the given tags.
    async fn search_tools(
        &self,
        repository: &ToolRepository,
        query: &str,
        limit: usize,
        any_of_tags_required: &[String],
    ) -> Vec<Tool>;
}

/// The default strategy: scores tools by substring/tag overlap with the
/// query, matching the original source's `TagSearchStrategy`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TagSearchStrategy;

#[async_trait]
impl ToolSearchStrategy for TagSearchStrategy {
    async fn search_tools(
        &self,
        repository: &ToolRepository,
        query: &str,
        limit: usize,
        any_of_tags_required: &[String],
    ) -> Vec<Tool> {
        let query = query.to_lowercase();
        let mut scored: Vec<(i32, Tool)> = repository
            .get_tools()
            .await
            .into_iter()
            .filter(|tool| {
                any_of_tags_required.is_empty()
                    || tool
                        .tags
                        .iter()
                        .any(|tag| any_of_tags_required.iter().any(|required| required.eq_ignore_ascii_case(tag)))
            })
            .filter_map(|tool| score(&tool, &query).map(|score| (score, tool)))
            .collect();

        scored.sort_by(|(a, tool_a), (b, tool_b)| b.cmp(a).then_with(|| tool_a.name.cmp(&tool_b.name)));
        scored.into_iter().take(limit).map(|(_, tool)| tool).collect()
    }
}

/// Score a tool against a lowercased query; `None` when nothing matches.
fn score(tool: &Tool, query: &str) -> Option<i32> {
    if query.is_empty() {
        return Some(0);
    }
    let mut score = 0;
    if tool.name.to_lowercase().contains(query) {
        score += 3;
    }
    if tool.description.to_lowercase().contains(query) {
        score += 2;
    }
    if tool.tags.iter().any(|tag| tag.to_lowercase().contains(query)) {
        score += 1;
    }
    (score > 0).then_some(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use utcp_types::call_template::HttpMethod;
    use utcp_types::{CallTemplate, Manual};

    fn template() -> CallTemplate {
        CallTemplate::Http {
            name: "svc".into(),
            url: "https://api.example".into(),
            http_method: HttpMethod::Get,
            content_type: "application/json".into(),
            headers: Default::default(),
            body_field: None,
            header_fields: vec![],
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        }
    }

    fn tool(name: &str, description: &str, tags: &[&str]) -> Tool {
        Tool {
            name: name.to_string(),
            description: description.to_string(),
            inputs: utcp_types::JsonSchema::empty(),
            outputs: utcp_types::JsonSchema::empty(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            tool_call_template: template(),
            average_response_size: None,
        }
    }

    #[tokio::test]
    async fn ranks_name_matches_above_tag_only_matches() {
        let repo = ToolRepository::new();
        repo.save_manual(
            "svc",
            template(),
            Manual {
                utcp_version: "1.0.0".into(),
                manual_version: "1.0.0".into(),
                tools: vec![
                    tool("svc.get_weather", "fetches weather", &["meteorology"]),
                    tool("svc.list_items", "lists catalog items", &["weather-related"]),
                ],
            },
        )
        .await;

        let strategy = TagSearchStrategy;
        let results = strategy.search_tools(&repo, "weather", 10, &[]).await;
        assert_eq!(results[0].name, "svc.get_weather");
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn required_tags_filter_out_non_matching_tools() {
        let repo = ToolRepository::new();
        repo.save_manual(
            "svc",
            template(),
            Manual {
                utcp_version: "1.0.0".into(),
                manual_version: "1.0.0".into(),
                tools: vec![
                    tool("svc.a", "alpha", &["internal"]),
                    tool("svc.b", "beta", &["public"]),
                ],
            },
        )
        .await;

        let strategy = TagSearchStrategy;
        let results = strategy.search_tools(&repo, "", 10, &["public".to_string()]).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "svc.b");
    }
}
