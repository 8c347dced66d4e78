//! A single callable tool exposed by a manual.

use serde::{Deserialize, Serialize};

use crate::call_template::CallTemplate;
use crate::schema::JsonSchema;

/// A single callable tool, as produced by manual discovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Tool name. Namespaced as `<manual>.<tool>` once registered into a
    /// repository.
    pub name: String,

    /// Human-readable description, used by tag/keyword search.
    #[serde(default)]
    pub description: String,

    /// Input argument schema.
    #[serde(default = "JsonSchema::empty")]
    pub inputs: JsonSchema,

    /// Output value schema.
    #[serde(default = "JsonSchema::empty")]
    pub outputs: JsonSchema,

    /// Free-form tags, matched case-insensitively by search.
    #[serde(default)]
    pub tags: Vec<String>,

    /// The call template used to invoke this tool.
    pub tool_call_template: CallTemplate,

    /// An optional hint for average response payload size in bytes, used
    /// by callers deciding whether to stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_response_size: Option<u64>,
}

impl Tool {
    /// True when `needle` case-insensitively matches the name, description,
    /// or any tag.
    #[must_use]
    pub fn matches_keyword(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.name.to_lowercase().contains(&needle)
            || self.description.to_lowercase().contains(&needle)
            || self.tags.iter().any(|t| t.to_lowercase().contains(&needle))
    }
}
