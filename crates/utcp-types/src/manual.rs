//! A manual: the catalog of tools returned by registering a call template.

use serde::{Deserialize, Serialize};

use crate::call_template::CallTemplate;
use crate::tool::Tool;

/// A catalog of tools discovered from a single call template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manual {
    /// UTCP wire protocol version the producer targeted.
    pub utcp_version: String,

    /// Producer-assigned manual version, opaque to the client.
    #[serde(default)]
    pub manual_version: String,

    /// Tools discovered from the call template that produced this manual.
    #[serde(default)]
    pub tools: Vec<Tool>,
}

impl Manual {
    /// An empty manual at the current wire protocol version.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            utcp_version: crate::UTCP_VERSION.to_string(),
            manual_version: String::new(),
            tools: Vec::new(),
        }
    }
}

/// The outcome of registering a call template into a repository.
///
/// Unlike [`crate::error::UtcpError`], a failed registration is not an
/// error: partial manuals (some tools discovered, others dropped) are
/// reported here instead of aborting the whole call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterManualResult {
    /// The call template that was registered.
    pub manual_call_template: CallTemplate,

    /// The discovered manual. Empty when discovery failed outright.
    pub manual: Manual,

    /// Whether discovery succeeded without any fatal error.
    pub success: bool,

    /// Human-readable problems encountered during discovery, even on
    /// partial success (e.g. a handful of tools with unparsable schemas).
    #[serde(default)]
    pub errors: Vec<String>,
}

impl RegisterManualResult {
    /// A successful registration result with no errors.
    #[must_use]
    pub fn success(manual_call_template: CallTemplate, manual: Manual) -> Self {
        Self {
            manual_call_template,
            manual,
            success: true,
            errors: Vec::new(),
        }
    }

    /// A failed registration result carrying the reason.
    #[must_use]
    pub fn failure(manual_call_template: CallTemplate, error: impl Into<String>) -> Self {
        Self {
            manual_call_template,
            manual: Manual::empty(),
            success: false,
            errors: vec![error.into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call_template::{CallTemplate, HttpMethod};
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_template() -> CallTemplate {
        CallTemplate::Http {
            name: "weather".into(),
            url: "https://api.example/forecast".into(),
            http_method: HttpMethod::Get,
            content_type: "application/json".into(),
            headers: BTreeMap::new(),
            body_field: None,
            header_fields: vec![],
            auth: None,
            allowed_communication_protocols: BTreeSet::new(),
        }
    }

    #[test]
    fn failure_result_carries_empty_manual_and_reason() {
        let result = RegisterManualResult::failure(sample_template(), "connection refused");
        assert!(!result.success);
        assert_eq!(result.errors, vec!["connection refused".to_string()]);
        assert!(result.manual.tools.is_empty());
    }

    #[test]
    fn success_result_has_no_errors() {
        let result = RegisterManualResult::success(sample_template(), Manual::empty());
        assert!(result.success);
        assert!(result.errors.is_empty());
    }
}
