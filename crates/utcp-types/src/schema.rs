//! Recursive JSON-Schema node used for tool inputs/outputs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A recursive JSON-Schema node.
///
/// Covers the subset of JSON Schema that UTCP manuals and the OpenAPI
/// converter need: `type`, nested `properties`/`items`, `required`, `enum`,
/// descriptive metadata, and a handful of pass-through validation keywords.
/// Unknown keywords collected by a producer but not modeled here round-trip
/// through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonSchema {
    /// JSON Schema `type` keyword (e.g. `"object"`, `"string"`, `"array"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Nested property schemas, keyed by property name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub properties: BTreeMap<String, JsonSchema>,

    /// Schema for array items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<JsonSchema>>,

    /// Names of required properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,

    /// Enumerated allowed values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<Value>>,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Human-readable title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Format hint (e.g. `"date-time"`, `"uri"`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Inclusive numeric minimum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    /// Inclusive numeric maximum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    /// Schema dialect identifier, serialized as `$schema`.
    #[serde(rename = "$schema", skip_serializing_if = "Option::is_none")]
    pub schema_dialect: Option<String>,

    /// Schema identifier, serialized as `$id`.
    #[serde(rename = "$id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Any keyword not modeled above, preserved verbatim for round-tripping.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl JsonSchema {
    /// An empty schema (`{}`), accepting anything.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A schema of the given primitive `type`.
    #[must_use]
    pub fn of_type(ty: impl Into<String>) -> Self {
        Self {
            r#type: Some(ty.into()),
            ..Self::default()
        }
    }

    /// True when every field is at its default (the schema imposes no
    /// constraint at all).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.r#type.is_none()
            && self.properties.is_empty()
            && self.items.is_none()
            && self.required.is_none()
            && self.r#enum.is_none()
            && self.description.is_none()
            && self.title.is_none()
            && self.format.is_none()
            && self.minimum.is_none()
            && self.maximum.is_none()
            && self.schema_dialect.is_none()
            && self.id.is_none()
            && self.extra.is_empty()
    }
}
