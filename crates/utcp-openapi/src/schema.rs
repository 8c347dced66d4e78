//! Raw OpenAPI schema `Value` -> [`utcp_types::JsonSchema`] conversion.

use serde_json::Value;
use utcp_types::JsonSchema;

/// Convert a raw (already `$ref`-resolved) OpenAPI schema object into a
/// [`JsonSchema`] node, recursing into `properties`/`items`.
#[must_use]
pub fn value_to_json_schema(value: &Value) -> JsonSchema {
    let Some(obj) = value.as_object() else {
        return JsonSchema::empty();
    };

    let r#type = obj.get("type").and_then(Value::as_str).map(String::from);
    let properties = obj
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json_schema(v)))
                .collect()
        })
        .unwrap_or_default();
    let items = obj.get("items").map(|v| Box::new(value_to_json_schema(v)));
    let required = obj.get("required").and_then(Value::as_array).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect()
    });
    let r#enum = obj.get("enum").and_then(Value::as_array).cloned();
    let description = obj
        .get("description")
        .and_then(Value::as_str)
        .map(String::from);
    let title = obj.get("title").and_then(Value::as_str).map(String::from);
    let format = obj.get("format").and_then(Value::as_str).map(String::from);
    let minimum = obj.get("minimum").and_then(Value::as_f64);
    let maximum = obj.get("maximum").and_then(Value::as_f64);

    JsonSchema {
        r#type,
        properties,
        items,
        required,
        r#enum,
        description,
        title,
        format,
        minimum,
        maximum,
        schema_dialect: None,
        id: None,
        extra: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_nested_object_schema() {
        let v = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "age": {"type": "integer"}},
            "required": ["name"]
        });
        let schema = value_to_json_schema(&v);
        assert_eq!(schema.r#type.as_deref(), Some("object"));
        assert_eq!(schema.properties.len(), 2);
        assert_eq!(schema.required, Some(vec!["name".to_string()]));
    }

    #[test]
    fn converts_array_items() {
        let v = json!({"type": "array", "items": {"type": "string"}});
        let schema = value_to_json_schema(&v);
        assert_eq!(schema.items.unwrap().r#type.as_deref(), Some("string"));
    }
}
