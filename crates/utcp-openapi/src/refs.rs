//! Recursive `$ref` resolution with cycle detection.

use std::collections::HashSet;

use serde_json::Value;

/// Resolve a JSON-pointer-style local reference (`#/components/schemas/X`)
/// against `spec`. Cycles are broken by returning `{"$ref": ref}` verbatim
/// instead of erasing the reference.
#[must_use]
pub fn resolve_ref_path(spec: &Value, reference: &str, visited: &mut HashSet<String>) -> Value {
    if !reference.starts_with("#/") {
        return Value::Object(Default::default());
    }
    if visited.contains(reference) {
        let mut obj = serde_json::Map::new();
        obj.insert("$ref".to_string(), Value::String(reference.to_string()));
        return Value::Object(obj);
    }
    visited.insert(reference.to_string());

    let mut node = spec;
    for part in reference.trim_start_matches("#/").split('/') {
        let part = part.replace("~1", "/").replace("~0", "~");
        match node.get(&part) {
            Some(next) => node = next,
            None => return Value::Object(Default::default()),
        }
    }

    if let Some(nested_ref) = node.get("$ref").and_then(Value::as_str) {
        return resolve_ref_path(spec, nested_ref, visited);
    }
    if node.is_object() {
        node.clone()
    } else {
        Value::Object(Default::default())
    }
}

/// Resolve `obj` if it is a `{"$ref": ...}` node; otherwise return it
/// unchanged.
#[must_use]
pub fn resolve_ref_obj(spec: &Value, obj: &Value) -> Value {
    if let Some(reference) = obj.get("$ref").and_then(Value::as_str) {
        let mut visited = HashSet::new();
        resolve_ref_path(spec, reference, &mut visited)
    } else {
        obj.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolves_nested_path() {
        let spec = json!({
            "components": {"schemas": {"Pet": {"type": "object", "properties": {"name": {"type": "string"}}}}}
        });
        let resolved = resolve_ref_obj(&spec, &json!({"$ref": "#/components/schemas/Pet"}));
        assert_eq!(resolved["type"], "object");
    }

    #[test]
    fn cycle_preserves_ref_verbatim() {
        let spec = json!({
            "components": {"schemas": {
                "A": {"$ref": "#/components/schemas/B"},
                "B": {"$ref": "#/components/schemas/A"},
            }}
        });
        let resolved = resolve_ref_obj(&spec, &json!({"$ref": "#/components/schemas/A"}));
        assert_eq!(resolved["$ref"], "#/components/schemas/A");
    }

    #[test]
    fn missing_path_yields_empty_object() {
        let spec = json!({});
        let resolved = resolve_ref_obj(&spec, &json!({"$ref": "#/components/schemas/Missing"}));
        assert_eq!(resolved, json!({}));
    }
}
