//! The OpenAPI 2.0/3.0 -> UTCP manual converter entry point.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{debug, warn};

use utcp_types::call_template::{CallTemplate, HttpMethod};
use utcp_types::{Auth, JsonSchema, Manual, Tool, UtcpError, UtcpResult};

use crate::refs::resolve_ref_obj;
use crate::schema::value_to_json_schema;
use crate::security::{auth_from_scheme, is_compatible, PlaceholderCounter};

const OPERATION_METHODS: [&str; 5] = ["get", "post", "put", "delete", "patch"];

/// Convert a parsed OpenAPI document into a UTCP [`Manual`].
///
/// `spec_url` is the document's own retrieval URL, used as the base URL
/// fallback when the document declares no `servers`/`host`. `manual_name`
/// becomes every emitted tool's call template `name`. `inherited_auth` is
/// the manual's own call template auth, considered last in the precedence
/// order documented on [`Auth`].
pub fn convert(
    spec: &Value,
    spec_url: &str,
    manual_name: &str,
    inherited_auth: Option<&Auth>,
) -> UtcpResult<Manual> {
    let base_url = resolve_base_url(spec, spec_url);
    let global_auth = global_security_auth(spec);
    let mut counter = PlaceholderCounter::new();

    let Some(paths) = spec.get("paths").and_then(Value::as_object) else {
        return Err(UtcpError::InvalidConfig(
            "OpenAPI document has no 'paths' object".to_string(),
        ));
    };

    let mut tools = Vec::new();
    for (path, path_item) in paths {
        let path_item = resolve_ref_obj(spec, path_item);
        let shared_params: Vec<Value> = path_item
            .get("parameters")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for method in OPERATION_METHODS {
            let Some(operation) = path_item.get(method) else {
                continue;
            };
            let Some(operation_id) = operation.get("operationId").and_then(Value::as_str) else {
                debug!(path, method, "skipping operation with no operationId");
                continue;
            };

            match build_tool(
                spec,
                &base_url,
                path,
                method,
                operation,
                &shared_params,
                operation_id,
                manual_name,
                global_auth.as_ref(),
                inherited_auth,
                &mut counter,
            ) {
                Ok(tool) => tools.push(tool),
                Err(err) => warn!(operation_id, error = %err, "skipping operation"),
            }
        }
    }

    Ok(Manual {
        utcp_version: utcp_types::UTCP_VERSION.to_string(),
        manual_version: spec
            .get("info")
            .and_then(|i| i.get("version"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        tools,
    })
}

#[allow(clippy::too_many_arguments)]
fn build_tool(
    spec: &Value,
    base_url: &str,
    path: &str,
    method: &str,
    operation: &Value,
    shared_params: &[Value],
    operation_id: &str,
    manual_name: &str,
    global_auth: Option<&Auth>,
    inherited_auth: Option<&Auth>,
    counter: &mut PlaceholderCounter,
) -> UtcpResult<Tool> {
    let url = join_url(base_url, path);

    let mut own_params: Vec<Value> = operation
        .get("parameters")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut all_params: Vec<Value> = shared_params.to_vec();
    all_params.append(&mut own_params);

    let (inputs, header_fields, mut body_field) = extract_inputs(spec, &all_params);
    let mut inputs = inputs;
    if body_field.is_none() {
        if let Some((name, schema)) = extract_body(spec, operation) {
            inputs.properties.insert(name.clone(), schema);
            body_field = Some(name);
        }
    }

    let outputs = extract_outputs(spec, operation);

    let auth = resolve_auth(spec, operation, global_auth, inherited_auth, counter);

    let description = operation
        .get("summary")
        .and_then(Value::as_str)
        .or_else(|| operation.get("description").and_then(Value::as_str))
        .unwrap_or_default()
        .to_string();
    let tags = operation
        .get("tags")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default();

    let http_method = match method {
        "get" => HttpMethod::Get,
        "post" => HttpMethod::Post,
        "put" => HttpMethod::Put,
        "delete" => HttpMethod::Delete,
        "patch" => HttpMethod::Patch,
        other => return Err(UtcpError::InvalidConfig(format!("unsupported method {other}"))),
    };

    Ok(Tool {
        name: operation_id.to_string(),
        description,
        inputs,
        outputs,
        tags,
        tool_call_template: CallTemplate::Http {
            name: manual_name.to_string(),
            url,
            http_method,
            content_type: "application/json".to_string(),
            headers: BTreeMap::new(),
            body_field,
            header_fields,
            auth,
            allowed_communication_protocols: BTreeSet::new(),
        },
        average_response_size: None,
    })
}

/// Resolve `servers[0].url` (OAS 3) or `scheme://host+basePath` (OAS 2),
/// falling back to the document's own retrieval URL.
fn resolve_base_url(spec: &Value, spec_url: &str) -> String {
    if let Some(servers) = spec.get("servers").and_then(Value::as_array)
        && let Some(url) = servers.first().and_then(|s| s.get("url")).and_then(Value::as_str)
    {
        return url.trim_end_matches('/').to_string();
    }
    if let Some(host) = spec.get("host").and_then(Value::as_str) {
        let scheme = spec
            .get("schemes")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(Value::as_str)
            .unwrap_or("https");
        let base_path = spec.get("basePath").and_then(Value::as_str).unwrap_or("");
        return format!("{scheme}://{host}{base_path}")
            .trim_end_matches('/')
            .to_string();
    }
    spec_url.trim_end_matches('/').to_string()
}

/// Join a base URL and a path with single-slash normalization.
fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Merge path-level and operation-level parameters into an input schema,
/// splitting out header fields and a single `in=body` property.
fn extract_inputs(spec: &Value, params: &[Value]) -> (JsonSchema, Vec<String>, Option<String>) {
    let mut schema = JsonSchema::of_type("object");
    let mut header_fields = Vec::new();
    let mut required = Vec::new();
    let mut body_field = None;

    for raw in params {
        let param = resolve_ref_obj(spec, raw);
        let Some(name) = param.get("name").and_then(Value::as_str) else {
            continue;
        };
        let location = param.get("in").and_then(Value::as_str).unwrap_or("query");

        if location == "body" {
            let body_schema = param
                .get("schema")
                .map(|s| resolve_ref_obj(spec, s))
                .map(|s| value_to_json_schema(&s))
                .unwrap_or_else(JsonSchema::empty);
            schema.properties.insert("body".to_string(), body_schema);
            body_field = Some("body".to_string());
            continue;
        }

        let prop_schema = param
            .get("schema")
            .map(|s| resolve_ref_obj(spec, s))
            .map(|s| value_to_json_schema(&s))
            .unwrap_or_else(|| {
                // OAS 2 inlines type/format directly on the parameter.
                value_to_json_schema(&param)
            });
        schema.properties.insert(name.to_string(), prop_schema);

        if location == "header" {
            header_fields.push(name.to_string());
        }
        if param.get("required").and_then(Value::as_bool).unwrap_or(false) {
            required.push(name.to_string());
        }
    }

    if !required.is_empty() {
        schema.required = Some(required);
    }
    (schema, header_fields, body_field)
}

/// OAS 3's `requestBody.content."application/json".schema` -> a single
/// `body` property.
fn extract_body(spec: &Value, operation: &Value) -> Option<(String, JsonSchema)> {
    let request_body = resolve_ref_obj(spec, operation.get("requestBody")?);
    let content = request_body.get("content")?.as_object()?;
    let media = content
        .get("application/json")
        .or_else(|| content.values().next())?;
    let raw_schema = resolve_ref_obj(spec, media.get("schema")?);
    Some(("body".to_string(), value_to_json_schema(&raw_schema)))
}

/// The `200`/`201`/`default` response's JSON schema.
fn extract_outputs(spec: &Value, operation: &Value) -> JsonSchema {
    let Some(responses) = operation.get("responses").and_then(Value::as_object) else {
        return JsonSchema::empty();
    };

    let response = responses
        .get("200")
        .or_else(|| responses.get("201"))
        .or_else(|| responses.get("default"))
        .map(|r| resolve_ref_obj(spec, r));
    let Some(response) = response else {
        return JsonSchema::empty();
    };

    // OAS 3: response.content."application/json".schema (or first content type).
    if let Some(content) = response.get("content").and_then(Value::as_object) {
        let media = content
            .get("application/json")
            .or_else(|| content.values().next());
        if let Some(schema) = media.and_then(|m| m.get("schema")) {
            return value_to_json_schema(&resolve_ref_obj(spec, schema));
        }
    }
    // OAS 2: response.schema directly.
    if let Some(schema) = response.get("schema") {
        return value_to_json_schema(&resolve_ref_obj(spec, schema));
    }
    JsonSchema::empty()
}

/// The document's global `security` requirement mapped through
/// `securityDefinitions`/`components.securitySchemes`, if any is satisfiable.
fn global_security_auth(spec: &Value) -> Option<Auth> {
    let security = spec.get("security").and_then(Value::as_array)?;
    let mut counter = PlaceholderCounter::new();
    security_to_auth(spec, security, &mut counter)
}

fn security_to_auth(spec: &Value, security: &[Value], counter: &mut PlaceholderCounter) -> Option<Auth> {
    let scheme_name = security.iter().find_map(|req| {
        req.as_object().and_then(|m| m.keys().next()).cloned()
    })?;
    let scheme = lookup_security_scheme(spec, &scheme_name)?;
    auth_from_scheme(&scheme, counter)
}

fn lookup_security_scheme(spec: &Value, name: &str) -> Option<Value> {
    if let Some(schemes) = spec
        .get("components")
        .and_then(|c| c.get("securitySchemes"))
        .and_then(Value::as_object)
    {
        return schemes.get(name).cloned();
    }
    spec.get("securityDefinitions")
        .and_then(Value::as_object)
        .and_then(|m| m.get(name))
        .cloned()
}

/// Apply the auth precedence chain.
fn resolve_auth(
    spec: &Value,
    operation: &Value,
    global_auth: Option<&Auth>,
    inherited_auth: Option<&Auth>,
    counter: &mut PlaceholderCounter,
) -> Option<Auth> {
    // 1. operation-level x-utcp-auth extension, parsed directly.
    if let Some(raw) = operation.get("x-utcp-auth")
        && let Ok(auth) = serde_json::from_value::<Auth>(raw.clone())
    {
        return Some(auth);
    }

    // 2. operation-level security requirement.
    if let Some(security) = operation.get("security").and_then(Value::as_array)
        && let Some(auth) = security_to_auth
    {
        return Some(auth);
    }

    // 3. global security requirement (already computed for the whole document).
    let candidate = global_auth.cloned();

    // 4. inherited auth from the manual's own call template, when compatible.
    if let (Some(candidate_auth), Some(inherited)) = (&candidate, inherited_auth)
        && is_compatible(candidate_auth, inherited)
    {
        return Some(inherited.clone());
    }

    candidate
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_oas3() -> Value {
        json!({
            "openapi": "3.0.0",
            "info": {"version": "1.2.3"},
            "servers": [{"url": "https://api.example.com/v1"}],
            "paths": {
                "/pets/{petId}": {
                    "get": {
                        "operationId": "getPet",
                        "summary": "Fetch a pet",
                        "tags": ["pets"],
                        "parameters": [
                            {"name": "petId", "in": "path", "required": true, "schema": {"type": "string"}},
                            {"name": "X-Trace-Id", "in": "header", "schema": {"type": "string"}}
                        ],
                        "responses": {
                            "200": {
                                "content": {"application/json": {"schema": {"type": "object", "properties": {"name": {"type": "string"}}}}}
                            }
                        }
                    }
                }
            }
        })
    }

    #[test]
    fn converts_operation_to_tool() {
        let spec = sample_oas3();
        let manual = convert(&spec, "https://api.example.com/v1/openapi.json", "petstore", None).unwrap();
        assert_eq!(manual.manual_version, "1.2.3");
        assert_eq!(manual.tools.len(), 1);
        let tool = &manual.tools[0];
        assert_eq!(tool.name, "getPet");
        assert_eq!(tool.description, "Fetch a pet");
        assert_eq!(tool.tags, vec!["pets".to_string()]);
        assert!(tool.inputs.properties.contains_key("petId"));
        match &tool.tool_call_template {
            CallTemplate::Http { url, header_fields, .. } => {
                assert_eq!(url, "https://api.example.com/v1/pets/{petId}");
                assert_eq!(header_fields, &vec!["X-Trace-Id".to_string()]);
            }
            other => panic!("expected Http template, got {other:?}"),
        }
    }

    #[test]
    fn skips_operations_without_operation_id() {
        let mut spec = sample_oas3();
        spec["paths"]["/pets/{petId}"]["get"]
            .as_object_mut()
            .unwrap()
            .remove("operationId");
        let manual = convert(&spec, "https://api.example.com/v1/openapi.json", "petstore", None).unwrap();
        assert!(manual.tools.is_empty());
    }

    #[test]
    fn placeholder_counters_are_deterministic_across_conversions() {
        let mut spec = sample_oas3();
        spec["components"] = json!({"securitySchemes": {"apiKeyAuth": {"type": "apiKey", "in": "header", "name": "X-Api-Key"}}});
        spec["paths"]["/pets/{petId}"]["get"]["security"] = json!([{"apiKeyAuth": []}]);

        let first = convert(&spec, "https://api.example.com/v1/openapi.json", "petstore", None).unwrap();
        let second = convert(&spec, "https://api.example.com/v1/openapi.json", "petstore", None).unwrap();
        assert_eq!(first, second);
    }
}
