//! Conversions between UTCP's JSON tool arguments/results and gNMI's
//! protobuf messages.

use serde_json::{json, Value};

use crate::proto;

/// Build a [`proto::Path`] from a `/`-delimited string, splitting on `/`
/// and dropping empty segments.
pub(crate) fn path_from_str(path: &str) -> proto::Path {
    proto::Path {
        origin: String::new(),
        target: String::new(),
        elem: path
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|name| proto::PathElem {
                name: name.to_string(),
                key: Default::default(),
            })
            .collect(),
    }
}

/// Render a [`proto::Path`] back to a `/`-joined string, for response
/// conversion.
pub(crate) fn path_to_string(path: &proto::Path) -> String {
    let joined = path
        .elem
        .iter()
        .map(|e| e.name.as_str())
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

/// Build a [`proto::TypedValue`] from a JSON value, typed per its dynamic
/// shape.
pub(crate) fn typed_value_from_json(value: &Value) -> proto::TypedValue {
    use proto::typed_value::Value as Tv;
    let inner = match value {
        Value::Bool(b) => Tv::BoolVal(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Tv::IntVal(i)
            } else if let Some(f) = n.as_f64() {
                Tv::FloatVal(f as f32)
            } else {
                Tv::StringVal(n.to_string())
            }
        }
        Value::String(s) => Tv::StringVal(s.clone()),
        other => Tv::JsonIetfVal(serde_json::to_vec(other).unwrap_or_default()),
    };
    proto::TypedValue { value: Some(inner) }
}

/// Render a [`proto::TypedValue`] back to JSON, inverting
/// [`typed_value_from_json`] (used to decode `Get`/`Subscribe` responses).
pub(crate) fn json_from_typed_value(value: &proto::TypedValue) -> Value {
    use proto::typed_value::Value as Tv;
    match &value.value {
        Some(Tv::StringVal(s)) => Value::String(s.clone()),
        Some(Tv::IntVal(i)) => json!(i),
        Some(Tv::UintVal(u)) => json!(u),
        Some(Tv::BoolVal(b)) => json!(b),
        Some(Tv::FloatVal(f)) => json!(f),
        Some(Tv::BytesVal(b)) => Value::String(base64::Engine::encode(&base64::engine::general_purpose::STANDARD, b)),
        Some(Tv::JsonVal(bytes)) | Some(Tv::JsonIetfVal(bytes)) => {
            serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
        }
        None => Value::Null,
    }
}

/// Convert a [`proto::Update`] to a plain `{path, val}` JSON object, the
/// UTCP-side shape the original source's `json_format.MessageToDict`
/// equivalent produces for update entries.
fn update_to_json(update: &proto::Update) -> Value {
    json!({
        "path": update.path.as_ref().map(path_to_string).unwrap_or_default(),
        "val": update.val.as_ref().map(json_from_typed_value).unwrap_or(Value::Null),
    })
}

/// Convert a [`proto::Notification`] to JSON.
fn notification_to_json(notification: &proto::Notification) -> Value {
    json!({
        "timestamp": notification.timestamp,
        "prefix": notification.prefix.as_ref().map(path_to_string),
        "update": notification.update.iter().map(update_to_json).collect::<Vec<_>>(),
        "delete": notification.delete.iter().map(path_to_string).collect::<Vec<_>>(),
    })
}

/// Convert a [`proto::CapabilityResponse`] to JSON.
pub(crate) fn capability_response_to_json(response: &proto::CapabilityResponse) -> Value {
    json!({
        "supported_models": response.supported_models.iter().map(|m| json!({
            "name": m.name,
            "organization": m.organization,
            "version": m.version,
        })).collect::<Vec<_>>(),
        "supported_encodings": response.supported_encodings,
        "gnmi_version": response.gnmi_version,
    })
}

/// Convert a [`proto::GetResponse`] to JSON.
pub(crate) fn get_response_to_json(response: &proto::GetResponse) -> Value {
    json!({
        "notification": response.notification.iter().map(notification_to_json).collect::<Vec<_>>(),
    })
}

/// Convert a [`proto::SetResponse`] to JSON.
pub(crate) fn set_response_to_json(response: &proto::SetResponse) -> Value {
    json!({
        "prefix": response.prefix.as_ref().map(path_to_string),
        "response": response.response.iter().map(|r| json!({
            "path": r.path.as_ref().map(path_to_string),
            "op": r.op,
        })).collect::<Vec<_>>(),
        "timestamp": response.timestamp,
    })
}

/// Convert a [`proto::SubscribeResponse`] to JSON.
pub(crate) fn subscribe_response_to_json(response: &proto::SubscribeResponse) -> Value {
    use proto::subscribe_response::Response;
    match &response.response {
        Some(Response::Update(notification)) => notification_to_json(notification),
        Some(Response::SyncResponse(sync)) => json!({"sync_response": sync}),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_round_trips_through_string() {
        let path = path_from_str("/interfaces/interface[name=eth0]");
        assert_eq!(path.elem.len(), 2);
        assert_eq!(path_to_string(&path), "/interfaces/interface[name=eth0]");
    }

    #[test]
    fn typed_value_types_by_json_shape() {
        assert!(matches!(
            typed_value_from_json(&json!(true)).value,
            Some(proto::typed_value::Value::BoolVal(true))
        ));
        assert!(matches!(
            typed_value_from_json(&json!(42)).value,
            Some(proto::typed_value::Value::IntVal(42))
        ));
        assert!(matches!(
            typed_value_from_json(&json!("hi")).value,
            Some(proto::typed_value::Value::StringVal(ref s)) if s == "hi"
        ));
        assert!(matches!(
            typed_value_from_json(&json!({"a": 1})).value,
            Some(proto::typed_value::Value::JsonIetfVal(_))
        ));
    }
}
