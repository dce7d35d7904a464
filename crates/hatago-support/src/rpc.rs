//! JSON-RPC 2.0 value helpers.
//!
//! Payloads largely stay as opaque [`serde_json::Value`] as they cross the
//! hub: tool call arguments and results are never deserialized into typed
//! structs here, only the envelope fields the hub itself needs to act on.

use serde_json::{Value, json};

pub fn request(id: Value, method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params,
    })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}

pub fn response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

pub fn error_response(id: Value, code: i64, message: &str, data: Option<Value>) -> Value {
    let mut error = json!({ "code": code, "message": message });
    if let Some(data) = data {
        error["data"] = data;
    }
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}

pub fn id_of(value: &Value) -> Option<&Value> {
    value.get("id")
}

pub fn method_of(value: &Value) -> Option<&str> {
    value.get("method").and_then(Value::as_str)
}

pub fn is_notification(value: &Value) -> bool {
    value.get("method").is_some() && value.get("id").is_none()
}

pub fn is_response(value: &Value) -> bool {
    value.get("id").is_some() && (value.get("result").is_some() || value.get("error").is_some())
}

/// Read `_meta.progressToken` from a request's `params`, if present.
pub fn progress_token(params: &Value) -> Option<&Value> {
    params.get("_meta")?.get("progressToken")
}

/// Set `_meta.progressToken` on a (possibly absent) `params` object,
/// creating `_meta` if needed and preserving any other keys already there.
pub fn set_progress_token(params: &mut Value, token: Value) {
    if !params.is_object() {
        *params = json!({});
    }
    let obj = params.as_object_mut().expect("just ensured object");
    let meta = obj
        .entry("_meta")
        .or_insert_with(|| json!({}));
    if !meta.is_object() {
        *meta = json!({});
    }
    meta.as_object_mut()
        .expect("just ensured object")
        .insert("progressToken".to_string(), token);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_has_jsonrpc_envelope() {
        let req = request(json!(1), "tools/call", json!({"name": "x"}));
        assert_eq!(req["jsonrpc"], "2.0");
        assert_eq!(req["method"], "tools/call");
    }

    #[test]
    fn notification_has_no_id() {
        let note = notification("notifications/progress", json!({}));
        assert!(!is_response(&note));
        assert!(is_notification(&note));
    }

    #[test]
    fn progress_token_round_trips() {
        let mut params = json!({"name": "x"});
        set_progress_token(&mut params, json!("upstream-1"));
        assert_eq!(progress_token(&params).unwrap(), "upstream-1");
    }

    #[test]
    fn set_progress_token_preserves_existing_meta_keys() {
        let mut params = json!({"_meta": {"other": true}});
        set_progress_token(&mut params, json!("upstream-2"));
        assert_eq!(params["_meta"]["other"], true);
        assert_eq!(params["_meta"]["progressToken"], "upstream-2");
    }

    #[test]
    fn error_response_omits_data_when_none() {
        let resp = error_response(json!(1), -32601, "not found", None);
        assert!(resp["error"].get("data").is_none());
    }
}
