//! Agent wire protocol
//!
//! Requests and responses are single-line JSON objects exchanged over a
//! loopback TCP socket. Requests carry `type` and `id`; responses echo the
//! `id` and report success through `ok`.

pub mod channel;

pub use channel::LineChannel;

use serde_json::{json, Map, Value};

/// Id used for the shutdown request
pub const SHUTDOWN_ID: &str = "shutdown";

/// The reserved request asking the engine to quit
pub fn quit_request() -> Value {
    json!({"type": "command", "name": "quit", "id": SHUTDOWN_ID})
}

/// Whether a response reports success
///
/// `ok` is read by truthiness: a missing field, `null`, `false`, zero, the
/// empty string and empty arrays or objects all count as failure.
pub fn response_ok(response: &Map<String, Value>) -> bool {
    response.get("ok").is_some_and(is_truthy)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// The correlation id echoed by a response, if any
pub fn response_id(response: &Map<String, Value>) -> Option<&Value> {
    response.get("id")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("Expected object"),
        }
    }

    #[test]
    fn test_response_ok() {
        assert!(response_ok(&object(json!({"id": "a", "ok": true}))));
        assert!(!response_ok(&object(json!({"id": "a", "ok": false}))));
        assert!(!response_ok(&object(json!({"id": "a"}))));
    }

    #[test]
    fn test_response_ok_truthiness() {
        for ok in [json!(1), json!(-0.5), json!("yes"), json!([0]), json!({"a": 1})] {
            assert!(response_ok(&object(json!({"id": "a", "ok": ok.clone()}))), "{}", ok);
        }
        for ok in [json!(null), json!(0), json!(0.0), json!(""), json!([]), json!({})] {
            assert!(!response_ok(&object(json!({"id": "a", "ok": ok.clone()}))), "{}", ok);
        }
    }

    #[test]
    fn test_quit_request_shape() {
        let request = quit_request();
        assert_eq!(request["type"], "command");
        assert_eq!(request["name"], "quit");
        assert_eq!(request["id"], SHUTDOWN_ID);
    }
}
