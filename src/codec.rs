//! Wire framing: one JSON object per line, no batching, no notifications.
//!
//! Every frame carries an `id`. A frame with a `method` key is a request;
//! one with neither `method` nor a resolvable `id` is either a response or
//! garbage. [`decode_frame`] performs the full classification described by
//! the transport's framing rules; [`encode_request`] and [`encode_response`]
//! are its inverse.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The five well-known JSON-RPC fault codes this transport can raise on its
/// own behalf. Handlers may also raise these codes deliberately (e.g. a
/// malformed `broadcast` payload is `INVALID_PARAMS`, not `SERVER_ERROR`).
pub mod fault_code {
    pub const SERVER_ERROR: i64 = -32500;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const PARSE_ERROR: i64 = -32700;
}

/// A JSON-RPC style error, carried either over the wire in a response's
/// `error` field or locally as a [`crate::error::RpcError::Protocol`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fault {
    pub code: i64,
    pub message: String,
}

impl Fault {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn internal_error() -> Self {
        Self::new(fault_code::SERVER_ERROR, "Internal server error.")
    }

    pub fn invalid_request() -> Self {
        Self::new(fault_code::INVALID_REQUEST, "Invalid JSON-RPC request.")
    }

    pub fn method_not_found() -> Self {
        Self::new(fault_code::METHOD_NOT_FOUND, "Procedure not found.")
    }

    pub fn invalid_params() -> Self {
        Self::new(fault_code::INVALID_PARAMS, "Parameters invalid.")
    }

    pub fn parse_error() -> Self {
        Self::new(fault_code::PARSE_ERROR, "Parse error.")
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for Fault {}

/// Request parameters. At most one of positional or named args is ever
/// present on the wire; `call()` enforces that locally before a request is
/// ever encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Positional(Vec<Value>),
    Named(Map<String, Value>),
}

/// Converts decoded `Params` back into the bare JSON value that sits under
/// the wire envelope's `params` key.
pub fn params_to_value(params: Params) -> Value {
    match params {
        Params::Positional(values) => Value::Array(values),
        Params::Named(map) => Value::Object(map),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub id: u32,
    pub method: String,
    pub params: Option<Params>,
}

/// Either a successful result or a fault, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Result(Value),
    Error(Fault),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// `None` only ever appears on responses this side synthesizes for a
    /// frame whose id could not be recovered (e.g. a malformed request).
    pub id: Option<u32>,
    pub outcome: Outcome,
}

/// The result of classifying one line of input.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Request(Request),
    Response(Response),
    /// A JSON object with a resolvable id that is neither a well-formed
    /// request nor a well-formed response.
    Invalid(Fault, Option<u32>),
    /// Not even a JSON object with a usable id; the universal bottom case.
    Unclassifiable,
}

fn id_from_value(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

/// Classifies one decoded line into a [`Frame`]. Never panics; anything
/// that is not a JSON object, or whose `id` cannot be recovered as a u32,
/// classifies as [`Frame::Unclassifiable`].
pub fn decode_frame(line: &str) -> Frame {
    let value: Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(_) => return Frame::Unclassifiable,
    };
    let Some(obj) = value.as_object() else {
        return Frame::Unclassifiable;
    };
    let Some(id_value) = obj.get("id") else {
        return Frame::Unclassifiable;
    };

    if let Some(method_value) = obj.get("method") {
        return classify_request(obj, id_value, method_value);
    }
    classify_response(obj, id_value)
}

fn classify_request(obj: &Map<String, Value>, id_value: &Value, method_value: &Value) -> Frame {
    let id = id_from_value(id_value);

    let Some(method) = method_value.as_str() else {
        return Frame::Invalid(Fault::invalid_request(), id);
    };

    let params = match obj.get("params") {
        None | Some(Value::Null) => None,
        Some(Value::Array(values)) => Some(Params::Positional(values.clone())),
        Some(Value::Object(map)) => Some(Params::Named(map.clone())),
        Some(_) => return Frame::Invalid(Fault::invalid_request(), id),
    };

    let Some(id) = id else {
        return Frame::Unclassifiable;
    };

    Frame::Request(Request {
        id,
        method: method.to_string(),
        params,
    })
}

fn classify_response(obj: &Map<String, Value>, id_value: &Value) -> Frame {
    let Some(id) = id_from_value(id_value) else {
        return Frame::Unclassifiable;
    };

    if let Some(error_value) = obj.get("error") {
        let Some(error_obj) = error_value.as_object() else {
            return Frame::Unclassifiable;
        };
        let Some(code) = error_obj.get("code").and_then(Value::as_i64) else {
            return Frame::Unclassifiable;
        };
        let Some(message) = error_obj.get("message").and_then(Value::as_str) else {
            return Frame::Unclassifiable;
        };
        return Frame::Response(Response {
            id: Some(id),
            outcome: Outcome::Error(Fault::new(code, message)),
        });
    }

    if !obj.contains_key("result") {
        return Frame::Unclassifiable;
    }

    Frame::Response(Response {
        id: Some(id),
        outcome: Outcome::Result(obj.get("result").cloned().unwrap_or(Value::Null)),
    })
}

/// Encodes a request frame. Fails only if `params` somehow contains a value
/// `serde_json` cannot serialize (e.g. non-finite floats).
pub fn encode_request(id: u32, method: &str, params: Option<&Params>) -> Result<String, Fault> {
    let mut obj = Map::new();
    obj.insert("id".into(), Value::from(id));
    obj.insert("method".into(), Value::from(method));
    if let Some(params) = params {
        obj.insert("params".into(), params_to_value(params.clone()));
    }
    serde_json::to_string(&Value::Object(obj)).map_err(|_| Fault::internal_error())
}

/// Encodes a response frame. The caller is responsible for falling back to
/// an encodable error outcome (e.g. `internal_error()`) if this fails.
pub fn encode_response(id: Option<u32>, outcome: &Outcome) -> Result<String, Fault> {
    let mut obj = Map::new();
    obj.insert(
        "id".into(),
        id.map(Value::from).unwrap_or(Value::Null),
    );
    match outcome {
        Outcome::Result(value) => {
            obj.insert("result".into(), value.clone());
        }
        Outcome::Error(fault) => {
            obj.insert(
                "error".into(),
                serde_json::json!({ "code": fault.code, "message": fault.message }),
            );
        }
    }
    serde_json::to_string(&Value::Object(obj)).map_err(|_| Fault::internal_error())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn round_trips_a_positional_request() {
        let params = Params::Positional(vec![json!("hello"), json!(42)]);
        let line = encode_request(7, "echo", Some(&params)).unwrap();
        match decode_frame(&line) {
            Frame::Request(req) => {
                assert_eq!(req.id, 7);
                assert_eq!(req.method, "echo");
                assert_eq!(req.params, Some(params));
            }
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_a_request_with_no_params() {
        let line = encode_request(1, "ping", None).unwrap();
        match decode_frame(&line) {
            Frame::Request(req) => {
                assert_eq!(req.id, 1);
                assert_eq!(req.method, "ping");
                assert_eq!(req.params, None);
            }
            other => panic!("expected Request, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_a_successful_response() {
        let line = encode_response(Some(3), &Outcome::Result(json!({"ok": true}))).unwrap();
        match decode_frame(&line) {
            Frame::Response(resp) => {
                assert_eq!(resp.id, Some(3));
                assert_eq!(resp.outcome, Outcome::Result(json!({"ok": true})));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn round_trips_an_error_response() {
        let fault = Fault::method_not_found();
        let line = encode_response(Some(9), &Outcome::Error(fault.clone())).unwrap();
        match decode_frame(&line) {
            Frame::Response(resp) => {
                assert_eq!(resp.id, Some(9));
                assert_eq!(resp.outcome, Outcome::Error(fault));
            }
            other => panic!("expected Response, got {other:?}"),
        }
    }

    #[test]
    fn classification_is_total_over_garbage_input() {
        assert_eq!(decode_frame("not json at all"), Frame::Unclassifiable);
        assert_eq!(decode_frame("[1, 2, 3]"), Frame::Unclassifiable);
        assert_eq!(decode_frame("{}"), Frame::Unclassifiable);
        assert_eq!(decode_frame(r#"{"id": "not-a-number"}"#), Frame::Unclassifiable);
    }

    #[test]
    fn request_with_non_string_method_is_invalid_not_unclassifiable() {
        let line = r#"{"id": 5, "method": 123}"#;
        match decode_frame(line) {
            Frame::Invalid(fault, id) => {
                assert_eq!(fault.code, fault_code::INVALID_REQUEST);
                assert_eq!(id, Some(5));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn request_with_malformed_params_is_invalid() {
        let line = r#"{"id": 1, "method": "echo", "params": "oops"}"#;
        match decode_frame(line) {
            Frame::Invalid(fault, id) => {
                assert_eq!(fault.code, fault_code::INVALID_REQUEST);
                assert_eq!(id, Some(1));
            }
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[test]
    fn response_missing_both_result_and_error_is_unclassifiable() {
        assert_eq!(decode_frame(r#"{"id": 1}"#), Frame::Unclassifiable);
    }

    #[test]
    fn named_params_round_trip() {
        let mut map = Map::new();
        map.insert("message".into(), json!("hi"));
        let params = Params::Named(map);
        let line = encode_request(2, "echo", Some(&params)).unwrap();
        match decode_frame(&line) {
            Frame::Request(req) => assert_eq!(req.params, Some(params)),
            other => panic!("expected Request, got {other:?}"),
        }
    }
}
