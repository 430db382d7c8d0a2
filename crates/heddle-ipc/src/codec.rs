// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Line codec: one JSON value per line in, one JSON value per line out.
use serde_json::Value;

use crate::protocol::{InitConfig, IpcRequest, IpcResponse};

/// Decoding failures carry their own terse message and (when recoverable)
/// the request id so the caller can still emit a matching error result.
#[derive(Debug, Clone)]
pub struct DecodeError {
    pub id: Option<String>,
    pub message: String,
}

/// Parse one line of input into an [`IpcRequest`].
///
/// Unrecognized `type` values are surfaced as a `DecodeError` carrying the
/// request's `id` (not `None`) so the dispatcher can still reply with a
/// matching `result`.
pub fn decode_request(line: &str) -> Result<IpcRequest, DecodeError> {
    let value: Value = serde_json::from_str(line)
        .map_err(|_| DecodeError { id: None, message: "Invalid JSON".to_string() })?;

    let obj = value
        .as_object()
        .ok_or_else(|| DecodeError { id: None, message: "Expected JSON object".to_string() })?;

    let type_name = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError { id: None, message: "Missing 'type' field".to_string() })?
        .to_string();

    let id = obj
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| DecodeError { id: None, message: "Missing 'id' field".to_string() })?
        .to_string();

    match type_name.as_str() {
        "init" => {
            let protocol_version = obj.get("protocol_version").and_then(Value::as_str).map(str::to_string);
            let config = obj
                .get("config")
                .cloned()
                .map(serde_json::from_value::<InitConfig>)
                .transpose()
                .map_err(|e| DecodeError { id: Some(id.clone()), message: format!("Invalid config: {e}") })?
                .unwrap_or_default();
            Ok(IpcRequest::Init { id, protocol_version, config })
        }
        "send" => {
            let message = obj
                .get("message")
                .and_then(Value::as_str)
                .ok_or_else(|| DecodeError { id: Some(id.clone()), message: "Missing 'message' field".to_string() })?
                .to_string();
            Ok(IpcRequest::Send { id, message })
        }
        "status" => Ok(IpcRequest::Status { id }),
        "shutdown" => Ok(IpcRequest::Shutdown { id }),
        "cancel" => {
            let target_id = obj
                .get("target_id")
                .and_then(Value::as_str)
                .ok_or_else(|| DecodeError { id: Some(id.clone()), message: "Missing 'target_id' field".to_string() })?
                .to_string();
            Ok(IpcRequest::Cancel { id, target_id })
        }
        other => Err(DecodeError { id: Some(id), message: format!("Unknown request type: {other}") }),
    }
}

/// Serialize a response as compact JSON, without a trailing newline — the
/// caller owns line termination.
pub fn encode_response(response: &IpcResponse) -> String {
    serde_json::to_string(response).expect("IpcResponse always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_invalid_json_is_rejected() {
        let err = decode_request("not json").unwrap_err();
        assert_eq!(err.message, "Invalid JSON");
        assert!(err.id.is_none());
    }

    #[test]
    fn decode_non_object_is_rejected() {
        let err = decode_request("[1,2,3]").unwrap_err();
        assert_eq!(err.message, "Expected JSON object");
    }

    #[test]
    fn decode_missing_type_is_rejected() {
        let err = decode_request(r#"{"id":"1"}"#).unwrap_err();
        assert_eq!(err.message, "Missing 'type' field");
    }

    #[test]
    fn decode_missing_id_is_rejected() {
        let err = decode_request(r#"{"type":"status"}"#).unwrap_err();
        assert_eq!(err.message, "Missing 'id' field");
    }

    #[test]
    fn decode_status_request() {
        let req = decode_request(r#"{"type":"status","id":"7"}"#).unwrap();
        assert!(matches!(req, IpcRequest::Status { id } if id == "7"));
    }

    #[test]
    fn decode_send_request() {
        let req = decode_request(r#"{"type":"send","id":"2","message":"hi"}"#).unwrap();
        assert!(matches!(req, IpcRequest::Send { id, message } if id == "2" && message == "hi"));
    }

    #[test]
    fn decode_cancel_request() {
        let req = decode_request(r#"{"type":"cancel","id":"3","target_id":"2"}"#).unwrap();
        assert!(matches!(req, IpcRequest::Cancel { id, target_id } if id == "3" && target_id == "2"));
    }

    #[test]
    fn decode_init_request_with_config() {
        let req = decode_request(
            r#"{"type":"init","id":"1","protocol_version":"0.1.0","config":{"model":"m","tools":["grep"]}}"#,
        )
        .unwrap();
        match req {
            IpcRequest::Init { id, protocol_version, config } => {
                assert_eq!(id, "1");
                assert_eq!(protocol_version.as_deref(), Some("0.1.0"));
                assert_eq!(config.model.as_deref(), Some("m"));
                assert_eq!(config.tools, vec!["grep".to_string()]);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn decode_init_request_without_config_uses_defaults() {
        let req = decode_request(r#"{"type":"init","id":"1"}"#).unwrap();
        assert!(matches!(req, IpcRequest::Init { config, .. } if config.model.is_none()));
    }

    #[test]
    fn decode_unknown_type_carries_request_id() {
        let err = decode_request(r#"{"type":"frobnicate","id":"9"}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("9"));
        assert!(err.message.contains("frobnicate"));
    }

    #[test]
    fn encode_response_has_no_trailing_newline() {
        let resp = IpcResponse::ShutdownOk { id: "1".into() };
        let encoded = encode_response(&resp);
        assert!(!encoded.ends_with('\n'));
        assert!(encoded.contains("shutdown_ok"));
    }
}
