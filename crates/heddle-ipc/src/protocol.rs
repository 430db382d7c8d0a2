// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wire types for the headless IPC adapter: line-delimited JSON, `snake_case`
//! fields, discriminated by a `type` tag.
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Configuration carried by an `init` request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitConfig {
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    pub max_iterations: Option<usize>,
}

/// Requests accepted from the controller, one per stdin line.
#[derive(Debug, Clone)]
pub enum IpcRequest {
    Init { id: String, protocol_version: Option<String>, config: InitConfig },
    Send { id: String, message: String },
    Status { id: String },
    Shutdown { id: String },
    Cancel { id: String, target_id: String },
}

impl IpcRequest {
    pub fn id(&self) -> &str {
        match self {
            IpcRequest::Init { id, .. }
            | IpcRequest::Send { id, .. }
            | IpcRequest::Status { id, .. }
            | IpcRequest::Shutdown { id, .. }
            | IpcRequest::Cancel { id, .. } => id,
        }
    }
}

/// One tool call observed during a `send`, recorded for the terminal result.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallMade {
    pub name: String,
    pub args: Value,
}

/// Token accounting reported by the provider for one turn.
#[derive(Debug, Clone, Serialize)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Events pushed to the controller while a `send` is in flight.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    ContentDelta {
        text: String,
    },
    ToolStart {
        name: String,
        args: Value,
    },
    ToolEnd {
        name: String,
        result_preview: String,
    },
    Usage {
        prompt_tokens: u32,
        completion_tokens: u32,
        total_tokens: u32,
    },
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        details: Option<Value>,
    },
}

/// Responses emitted to stdout, one per line.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IpcResponse {
    InitOk {
        id: String,
        session_id: String,
        protocol_version: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Event {
        event: WorkerEvent,
    },
    Result {
        id: String,
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<String>,
        tool_calls_made: Vec<ToolCallMade>,
        #[serde(skip_serializing_if = "Option::is_none")]
        usage: Option<UsageInfo>,
        iterations: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    StatusOk {
        id: String,
        model: String,
        messages_count: usize,
        session_id: String,
        active: bool,
    },
    ShutdownOk {
        id: String,
    },
}

impl IpcResponse {
    /// An error `result` with empty tool calls and zero iterations — the
    /// shape used for decode failures and the version-mismatch response.
    pub fn error_result(id: impl Into<String>, error: impl Into<String>) -> Self {
        IpcResponse::Result {
            id: id.into(),
            status: "error".to_string(),
            response: None,
            tool_calls_made: Vec::new(),
            usage: None,
            iterations: 0,
            error: Some(error.into()),
        }
    }
}
