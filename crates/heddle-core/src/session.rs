// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! The in-memory session and its append-only JSONL journal.
use std::io::Write as _;
use std::path::{Path, PathBuf};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use heddle_model::{Message, ModelProvider};
use heddle_tools::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::agent::AgentOptions;

/// Header line written once at the start of a session journal file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMeta {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: String,
    pub cwd: String,
    pub model: String,
    pub created: DateTime<Utc>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl SessionMeta {
    pub fn new(id: impl Into<String>, cwd: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            kind: "session_meta".to_string(),
            id: id.into(),
            cwd: cwd.into(),
            model: model.into(),
            created: Utc::now(),
            extra: Map::new(),
        }
    }
}

/// A live conversation plus the collaborators it was built with.
///
/// Constructed by the session-setup collaborator (`heddle-bootstrap`), driven
/// by the agent loop (`agent.rs`), and persisted through the journal
/// functions below.
pub struct Session {
    pub id: String,
    pub session_file: PathBuf,
    pub created_at: DateTime<Utc>,
    pub model: String,
    pub cwd: PathBuf,
    pub conversation: Vec<Message>,
    pub provider: Arc<dyn ModelProvider>,
    pub tool_registry: ToolRegistry,
    /// Loop tunables this session was configured with (`max_iterations`,
    /// `doom_loop_threshold`, ...), carried from the session-setup
    /// collaborator into every `run_streaming`/`run_non_streaming` call.
    pub agent_options: AgentOptions,
}

impl Session {
    pub fn new(
        session_file: PathBuf,
        model: String,
        cwd: PathBuf,
        provider: Arc<dyn ModelProvider>,
        tool_registry: ToolRegistry,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_file,
            created_at: Utc::now(),
            model,
            cwd,
            conversation: Vec::new(),
            provider,
            tool_registry,
            agent_options: AgentOptions::default(),
        }
    }
}

fn ensure_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn append_line(path: &Path, line: &str) -> anyhow::Result<()> {
    ensure_parent(path)?;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")?;
    Ok(())
}

/// Write the `session_meta` header line. Call once, before any `append_message`.
pub fn write_session_meta(path: &Path, meta: &SessionMeta) -> anyhow::Result<()> {
    append_line(path, &serde_json::to_string(meta)?)
}

/// Append one message to the journal, stamped with the write time.
pub fn append_message(path: &Path, message: &Message) -> anyhow::Result<()> {
    let mut value = serde_json::to_value(message)?;
    if let Value::Object(map) = &mut value {
        map.insert("timestamp".to_string(), Value::String(Utc::now().to_rfc3339()));
    }
    append_line(path, &serde_json::to_string(&value)?)
}

/// Read every non-header message from a journal file, in append order.
/// A missing file is treated as an empty session, not an error.
pub fn load_session(path: &Path) -> anyhow::Result<Vec<Message>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut messages = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)?;
        if value.get("type").and_then(Value::as_str) == Some("session_meta") {
            continue;
        }
        messages.push(serde_json::from_value(value)?);
    }
    Ok(messages)
}

/// Parse just the header line, if the file exists and starts with one.
pub fn load_session_meta(path: &Path) -> anyhow::Result<Option<SessionMeta>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let Some(first) = content.lines().next() else { return Ok(None) };
    let first = first.trim();
    if first.is_empty() {
        return Ok(None);
    }
    let Ok(value) = serde_json::from_str::<Value>(first) else { return Ok(None) };
    if value.get("type").and_then(Value::as_str) != Some("session_meta") {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(value)?))
}
