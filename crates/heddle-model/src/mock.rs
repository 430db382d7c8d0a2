// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! A scripted, deterministic [`ModelProvider`] for exercising the agent loop
//! without network access.
//!
//! Each test pushes one scripted outcome per expected remote call, onto
//! whichever queue matches the call style (`send` or `stream`) the test
//! drives. Popping past the end of a queue is a test bug, not a recoverable
//! condition, so it panics loudly rather than returning a confusing error.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use serde_json::Value;

use crate::provider::ProviderHttpError;
use crate::provider_trait::ModelProvider;
use crate::types::{ChatResponse, Chunk, Message, ToolDefinition, Usage};

enum Outcome<T> {
    Ok(T),
    Err(String),
}

/// A single streamed call's worth of chunks.
pub struct ScriptedStream {
    pub chunks: Vec<Chunk>,
}

impl ScriptedStream {
    /// A stream that emits `text` as a single content delta, then stops.
    pub fn text(text: impl Into<String>) -> Self {
        Self { chunks: vec![text_chunk(text.into())] }
    }
}

fn text_chunk(content: String) -> Chunk {
    Chunk {
        choices: vec![crate::types::ChunkChoice {
            delta: crate::types::Delta { content: Some(content), tool_calls: vec![] },
            finish_reason: None,
        }],
        usage: None,
    }
}

#[derive(Default)]
pub struct ScriptedMockProvider {
    model: String,
    sends: Mutex<VecDeque<Outcome<ChatResponse>>>,
    streams: Mutex<VecDeque<Outcome<ScriptedStream>>>,
}

impl ScriptedMockProvider {
    pub fn new() -> Self {
        Self { model: "mock/scripted".to_string(), sends: Mutex::new(VecDeque::new()), streams: Mutex::new(VecDeque::new()) }
    }

    /// Queue a non-streaming response returning plain assistant text.
    pub fn push_text(&self, text: impl Into<String>) -> &Self {
        self.sends.lock().unwrap().push_back(Outcome::Ok(ChatResponse {
            choices: vec![crate::types::Choice { message: Message::assistant(text.into()) }],
            usage: None,
        }));
        self
    }

    /// Queue a non-streaming response with tool calls and no text content.
    pub fn push_tool_calls(&self, calls: Vec<(&str, &str, &str)>) -> &Self {
        let tool_calls = calls
            .into_iter()
            .map(|(id, name, args)| crate::types::ToolCall {
                id: id.to_string(),
                kind: crate::types::ToolCallKind::Function,
                function: crate::types::FunctionCall { name: name.to_string(), arguments: args.to_string() },
            })
            .collect();
        self.sends.lock().unwrap().push_back(Outcome::Ok(ChatResponse {
            choices: vec![crate::types::Choice {
                message: Message::Assistant { content: None, tool_calls: Some(tool_calls) },
            }],
            usage: None,
        }));
        self
    }

    /// Queue a non-streaming response carrying a choiceless payload ("no choice in response").
    pub fn push_empty_choices(&self) -> &Self {
        self.sends.lock().unwrap().push_back(Outcome::Ok(ChatResponse { choices: vec![], usage: None }));
        self
    }

    /// Queue a provider HTTP error for the next `send` call.
    pub fn push_send_error(&self, provider: &str, status: u16, body: &str) -> &Self {
        let err = ProviderHttpError { provider: provider.to_string(), status, body: body.to_string() };
        self.sends.lock().unwrap().push_back(Outcome::Err(err.to_string()));
        self
    }

    /// Queue a raw streamed chunk sequence for the next `stream` call.
    pub fn push_stream(&self, stream: ScriptedStream) -> &Self {
        self.streams.lock().unwrap().push_back(Outcome::Ok(stream));
        self
    }

    /// Queue a provider HTTP error for the next `stream` call (failure before
    /// any bytes are read, e.g. a non-2xx status on the initial response).
    pub fn push_stream_error(&self, provider: &str, status: u16, body: &str) -> &Self {
        let err = ProviderHttpError { provider: provider.to_string(), status, body: body.to_string() };
        self.streams.lock().unwrap().push_back(Outcome::Err(err.to_string()));
        self
    }
}

#[async_trait]
impl ModelProvider for ScriptedMockProvider {
    fn model(&self) -> String {
        self.model.clone()
    }

    async fn send(
        &self,
        _conversation: &[Message],
        _tools: &[ToolDefinition],
        _overrides: Option<&Value>,
    ) -> anyhow::Result<ChatResponse> {
        let next = self.sends.lock().unwrap().pop_front().expect("ScriptedMockProvider: no scripted `send` response queued");
        match next {
            Outcome::Ok(resp) => Ok(resp),
            Outcome::Err(msg) => Err(anyhow::anyhow!(msg)),
        }
    }

    async fn stream(
        &self,
        _conversation: &[Message],
        _tools: &[ToolDefinition],
        _overrides: Option<&Value>,
    ) -> anyhow::Result<Pin<Box<dyn Stream<Item = anyhow::Result<Chunk>> + Send>>> {
        let next = self.streams.lock().unwrap().pop_front().expect("ScriptedMockProvider: no scripted `stream` response queued");
        match next {
            Outcome::Ok(s) => {
                let items: Vec<anyhow::Result<Chunk>> = s.chunks.into_iter().map(Ok).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Outcome::Err(msg) => Err(anyhow::anyhow!(msg)),
        }
    }
}

/// Helper for building a single streamed tool-call chunk, fragment by
/// fragment, mirroring how a real provider splits `function.arguments`
/// across several SSE chunks mid-call.
pub fn tool_call_fragment(index: usize, id: Option<&str>, name: Option<&str>, arguments: Option<&str>) -> Chunk {
    Chunk {
        choices: vec![crate::types::ChunkChoice {
            delta: crate::types::Delta {
                content: None,
                tool_calls: vec![crate::types::ToolCallDelta {
                    index,
                    id: id.map(str::to_string),
                    function: Some(crate::types::FunctionCallDelta {
                        name: name.map(str::to_string),
                        arguments: arguments.map(str::to_string),
                    }),
                }],
            },
            finish_reason: None,
        }],
        usage: None,
    }
}

/// A content-only chunk, for building multi-fragment text streams.
pub fn content_chunk(text: impl Into<String>) -> Chunk {
    text_chunk(text.into())
}

/// A chunk carrying only a finish_reason and/or usage, no delta content.
pub fn finish_chunk(finish_reason: &str, usage: Option<Usage>) -> Chunk {
    Chunk {
        choices: vec![crate::types::ChunkChoice {
            delta: crate::types::Delta::default(),
            finish_reason: Some(finish_reason.to_string()),
        }],
        usage,
    }
}
