// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The streaming provider client.
//!
//! Issues chat-completion requests against an OpenAI-compatible
//! `/chat/completions` endpoint (the wire format OpenRouter and most
//! gateway providers speak), parses SSE-framed streaming responses into
//! [`Chunk`]s, validates per-call parameter overrides, and retries on
//! HTTP 429 honoring `Retry-After`.

use std::pin::Pin;

use anyhow::Context;
use chrono::Utc;
use futures::{Stream, StreamExt};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::overrides::validate_overrides;
use crate::retry::RetryPolicy;
use crate::types::{ChatResponse, Chunk, Message, ToolDefinition};

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// A non-2xx HTTP response from the provider.
#[derive(Debug, Error)]
#[error("{provider} API error ({status}): {body}")]
pub struct ProviderHttpError {
    pub provider: String,
    pub status: u16,
    pub body: String,
}

/// Construction parameters for [`Provider`].
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub request_params: Option<Value>,
    pub retry: Option<RetryPolicy>,
}

/// A chat-completion client bound to one model and one set of sticky
/// request parameters.
///
/// `send`/`stream` issue one call each; `with(overrides)` returns a new,
/// independent `Provider` — the receiver is never mutated.
#[derive(Clone)]
pub struct Provider {
    api_key: String,
    model: String,
    base_url: String,
    request_params: Map<String, Value>,
    retry: RetryPolicy,
    client: reqwest::Client,
}

impl Provider {
    pub fn new(config: ProviderConfig) -> Self {
        let base_url = config.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let request_params = match config.request_params {
            Some(v) => v.as_object().cloned().unwrap_or_default(),
            None => Map::new(),
        };
        Self {
            api_key: config.api_key,
            model: config.model,
            base_url,
            request_params,
            retry: config.retry.unwrap_or_default(),
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Return a new provider whose `request_params` are the receiver's
    /// merged with `overrides` (overrides win). Never mutates `self`.
    pub fn with(&self, overrides: &Value) -> Self {
        let validated = validate_overrides(overrides);
        let mut merged = self.request_params.clone();
        for (k, v) in validated {
            merged.insert(k, v);
        }
        Self { request_params: merged, ..self.clone() }
    }

    fn vendor_label(&self) -> String {
        reqwest::Url::parse(&self.base_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .map(|host| {
                let first = host.split('.').next().unwrap_or(&host).to_string();
                let mut c = first.chars();
                match c.next() {
                    Some(ch) => ch.to_uppercase().collect::<String>() + c.as_str(),
                    None => "Provider".to_string(),
                }
            })
            .unwrap_or_else(|| "Provider".to_string())
    }

    fn build_body(
        &self,
        conversation: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&Value>,
        stream: bool,
    ) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": conversation,
            "stream": stream,
        });
        let obj = body.as_object_mut().unwrap();
        for (k, v) in &self.request_params {
            obj.insert(k.clone(), v.clone());
        }
        if let Some(overrides) = overrides {
            for (k, v) in validate_overrides(overrides) {
                obj.insert(k, v);
            }
        }
        if !tools.is_empty() {
            obj.insert("tools".to_string(), serde_json::to_value(tools).unwrap());
        }
        body
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        self.client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
    }

    /// One non-streaming completion.
    pub async fn send(
        &self,
        conversation: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&Value>,
    ) -> anyhow::Result<ChatResponse> {
        let body = self.build_body(conversation, tools, overrides, false);
        let response = self.send_with_retry(&body).await?;
        let parsed: ChatResponse =
            response.json().await.context("parsing non-streaming response")?;
        Ok(parsed)
    }

    /// Issue the HTTP request, retrying on 429 per policy.
    async fn send_with_retry(&self, body: &Value) -> anyhow::Result<reqwest::Response> {
        let mut attempt = 0u32;
        loop {
            let response = self.request(body).send().await.context("sending request")?;
            if response.status() != reqwest::StatusCode::TOO_MANY_REQUESTS {
                return self.into_result(response).await;
            }
            if attempt >= self.retry.retries {
                return self.into_result(response).await;
            }
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let delay = self.retry.delay_for(attempt, retry_after.as_deref(), Utc::now());
            debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after 429");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn into_result(&self, response: reqwest::Response) -> anyhow::Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(ProviderHttpError { provider: self.vendor_label(), status, body }.into())
    }

    /// A lazy, finite, single-consumer stream of [`Chunk`]s for one call.
    pub async fn stream(
        &self,
        conversation: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&Value>,
    ) -> anyhow::Result<Pin<Box<dyn Stream<Item = anyhow::Result<Chunk>> + Send>>> {
        let body = self.build_body(conversation, tools, overrides, true);
        let response = self.send_with_retry(&body).await?;
        let byte_stream = response.bytes_stream();
        Ok(Box::pin(sse_chunks(byte_stream)))
    }
}

/// Turn a byte stream into a stream of parsed [`Chunk`]s, framing on
/// `data: ` lines and stopping cleanly at `data: [DONE]`.
fn sse_chunks(
    mut byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + Unpin + 'static,
) -> impl Stream<Item = anyhow::Result<Chunk>> {
    async_stream::try_stream! {
        let mut buf = String::new();
        'outer: while let Some(bytes) = byte_stream.next().await {
            let bytes = bytes.context("reading stream body")?;
            buf.push_str(&String::from_utf8_lossy(&bytes));
            while let Some(pos) = buf.find('\n') {
                let line = buf[..pos].trim_end_matches('\r').to_string();
                buf.drain(..=pos);
                if line.trim() == "data: [DONE]" {
                    break 'outer;
                }
                if let Some(chunk) = parse_sse_line(&line)? {
                    yield chunk;
                }
            }
        }
        let remaining = buf.trim();
        if !remaining.is_empty() && remaining != "data: [DONE]" {
            if let Some(chunk) = parse_sse_line(remaining)? {
                yield chunk;
            }
        }
    }
}

/// Parse one SSE line. Returns `Ok(None)` for non-`data:` lines (comments,
/// keepalives, blank lines) and for the `[DONE]` terminator.
fn parse_sse_line(line: &str) -> anyhow::Result<Option<Chunk>> {
    let Some(payload) = line.strip_prefix("data: ") else {
        return Ok(None);
    };
    if payload == "[DONE]" {
        return Ok(None);
    }
    let chunk: Chunk = serde_json::from_str(payload).context("parsing SSE chunk")?;
    Ok(Some(chunk))
}
