// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Object-safe provider abstraction.
//!
//! `Provider` (the real HTTP client) is the only production implementation,
//! but the agent loop takes `Arc<dyn ModelProvider>` so it can be driven
//! against a scripted mock in tests without any network access.

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;

use crate::provider::Provider;
use crate::types::{ChatResponse, Chunk, Message, ToolDefinition};

#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn model(&self) -> String;

    async fn send(
        &self,
        conversation: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&Value>,
    ) -> anyhow::Result<ChatResponse>;

    async fn stream(
        &self,
        conversation: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&Value>,
    ) -> anyhow::Result<Pin<Box<dyn Stream<Item = anyhow::Result<Chunk>> + Send>>>;
}

#[async_trait]
impl ModelProvider for Provider {
    fn model(&self) -> String {
        Provider::model(self).to_string()
    }

    async fn send(
        &self,
        conversation: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&Value>,
    ) -> anyhow::Result<ChatResponse> {
        Provider::send(self, conversation, tools, overrides).await
    }

    async fn stream(
        &self,
        conversation: &[Message],
        tools: &[ToolDefinition],
        overrides: Option<&Value>,
    ) -> anyhow::Result<Pin<Box<dyn Stream<Item = anyhow::Result<Chunk>> + Send>>> {
        Provider::stream(self, conversation, tools, overrides).await
    }
}
