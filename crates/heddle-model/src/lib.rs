// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Wire types and the streaming HTTP client for the one chat-completions
//! provider this harness talks to (an OpenAI-compatible gateway, OpenRouter
//! by default).

mod mock;
mod overrides;
mod provider;
mod provider_trait;
mod retry;
mod types;

pub use mock::{content_chunk, finish_chunk, tool_call_fragment, ScriptedMockProvider, ScriptedStream};
pub use overrides::validate_overrides;
pub use provider::{Provider, ProviderConfig, ProviderHttpError};
pub use provider_trait::ModelProvider;
pub use retry::RetryPolicy;
pub use types::*;

use heddle_config::ModelConfig;

/// Build a [`Provider`] from loaded configuration, resolving the API key
/// from the explicit `api_key` field or the environment variable it names.
pub fn from_config(cfg: &ModelConfig) -> anyhow::Result<Provider> {
    let api_key = resolve_api_key(cfg).unwrap_or_default();
    let retry = RetryPolicy { retries: cfg.retries, base_delay_ms: cfg.retry_base_delay_ms };
    Ok(Provider::new(ProviderConfig {
        api_key,
        model: cfg.name.clone(),
        base_url: cfg.base_url.clone(),
        request_params: Some(cfg.driver_options.clone()),
        retry: Some(retry),
    }))
}

fn resolve_api_key(cfg: &ModelConfig) -> Option<String> {
    if let Some(k) = &cfg.api_key {
        return Some(k.clone());
    }
    if let Some(env) = &cfg.api_key_env {
        return std::env::var(env).ok();
    }
    std::env::var("OPENROUTER_API_KEY").ok()
}
