// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::Config;

/// Resolves `HEDDLE_HOME`, falling back to the OS config directory, then
/// `~/.heddle`. Relative values are resolved against the current directory.
pub fn heddle_home() -> PathBuf {
    if let Ok(v) = std::env::var("HEDDLE_HOME") {
        return PathBuf::from(v);
    }
    if let Some(cfg) = dirs::config_dir() {
        return cfg.join("heddle");
    }
    PathBuf::from(".heddle")
}

/// Ordered list of config file locations searched from lowest to highest
/// priority. Later files override earlier ones.
fn config_search_paths() -> Vec<PathBuf> {
    vec![
        heddle_home().join("config.yaml"),
        heddle_home().join("config.yml"),
        PathBuf::from(".heddle.yaml"),
        PathBuf::from(".heddle.yml"),
    ]
}

/// Load configuration by merging all discovered YAML files, then applying
/// environment variable overrides. `extra` may provide an explicit path
/// (e.g. a `--config` CLI flag), applied with the highest file precedence.
pub fn load(extra: Option<&Path>) -> anyhow::Result<Config> {
    let mut merged = serde_yaml::Value::Mapping(serde_yaml::Mapping::new());

    for path in config_search_paths() {
        if path.is_file() {
            debug!(path = %path.display(), "loading config layer");
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: serde_yaml::Value = serde_yaml::from_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?;
            merge_yaml(&mut merged, layer);
        }
    }

    if let Some(p) = extra {
        debug!(path = %p.display(), "loading explicit config");
        let text =
            std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display()))?;
        let layer: serde_yaml::Value =
            serde_yaml::from_str(&text).with_context(|| format!("parsing {}", p.display()))?;
        merge_yaml(&mut merged, layer);
    }

    let mut config: Config = if matches!(merged, serde_yaml::Value::Mapping(ref m) if m.is_empty())
    {
        Config::default()
    } else {
        serde_yaml::from_value(merged).unwrap_or_default()
    };

    apply_env_overrides(&mut config);
    Ok(config)
}

/// Environment variables always win over file configuration, matching the
/// "environment" layer at the top of the precedence stack.
fn apply_env_overrides(config: &mut Config) {
    if let Ok(model) = std::env::var("HEDDLE_MODEL") {
        config.model.name = model;
    }
    if let Ok(url) = std::env::var("HEDDLE_BASE_URL") {
        config.model.base_url = Some(url);
    }
}

/// Deep-merge `src` into `dst`; `src` wins on scalar conflicts.
fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(d), serde_yaml::Value::Mapping(s)) => {
            for (k, v) in s {
                match d.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        d.insert(k, v);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}
