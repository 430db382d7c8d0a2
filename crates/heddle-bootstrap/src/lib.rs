// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The session-setup collaborator.
//!
//! Consolidates everything needed to go from "nothing" to a runnable
//! [`heddle_core::Session`]: project-context discovery, the default tool
//! registry, and configuration/credential resolution. The headless IPC
//! adapter and any future REPL frontend both depend on this crate instead of
//! duplicating that wiring.

pub mod context;
pub mod registry;
pub mod session;

pub use context::{compose_system_prompt, default_system_prompt, load_project_context_file};
pub use registry::build_tool_registry;
pub use session::{create_session, SessionOptions};
