// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The headless IPC adapter: a line-delimited JSON protocol over stdin/
//! stdout for driving one agent session from a parent process, with no
//! interactive terminal in the loop.

pub mod adapter;
pub mod codec;
pub mod normalize;
pub mod protocol;
pub mod version;

pub use adapter::run;
pub use normalize::{normalize, NormalizedError};
pub use protocol::{InitConfig, IpcRequest, IpcResponse, ToolCallMade, UsageInfo, WorkerEvent};
pub use version::{check as check_protocol_version, own_version, Compatibility};

/// Run the adapter over the real process stdin/stdout. Returns the process
/// exit code the caller should pass to `std::process::exit`.
pub async fn run_stdio() -> i32 {
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();
    run(stdin, stdout).await
}
