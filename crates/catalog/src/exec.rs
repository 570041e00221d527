// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script executor seam.
//!
//! Script checks run inside the task's environment, so the actual process
//! spawning belongs to the task driver. The sync core only needs this
//! trait: run a command, give back combined output and an exit code, stop
//! early when cancelled.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Result of one script execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOutput {
    /// Combined stdout/stderr bytes.
    pub output: Vec<u8>,
    pub code: i32,
}

/// Runs script check commands on behalf of the sync core.
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Execute `command` with `args`, honoring `cancel`: implementations
    /// must abandon the run promptly once the token is cancelled.
    ///
    /// An `Err` means the command could not be run at all (as opposed to
    /// running and exiting non-zero); the probe reports either as critical.
    async fn exec(
        &self,
        cancel: CancellationToken,
        command: &str,
        args: &[String],
    ) -> std::io::Result<ScriptOutput>;
}
