// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Script probe: a supervised task that runs a check's command on a fixed
//! interval and refreshes the corresponding TTL check.
//!
//! The catalog agent never executes scripts itself; it only watches the
//! TTL. The probe reports passing/warning/critical from the exit code and
//! lets the TTL lapse count as critical if the probe dies outright.

use crate::agent::{CatalogAgent, TTL_OUTPUT_LIMIT};
use crate::exec::ScriptExecutor;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use wharf_model::{CheckStatus, ServiceCheck};

/// A script probe waiting to be started by the sync loop.
///
/// Holds only value-level identity and injected collaborators; the
/// desired-state store owns membership. Cloning is cheap and a single
/// probe may be started again after its previous run was cancelled.
#[derive(Clone)]
pub struct ScriptProbe {
    check_id: String,
    check: ServiceCheck,
    exec: Arc<dyn ScriptExecutor>,
    agent: Arc<dyn CatalogAgent>,
    shutdown: CancellationToken,
}

/// Control handle for a running probe.
pub struct ProbeHandle {
    cancel: CancellationToken,
    done: oneshot::Receiver<()>,
}

impl ProbeHandle {
    /// Stop the probe: no further executions are scheduled and any
    /// in-flight execution is interrupted.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the probe task has fully stopped. Fires exactly once.
    pub async fn wait(self) {
        let _ = self.done.await;
    }
}

impl ScriptProbe {
    pub fn new(
        check_id: String,
        check: ServiceCheck,
        exec: Arc<dyn ScriptExecutor>,
        agent: Arc<dyn CatalogAgent>,
        shutdown: CancellationToken,
    ) -> Self {
        Self { check_id, check, exec, agent, shutdown }
    }

    pub fn check_id(&self) -> &str {
        &self.check_id
    }

    /// Spawn the probe task.
    ///
    /// The returned handle's token is a child of the client-wide shutdown
    /// token, so shutdown stops every probe while the handle stops only
    /// this one.
    pub fn start(&self) -> ProbeHandle {
        let cancel = self.shutdown.child_token();
        let (done_tx, done_rx) = oneshot::channel();
        let probe = self.clone();
        let token = cancel.clone();
        tokio::spawn(async move {
            probe.run(token).await;
            let _ = done_tx.send(());
        });
        ProbeHandle { cancel, done: done_rx }
    }

    async fn run(self, cancel: CancellationToken) {
        debug!(check_id = %self.check_id, interval = ?self.check.interval, "script probe started");

        // Delay (not burst) when an execution outlasts the interval: at
        // most one execution in flight, missed ticks skipped.
        let mut ticks = tokio::time::interval(self.check.interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticks.tick() => {}
            }

            let execution = self.exec.exec(cancel.clone(), &self.check.command, &self.check.args);
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                result = tokio::time::timeout(self.check.timeout, execution) => result,
            };

            let (output, status) = match result {
                Ok(Ok(run)) => {
                    let status = match run.code {
                        0 => CheckStatus::Passing,
                        1 => CheckStatus::Warning,
                        _ => CheckStatus::Critical,
                    };
                    (truncate_output(&run.output), status)
                }
                Ok(Err(err)) => (format!("failed to run command: {}", err), CheckStatus::Critical),
                Err(_) => (
                    format!("command timed out after {:?}", self.check.timeout),
                    CheckStatus::Critical,
                ),
            };

            if cancel.is_cancelled() {
                break;
            }

            if let Err(err) = self.agent.update_ttl(&self.check_id, &output, status).await {
                warn!(check_id = %self.check_id, error = %err, "failed to refresh check ttl");
            }
        }

        debug!(check_id = %self.check_id, "script probe stopped");
    }
}

/// Clamp probe output to what the agent will store with a TTL update.
fn truncate_output(output: &[u8]) -> String {
    let end = output.len().min(TTL_OUTPUT_LIMIT);
    String::from_utf8_lossy(&output[..end]).into_owned()
}

#[cfg(test)]
#[path = "probe_tests.rs"]
mod tests;
