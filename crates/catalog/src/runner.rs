// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The sync loop: single writer to the desired-state store and sole issuer
//! of writes to the catalog agent.
//!
//! Each cycle merges any newly arrived batch, observes the agent's current
//! state, and issues only the writes needed to converge it. A failure
//! anywhere aborts the cycle; the whole cycle is retried on a timer rather
//! than retrying individual calls.

use crate::agent::{CatalogAgent, CatalogError};
use crate::batch::Batch;
use crate::ids::is_managed;
use crate::probe::ProbeHandle;
use crate::store::DesiredState;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A reconcile cycle that could not complete. Always transient: the cycle
/// is re-run from the top on the retry timer.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to query catalog services: {0}")]
    Services(#[source] CatalogError),

    #[error("failed to query catalog checks: {0}")]
    Checks(#[source] CatalogError),

    #[error(transparent)]
    Write(#[from] CatalogError),
}

/// Owns the desired-state store and drives reconciliation until shutdown.
/// Built by [`ServiceSync::new`](crate::sync::ServiceSync::new) and spawned
/// exactly once.
pub struct SyncRunner {
    agent: Arc<dyn CatalogAgent>,
    rx: mpsc::Receiver<Batch>,
    shutdown: CancellationToken,
    exit_tx: oneshot::Sender<Vec<ProbeHandle>>,
    retry_interval: Duration,
    store: DesiredState,
}

impl SyncRunner {
    pub(crate) fn new(
        agent: Arc<dyn CatalogAgent>,
        rx: mpsc::Receiver<Batch>,
        shutdown: CancellationToken,
        exit_tx: oneshot::Sender<Vec<ProbeHandle>>,
        retry_interval: Duration,
    ) -> Self {
        Self {
            agent,
            rx,
            shutdown,
            exit_tx,
            retry_interval,
            store: DesiredState::default(),
        }
    }

    /// Run until shutdown is signalled or every producer handle is gone.
    ///
    /// On exit the running probe handles are surrendered through the exit
    /// channel so shutdown can drain them; the probes themselves are
    /// cancelled by the shutdown token they descend from.
    pub async fn run(mut self) {
        let mut next_retry: Option<Instant> = None;
        let mut last_ok = true;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                batch = self.rx.recv() => match batch {
                    Some(batch) => self.store.merge(batch),
                    None => break,
                },
                _ = wait_until(next_retry) => {}
            }

            match self.reconcile().await {
                Ok(()) => {
                    next_retry = None;
                    if !last_ok {
                        info!("catalog sync recovered");
                        last_ok = true;
                    }
                }
                Err(err) => {
                    if last_ok {
                        warn!(error = %err, "failed to sync with catalog agent");
                        last_ok = false;
                    }
                    next_retry = Some(Instant::now() + self.retry_interval);
                }
            }
        }

        let handles: Vec<ProbeHandle> = self.store.running.drain().map(|(_, h)| h).collect();
        let _ = self.exit_tx.send(handles);
    }

    /// One convergence cycle against the catalog agent.
    ///
    /// Order matters: stale services go first so their checks are already
    /// doomed, and missing services register before missing checks so a
    /// check never references an absent service.
    async fn reconcile(&mut self) -> Result<(), SyncError> {
        let catalog_services = self.agent.services().await.map_err(SyncError::Services)?;
        let catalog_checks = self.agent.checks().await.map_err(SyncError::Checks)?;

        let (mut sreg, mut sdereg, mut creg, mut cdereg) = (0, 0, 0, 0);

        // Managed services the agent has but we no longer want.
        for id in catalog_services.keys() {
            if self.store.services.contains_key(id) || !is_managed(id) {
                continue;
            }
            self.agent.deregister_service(id).await?;
            sdereg += 1;
        }

        // Desired services the agent is missing.
        for (id, service) in &self.store.services {
            if catalog_services.contains_key(id) {
                continue;
            }
            self.agent.register_service(service).await?;
            sreg += 1;
        }

        // Managed checks the agent has but we no longer want.
        for (id, check) in &catalog_checks {
            if self.store.checks.contains_key(id) || !is_managed(&check.service_id) {
                continue;
            }
            self.agent.deregister_check(id).await?;
            cdereg += 1;
        }

        // Desired checks the agent is missing; fresh script checks also
        // get their probe started.
        for (id, check) in &self.store.checks {
            if catalog_checks.contains_key(id) {
                continue;
            }
            self.agent.register_check(check).await?;
            creg += 1;

            if let Some(probe) = self.store.probes.get(id) {
                if !self.store.running.contains_key(id) {
                    self.store.running.insert(id.clone(), probe.start());
                }
            }
        }

        debug!(
            registered_services = sreg,
            registered_checks = creg,
            deregistered_services = sdereg,
            deregistered_checks = cdereg,
            "catalog sync complete"
        );
        Ok(())
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
