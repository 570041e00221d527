// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Producer API: the externally callable surface of the sync core.
//!
//! Every producer builds a complete batch, commits it over the bounded
//! channel, and returns promptly; the sync loop applies it asynchronously.
//! Validation failures are returned before anything is submitted, so a
//! rejected call leaves no partial desired state behind.

use crate::addr::{split_host_port, AddrError};
use crate::agent::{CatalogAgent, ServiceRegistration};
use crate::batch::Batch;
use crate::check::{build_check, CheckBuildError};
use crate::exec::ScriptExecutor;
use crate::ids::{agent_service_id, check_id, task_service_id};
use crate::probe::{ProbeHandle, ScriptProbe};
use crate::runner::SyncRunner;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use wharf_model::{CheckKind, Service, ServiceCheck, Task};

/// Resolves a named port label to a concrete host and port. Bound to the
/// task's resource allocation by the caller.
pub type PortResolver<'a> = &'a dyn Fn(&str) -> (String, u16);

/// Tunables for the sync core.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Delay before a failed reconcile cycle is retried.
    pub retry_interval: Duration,
    /// How long [`ServiceSync::shutdown`] blocks waiting for the loop and
    /// the probes to stop.
    pub shutdown_wait: Duration,
    /// Capacity of the batch submission channel. Producers block once the
    /// loop falls this far behind.
    pub queue_depth: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(6),
            shutdown_wait: Duration::from_secs(60),
            queue_depth: 8,
        }
    }
}

/// A producer call rejected before submission. The batch it was building
/// is discarded whole.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("error parsing port label {label:?} from service {service:?}: {source}")]
    ServicePortLabel {
        service: String,
        label: String,
        #[source]
        source: AddrError,
    },

    #[error("error parsing port label {label:?} from check {check:?}: {source}")]
    CheckPortLabel {
        check: String,
        label: String,
        #[source]
        source: AddrError,
    },

    #[error("service {0:?} contains invalid check: agent checks do not support scripts")]
    AgentScriptCheck(String),

    #[error("driver doesn't support script checks")]
    ScriptsUnsupported,

    #[error(transparent)]
    CheckBuild(#[from] CheckBuildError),
}

/// One thing that went wrong while shutting down.
#[derive(Debug, Error)]
pub enum ShutdownIssue {
    #[error(transparent)]
    Catalog(#[from] crate::agent::CatalogError),

    #[error("timed out waiting for catalog sync to stop")]
    SyncTimeout,

    #[error("timed out waiting for script probes to stop")]
    ProbeTimeout,
}

/// Everything that went wrong while shutting down. Deregistration errors
/// accumulate rather than aborting the sweep.
#[derive(Debug, Default)]
pub struct ShutdownError {
    pub issues: Vec<ShutdownIssue>,
}

impl ShutdownError {
    fn push(&mut self, issue: ShutdownIssue) {
        self.issues.push(issue);
    }

    fn into_result(self) -> Result<(), ShutdownError> {
        if self.issues.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shutdown finished with {} error(s):", self.issues.len())?;
        for issue in &self.issues {
            write!(f, " {};", issue)?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {}

/// Ids registered on behalf of the host agent itself, swept on shutdown.
#[derive(Default)]
struct AgentRegistry {
    services: HashSet<String>,
    checks: HashSet<String>,
}

/// Handle for registering services and checks with the local catalog
/// agent. Cheap to share; all mutation happens in the [`SyncRunner`].
pub struct ServiceSync {
    agent: Arc<dyn CatalogAgent>,
    tx: mpsc::Sender<Batch>,
    shutdown: CancellationToken,
    shutdown_wait: Duration,
    /// Resolves with the running probe handles when the sync loop exits.
    /// Taken by the first shutdown call.
    exit_rx: Mutex<Option<oneshot::Receiver<Vec<ProbeHandle>>>>,
    agent_ids: Mutex<AgentRegistry>,
}

impl ServiceSync {
    /// Create the producer handle and its runner. Spawn the runner exactly
    /// once; producers work from any task.
    pub fn new(agent: Arc<dyn CatalogAgent>) -> (Self, SyncRunner) {
        Self::with_config(agent, SyncConfig::default())
    }

    pub fn with_config(agent: Arc<dyn CatalogAgent>, config: SyncConfig) -> (Self, SyncRunner) {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let (exit_tx, exit_rx) = oneshot::channel();
        let shutdown = CancellationToken::new();
        let runner = SyncRunner::new(
            agent.clone(),
            rx,
            shutdown.clone(),
            exit_tx,
            config.retry_interval,
        );
        let sync = Self {
            agent,
            tx,
            shutdown,
            shutdown_wait: config.shutdown_wait,
            exit_rx: Mutex::new(Some(exit_rx)),
            agent_ids: Mutex::new(AgentRegistry::default()),
        };
        (sync, runner)
    }

    /// Register services owned by the host agent itself (client or
    /// server role). Port labels must be explicit `host:port` addresses,
    /// and script checks are rejected. The registered ids are swept from
    /// the catalog on shutdown.
    pub async fn register_agent(
        &self,
        role: &str,
        services: &[Service],
    ) -> Result<(), RegisterError> {
        let mut batch = Batch::default();

        for service in services {
            let id = agent_service_id(role, service);
            let (host, port) = split_host_port(&service.port_label).map_err(|source| {
                RegisterError::ServicePortLabel {
                    service: service.name.clone(),
                    label: service.port_label.clone(),
                    source,
                }
            })?;

            for check in &service.checks {
                if check.kind == CheckKind::Script {
                    return Err(RegisterError::AgentScriptCheck(service.name.clone()));
                }
                let cid = check_id(&id, check);
                let (check_host, check_port) = if check.port_label.is_empty() {
                    (host.clone(), port)
                } else {
                    split_host_port(&check.port_label).map_err(|source| {
                        RegisterError::CheckPortLabel {
                            check: check.name.clone(),
                            label: check.port_label.clone(),
                            source,
                        }
                    })?
                };
                batch
                    .reg_checks
                    .push(build_check(&id, &cid, check, &check_host, check_port)?);
            }

            batch.reg_services.push(ServiceRegistration {
                id,
                name: service.name.clone(),
                tags: service.tags.clone(),
                address: host,
                port,
            });
        }

        let service_ids: Vec<String> = batch.reg_services.iter().map(|s| s.id.clone()).collect();
        let check_ids: Vec<String> = batch.reg_checks.iter().map(|c| c.id.clone()).collect();

        if !self.commit(batch).await {
            // Shutting down; nothing was enqueued, so record nothing.
            return Ok(());
        }

        let mut registry = self.agent_ids.lock();
        registry.services.extend(service_ids);
        registry.checks.extend(check_ids);
        Ok(())
    }

    /// Register a task's services and checks. Script checks need `exec`;
    /// without one the whole call is rejected and nothing is submitted.
    pub async fn register_task(
        &self,
        alloc_id: &str,
        task: &Task,
        resolve: PortResolver<'_>,
        exec: Option<Arc<dyn ScriptExecutor>>,
    ) -> Result<(), RegisterError> {
        let mut batch = Batch::default();
        for service in &task.services {
            self.service_regs(&mut batch, alloc_id, &task.name, service, resolve, exec.as_ref())?;
        }
        self.commit(batch).await;
        Ok(())
    }

    /// Apply a task update as a diff: removed services deregister with all
    /// their checks, surviving services only exchange changed checks, and
    /// new services register as in [`register_task`](Self::register_task).
    pub async fn update_task(
        &self,
        alloc_id: &str,
        existing: &Task,
        updated: &Task,
        resolve: PortResolver<'_>,
        exec: Option<Arc<dyn ScriptExecutor>>,
    ) -> Result<(), RegisterError> {
        let mut batch = Batch::default();

        let existing_ids: HashMap<String, &Service> = existing
            .services
            .iter()
            .map(|s| (task_service_id(alloc_id, &existing.name, s), s))
            .collect();
        let mut new_ids: HashMap<String, &Service> = updated
            .services
            .iter()
            .map(|s| (task_service_id(alloc_id, &updated.name, s), s))
            .collect();

        for (id, existing_svc) in &existing_ids {
            let Some(new_svc) = new_ids.remove(id) else {
                debug!(service_id = %id, "task update removed service");
                for check in &existing_svc.checks {
                    batch.dereg_checks.push(check_id(id, check));
                }
                batch.dereg_services.push(id.clone());
                continue;
            };

            // Same service id; diff the checks. A changed check hashes to
            // a new id, so it shows up as one removal plus one addition.
            let mut old_checks: HashSet<String> =
                existing_svc.checks.iter().map(|c| check_id(id, c)).collect();

            for check in &new_svc.checks {
                let cid = check_id(id, check);
                if old_checks.remove(&cid) {
                    debug!(check_id = %cid, "task update kept check");
                    continue;
                }

                if check.kind == CheckKind::Script {
                    let Some(exec) = exec.as_ref() else {
                        return Err(RegisterError::ScriptsUnsupported);
                    };
                    batch.probes.push(self.probe_for(&cid, check, exec));
                }
                let (host, port) = if check.port_label.is_empty() {
                    resolve(&new_svc.port_label)
                } else {
                    resolve(&check.port_label)
                };
                batch.reg_checks.push(build_check(id, &cid, check, &host, port)?);
            }

            for cid in old_checks {
                debug!(check_id = %cid, "task update removed check");
                batch.dereg_checks.push(cid);
            }
        }

        // Whatever remains is new outright.
        for service in new_ids.values().copied() {
            self.service_regs(&mut batch, alloc_id, &updated.name, service, resolve, exec.as_ref())?;
        }

        self.commit(batch).await;
        Ok(())
    }

    /// Deregister every service and check the task owns.
    pub async fn remove_task(&self, alloc_id: &str, task: &Task) {
        let mut batch = Batch::default();
        for service in &task.services {
            let id = task_service_id(alloc_id, &task.name, service);
            for check in &service.checks {
                batch.dereg_checks.push(check_id(&id, check));
            }
            batch.dereg_services.push(id);
        }
        self.commit(batch).await;
    }

    /// Stop the sync core: cancel the loop and every probe, sweep the
    /// agent's own registrations from the catalog, and wait out stragglers
    /// up to the configured deadline. A second call is a no-op.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        let deadline = tokio::time::Instant::now() + self.shutdown_wait;
        self.shutdown.cancel();

        let Some(exit_rx) = self.exit_rx.lock().take() else {
            return Ok(());
        };

        let mut errors = ShutdownError::default();

        // Snapshot the registry in a short critical section; the catalog
        // calls happen after the lock is released.
        let (services, checks) = {
            let registry = self.agent_ids.lock();
            (
                registry.services.iter().cloned().collect::<Vec<_>>(),
                registry.checks.iter().cloned().collect::<Vec<_>>(),
            )
        };

        for id in &services {
            if let Err(err) = self.agent.deregister_service(id).await {
                errors.push(err.into());
            }
        }
        for id in &checks {
            if let Err(err) = self.agent.deregister_check(id).await {
                errors.push(err.into());
            }
        }

        // The loop surrenders its running probe handles as it exits.
        let handles = match tokio::time::timeout_at(deadline, exit_rx).await {
            Ok(Ok(handles)) => handles,
            // The runner was dropped without running; nothing to drain.
            Ok(Err(_)) => Vec::new(),
            Err(_) => {
                errors.push(ShutdownIssue::SyncTimeout);
                return errors.into_result();
            }
        };

        for handle in handles {
            if tokio::time::timeout_at(deadline, handle.wait()).await.is_err() {
                errors.push(ShutdownIssue::ProbeTimeout);
                return errors.into_result();
            }
        }

        errors.into_result()
    }

    /// Build the registration and checks for one task service.
    fn service_regs(
        &self,
        batch: &mut Batch,
        alloc_id: &str,
        task_name: &str,
        service: &Service,
        resolve: PortResolver<'_>,
        exec: Option<&Arc<dyn ScriptExecutor>>,
    ) -> Result<(), RegisterError> {
        let id = task_service_id(alloc_id, task_name, service);
        let (host, port) = resolve(&service.port_label);
        let reg = ServiceRegistration {
            id,
            name: service.name.clone(),
            // Value copy: the caller may keep mutating its descriptor.
            tags: service.tags.clone(),
            address: host,
            port,
        };

        for check in &service.checks {
            self.check_regs(batch, check, &reg, resolve, exec)?;
        }

        batch.reg_services.push(reg);
        Ok(())
    }

    /// Build one check registration (and its probe for script checks).
    fn check_regs(
        &self,
        batch: &mut Batch,
        check: &ServiceCheck,
        service: &ServiceRegistration,
        resolve: PortResolver<'_>,
        exec: Option<&Arc<dyn ScriptExecutor>>,
    ) -> Result<(), RegisterError> {
        let cid = check_id(&service.id, check);
        if check.kind == CheckKind::Script {
            let Some(exec) = exec else {
                return Err(RegisterError::ScriptsUnsupported);
            };
            batch.probes.push(self.probe_for(&cid, check, exec));
        }

        let (host, port) = if check.port_label.is_empty() {
            (service.address.clone(), service.port)
        } else {
            resolve(&check.port_label)
        };
        batch.reg_checks.push(build_check(&service.id, &cid, check, &host, port)?);
        Ok(())
    }

    fn probe_for(
        &self,
        check_id: &str,
        check: &ServiceCheck,
        exec: &Arc<dyn ScriptExecutor>,
    ) -> ScriptProbe {
        ScriptProbe::new(
            check_id.to_string(),
            check.clone(),
            exec.clone(),
            self.agent.clone(),
            self.shutdown.clone(),
        )
    }

    /// Submit a batch to the sync loop, blocking while the queue is full.
    /// Returns false without enqueueing if shutdown is signalled first.
    async fn commit(&self, batch: Batch) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            sent = self.tx.send(batch) => sent.is_ok(),
        }
    }
}

#[cfg(test)]
#[path = "sync_tests.rs"]
mod tests;
