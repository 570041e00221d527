// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory fakes for exercising the sync core without a catalog agent
//! or a task driver.

use crate::agent::{
    AgentCheck, AgentService, CatalogAgent, CatalogError, CheckRegistration, ServiceRegistration,
};
use crate::exec::{ScriptExecutor, ScriptOutput};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wharf_model::CheckStatus;

/// One recorded TTL refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TtlUpdate {
    pub check_id: String,
    pub output: String,
    pub status: CheckStatus,
}

#[derive(Default)]
struct FakeCatalogState {
    services: HashMap<String, AgentService>,
    checks: HashMap<String, AgentCheck>,
    ttl_updates: Vec<TtlUpdate>,
    /// Registrations + deregistrations issued so far.
    writes: usize,
    fail_queries: bool,
}

/// An in-memory catalog agent: registrations land in maps, queries read
/// them back, and every write and TTL refresh is recorded for assertions.
#[derive(Default)]
pub struct FakeCatalog {
    state: Mutex<FakeCatalogState>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make queries fail until cleared; writes are unaffected.
    pub fn fail_queries(&self, fail: bool) {
        self.state.lock().fail_queries = fail;
    }

    /// Seed a service as if a third party had registered it.
    pub fn seed_service(&self, service: AgentService) {
        let mut state = self.state.lock();
        state.services.insert(service.id.clone(), service);
    }

    pub fn service(&self, id: &str) -> Option<AgentService> {
        self.state.lock().services.get(id).cloned()
    }

    pub fn check(&self, id: &str) -> Option<AgentCheck> {
        self.state.lock().checks.get(id).cloned()
    }

    pub fn service_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().services.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn check_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.lock().checks.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn writes(&self) -> usize {
        self.state.lock().writes
    }

    pub fn ttl_updates(&self) -> Vec<TtlUpdate> {
        self.state.lock().ttl_updates.clone()
    }
}

#[async_trait]
impl CatalogAgent for FakeCatalog {
    async fn services(&self) -> Result<HashMap<String, AgentService>, CatalogError> {
        let state = self.state.lock();
        if state.fail_queries {
            return Err(CatalogError::Connection("connection refused".to_string()));
        }
        Ok(state.services.clone())
    }

    async fn checks(&self) -> Result<HashMap<String, AgentCheck>, CatalogError> {
        let state = self.state.lock();
        if state.fail_queries {
            return Err(CatalogError::Connection("connection refused".to_string()));
        }
        Ok(state.checks.clone())
    }

    async fn register_service(&self, reg: &ServiceRegistration) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        state.writes += 1;
        state.services.insert(
            reg.id.clone(),
            AgentService {
                id: reg.id.clone(),
                service: reg.name.clone(),
                tags: reg.tags.clone(),
                address: reg.address.clone(),
                port: reg.port,
            },
        );
        Ok(())
    }

    async fn deregister_service(&self, service_id: &str) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        state.writes += 1;
        state.services.remove(service_id);
        Ok(())
    }

    async fn register_check(&self, reg: &CheckRegistration) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        state.writes += 1;
        let status = reg.status.map(|s| s.as_str()).unwrap_or("critical");
        state.checks.insert(
            reg.id.clone(),
            AgentCheck {
                id: reg.id.clone(),
                name: reg.name.clone(),
                status: status.to_string(),
                service_id: reg.service_id.clone(),
            },
        );
        Ok(())
    }

    async fn deregister_check(&self, check_id: &str) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        state.writes += 1;
        state.checks.remove(check_id);
        Ok(())
    }

    async fn update_ttl(
        &self,
        check_id: &str,
        output: &str,
        status: CheckStatus,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.lock();
        if let Some(check) = state.checks.get_mut(check_id) {
            check.status = status.as_str().to_string();
        }
        state.ttl_updates.push(TtlUpdate {
            check_id: check_id.to_string(),
            output: output.to_string(),
            status,
        });
        Ok(())
    }
}

/// A scripted response for one execution.
#[derive(Debug, Clone)]
pub enum ScriptRun {
    /// Exit with a code and output.
    Exit(i32, String),
    /// Never finish; unblocks only on cancellation.
    Hang,
    /// The command could not be run at all.
    Fail(String),
}

#[derive(Default)]
struct ScriptedState {
    queued: VecDeque<ScriptRun>,
    /// Replayed once the queue drains.
    repeat: Option<ScriptRun>,
    runs: usize,
}

/// A script executor that replays canned results.
#[derive(Default)]
pub struct ScriptedExecutor {
    state: Mutex<ScriptedState>,
}

impl ScriptedExecutor {
    /// Repeat the same result for every execution.
    pub fn always(run: ScriptRun) -> Self {
        let exec = Self::default();
        exec.state.lock().repeat = Some(run);
        exec
    }

    /// Queue a result for the next execution.
    pub fn push(&self, run: ScriptRun) {
        self.state.lock().queued.push_back(run);
    }

    pub fn runs(&self) -> usize {
        self.state.lock().runs
    }
}

#[async_trait]
impl ScriptExecutor for ScriptedExecutor {
    async fn exec(
        &self,
        cancel: CancellationToken,
        _command: &str,
        _args: &[String],
    ) -> std::io::Result<ScriptOutput> {
        let run = {
            let mut state = self.state.lock();
            state.runs += 1;
            state
                .queued
                .pop_front()
                .or_else(|| state.repeat.clone())
                .unwrap_or(ScriptRun::Hang)
        };
        match run {
            ScriptRun::Exit(code, output) => Ok(ScriptOutput {
                output: output.into_bytes(),
                code,
            }),
            ScriptRun::Hang => {
                cancel.cancelled().await;
                Err(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "cancelled",
                ))
            }
            ScriptRun::Fail(reason) => {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, reason))
            }
        }
    }
}

/// Poll `cond` until it holds, advancing (or sleeping) in small steps.
/// Panics after thirty simulated seconds, comfortably past the default
/// retry interval.
pub async fn wait_for(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
