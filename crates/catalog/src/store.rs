// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Desired-state store, owned exclusively by the sync loop.

use crate::agent::{CheckRegistration, ServiceRegistration};
use crate::batch::Batch;
use crate::probe::{ProbeHandle, ScriptProbe};
use std::collections::HashMap;

/// The registrations the sync loop wants the catalog agent to reflect,
/// plus the probes bound to script checks. Only the sync loop mutates
/// this, so no locking is involved.
#[derive(Default)]
pub struct DesiredState {
    pub services: HashMap<String, ServiceRegistration>,
    pub checks: HashMap<String, CheckRegistration>,
    /// Probes for desired script checks that may not be running yet.
    pub probes: HashMap<String, ScriptProbe>,
    /// Handles of probes currently running. Every id here is a desired
    /// script check; deregistration removes the entry as it cancels.
    pub running: HashMap<String, ProbeHandle>,
}

impl DesiredState {
    /// Merge a batch: registrations first, then deregistrations, so the
    /// maps land in submission order. Total and non-failing.
    pub fn merge(&mut self, batch: Batch) {
        for service in batch.reg_services {
            self.services.insert(service.id.clone(), service);
        }
        for check in batch.reg_checks {
            self.checks.insert(check.id.clone(), check);
        }
        for probe in batch.probes {
            self.probes.insert(probe.check_id().to_string(), probe);
        }
        for id in batch.dereg_services {
            self.services.remove(&id);
        }
        for id in batch.dereg_checks {
            if let Some(handle) = self.running.remove(&id) {
                handle.cancel();
                self.probes.remove(&id);
            }
            self.checks.remove(&id);
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
