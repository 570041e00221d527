// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operation batch: the unit of desired-state mutation.

use crate::agent::{CheckRegistration, ServiceRegistration};
use crate::probe::ScriptProbe;

/// A bundle of registrations and deregistrations submitted atomically to
/// the sync loop. Producers fill one completely before committing; partial
/// batches are never observable.
#[derive(Default)]
pub struct Batch {
    pub reg_services: Vec<ServiceRegistration>,
    pub reg_checks: Vec<CheckRegistration>,
    /// Probes for script checks in `reg_checks`, started by the sync loop
    /// once the corresponding check registers.
    pub probes: Vec<ScriptProbe>,
    pub dereg_services: Vec<String>,
    pub dereg_checks: Vec<String>,
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.reg_services.is_empty()
            && self.reg_checks.is_empty()
            && self.probes.is_empty()
            && self.dereg_services.is_empty()
            && self.dereg_checks.is_empty()
    }
}
