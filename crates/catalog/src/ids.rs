// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identity derivation for managed services and checks.
//!
//! Service ids are readable and deterministic; check ids are opaque hashes
//! from the model crate. Everything the sync core registers starts with
//! [`MANAGED_PREFIX`], and the reconciler only ever deregisters entries
//! carrying that prefix, so catalog entries owned by third parties are
//! never touched.

use wharf_model::{Service, ServiceCheck};

/// Prefix scoping every id the sync core owns.
pub const MANAGED_PREFIX: &str = "_nomad";

/// Well-known tag for HTTP endpoints on agent self-registrations.
pub const TAG_HTTP: &str = "http";
/// Well-known tag for RPC endpoints on agent self-registrations.
pub const TAG_RPC: &str = "rpc";
/// Well-known tag for gossip endpoints on agent self-registrations.
pub const TAG_SERF: &str = "serf";

/// Id for a service registered on behalf of the host agent itself.
///
/// Shape: `{prefix}-{role}-{name}[-{tag}]*`, e.g. `_nomad-server-nomad-http`.
pub fn agent_service_id(role: &str, service: &Service) -> String {
    let mut parts = Vec::with_capacity(service.tags.len() + 3);
    parts.push(MANAGED_PREFIX);
    parts.push(role);
    parts.push(&service.name);
    parts.extend(service.tags.iter().map(String::as_str));
    parts.join("-")
}

/// Id for a service exposed by a task.
///
/// Shape: `{prefix}-executor-{alloc}-{task}-{name}[-{tag}]*`, e.g.
/// `_nomad-executor-abcd-echo-svc-a-b`.
pub fn task_service_id(alloc_id: &str, task_name: &str, service: &Service) -> String {
    let mut parts = Vec::with_capacity(service.tags.len() + 5);
    parts.push(MANAGED_PREFIX);
    parts.push("executor");
    parts.push(alloc_id);
    parts.push(task_name);
    parts.push(&service.name);
    parts.extend(service.tags.iter().map(String::as_str));
    parts.join("-")
}

/// Id for a check under its owning service.
pub fn check_id(service_id: &str, check: &ServiceCheck) -> String {
    check.hash(service_id)
}

/// True if the id is owned by the sync core.
pub fn is_managed(id: &str) -> bool {
    id.starts_with(MANAGED_PREFIX)
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
