// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! wharf-catalog: keeps the local service-catalog agent in sync with the
//! registrations the host agent wants to exist.
//!
//! Producers (agent self-registration, task registration/update/removal)
//! submit batches of desired-state mutations over a bounded channel; a
//! single sync loop merges them and reconciles against the catalog agent,
//! retrying whole cycles on failure. Script checks are modelled as TTL
//! checks refreshed by supervised probe tasks.

pub mod addr;
pub mod agent;
pub mod batch;
pub mod check;
pub mod exec;
pub mod ids;
pub mod probe;
pub mod runner;
pub mod store;
pub mod sync;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use addr::AddrError;
pub use agent::{
    AgentCheck, AgentService, CatalogAgent, CatalogError, CheckRegistration, CheckTarget,
    ServiceRegistration, QUERY_WAIT, TTL_OUTPUT_LIMIT,
};
pub use check::{CheckBuildError, TTL_BUFFER};
pub use exec::{ScriptExecutor, ScriptOutput};
pub use ids::{
    agent_service_id, check_id, is_managed, task_service_id, MANAGED_PREFIX, TAG_HTTP, TAG_RPC,
    TAG_SERF,
};
pub use probe::{ProbeHandle, ScriptProbe};
pub use runner::{SyncError, SyncRunner};
pub use sync::{PortResolver, RegisterError, ServiceSync, ShutdownError, ShutdownIssue, SyncConfig};
