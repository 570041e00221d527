// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalog agent surface.
//!
//! The local catalog agent is an external process reached over its HTTP
//! API; the sync core only sees this trait. Field names on the wire types
//! follow the agent's API spelling so a transport client can serialize
//! them directly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use wharf_model::CheckStatus;

/// Max duration an implementation should wait on a catalog query.
pub const QUERY_WAIT: Duration = Duration::from_secs(2);

/// Max bytes of probe output the agent stores with a TTL update.
pub const TTL_OUTPUT_LIMIT: usize = 4096;

/// Failure talking to the catalog agent. Every call is a fallible network
/// operation; the sync loop treats any of these as transient.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog agent unreachable: {0}")]
    Connection(String),

    #[error("catalog request failed: {0}")]
    Request(String),
}

/// A service registration to submit to the catalog agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: String,
    pub tags: Vec<String>,
    pub address: String,
    pub port: u16,
}

/// The probe target of a check registration. The agent accepts exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CheckTarget {
    Http {
        #[serde(rename = "HTTP")]
        url: String,
    },
    Tcp {
        #[serde(rename = "TCP")]
        addr: String,
    },
    /// The agent marks the check critical if no update arrives within the
    /// TTL; some probe elsewhere is responsible for refreshing it.
    Ttl {
        #[serde(rename = "TTL")]
        ttl: String,
    },
}

/// A check registration to submit to the catalog agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CheckRegistration {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "ServiceID")]
    pub service_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<CheckStatus>,
    pub interval: String,
    pub timeout: String,
    #[serde(flatten)]
    pub target: CheckTarget,
}

/// A service as the catalog agent currently knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentService {
    #[serde(rename = "ID")]
    pub id: String,
    pub service: String,
    pub tags: Vec<String>,
    pub address: String,
    pub port: u16,
}

/// A check as the catalog agent currently knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentCheck {
    #[serde(rename = "CheckID")]
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(rename = "ServiceID")]
    pub service_id: String,
}

/// The capability set the sync core consumes from the catalog agent.
#[async_trait]
pub trait CatalogAgent: Send + Sync {
    /// All services registered with the local agent, keyed by id.
    async fn services(&self) -> Result<HashMap<String, AgentService>, CatalogError>;

    /// All checks registered with the local agent, keyed by id.
    async fn checks(&self) -> Result<HashMap<String, AgentCheck>, CatalogError>;

    async fn register_service(&self, reg: &ServiceRegistration) -> Result<(), CatalogError>;

    async fn deregister_service(&self, service_id: &str) -> Result<(), CatalogError>;

    async fn register_check(&self, reg: &CheckRegistration) -> Result<(), CatalogError>;

    async fn deregister_check(&self, check_id: &str) -> Result<(), CatalogError>;

    /// Refresh a TTL check with a status and the probe's output.
    async fn update_ttl(
        &self,
        check_id: &str,
        output: &str,
        status: CheckStatus,
    ) -> Result<(), CatalogError>;
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
