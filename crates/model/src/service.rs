// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service and health check descriptors.
//!
//! These are input values: the scheduler hands them to the host agent, which
//! derives registrations from them but never mutates them. Check identity is
//! a stable hash over the descriptor, so any edit to a check produces a new
//! identity rather than an in-place update.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// A service exposed by a task or by the host agent itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Either a named port from the task's resource allocation or an
    /// explicit `host:port` address.
    pub port_label: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub checks: Vec<ServiceCheck>,
}

/// The probe style of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Http,
    Tcp,
    Script,
}

impl CheckKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckKind::Http => "http",
            CheckKind::Tcp => "tcp",
            CheckKind::Script => "script",
        }
    }
}

/// A health state as the catalog agent spells it on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Passing,
    Warning,
    Critical,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Passing => "passing",
            CheckStatus::Warning => "warning",
            CheckStatus::Critical => "critical",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A health check attached to a [`Service`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceCheck {
    pub name: String,
    pub kind: CheckKind,
    /// Command and arguments, script checks only.
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Request path, HTTP checks only.
    #[serde(default)]
    pub path: String,
    /// URL scheme, HTTP checks only. Empty means plain `http`.
    #[serde(default)]
    pub protocol: String,
    /// When set, overrides the owning service's port label for this check.
    #[serde(default)]
    pub port_label: String,
    pub interval: Duration,
    pub timeout: Duration,
    #[serde(default)]
    pub initial_status: Option<CheckStatus>,
}

impl ServiceCheck {
    /// Stable identity of this check under the given service id.
    ///
    /// Identical descriptors under the same service hash identically across
    /// runs; any field difference yields a different id. The id is opaque to
    /// consumers and nothing ever parses it back.
    pub fn hash(&self, service_id: &str) -> String {
        let mut canonical = String::with_capacity(128);
        canonical.push_str(service_id);
        for field in [
            self.name.as_str(),
            self.kind.as_str(),
            self.command.as_str(),
            self.path.as_str(),
            self.protocol.as_str(),
            self.port_label.as_str(),
        ] {
            canonical.push('\n');
            canonical.push_str(field);
        }
        for arg in &self.args {
            canonical.push('\n');
            canonical.push_str(arg);
        }
        canonical.push('\n');
        canonical.push_str(&self.interval.as_nanos().to_string());
        canonical.push('\n');
        canonical.push_str(&self.timeout.as_nanos().to_string());
        canonical.push('\n');
        if let Some(status) = self.initial_status {
            canonical.push_str(status.as_str());
        }
        format!("{:x}", Sha256::digest(canonical.as_bytes()))
    }
}

impl Default for ServiceCheck {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: CheckKind::Tcp,
            command: String::new(),
            args: Vec::new(),
            path: String::new(),
            protocol: String::new(),
            port_label: String::new(),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(2),
            initial_status: None,
        }
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
