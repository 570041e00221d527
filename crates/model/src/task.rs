// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task descriptor.

use crate::service::Service;
use serde::{Deserialize, Serialize};

/// A scheduled unit of work and the services it exposes.
///
/// Only the fields the host agent's catalog sync consumes appear here; port
/// resolution is a capability of the runtime environment and is passed to
/// the sync core as a callback rather than carried on the task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default)]
    pub services: Vec<Service>,
}
