// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Check builder: descriptor plus resolved address to registration payload.

use crate::addr::join_host_port;
use crate::agent::{CheckRegistration, CheckTarget};
use std::time::Duration;
use thiserror::Error;
use url::Url;
use wharf_model::{format_duration, CheckKind, ServiceCheck};

/// Grace period added to a script check's interval before the agent marks
/// the TTL lapsed, covering probe execution and reporting time.
pub const TTL_BUFFER: Duration = Duration::from_secs(31);

/// A check descriptor that could not be turned into a registration.
#[derive(Debug, Error)]
pub enum CheckBuildError {
    #[error("invalid HTTP target for check {name:?}: {source}")]
    InvalidUrl {
        name: String,
        #[source]
        source: url::ParseError,
    },
}

/// Build the registration payload for `check` probing `host:port` under
/// `service_id`.
///
/// HTTP checks get a URL with the descriptor's path resolved against
/// `{protocol}://{host}:{port}` (protocol defaults to plain `http`); TCP
/// checks get the joined endpoint; script checks register as TTL checks
/// with TTL = interval + [`TTL_BUFFER`], refreshed by a probe elsewhere.
pub fn build_check(
    service_id: &str,
    check_id: &str,
    check: &ServiceCheck,
    host: &str,
    port: u16,
) -> Result<CheckRegistration, CheckBuildError> {
    let target = match check.kind {
        CheckKind::Http => {
            let protocol = if check.protocol.is_empty() { "http" } else { &check.protocol };
            let base = format!("{}://{}", protocol, join_host_port(host, port));
            let url = Url::parse(&base)
                .and_then(|base| base.join(&check.path))
                .map_err(|source| CheckBuildError::InvalidUrl {
                    name: check.name.clone(),
                    source,
                })?;
            CheckTarget::Http { url: url.to_string() }
        }
        CheckKind::Tcp => CheckTarget::Tcp { addr: join_host_port(host, port) },
        CheckKind::Script => {
            CheckTarget::Ttl { ttl: format_duration(check.interval + TTL_BUFFER) }
        }
    };

    Ok(CheckRegistration {
        id: check_id.to_string(),
        service_id: service_id.to_string(),
        name: check.name.clone(),
        status: check.initial_status,
        interval: format_duration(check.interval),
        timeout: format_duration(check.timeout),
        target,
    })
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
