// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Host/port label parsing and joining.

use thiserror::Error;

/// A port label that could not be parsed as an explicit `host:port`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrError {
    #[error("address {0:?} has no port")]
    MissingPort(String),

    #[error("invalid port in address {0:?}")]
    InvalidPort(String),

    #[error("unmatched bracket in address {0:?}")]
    UnmatchedBracket(String),
}

/// Split an explicit `host:port` label into its parts.
///
/// IPv6 hosts must be bracketed (`[::1]:4646`). The host may be empty
/// (`:8080`), matching how listeners spell wildcard binds.
pub fn split_host_port(label: &str) -> Result<(String, u16), AddrError> {
    let (host, port) = if let Some(rest) = label.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| AddrError::UnmatchedBracket(label.to_string()))?;
        let host = &rest[..end];
        let port = rest[end + 1..]
            .strip_prefix(':')
            .ok_or_else(|| AddrError::MissingPort(label.to_string()))?;
        (host, port)
    } else {
        label
            .rsplit_once(':')
            .ok_or_else(|| AddrError::MissingPort(label.to_string()))?
    };
    if host.contains(':') {
        // Unbracketed IPv6; the split above took the wrong colon.
        return Err(AddrError::MissingPort(label.to_string()));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| AddrError::InvalidPort(label.to_string()))?;
    Ok((host.to_string(), port))
}

/// Join a host and port, bracketing IPv6 hosts.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

#[cfg(test)]
#[path = "addr_tests.rs"]
mod tests;
