// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Duration rendering for the catalog wire format.

use std::time::Duration;

/// Render a duration the way the catalog agent parses it: whole seconds as
/// `"10s"`, with any sub-second remainder appended as milliseconds
/// (`"2s500ms"`). A zero duration renders as `"0s"`.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let millis = d.subsec_millis();
    match (secs, millis) {
        (_, 0) => format!("{}s", secs),
        (0, _) => format!("{}ms", millis),
        (_, _) => format!("{}s{}ms", secs, millis),
    }
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;
