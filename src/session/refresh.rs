//! Live-status refresh policy.
//!
//! | probing | outcome | config fallback | descriptor              |
//! |---------|---------|-----------------|-------------------------|
//! | off     | -       | -               | unchanged               |
//! | on      | ok      | -               | live values             |
//! | on      | failed  | on              | static config values    |
//! | on      | failed  | off             | unchanged (logged only) |
//!
//! Whenever values are replaced, an empty host name falls back to the owning
//! account's display name.

use tracing::{error, warn};

use super::{SessionDescriptor, StaticSessionInfo};
use crate::ping::ProbeResult;
use crate::Result;

/// The two independent toggles governing a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// Query the server live on every cycle.
    pub query_server: bool,
    /// Reset to static values when the query fails.
    pub config_fallback: bool,
}

/// What a refresh did to the descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Probing is disabled.
    Skipped,
    /// Live values applied.
    Live,
    /// Probe failed, static values applied.
    Fallback,
    /// Probe failed, descriptor left as it was.
    Unchanged,
}

/// Apply a probe result to `descriptor` according to `policy`.
///
/// `probe` is `None` when probing is disabled and no query was attempted.
pub fn apply_refresh(
    descriptor: &mut SessionDescriptor,
    policy: RefreshPolicy,
    probe: Option<Result<ProbeResult>>,
    fallback: &StaticSessionInfo,
    display_name: &str,
) -> RefreshOutcome {
    let probe = match (policy.query_server, probe) {
        (true, Some(probe)) => probe,
        _ => return RefreshOutcome::Skipped,
    };

    match probe {
        Ok(result) => {
            descriptor.apply_probe(&result);
            descriptor.fallback_host_name(display_name);
            RefreshOutcome::Live
        }
        Err(e) if policy.config_fallback => {
            warn!(
                addr = %format!("{}:{}", descriptor.ip, descriptor.port),
                "Failed to ping server, falling back to config values: {}", e
            );
            descriptor.apply_static(fallback);
            descriptor.fallback_host_name(display_name);
            RefreshOutcome::Fallback
        }
        Err(e) => {
            error!(
                addr = %format!("{}:{}", descriptor.ip, descriptor.port),
                "Failed to ping server: {}", e
            );
            RefreshOutcome::Unchanged
        }
    }
}
