//! Session lifecycle.
//!
//! This module holds the advertised [`SessionDescriptor`], the live-status
//! refresh policy, the manager state machine, the [`SessionManager`] that
//! drives creation and heartbeats, and the schedule that runs it.

mod descriptor;
mod manager;
mod refresh;
mod schedule;
mod state;

pub use descriptor::{SessionDescriptor, StaticSessionInfo};
pub use manager::{CycleOutcome, ManagerConfig, RestartHook, SessionManager, SessionServices};
pub use refresh::{apply_refresh, RefreshOutcome, RefreshPolicy};
pub use schedule::{ScheduleHandle, MIN_PERIOD};
pub use state::ManagerState;
