//! Background heartbeat schedule.
//!
//! The spawned task owns its [`SessionManager`], so cycles never overlap and
//! nothing else can touch the descriptor while a cycle runs. Cancellation is
//! cooperative: it is only observed between cycles, never mid-update.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error};

use super::SessionManager;

/// Shortest period a schedule will tick at.
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running heartbeat schedule.
pub struct ScheduleHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<SessionManager>>,
}

impl ScheduleHandle {
    /// Start running `manager.update_cycle()` every `period`, first tick one
    /// period from now. Periods below [`MIN_PERIOD`] are raised to it.
    pub fn spawn(mut manager: SessionManager, period: Duration) -> Self {
        let period = period.max(MIN_PERIOD);
        let (cancel, mut cancelled) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.changed() => break,
                    _ = ticker.tick() => {}
                }
                if *cancelled.borrow() {
                    break;
                }

                let outcome = manager.update_cycle().await;
                debug!(?outcome, "update cycle finished");
            }

            manager.shutdown().await;
            manager
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Signal the schedule to stop after any in-flight cycle.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Whether the schedule task is still running.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Cancel, wait for the task to finish, and hand back the shut-down
    /// manager. Returns `None` if already stopped.
    pub async fn shutdown(&mut self) -> Option<SessionManager> {
        self.cancel();
        let task = self.task.take()?;
        match task.await {
            Ok(manager) => Some(manager),
            Err(e) => {
                error!("schedule task failed: {}", e);
                None
            }
        }
    }
}

impl Drop for ScheduleHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
