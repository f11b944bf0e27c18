//! Session manager state machine.

/// Lifecycle state of a [`SessionManager`](super::SessionManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerState {
    /// Constructed, no remote session yet.
    #[default]
    Uninitialized,
    /// A remote session exists and is being kept alive.
    Active,
    /// The remote session is gone and a restart has been requested.
    Restarting,
    /// Shut down; no further transitions possible.
    ShutDown,
}

impl ManagerState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Uninitialized -> Active
    /// - Active -> Restarting
    /// - Restarting -> Active
    /// - Uninitialized | Active | Restarting -> ShutDown
    pub fn can_transition_to(&self, target: ManagerState) -> bool {
        use ManagerState::*;
        matches!(
            (*self, target),
            (Uninitialized, Active)
                | (Active, Restarting)
                | (Restarting, Active)
                | (Uninitialized, ShutDown)
                | (Active, ShutDown)
                | (Restarting, ShutDown)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: ManagerState) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::BroadcastError::InvalidStateTransition {
                from: *self,
                to: target,
            })
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ManagerState::ShutDown)
    }

    /// Check if a session can be created from this state.
    pub fn can_init(&self) -> bool {
        matches!(self, ManagerState::Uninitialized | ManagerState::Restarting)
    }
}
