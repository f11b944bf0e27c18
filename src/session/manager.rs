//! Session lifecycle manager.
//!
//! A [`SessionManager`] owns exactly one advertised session. It creates the
//! remote session on [`init`](SessionManager::init), keeps it alive with
//! [`update_cycle`](SessionManager::update_cycle), and releases it on
//! [`shutdown`](SessionManager::shutdown). All three take `&mut self`, so a
//! single owner serialises every mutation of the descriptor.
//!
//! Update results are classified three ways:
//! - the directory no longer knows the session: notify, move to
//!   [`ManagerState::Restarting`], and ask the [`RestartHook`] for a fresh
//!   manager;
//! - any other update failure: log it, the next tick retries;
//! - friend-sync failures: per account, never abort the cycle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::refresh::{apply_refresh, RefreshOutcome, RefreshPolicy};
use super::{ManagerState, SessionDescriptor, StaticSessionInfo};
use crate::auth::{Authenticator, Identity};
use crate::directory::{SessionDirectory, UpdateOutcome};
use crate::error::BroadcastError;
use crate::friends::{sync_friends, FriendAccount, FriendService};
use crate::notify::{NotificationEvent, Notifier};
use crate::ping::{StatusProbe, DEFAULT_PROBE_TIMEOUT};
use crate::wire::{CreateSessionRequest, UpdateSessionRequest};
use crate::Result;

/// Asked for a brand-new manager when the current session is dead.
///
/// The manager never rebuilds itself; whoever owns it decides how a fresh
/// instance and its collaborators are constructed.
pub trait RestartHook: Send + Sync {
    /// Request a full restart. Called at most once per lost session.
    fn request_restart(&self);
}

/// Manager settings.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Delay between update cycles.
    pub update_interval: Duration,
    pub refresh: RefreshPolicy,
    /// Hard upper bound for one status probe.
    pub probe_timeout: Duration,
    /// Values used when a probe fails and config fallback is on.
    pub static_info: StaticSessionInfo,
    pub friend_accounts: Vec<FriendAccount>,
    /// Log successful updates at debug instead of info.
    pub suppress_update_info: bool,
    /// Create attempts before `init` gives up.
    pub create_attempts: u32,
    pub create_retry_delay: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(30),
            refresh: RefreshPolicy {
                query_server: true,
                config_fallback: false,
            },
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            static_info: StaticSessionInfo::default(),
            friend_accounts: Vec::new(),
            suppress_update_info: false,
            create_attempts: 3,
            create_retry_delay: Duration::from_secs(5),
        }
    }
}

/// Collaborators a manager is constructed with.
#[derive(Clone)]
pub struct SessionServices {
    pub authenticator: Arc<dyn Authenticator>,
    pub directory: Arc<dyn SessionDirectory>,
    pub probe: Arc<dyn StatusProbe>,
    pub friends: Arc<dyn FriendService>,
    pub notifier: Arc<Notifier>,
}

/// Result of one update cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The directory accepted the update.
    Updated,
    /// The update failed; the next tick retries.
    Transient(String),
    /// The session is gone and a restart was requested.
    Restarting,
    /// The manager is not active; nothing was sent.
    Skipped,
}

/// Owns and maintains one advertised session.
pub struct SessionManager {
    config: ManagerConfig,
    services: SessionServices,
    restart: Arc<dyn RestartHook>,
    state: ManagerState,
    descriptor: Option<SessionDescriptor>,
    identity: Option<Identity>,
    session_id: Option<String>,
    member_connection: String,
    friend_sync: bool,
}

impl SessionManager {
    /// Create an uninitialized manager.
    pub fn new(
        config: ManagerConfig,
        services: SessionServices,
        restart: Arc<dyn RestartHook>,
    ) -> Self {
        Self {
            config,
            services,
            restart,
            state: ManagerState::Uninitialized,
            descriptor: None,
            identity: None,
            session_id: None,
            member_connection: Uuid::new_v4().to_string(),
            friend_sync: false,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        self.state
    }

    /// Manager settings.
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The descriptor being advertised, once initialized.
    pub fn descriptor(&self) -> Option<&SessionDescriptor> {
        self.descriptor.as_ref()
    }

    /// Display name of the authenticated identity.
    pub fn display_name(&self) -> Option<&str> {
        self.identity.as_ref().map(|i| i.gamertag.as_str())
    }

    /// Id of the remote session while it is owned.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Authenticate, create the remote session, and become active.
    ///
    /// Valid from `Uninitialized` and `Restarting`. Any authentication or
    /// creation failure is returned as [`BroadcastError::Creation`] once the
    /// create retry allowance is spent.
    pub async fn init(&mut self, mut descriptor: SessionDescriptor, friend_sync: bool) -> Result<()> {
        if !self.state.can_init() {
            return Err(BroadcastError::InvalidStateTransition {
                from: self.state,
                to: ManagerState::Active,
            });
        }

        let identity = self
            .services
            .authenticator
            .authenticate()
            .await
            .map_err(|e| BroadcastError::Creation(e.to_string()))?;
        info!(xuid = %identity.xuid, "Authenticated as {}", identity.gamertag);

        descriptor.xuid = identity.xuid.clone();
        if descriptor.connection_id.is_empty() {
            descriptor.connection_id = rand::random::<u64>().to_string();
        }
        descriptor.fallback_host_name(&identity.gamertag);

        self.identity = Some(identity);
        self.descriptor = Some(descriptor);
        self.friend_sync = friend_sync;
        self.refresh_info().await;

        let session_id = Uuid::new_v4().to_string();
        self.create_remote(&session_id).await?;

        self.session_id = Some(session_id.clone());
        self.state.transition_to(ManagerState::Active)?;
        info!(session_id = %session_id, "Created session");
        Ok(())
    }

    async fn create_remote(&self, session_id: &str) -> Result<()> {
        let (Some(identity), Some(descriptor)) = (self.identity.as_ref(), self.descriptor.as_ref())
        else {
            return Err(BroadcastError::Creation("manager has no identity".into()));
        };

        let request = CreateSessionRequest::new(descriptor, &self.member_connection);
        let attempts = self.config.create_attempts.max(1);

        for attempt in 1..=attempts {
            match self
                .services
                .directory
                .create_session(identity, session_id, &request)
                .await
            {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(attempt, attempts, "Failed to create session, retrying: {}", e);
                    tokio::time::sleep(self.config.create_retry_delay).await;
                }
                Err(e) => return Err(BroadcastError::Creation(e.to_string())),
            }
        }

        Err(BroadcastError::Creation("no create attempt made".into()))
    }

    /// Refresh the descriptor from the live server according to the
    /// configured [`RefreshPolicy`].
    pub async fn refresh_info(&mut self) -> RefreshOutcome {
        let policy = self.config.refresh;
        let display_name = self.display_name().unwrap_or_default().to_string();

        let Some(descriptor) = self.descriptor.as_mut() else {
            return RefreshOutcome::Skipped;
        };

        let probe = if policy.query_server {
            Some(
                self.services
                    .probe
                    .probe(&descriptor.ip, descriptor.port, self.config.probe_timeout)
                    .await,
            )
        } else {
            None
        };

        let outcome = apply_refresh(
            descriptor,
            policy,
            probe,
            &self.config.static_info,
            &display_name,
        );
        descriptor.fallback_host_name(&display_name);
        outcome
    }

    /// Run one heartbeat: refresh, push the update, and classify the result.
    pub async fn update_cycle(&mut self) -> CycleOutcome {
        if self.state != ManagerState::Active {
            debug!(state = ?self.state, "skipping update cycle");
            return CycleOutcome::Skipped;
        }

        self.refresh_info().await;

        let (Some(identity), Some(session_id), Some(descriptor)) = (
            self.identity.as_ref(),
            self.session_id.clone(),
            self.descriptor.as_ref(),
        ) else {
            return CycleOutcome::Skipped;
        };

        let request = UpdateSessionRequest::new(descriptor);
        let outcome = self
            .services
            .directory
            .update_session(identity, &session_id, &request)
            .await;

        match outcome {
            UpdateOutcome::Updated => {
                if self.config.suppress_update_info {
                    debug!(session_id = %session_id, "Updated session!");
                } else {
                    info!(session_id = %session_id, "Updated session!");
                }
                if self.friend_sync {
                    self.sync_friends().await;
                }
                CycleOutcome::Updated
            }
            UpdateOutcome::SessionGone => self.handle_session_gone(session_id).await,
            UpdateOutcome::TransientError(e) => {
                error!(session_id = %session_id, "Failed to update session: {}", e);
                CycleOutcome::Transient(e)
            }
        }
    }

    async fn handle_session_gone(&mut self, session_id: String) -> CycleOutcome {
        warn!(session_id = %session_id, "Session no longer exists on the directory, restarting");

        self.session_id = None;
        if let Err(e) = self.state.transition_to(ManagerState::Restarting) {
            error!("{}", e);
            return CycleOutcome::Skipped;
        }

        let display_name = self.display_name().unwrap_or_default().to_string();
        self.services
            .notifier
            .notify(NotificationEvent::SessionExpired {
                session_id,
                display_name,
            })
            .await;

        self.restart.request_restart();
        CycleOutcome::Restarting
    }

    async fn sync_friends(&self) {
        let Some(identity) = self.identity.as_ref() else {
            return;
        };
        sync_friends(
            self.services.friends.as_ref(),
            identity,
            &self.config.friend_accounts,
            &self.services.notifier,
        )
        .await;
    }

    /// Release the remote session if still owned and stop for good.
    ///
    /// Calling this again is a no-op.
    pub async fn shutdown(&mut self) {
        if self.state.is_terminal() {
            return;
        }

        if let (Some(identity), Some(session_id)) = (self.identity.as_ref(), self.session_id.take()) {
            match self
                .services
                .directory
                .leave_session(identity, &session_id)
                .await
            {
                Ok(()) => info!(session_id = %session_id, "Left session"),
                Err(e) => warn!(session_id = %session_id, "Failed to leave session: {}", e),
            }
        }

        self.state = ManagerState::ShutDown;
    }
}
