//! Process-level owner of the broadcast.
//!
//! [`Broadcaster`] holds the configuration, the shared collaborators, and the
//! one running schedule. When a manager reports its session gone, the
//! restart request arrives here over a channel; the old schedule is fully
//! stopped before a new manager is created.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::auth::{FileStorage, StoredCredentialAuthenticator};
use crate::config::Config;
use crate::directory::HttpSessionDirectory;
use crate::friends::HttpFriendService;
use crate::notify::{NotificationEvent, Notifier, NullSink, SlackWebhookSink};
use crate::ping::{FallbackProbe, RakNetProbe, StatusProbe, WebStatusProbe};
use crate::session::{
    ManagerConfig, RestartHook, ScheduleHandle, SessionDescriptor, SessionManager,
    SessionServices,
};
use crate::Result;

/// Restart hook that forwards requests to the owning [`Broadcaster`].
#[derive(Clone)]
pub struct ChannelRestartHook {
    tx: mpsc::UnboundedSender<()>,
}

impl ChannelRestartHook {
    /// Create a hook sending on `tx`.
    pub fn new(tx: mpsc::UnboundedSender<()>) -> Self {
        Self { tx }
    }
}

impl RestartHook for ChannelRestartHook {
    fn request_restart(&self) {
        if self.tx.send(()).is_err() {
            warn!("restart requested after broadcaster stopped");
        }
    }
}

/// Build the production collaborators from configuration.
pub fn services_from_config(config: &Config) -> Result<SessionServices> {
    let timeout = Duration::from_secs(config.directory.request_timeout_secs);

    let notifier = if config.notifications.enabled {
        let sink = SlackWebhookSink::new(
            &config.notifications.webhook_url,
            Duration::from_secs(config.notifications.timeout_secs),
        )?;
        Notifier::new(config.to_notifier_config(), Arc::new(sink))
    } else {
        Notifier::new(config.to_notifier_config(), Arc::new(NullSink))
    };

    let storage = Arc::new(FileStorage::new(&config.cache_dir));

    let probe: Arc<dyn StatusProbe> = if config.session.web_query_fallback {
        let web = WebStatusProbe::new(&config.session.web_query_url, timeout)?;
        Arc::new(FallbackProbe::new(Arc::new(RakNetProbe::new()), Arc::new(web)))
    } else {
        Arc::new(RakNetProbe::new())
    };

    Ok(SessionServices {
        authenticator: Arc::new(StoredCredentialAuthenticator::new(storage)),
        directory: Arc::new(HttpSessionDirectory::new(
            &config.directory.url,
            &config.directory.service_config_id,
            &config.directory.template_name,
            timeout,
        )?),
        probe,
        friends: Arc::new(HttpFriendService::new(&config.directory.social_url, timeout)?),
        notifier: Arc::new(notifier),
    })
}

/// Owns the active session schedule for the life of the process.
pub struct Broadcaster {
    manager_config: ManagerConfig,
    friend_sync: bool,
    services: SessionServices,
    descriptor: SessionDescriptor,
    restart_tx: mpsc::UnboundedSender<()>,
    restart_rx: mpsc::UnboundedReceiver<()>,
    schedule: Option<ScheduleHandle>,
    display_name: String,
    restarts: u64,
    restart_failing: bool,
}

impl Broadcaster {
    /// Create a broadcaster using the production collaborators.
    pub fn from_config(config: &Config) -> Result<Self> {
        let services = services_from_config(config)?;
        Ok(Self::with_services(
            config.to_manager_config(),
            config.friend_sync.enabled,
            services,
        ))
    }

    /// Create a broadcaster with explicit collaborators.
    pub fn with_services(
        manager_config: ManagerConfig,
        friend_sync: bool,
        services: SessionServices,
    ) -> Self {
        let (restart_tx, restart_rx) = mpsc::unbounded_channel();
        let descriptor = SessionDescriptor::from_static(&manager_config.static_info);

        Self {
            manager_config,
            friend_sync,
            services,
            descriptor,
            restart_tx,
            restart_rx,
            schedule: None,
            display_name: String::new(),
            restarts: 0,
            restart_failing: false,
        }
    }

    /// Number of completed restarts.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Whether a schedule is currently running.
    pub fn is_running(&self) -> bool {
        self.schedule.as_ref().is_some_and(|s| s.is_running())
    }

    fn new_manager(&self) -> SessionManager {
        SessionManager::new(
            self.manager_config.clone(),
            self.services.clone(),
            Arc::new(ChannelRestartHook::new(self.restart_tx.clone())),
        )
    }

    /// Create the session and start its heartbeat.
    ///
    /// A creation failure here is returned to the caller.
    pub async fn start(&mut self) -> Result<()> {
        let mut manager = self.new_manager();
        manager.init(self.descriptor.clone(), self.friend_sync).await?;
        self.adopt(manager);
        Ok(())
    }

    fn adopt(&mut self, manager: SessionManager) {
        if let Some(descriptor) = manager.descriptor() {
            self.descriptor = descriptor.clone();
        }
        if let Some(name) = manager.display_name() {
            self.display_name = name.to_string();
        }
        let period = manager.config().update_interval;
        self.schedule = Some(ScheduleHandle::spawn(manager, period));
    }

    /// Tear down the current manager and bring up a new one.
    ///
    /// On failure the restart is requested again after one update interval.
    /// The first failure of a streak raises a
    /// [`NotificationEvent::RestartFailed`].
    pub async fn restart(&mut self) {
        info!("Restarting session");

        if let Some(mut schedule) = self.schedule.take() {
            if let Some(old) = schedule.shutdown().await {
                if let Some(descriptor) = old.descriptor() {
                    self.descriptor = descriptor.clone();
                }
            }
        }

        let mut manager = self.new_manager();
        match manager.init(self.descriptor.clone(), self.friend_sync).await {
            Ok(()) => {
                self.restarts += 1;
                self.restart_failing = false;
                self.adopt(manager);
            }
            Err(e) => {
                error!("Failed to restart session: {}", e);
                if !self.restart_failing {
                    self.restart_failing = true;
                    self.services
                        .notifier
                        .notify(NotificationEvent::RestartFailed {
                            display_name: self.display_name.clone(),
                            error: e.to_string(),
                        })
                        .await;
                }
                let tx = self.restart_tx.clone();
                let delay = self.manager_config.update_interval;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(());
                });
            }
        }
    }

    /// Wait for the next restart request and service it.
    ///
    /// Returns `false` if no more requests can arrive.
    pub async fn handle_next_restart(&mut self) -> bool {
        match self.restart_rx.recv().await {
            Some(()) => {
                self.restart().await;
                true
            }
            None => false,
        }
    }

    /// Run until Ctrl-C, servicing restart requests.
    pub async fn run(mut self) -> Result<()> {
        self.start().await?;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
                Some(()) = self.restart_rx.recv() => self.restart().await,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stop the schedule and release the session. Idempotent.
    pub async fn shutdown(&mut self) {
        if let Some(mut schedule) = self.schedule.take() {
            schedule.shutdown().await;
        }
    }
}
