//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use session_broadcast::auth::{Authenticator, Identity};
use session_broadcast::friends::{FriendOutcome, FriendService};
use session_broadcast::notify::{NotificationSink, Notifier, NotifierConfig};
use session_broadcast::session::RefreshPolicy;
use session_broadcast::{
    BroadcastError, CreateSessionRequest, ManagerConfig, ProbeResult, RestartHook, Result,
    SessionDescriptor, SessionDirectory, SessionManager, SessionServices, StaticSessionInfo,
    StatusProbe, UpdateOutcome, UpdateSessionRequest,
};

pub const XUID: &str = "2535400000000000";
pub const GAMERTAG: &str = "Steve";

#[derive(Default)]
pub struct FakeAuthenticator {
    fail: AtomicBool,
}

impl FakeAuthenticator {
    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(&self) -> Result<Identity> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(BroadcastError::Auth("credential rejected".into()));
        }
        Ok(Identity {
            xuid: XUID.to_string(),
            gamertag: GAMERTAG.to_string(),
            authorization: "XBL3.0 x=uhs;token".to_string(),
        })
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    creates: AtomicUsize,
    updates: AtomicUsize,
    leaves: AtomicUsize,
    create_failures: AtomicUsize,
    scripted: Mutex<VecDeque<UpdateOutcome>>,
    last_update: Mutex<Option<UpdateSessionRequest>>,
    last_create: Mutex<Option<CreateSessionRequest>>,
}

impl FakeDirectory {
    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn leaves(&self) -> usize {
        self.leaves.load(Ordering::SeqCst)
    }

    /// Fail the next `n` create calls.
    pub fn fail_creates(&self, n: usize) {
        self.create_failures.store(n, Ordering::SeqCst);
    }

    /// Queue the outcome of a future update call. Unscripted calls succeed.
    pub fn push_update(&self, outcome: UpdateOutcome) {
        self.scripted.lock().unwrap().push_back(outcome);
    }

    pub fn last_update(&self) -> Option<UpdateSessionRequest> {
        self.last_update.lock().unwrap().clone()
    }

    pub fn last_create(&self) -> Option<CreateSessionRequest> {
        self.last_create.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionDirectory for FakeDirectory {
    async fn create_session(
        &self,
        _identity: &Identity,
        _session_id: &str,
        request: &CreateSessionRequest,
    ) -> Result<()> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let remaining = self.create_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.create_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BroadcastError::Directory("503 Service Unavailable".into()));
        }
        *self.last_create.lock().unwrap() = Some(request.clone());
        Ok(())
    }

    async fn update_session(
        &self,
        _identity: &Identity,
        _session_id: &str,
        request: &UpdateSessionRequest,
    ) -> UpdateOutcome {
        self.updates.fetch_add(1, Ordering::SeqCst);
        *self.last_update.lock().unwrap() = Some(request.clone());
        self.scripted
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(UpdateOutcome::Updated)
    }

    async fn leave_session(&self, _identity: &Identity, _session_id: &str) -> Result<()> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Probe answering with a fixed result, or failing when none is set.
#[derive(Default)]
pub struct FakeProbe {
    result: Mutex<Option<ProbeResult>>,
    calls: AtomicUsize,
}

impl FakeProbe {
    pub fn answer(&self, result: Option<ProbeResult>) {
        *self.result.lock().unwrap() = result;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatusProbe for FakeProbe {
    async fn probe(&self, _host: &str, _port: u16, _timeout: Duration) -> Result<ProbeResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.result
            .lock()
            .unwrap()
            .clone()
            .ok_or(BroadcastError::Timeout)
    }
}

#[derive(Default)]
pub struct FakeFriends {
    outcomes: Mutex<HashMap<String, FriendOutcome>>,
    calls: AtomicUsize,
}

impl FakeFriends {
    pub fn set(&self, xuid: &str, outcome: FriendOutcome) {
        self.outcomes.lock().unwrap().insert(xuid.to_string(), outcome);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FriendService for FakeFriends {
    async fn add_friend(&self, _identity: &Identity, xuid: &str) -> FriendOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.outcomes
            .lock()
            .unwrap()
            .get(xuid)
            .cloned()
            .unwrap_or(FriendOutcome::Added)
    }
}

#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, message: &str) -> Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct CountingRestart {
    count: AtomicUsize,
}

impl CountingRestart {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RestartHook for CountingRestart {
    fn request_restart(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}

/// A full set of fakes wired together.
pub struct Fixture {
    pub authenticator: Arc<FakeAuthenticator>,
    pub directory: Arc<FakeDirectory>,
    pub probe: Arc<FakeProbe>,
    pub friends: Arc<FakeFriends>,
    pub sink: Arc<RecordingSink>,
    pub restarts: Arc<CountingRestart>,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            authenticator: Arc::new(FakeAuthenticator::default()),
            directory: Arc::new(FakeDirectory::default()),
            probe: Arc::new(FakeProbe::default()),
            friends: Arc::new(FakeFriends::default()),
            sink: Arc::new(RecordingSink::default()),
            restarts: Arc::new(CountingRestart::default()),
        }
    }

    pub fn services(&self) -> SessionServices {
        let notifier = Notifier::new(
            NotifierConfig {
                enabled: true,
                ..NotifierConfig::default()
            },
            self.sink.clone(),
        );

        SessionServices {
            authenticator: self.authenticator.clone(),
            directory: self.directory.clone(),
            probe: self.probe.clone(),
            friends: self.friends.clone(),
            notifier: Arc::new(notifier),
        }
    }

    pub fn manager(&self, config: ManagerConfig) -> SessionManager {
        SessionManager::new(config, self.services(), self.restarts.clone())
    }

    /// `{host:"", world:"Survival World", players:2, max:10, ip:127.0.0.1:19132}`
    pub fn descriptor(&self) -> SessionDescriptor {
        SessionDescriptor::from_static(&survival_world())
    }
}

pub fn survival_world() -> StaticSessionInfo {
    StaticSessionInfo {
        host_name: String::new(),
        world_name: "Survival World".to_string(),
        players: 2,
        max_players: 10,
        ip: "127.0.0.1".to_string(),
        port: 19132,
    }
}

/// Probing off, no retry delay.
pub fn quick_config() -> ManagerConfig {
    ManagerConfig {
        update_interval: Duration::from_millis(20),
        refresh: RefreshPolicy {
            query_server: false,
            config_fallback: false,
        },
        create_retry_delay: Duration::ZERO,
        ..ManagerConfig::default()
    }
}
