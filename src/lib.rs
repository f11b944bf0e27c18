//! # session-broadcast
//!
//! Advertise a game server on a remote session directory so that friends
//! of a proxy account can discover and join it without knowing its address.
//!
//! The crate authenticates as the proxy identity, publishes a session
//! document describing the server, keeps it alive with periodic heartbeats,
//! refreshes the displayed status by pinging the server over its native
//! protocol, and recreates the session whenever the directory drops it.
//!
//! ## Features
//!
//! - **Session lifecycle**: create, heartbeat, expiry detection, restart
//! - **Live status**: RakNet unconnected ping with config fallback
//! - **Notifications**: webhook alerts for expired sessions and restricted friends
//! - **Friend sync**: keep configured accounts friended
//!
//! ## Quick Start
//!
//! ```no_run
//! use session_broadcast::{app::Broadcaster, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> session_broadcast::Result<()> {
//!     session_broadcast::logging::try_init("session_broadcast=info").ok();
//!
//!     let config = Config::default();
//!     Broadcaster::from_config(&config)?.run().await
//! }
//! ```

pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod directory;
pub mod error;
pub mod friends;
pub mod logging;
pub mod notify;
pub mod ping;
pub mod session;
pub mod wire;

// Re-export commonly used types
pub use app::Broadcaster;
pub use directory::{SessionDirectory, UpdateOutcome};
pub use error::{BroadcastError, Result};
pub use notify::{NotificationEvent, Notifier};
pub use ping::{ProbeResult, StatusProbe};
pub use session::{
    CycleOutcome, ManagerConfig, ManagerState, RestartHook, ScheduleHandle, SessionDescriptor,
    SessionManager, SessionServices, StaticSessionInfo,
};
pub use wire::{CreateSessionRequest, UpdateSessionRequest};
