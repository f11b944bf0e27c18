//! Configuration management for session-broadcast.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::directory::{DEFAULT_DIRECTORY_URL, DEFAULT_SERVICE_CONFIG_ID, DEFAULT_TEMPLATE_NAME};
use crate::friends::{FriendAccount, DEFAULT_SOCIAL_URL};
use crate::ping::DEFAULT_WEB_QUERY_URL;
use crate::notify::{
    NotifierConfig, DEFAULT_FRIEND_RESTRICTION_MESSAGE, DEFAULT_RESTART_FAILED_MESSAGE,
    DEFAULT_SESSION_EXPIRED_MESSAGE,
};
use crate::session::{ManagerConfig, RefreshPolicy, StaticSessionInfo};

/// Shortest update interval the directory tolerates.
pub const MIN_UPDATE_INTERVAL_SECS: u64 = 20;

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Advertised session settings.
    pub session: SessionSection,
    /// Friend sync settings.
    pub friend_sync: FriendSyncSection,
    /// Operator notification settings.
    pub notifications: NotificationsSection,
    /// Remote service endpoints.
    pub directory: DirectorySection,
    /// Directory holding the cached credential.
    pub cache_dir: PathBuf,
    /// Enable debug logging.
    pub debug_log: bool,
    /// Log "Updated session" at debug instead of info.
    pub suppress_session_update_info: bool,
    /// Log level filter (error, warn, info, debug, trace).
    pub log_level: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionSection::default(),
            friend_sync: FriendSyncSection::default(),
            notifications: NotificationsSection::default(),
            directory: DirectorySection::default(),
            cache_dir: PathBuf::from("./cache"),
            debug_log: false,
            suppress_session_update_info: false,
            log_level: None,
        }
    }
}

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Seconds between heartbeats.
    pub update_interval: u64,
    /// Query the server live for its status.
    pub query_server: bool,
    /// Reset to `session_info` when the live query fails.
    pub config_fallback: bool,
    /// Probe timeout in milliseconds.
    pub probe_timeout_ms: u64,
    /// Ask a public status API when the direct query fails.
    pub web_query_fallback: bool,
    /// Base URL of that status API.
    pub web_query_url: String,
    /// Static session values.
    pub session_info: StaticSessionInfo,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            update_interval: 30,
            query_server: true,
            config_fallback: false,
            probe_timeout_ms: 1500,
            web_query_fallback: false,
            web_query_url: DEFAULT_WEB_QUERY_URL.to_string(),
            session_info: StaticSessionInfo::default(),
        }
    }
}

/// Friend sync configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FriendSyncSection {
    /// Run friend sync after each successful update.
    pub enabled: bool,
    /// Accounts to keep friended.
    pub accounts: Vec<FriendAccount>,
}

/// Notification configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsSection {
    /// Enable notifications.
    pub enabled: bool,
    /// Incoming webhook URL.
    pub webhook_url: String,
    /// Template for expired sessions. Placeholders: `{session_id}`, `{display_name}`.
    pub session_expired_message: String,
    /// Template for restricted friends. Placeholders: `{username}`, `{xuid}`.
    pub friend_restriction_message: String,
    /// Template for a failed session restart. Placeholders: `{display_name}`, `{error}`.
    pub restart_failed_message: String,
    /// Delivery timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for NotificationsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            session_expired_message: DEFAULT_SESSION_EXPIRED_MESSAGE.to_string(),
            friend_restriction_message: DEFAULT_FRIEND_RESTRICTION_MESSAGE.to_string(),
            restart_failed_message: DEFAULT_RESTART_FAILED_MESSAGE.to_string(),
            timeout_secs: 10,
        }
    }
}

/// Remote service configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectorySection {
    /// Session directory base URL.
    pub url: String,
    /// Social service base URL.
    pub social_url: String,
    /// Service configuration id.
    pub service_config_id: String,
    /// Session template name.
    pub template_name: String,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for DirectorySection {
    fn default() -> Self {
        Self {
            url: DEFAULT_DIRECTORY_URL.to_string(),
            social_url: DEFAULT_SOCIAL_URL.to_string(),
            service_config_id: DEFAULT_SERVICE_CONFIG_ID.to_string(),
            template_name: DEFAULT_TEMPLATE_NAME.to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Write the default configuration to `path`.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(&Config::default()).map_err(ConfigError::Json)?;
        std::fs::write(path, json).map_err(ConfigError::Io)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(ip) = std::env::var("SESSION_BROADCAST_IP") {
            self.session.session_info.ip = ip;
        }

        if let Ok(port) = std::env::var("SESSION_BROADCAST_PORT") {
            if let Ok(port) = port.parse() {
                self.session.session_info.port = port;
            }
        }

        if let Ok(url) = std::env::var("SESSION_BROADCAST_WEBHOOK") {
            if !url.is_empty() {
                self.notifications.enabled = true;
                self.notifications.webhook_url = url;
            }
        }

        if let Ok(level) = std::env::var("SESSION_BROADCAST_LOG_LEVEL") {
            self.log_level = Some(level);
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(ref dir) = args.cache_dir {
            self.cache_dir = dir.clone();
        }

        if args.debug {
            self.debug_log = true;
        }

        if args.no_query {
            self.session.query_server = false;
        }

        if let Some(ref level) = args.log_level {
            self.log_level = Some(level.clone());
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults. A missing
    /// config file is created with default values.
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) if path.exists() => Config::from_file(path)?,
            Some(ref path) => {
                Config::write_default(path)?;
                Config::default()
            }
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);
        config.validate()?;

        Ok(config)
    }

    /// Reject static configuration that can never produce a valid session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let info = &self.session.session_info;
        if info.ip.trim().is_empty() {
            return Err(ConfigError::Invalid("session.session_info.ip is empty".into()));
        }
        if info.players > info.max_players {
            return Err(ConfigError::Invalid(format!(
                "session.session_info.players ({}) exceeds max_players ({})",
                info.players, info.max_players
            )));
        }
        if self.notifications.enabled && self.notifications.webhook_url.is_empty() {
            return Err(ConfigError::Invalid(
                "notifications are enabled but notifications.webhook_url is empty".into(),
            ));
        }
        if self.session.web_query_fallback && self.session.web_query_url.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session.web_query_fallback is on but session.web_query_url is empty".into(),
            ));
        }
        Ok(())
    }

    /// Non-fatal problems, meant to be logged once logging is up.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.session.update_interval < MIN_UPDATE_INTERVAL_SECS {
            warnings.push(format!(
                "session.update_interval {}s is below the minimum, using {}s",
                self.session.update_interval, MIN_UPDATE_INTERVAL_SECS
            ));
        }
        warnings
    }

    /// Heartbeat period actually used.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.session.update_interval.max(MIN_UPDATE_INTERVAL_SECS))
    }

    /// Convert to the session manager's settings.
    pub fn to_manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            update_interval: self.update_interval(),
            refresh: RefreshPolicy {
                query_server: self.session.query_server,
                config_fallback: self.session.config_fallback,
            },
            probe_timeout: Duration::from_millis(self.session.probe_timeout_ms),
            static_info: self.session.session_info.clone(),
            friend_accounts: self.friend_sync.accounts.clone(),
            suppress_update_info: self.suppress_session_update_info,
            ..ManagerConfig::default()
        }
    }

    /// Convert to the notifier's settings.
    pub fn to_notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            enabled: self.notifications.enabled,
            session_expired_message: self.notifications.session_expired_message.clone(),
            friend_restriction_message: self.notifications.friend_restriction_message.clone(),
            restart_failed_message: self.notifications.restart_failed_message.clone(),
        }
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> String {
        match self.log_level {
            Some(ref level) => level.clone(),
            None if self.debug_log => "session_broadcast=debug".to_string(),
            None => "session_broadcast=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Semantically invalid configuration.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::Invalid(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
