//! Operator notifications.
//!
//! [`Notifier`] renders a [`NotificationEvent`] through a per-event template
//! and hands the text to a [`NotificationSink`]. Delivery failures are logged
//! and never reach the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error};

use crate::error::BroadcastError;
use crate::Result;

/// Default template for [`NotificationEvent::SessionExpired`].
pub const DEFAULT_SESSION_EXPIRED_MESSAGE: &str =
    "The session {session_id} advertised by {display_name} expired and is being recreated.";

/// Default template for [`NotificationEvent::FriendRestricted`].
pub const DEFAULT_FRIEND_RESTRICTION_MESSAGE: &str =
    "{username} ({xuid}) has privacy settings that prevent adding them as a friend.";

/// Default template for [`NotificationEvent::RestartFailed`].
pub const DEFAULT_RESTART_FAILED_MESSAGE: &str =
    "Failed to recreate the session for {display_name}: {error}. Retrying.";

/// Something an operator should hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationEvent {
    /// The directory dropped the session.
    SessionExpired {
        session_id: String,
        display_name: String,
    },
    /// A friend-sync account refuses friend requests.
    FriendRestricted { username: String, xuid: String },
    /// Recreating the session after it expired failed; a retry is queued.
    RestartFailed { display_name: String, error: String },
}

impl NotificationEvent {
    /// Placeholder values available to this event's template.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::SessionExpired {
                session_id,
                display_name,
            } => vec![
                ("session_id", session_id.as_str()),
                ("display_name", display_name.as_str()),
            ],
            Self::FriendRestricted { username, xuid } => {
                vec![("username", username.as_str()), ("xuid", xuid.as_str())]
            }
            Self::RestartFailed {
                display_name,
                error,
            } => vec![
                ("display_name", display_name.as_str()),
                ("error", error.as_str()),
            ],
        }
    }
}

/// Fill `{name}` placeholders in `template` in one left-to-right pass.
///
/// Substituted values are never rescanned. Unknown placeholders are kept.
pub fn render(template: &str, fields: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        let value = after.find('}').and_then(|close| {
            let name = &after[..close];
            fields
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, value)| (close, *value))
        });

        match value {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

/// Notifier settings.
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// When false, nothing is ever delivered.
    pub enabled: bool,
    pub session_expired_message: String,
    pub friend_restriction_message: String,
    pub restart_failed_message: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            session_expired_message: DEFAULT_SESSION_EXPIRED_MESSAGE.to_string(),
            friend_restriction_message: DEFAULT_FRIEND_RESTRICTION_MESSAGE.to_string(),
            restart_failed_message: DEFAULT_RESTART_FAILED_MESSAGE.to_string(),
        }
    }
}

/// Delivery mechanism for rendered messages.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one message.
    async fn deliver(&self, message: &str) -> Result<()>;
}

/// Formats events and dispatches them to a sink.
pub struct Notifier {
    config: NotifierConfig,
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    /// Create a notifier delivering through `sink`.
    pub fn new(config: NotifierConfig, sink: Arc<dyn NotificationSink>) -> Self {
        Self { config, sink }
    }

    /// A notifier that never delivers anything.
    pub fn disabled() -> Self {
        Self::new(NotifierConfig::default(), Arc::new(NullSink))
    }

    /// Whether delivery is enabled.
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Render the message for `event`.
    pub fn format(&self, event: &NotificationEvent) -> String {
        let template = match event {
            NotificationEvent::SessionExpired { .. } => &self.config.session_expired_message,
            NotificationEvent::FriendRestricted { .. } => &self.config.friend_restriction_message,
            NotificationEvent::RestartFailed { .. } => &self.config.restart_failed_message,
        };
        render(template, &event.fields())
    }

    /// Send exactly one message for `event`, if enabled.
    pub async fn notify(&self, event: NotificationEvent) {
        if !self.config.enabled {
            return;
        }

        let message = self.format(&event);
        match self.sink.deliver(&message).await {
            Ok(()) => debug!("notification delivered"),
            Err(e) => error!("Failed to send notification: {}", e),
        }
    }
}

/// Sink that drops every message.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

#[async_trait]
impl NotificationSink for NullSink {
    async fn deliver(&self, _message: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts messages to a Slack-compatible incoming webhook.
#[derive(Clone)]
pub struct SlackWebhookSink {
    client: Client,
    url: String,
}

impl SlackWebhookSink {
    /// Create a sink posting to `url`, bounding each delivery by `timeout`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BroadcastError::Notification(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl NotificationSink for SlackWebhookSink {
    async fn deliver(&self, message: &str) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { text: message })
            .send()
            .await
            .map_err(|e| BroadcastError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BroadcastError::Notification(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
