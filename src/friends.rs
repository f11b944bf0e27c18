//! Friend sync: keep configured accounts friended with the proxy identity so
//! they can see the advertised session.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::auth::Identity;
use crate::error::BroadcastError;
use crate::notify::{NotificationEvent, Notifier};
use crate::Result;

/// Default social endpoint.
pub const DEFAULT_SOCIAL_URL: &str = "https://social.xboxlive.com";

/// An account that should be friended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendAccount {
    pub xuid: String,
    /// Display name used in notifications.
    #[serde(default)]
    pub username: String,
}

/// Result of adding one friend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FriendOutcome {
    Added,
    /// The account's privacy settings refuse the request.
    Restricted,
    /// Any other failure. Logged and skipped.
    Failed(String),
}

/// Social graph operations.
#[async_trait]
pub trait FriendService: Send + Sync {
    /// Add `xuid` as a friend of `identity`.
    async fn add_friend(&self, identity: &Identity, xuid: &str) -> FriendOutcome;
}

/// HTTP client for the social service.
#[derive(Clone)]
pub struct HttpFriendService {
    client: Client,
    base_url: String,
}

impl HttpFriendService {
    /// Create a client for `base_url` with the given request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BroadcastError::Directory(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl FriendService for HttpFriendService {
    async fn add_friend(&self, identity: &Identity, xuid: &str) -> FriendOutcome {
        let url = format!(
            "{}/users/xuid({})/people/xuid({})",
            self.base_url, identity.xuid, xuid
        );
        let response = self
            .client
            .put(url)
            .header("Authorization", &identity.authorization)
            .send()
            .await;

        match response {
            Ok(response) => match response.status() {
                s if s.is_success() => FriendOutcome::Added,
                StatusCode::FORBIDDEN => FriendOutcome::Restricted,
                s => FriendOutcome::Failed(format!("social service returned {}", s)),
            },
            Err(e) => FriendOutcome::Failed(e.to_string()),
        }
    }
}

/// Per-batch tally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FriendSyncReport {
    pub added: usize,
    pub restricted: usize,
    pub failed: usize,
}

/// Friend every account in `accounts`, continuing past per-account failures.
///
/// Restricted accounts raise a [`NotificationEvent::FriendRestricted`] each.
pub async fn sync_friends(
    service: &dyn FriendService,
    identity: &Identity,
    accounts: &[FriendAccount],
    notifier: &Notifier,
) -> FriendSyncReport {
    let mut report = FriendSyncReport::default();

    for account in accounts {
        match service.add_friend(identity, &account.xuid).await {
            FriendOutcome::Added => {
                debug!(xuid = %account.xuid, "friend added");
                report.added += 1;
            }
            FriendOutcome::Restricted => {
                let username = if account.username.is_empty() {
                    account.xuid.clone()
                } else {
                    account.username.clone()
                };
                warn!(xuid = %account.xuid, "{} has friend restrictions", username);
                notifier
                    .notify(NotificationEvent::FriendRestricted {
                        username,
                        xuid: account.xuid.clone(),
                    })
                    .await;
                report.restricted += 1;
            }
            FriendOutcome::Failed(e) => {
                warn!(xuid = %account.xuid, "Failed to add friend: {}", e);
                report.failed += 1;
            }
        }
    }

    if report.restricted > 0 || report.failed > 0 {
        info!(
            added = report.added,
            restricted = report.restricted,
            failed = report.failed,
            "friend sync finished with skipped accounts"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{NotificationSink, NotifierConfig};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct ScriptedFriends(HashMap<String, FriendOutcome>);

    #[async_trait]
    impl FriendService for ScriptedFriends {
        async fn add_friend(&self, _identity: &Identity, xuid: &str) -> FriendOutcome {
            self.0.get(xuid).cloned().unwrap_or(FriendOutcome::Added)
        }
    }

    #[derive(Default)]
    struct Messages(Mutex<Vec<String>>);

    #[async_trait]
    impl NotificationSink for Messages {
        async fn deliver(&self, message: &str) -> Result<()> {
            self.0.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn identity() -> Identity {
        Identity {
            xuid: "1".into(),
            gamertag: "Proxy".into(),
            authorization: "XBL3.0 x=u;t".into(),
        }
    }

    fn account(xuid: &str, username: &str) -> FriendAccount {
        FriendAccount {
            xuid: xuid.into(),
            username: username.into(),
        }
    }

    #[tokio::test]
    async fn test_partial_failure_continues() {
        let service = ScriptedFriends(HashMap::from([
            ("2".to_string(), FriendOutcome::Restricted),
            ("3".to_string(), FriendOutcome::Failed("timeout".into())),
            ("5".to_string(), FriendOutcome::Restricted),
        ]));
        let sink = Arc::new(Messages::default());
        let notifier = Notifier::new(
            NotifierConfig {
                enabled: true,
                ..NotifierConfig::default()
            },
            sink.clone(),
        );

        let accounts = vec![
            account("2", "Alex"),
            account("3", "Sam"),
            account("4", "Kai"),
            account("5", ""),
        ];
        let report = sync_friends(&service, &identity(), &accounts, &notifier).await;

        assert_eq!(
            report,
            FriendSyncReport {
                added: 1,
                restricted: 2,
                failed: 1,
            }
        );

        let messages = sink.0.lock().unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("Alex"));
        // Empty usernames fall back to the xuid.
        assert!(messages[1].starts_with("5 (5)"));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let service = ScriptedFriends(HashMap::new());
        let report = sync_friends(&service, &identity(), &[], &Notifier::disabled()).await;
        assert_eq!(report, FriendSyncReport::default());
    }
}
