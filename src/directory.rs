//! Remote session directory client.
//!
//! Creation failures are errors. Update results are a tagged
//! [`UpdateOutcome`] so the caller can tell a session the directory no longer
//! knows about apart from an ordinary network hiccup.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::auth::Identity;
use crate::error::BroadcastError;
use crate::wire::{CreateSessionRequest, UpdateSessionRequest};
use crate::Result;

/// Default directory endpoint.
pub const DEFAULT_DIRECTORY_URL: &str = "https://sessiondirectory.xboxlive.com";

/// Service configuration the sessions are published under.
pub const DEFAULT_SERVICE_CONFIG_ID: &str = "4fc10100-5f7a-4470-899b-280835760c07";

/// Session template name.
pub const DEFAULT_TEMPLATE_NAME: &str = "MinecraftLobby";

/// Contract version header value required by the directory.
pub const CONTRACT_VERSION: &str = "107";

/// Result of submitting an update document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The directory accepted the update.
    Updated,
    /// The directory no longer holds this session; it must be recreated.
    SessionGone,
    /// Any other failure; the next scheduled cycle retries.
    TransientError(String),
}

/// Map an update response status onto an outcome.
pub fn classify_update_status(status: StatusCode) -> UpdateOutcome {
    if status.is_success() {
        UpdateOutcome::Updated
    } else if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        UpdateOutcome::SessionGone
    } else {
        UpdateOutcome::TransientError(format!("directory returned {}", status))
    }
}

/// Operations on the remote session directory.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Create the session and join it as owner.
    async fn create_session(
        &self,
        identity: &Identity,
        session_id: &str,
        request: &CreateSessionRequest,
    ) -> Result<()>;

    /// Refresh the properties of an existing session.
    async fn update_session(
        &self,
        identity: &Identity,
        session_id: &str,
        request: &UpdateSessionRequest,
    ) -> UpdateOutcome;

    /// Leave the session so the directory can drop it.
    async fn leave_session(&self, identity: &Identity, session_id: &str) -> Result<()>;
}

/// HTTP client for the session directory.
#[derive(Clone)]
pub struct HttpSessionDirectory {
    client: Client,
    base_url: String,
    service_config_id: String,
    template_name: String,
}

impl HttpSessionDirectory {
    /// Create a client for `base_url` with the given request timeout.
    pub fn new(
        base_url: &str,
        service_config_id: &str,
        template_name: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BroadcastError::Directory(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_config_id: service_config_id.to_string(),
            template_name: template_name.to_string(),
        })
    }

    /// URL of a session document.
    pub fn session_url(&self, session_id: &str) -> String {
        format!(
            "{}/serviceconfigs/{}/sessionTemplates/{}/sessions/{}",
            self.base_url, self.service_config_id, self.template_name, session_id
        )
    }
}

#[async_trait]
impl SessionDirectory for HttpSessionDirectory {
    async fn create_session(
        &self,
        identity: &Identity,
        session_id: &str,
        request: &CreateSessionRequest,
    ) -> Result<()> {
        let response = self
            .client
            .put(self.session_url(session_id))
            .header("Authorization", &identity.authorization)
            .header("x-xbl-contract-version", CONTRACT_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| BroadcastError::Directory(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BroadcastError::Directory(format!(
                "create returned {}: {}",
                status, body
            )));
        }

        debug!(session_id, "created session");
        Ok(())
    }

    async fn update_session(
        &self,
        identity: &Identity,
        session_id: &str,
        request: &UpdateSessionRequest,
    ) -> UpdateOutcome {
        let response = self
            .client
            .put(self.session_url(session_id))
            .header("Authorization", &identity.authorization)
            .header("x-xbl-contract-version", CONTRACT_VERSION)
            .json(request)
            .send()
            .await;

        match response {
            Ok(response) => classify_update_status(response.status()),
            Err(e) => UpdateOutcome::TransientError(e.to_string()),
        }
    }

    async fn leave_session(&self, identity: &Identity, session_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/members/me", self.session_url(session_id)))
            .header("Authorization", &identity.authorization)
            .header("x-xbl-contract-version", CONTRACT_VERSION)
            .send()
            .await
            .map_err(|e| BroadcastError::Directory(e.to_string()))?;

        let status = response.status();
        if !status.is_success() && status != StatusCode::NOT_FOUND {
            warn!(session_id, %status, "leave request rejected");
            return Err(BroadcastError::Directory(format!("leave returned {}", status)));
        }
        Ok(())
    }
}
