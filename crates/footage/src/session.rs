// Federated media session negotiation.
//
// Each stream download runs under its own short-lived session credential.
// Sessions are requested for one hour, never renewed, and never shared
// between concurrent tasks; a task that outlives its session fails on the
// next fetch and is not retried.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::ApiClient;
use crate::error::EngineError;

const SESSION_PATH: &str = "/api/org/generateFederatedSessionToken";

/// Requested credential validity in seconds.
pub const SESSION_DURATION_SECS: i64 = 60 * 60;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionRequest {
    duration_sec: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    federated_session_token: String,
}

/// A short-lived credential scoped to one stream download.
#[derive(Debug, Clone)]
pub struct MediaSession {
    token: String,
    pub expires_at: DateTime<Utc>,
}

impl MediaSession {
    /// The `Cookie` header value media requests authenticate with.
    pub fn cookie_value(&self) -> String {
        format!("RSESSIONID=RFT:{}", self.token)
    }

    #[cfg(test)]
    pub fn for_tests(token: &str) -> Self {
        Self {
            token: token.to_owned(),
            expires_at: Utc::now(),
        }
    }
}

/// Seam for obtaining session credentials.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn negotiate(&self) -> Result<MediaSession, EngineError>;
}

/// Obtains federated session credentials from the remote service.
#[derive(Debug, Clone)]
pub struct SessionNegotiator {
    api: ApiClient,
}

impl SessionNegotiator {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SessionProvider for SessionNegotiator {
    /// Request a credential valid for up to one hour.
    ///
    /// Failures propagate; the caller aborts the affected stream rather than
    /// retrying.
    async fn negotiate(&self) -> Result<MediaSession, EngineError> {
        let request = SessionRequest {
            duration_sec: SESSION_DURATION_SECS,
        };
        let response: SessionResponse = self
            .api
            .post_json(SESSION_PATH, &request, "session negotiation")
            .await
            .map_err(|e| EngineError::session(e.to_string()))?;

        let session = MediaSession {
            token: response.federated_session_token,
            expires_at: Utc::now() + ChronoDuration::seconds(SESSION_DURATION_SECS),
        };
        debug!(expires_at = %session.expires_at, "negotiated media session");
        Ok(session)
    }
}
