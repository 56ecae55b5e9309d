//! Credential issuance and SDP exchange with the realtime provider.
//!
//! The long-lived API key is used exactly once per session, to obtain a
//! short-lived client credential; the media handshake itself is
//! authorized only by that credential.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::events::TranscriptionConfig;
use crate::error::CoachError;

/// Bounded wait for credential and handshake calls so a dead endpoint
/// fails the session instead of hanging it.
const SIGNALING_TIMEOUT: Duration = Duration::from_secs(10);

const REALTIME_BETA_HEADER: &str = "openai-beta";
const REALTIME_BETA_VALUE: &str = "realtime-v1";

/// Which kind of realtime session a credential is scoped to. The two
/// modes are distinguished by endpoint path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Full speech-in/speech-out session
    Interactive,
    /// Transcription-only session, the mode the coaching pipeline runs
    TranscriptionOnly,
}

impl SessionMode {
    pub fn credential_path(&self) -> &'static str {
        match self {
            SessionMode::Interactive => "/v1/realtime/sessions",
            SessionMode::TranscriptionOnly => "/v1/realtime/transcription_sessions",
        }
    }
}

/// Short-lived credential returned by the provider, valid for one
/// handshake.
#[derive(Clone)]
pub struct ClientCredential {
    pub secret: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CredentialResponse {
    client_secret: ClientSecret,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecret {
    value: String,
}

/// Signaling operations a session needs to negotiate its transport.
#[async_trait]
pub trait Signaling: Send + Sync {
    /// POST the session configuration with the long-lived key and obtain
    /// a short-lived client credential.
    async fn request_credential(
        &self,
        mode: SessionMode,
        config: &TranscriptionConfig,
    ) -> Result<ClientCredential, CoachError>;

    /// POST the local SDP offer authorized by the short-lived credential
    /// and return the remote answer.
    async fn exchange_offer(
        &self,
        credential: &ClientCredential,
        offer_sdp: &str,
    ) -> Result<String, CoachError>;
}

/// HTTP signaling client against the provider's realtime endpoints.
pub struct SignalingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SignalingClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, CoachError> {
        let http = reqwest::Client::builder()
            .timeout(SIGNALING_TIMEOUT)
            .build()
            .map_err(|e| CoachError::connection("client", e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Signaling for SignalingClient {
    async fn request_credential(
        &self,
        mode: SessionMode,
        config: &TranscriptionConfig,
    ) -> Result<ClientCredential, CoachError> {
        let url = format!("{}{}", self.base_url, mode.credential_path());

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .header(REALTIME_BETA_HEADER, REALTIME_BETA_VALUE)
            .json(config)
            .send()
            .await
            .map_err(|e| CoachError::connection("credential", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoachError::connection(
                "credential",
                format!("HTTP {status}: {body}"),
            ));
        }

        let payload: CredentialResponse = response
            .json()
            .await
            .map_err(|e| CoachError::connection("credential", e.to_string()))?;

        Ok(ClientCredential {
            secret: payload.client_secret.value,
            session_id: payload.id,
        })
    }

    async fn exchange_offer(
        &self,
        credential: &ClientCredential,
        offer_sdp: &str,
    ) -> Result<String, CoachError> {
        let url = format!("{}/v1/realtime", self.base_url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&credential.secret)
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_owned())
            .send()
            .await
            .map_err(|e| CoachError::connection("handshake", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoachError::connection(
                "handshake",
                format!("HTTP {status}: {body}"),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| CoachError::connection("handshake", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_modes_map_to_distinct_endpoints() {
        assert_eq!(
            SessionMode::Interactive.credential_path(),
            "/v1/realtime/sessions"
        );
        assert_eq!(
            SessionMode::TranscriptionOnly.credential_path(),
            "/v1/realtime/transcription_sessions"
        );
    }

    #[test]
    fn base_url_trailing_slash_is_normalized() {
        let client = SignalingClient::new("https://api.example.com/", "sk-test").unwrap();
        assert_eq!(client.base_url, "https://api.example.com");
    }

    #[test]
    fn credential_response_parses_nested_secret() {
        let raw = r#"{"id": "sess_42", "client_secret": {"value": "ek_abc"}}"#;
        let parsed: CredentialResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.client_secret.value, "ek_abc");
        assert_eq!(parsed.id.as_deref(), Some("sess_42"));
    }
}
