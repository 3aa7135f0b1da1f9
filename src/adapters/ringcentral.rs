//! RingCentral REST adapter.
//!
//! Covers the four provider surfaces the pipeline needs:
//! - OAuth token exchange (JWT bearer grant)
//! - call log listing (`/call-log`)
//! - recording metadata and content (`/recording/{id}`)
//! - RingSense transcripts (`/call-recordings/{id}/ringsense`)

use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::adapters::{
    CallSource, RecordingAudio, RecordingAvailability, RecordingInfo, SourceError,
};
use crate::domain::{CallDirection, CallMetadata, CallRecordEvent, PhoneNumber};

const DEFAULT_SERVER_URL: &str = "https://platform.ringcentral.com";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Connection settings for RingCentral.
///
/// Credentials come from the environment only; they are never read from a
/// config file and never written anywhere.
#[derive(Clone)]
pub struct RingCentralSettings {
    pub server_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Pre-issued JWT assertion for the bearer grant
    pub jwt: String,
}

impl RingCentralSettings {
    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let server_url =
            std::env::var("RC_SERVER_URL").unwrap_or_else(|_| DEFAULT_SERVER_URL.to_string());
        let client_id =
            std::env::var("RC_CLIENT_ID").context("RC_CLIENT_ID environment variable required")?;
        let client_secret = std::env::var("RC_CLIENT_SECRET")
            .context("RC_CLIENT_SECRET environment variable required")?;
        let jwt =
            std::env::var("RC_JWT_TOKEN").context("RC_JWT_TOKEN environment variable required")?;
        Ok(Self {
            server_url,
            client_id,
            client_secret,
            jwt,
        })
    }
}

/// An access token obtained at invocation start.
///
/// Immutable value: refreshing means running `authenticate` again and
/// building a new client. The token text never appears in Debug output.
#[derive(Clone)]
pub struct BearerToken {
    access_token: String,
    acquired_at: DateTime<Utc>,
    expires_in_secs: i64,
}

impl BearerToken {
    pub fn new(access_token: impl Into<String>, expires_in_secs: i64) -> Self {
        Self {
            access_token: access_token.into(),
            acquired_at: Utc::now(),
            expires_in_secs,
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.acquired_at + Duration::seconds(self.expires_in_secs)
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at()
    }

    fn secret(&self) -> &str {
        &self.access_token
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("access_token", &"[redacted]")
            .field("expires_at", &self.expires_at())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

/// Exchange the JWT assertion for a bearer token.
pub async fn authenticate(settings: &RingCentralSettings) -> Result<BearerToken, SourceError> {
    let url = format!(
        "{}/restapi/oauth/token",
        settings.server_url.trim_end_matches('/')
    );

    let response = reqwest::Client::new()
        .post(&url)
        .basic_auth(&settings.client_id, Some(&settings.client_secret))
        .form(&[
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", settings.jwt.as_str()),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        // The token endpoint answers 400 for a rejected assertion, 401 for
        // bad client credentials; both mean "fix your credentials".
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::AuthFailed(format!(
            "token exchange rejected ({status}): {body}"
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| SourceError::Malformed(format!("token response: {e}")))?;

    debug!("Obtained bearer token, expires in {}s", token.expires_in);
    Ok(BearerToken::new(token.access_token, token.expires_in))
}

/// RingCentral API client.
pub struct RingCentralClient {
    server_url: String,
    token: BearerToken,
    client: reqwest::Client,
}

impl RingCentralClient {
    /// Create a client around an already-obtained token
    pub fn new(server_url: impl Into<String>, token: BearerToken) -> Self {
        Self {
            server_url: server_url.into(),
            token,
            client: reqwest::Client::new(),
        }
    }

    /// Authenticate and build a client in one step
    pub async fn connect(settings: &RingCentralSettings) -> Result<Self, SourceError> {
        let token = authenticate(settings).await?;
        Ok(Self::new(settings.server_url.clone(), token))
    }

    /// Build API URL
    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), path)
    }

    /// Map non-success statuses onto the source error taxonomy.
    async fn checked(response: reqwest::Response) -> Result<reqwest::Response, SourceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 | 403 => SourceError::AuthFailed(format!("({status}) {message}")),
            404 => SourceError::NotFound(message),
            code => SourceError::Api {
                status: code,
                message,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct CallLogResponse {
    #[serde(default)]
    records: Vec<CallLogRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallLogRecord {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    direction: CallDirection,
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    from: Option<CallLeg>,
    #[serde(default)]
    to: Option<CallLeg>,
    #[serde(default)]
    recording: Option<RecordingRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CallLeg {
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordingRef {
    id: String,
}

impl CallLogRecord {
    fn into_event(self) -> Option<CallRecordEvent> {
        // A record without a start time cannot produce deterministic file
        // names downstream; the provider always sends one in practice.
        let start_time = self.start_time?;
        Some(CallRecordEvent {
            recording_id: self.recording.map(|r| r.id),
            session_id: self.session_id,
            direction: self.direction,
            duration: self.duration,
            start_time,
            end_time: self.end_time,
            from: self.from.and_then(|leg| leg.phone_number).map(PhoneNumber::from),
            to: self.to.and_then(|leg| leg.phone_number).map(PhoneNumber::from),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordingMetadata {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    content_uri: Option<String>,
    #[serde(default)]
    direction: Option<CallDirection>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    from: Option<CallLeg>,
    #[serde(default)]
    to: Option<CallLeg>,
}

fn availability_from_status(status: Option<&str>) -> RecordingAvailability {
    match status {
        Some("Available") => RecordingAvailability::Available,
        Some("Pending") | Some("InProgress") => RecordingAvailability::Pending,
        _ => RecordingAvailability::Unknown,
    }
}

#[async_trait::async_trait]
impl CallSource for RingCentralClient {
    fn name(&self) -> &str {
        "ringcentral"
    }

    async fn list_calls(
        &self,
        number: &PhoneNumber,
        since: DateTime<Utc>,
    ) -> Result<Vec<CallRecordEvent>, SourceError> {
        let url = self.api_url("/restapi/v1.0/account/~/call-log");
        let date_from = since.format("%Y-%m-%dT%H:%M:%S.000Z").to_string();

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.secret())
            .query(&[
                ("type", "Voice"),
                ("phoneNumber", number.as_str()),
                ("view", "Detailed"),
                ("dateFrom", date_from.as_str()),
            ])
            .send()
            .await?;
        let response = Self::checked(response).await?;

        let payload: CallLogResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("call log response: {e}")))?;

        let events: Vec<CallRecordEvent> = payload
            .records
            .into_iter()
            .filter_map(CallLogRecord::into_event)
            .collect();

        debug!(count = events.len(), phone = %number, "Listed call records");
        Ok(events)
    }

    async fn recording_info(&self, recording_id: &str) -> Result<RecordingInfo, SourceError> {
        let url = self.api_url(&format!("/restapi/v1.0/account/~/recording/{recording_id}"));

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.secret())
            .send()
            .await?;
        let response = Self::checked(response).await?;

        let metadata: RecordingMetadata = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("recording metadata: {e}")))?;

        Ok(RecordingInfo {
            recording_id: recording_id.to_string(),
            availability: availability_from_status(metadata.status.as_deref()),
            content_uri: metadata.content_uri,
            call: CallMetadata {
                direction: metadata.direction,
                duration: metadata.duration,
                start_time: metadata.start_time,
                end_time: metadata.end_time,
                from: metadata
                    .from
                    .and_then(|leg| leg.phone_number)
                    .map(PhoneNumber::from),
                to: metadata
                    .to
                    .and_then(|leg| leg.phone_number)
                    .map(PhoneNumber::from),
            },
        })
    }

    async fn fetch_recording_audio(
        &self,
        recording_id: &str,
    ) -> Result<RecordingAudio, SourceError> {
        let info = self.recording_info(recording_id).await?;
        if info.availability != RecordingAvailability::Available {
            return Ok(RecordingAudio {
                availability: info.availability,
                bytes: None,
            });
        }

        let content_url = info.content_uri.unwrap_or_else(|| {
            self.api_url(&format!(
                "/restapi/v1.0/account/~/recording/{recording_id}/content"
            ))
        });

        let response = self
            .client
            .get(&content_url)
            .bearer_auth(self.token.secret())
            .send()
            .await?;
        let response = Self::checked(response).await?;
        let bytes = response.bytes().await?;

        debug!(recording_id, size = bytes.len(), "Downloaded recording audio");
        Ok(RecordingAudio {
            availability: RecordingAvailability::Available,
            bytes: Some(bytes.to_vec()),
        })
    }

    async fn fetch_transcript(
        &self,
        recording_id: &str,
    ) -> Result<serde_json::Value, SourceError> {
        let url = self.api_url(&format!(
            "/restapi/v1.0/account/~/call-recordings/{recording_id}/ringsense"
        ));

        let response = self
            .client
            .get(&url)
            .bearer_auth(self.token.secret())
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Err(SourceError::TranscriptUnavailable {
                recording_id: recording_id.to_string(),
            });
        }
        let response = Self::checked(response).await?;

        let transcript: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SourceError::Malformed(format!("transcript response: {e}")))?;

        // An empty answer means the provider has not produced one (yet).
        if transcript.is_null() {
            return Err(SourceError::TranscriptUnavailable {
                recording_id: recording_id.to_string(),
            });
        }
        Ok(transcript)
    }
}
