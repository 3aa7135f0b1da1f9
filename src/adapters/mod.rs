//! Adapter interfaces for external systems.
//!
//! Adapters provide a unified interface for the telephony provider (call
//! log, recordings, provider transcripts) and the local speech-to-text
//! engine, so the ingestion pipeline never touches HTTP or subprocesses
//! directly.

pub mod ringcentral;
pub mod whisper;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{CallMetadata, CallRecordEvent, PhoneNumber, TranscriptOutput};

// Re-export the concrete adapters
pub use ringcentral::{authenticate, BearerToken, RingCentralClient};
pub use whisper::WhisperTranscriber;

/// Errors surfaced by a call source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Credentials were rejected; the whole invocation aborts on this
    #[error("call source authentication failed: {0}")]
    AuthFailed(String),

    /// The provider has no transcript for this recording
    #[error("no provider transcript for recording {recording_id}")]
    TranscriptUnavailable { recording_id: String },

    /// The recording exists but its content is not downloadable yet
    #[error("recording {recording_id} not ready ({availability})")]
    RecordingNotReady {
        recording_id: String,
        availability: RecordingAvailability,
    },

    /// The provider knows nothing about the requested resource
    #[error("call source resource not found: {0}")]
    NotFound(String),

    /// Any other provider-side rejection
    #[error("call source API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider answered with something we could not parse
    #[error("malformed call source response: {0}")]
    Malformed(String),

    #[error("call source request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Whether a recording's content can be downloaded right now.
///
/// `Pending` means the provider is still processing the recording and a
/// later attempt may succeed; `Unknown` means the provider reported a state
/// this code does not recognize, which is treated as terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingAvailability {
    Available,
    Pending,
    Unknown,
}

impl fmt::Display for RecordingAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "available",
            Self::Pending => "pending",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Recording metadata as reported by the provider.
#[derive(Debug, Clone)]
pub struct RecordingInfo {
    pub recording_id: String,

    pub availability: RecordingAvailability,

    /// Where the audio content lives, when the provider exposes it
    pub content_uri: Option<String>,

    /// Call metadata attached to the recording; fields the provider did not
    /// report stay `None`
    pub call: CallMetadata,
}

/// Result of a recording content fetch.
///
/// `bytes` is populated only when the recording was `Available`; callers
/// decide whether a missing body is a skip or a retry.
#[derive(Debug, Clone)]
pub struct RecordingAudio {
    pub availability: RecordingAvailability,
    pub bytes: Option<Vec<u8>>,
}

/// Trait for the telephony provider.
#[async_trait]
pub trait CallSource: Send + Sync {
    /// Human-readable source name
    fn name(&self) -> &str;

    /// List voice calls involving `number` since `since`.
    async fn list_calls(
        &self,
        number: &PhoneNumber,
        since: DateTime<Utc>,
    ) -> Result<Vec<CallRecordEvent>, SourceError>;

    /// Fetch recording metadata, including its availability status.
    async fn recording_info(&self, recording_id: &str) -> Result<RecordingInfo, SourceError>;

    /// Fetch the recording audio; bytes are present only when available.
    async fn fetch_recording_audio(
        &self,
        recording_id: &str,
    ) -> Result<RecordingAudio, SourceError>;

    /// Fetch the provider-generated transcript for a recording.
    async fn fetch_transcript(
        &self,
        recording_id: &str,
    ) -> Result<serde_json::Value, SourceError>;
}

/// Trait for local speech-to-text engines.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Engine name for logs
    fn name(&self) -> &str;

    /// Transcribe raw audio bytes.
    async fn transcribe(&self, audio: &[u8]) -> Result<TranscriptOutput>;
}
