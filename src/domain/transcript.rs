//! The persisted transcript record and its file naming scheme.
//!
//! A `TranscriptRecord` is the canonical unit this system produces: one JSON
//! file per recording per lead folder, carrying the call metadata needed to
//! re-associate the file with a phone number later. File names are derived
//! from the call start time and the recording id, which is what makes
//! re-ingestion land on the same path instead of accumulating copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CallDirection, CallRecordEvent, PhoneNumber};

/// One timed segment of an engine-produced transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Segment start, seconds from the beginning of the audio
    #[serde(default)]
    pub start: f64,

    /// Segment end, seconds from the beginning of the audio
    #[serde(default)]
    pub end: f64,

    /// Transcribed text for this segment
    pub text: String,
}

/// Output of a local transcription engine run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptOutput {
    /// Full transcribed text
    pub text: String,

    /// Timed segments, when the engine produced them
    #[serde(default)]
    pub segments: Vec<TranscriptSegment>,

    /// Detected language, when the engine reported one
    #[serde(default)]
    pub language: Option<String>,
}

/// The transcript payload of a persisted record.
///
/// Either the engine-native shape produced by a local transcription run, or
/// the provider's transcript payload stored verbatim. Readers that only care
/// about call metadata never need to look inside.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TranscriptContent {
    Native(TranscriptOutput),
    Provider(serde_json::Value),
}

/// Call metadata embedded in every persisted record.
///
/// Every field is optional on read: records written by earlier tooling may
/// miss fields or carry nulls, and a lenient parse here is what keeps the
/// resolver scan alive across old data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallMetadata {
    #[serde(default)]
    pub direction: Option<CallDirection>,

    /// Call duration in seconds
    #[serde(default)]
    pub duration: Option<u64>,

    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,

    /// Calling party, normalized on read
    #[serde(default)]
    pub from: Option<PhoneNumber>,

    /// Called party, normalized on read
    #[serde(default)]
    pub to: Option<PhoneNumber>,
}

impl CallMetadata {
    /// Whether either party of the call is the given number.
    pub fn involves(&self, number: &PhoneNumber) -> bool {
        self.from.as_ref() == Some(number) || self.to.as_ref() == Some(number)
    }
}

impl From<&CallRecordEvent> for CallMetadata {
    fn from(event: &CallRecordEvent) -> Self {
        Self {
            direction: Some(event.direction),
            duration: Some(event.duration),
            start_time: Some(event.start_time),
            end_time: event.end_time,
            from: event.from.clone(),
            to: event.to.clone(),
        }
    }
}

/// The persisted transcript record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// Provider recording id, or a content-hash pseudo id for backfilled
    /// audio that never had one
    #[serde(default)]
    pub recording_id: String,

    /// Backfill provenance: the file this record was recovered from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file: Option<String>,

    /// Backfill provenance: the folder the file was recovered from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_location: Option<String>,

    pub call_metadata: CallMetadata,

    pub transcript: TranscriptContent,
}

impl TranscriptRecord {
    pub fn new(
        recording_id: impl Into<String>,
        call_metadata: CallMetadata,
        transcript: TranscriptContent,
    ) -> Self {
        Self {
            recording_id: recording_id.into(),
            original_file: None,
            original_location: None,
            call_metadata,
            transcript,
        }
    }

    /// Attach backfill provenance (where the audio was found).
    pub fn with_provenance(
        mut self,
        original_file: impl Into<String>,
        original_location: impl Into<String>,
    ) -> Self {
        self.original_file = Some(original_file.into());
        self.original_location = Some(original_location.into());
        self
    }

    /// The file name this record persists under.
    pub fn file_name(&self, fallback_time: DateTime<Utc>) -> String {
        let stamp = self.call_metadata.start_time.unwrap_or(fallback_time);
        transcript_file_name(stamp, &self.recording_id)
    }
}

/// Timestamp stamp used in every generated file name.
pub fn time_stamp(t: DateTime<Utc>) -> String {
    t.format("%Y%m%d_%H%M%S").to_string()
}

/// Deterministic transcript file name: `transcript_<stamp>_<recordingId>.json`.
pub fn transcript_file_name(start_time: DateTime<Utc>, recording_id: &str) -> String {
    format!("transcript_{}_{}.json", time_stamp(start_time), recording_id)
}

/// Deterministic audio file name:
/// `call_<stamp>_<direction>_<durationSec>sec_<recordingId>.mp3`.
pub fn recording_file_name(
    start_time: DateTime<Utc>,
    direction: CallDirection,
    duration_secs: u64,
    recording_id: &str,
) -> String {
    format!(
        "call_{}_{}_{}sec_{}.mp3",
        time_stamp(start_time),
        direction,
        duration_secs,
        recording_id
    )
}
