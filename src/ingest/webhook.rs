//! Webhook-driven ingestion.
//!
//! The telephony provider pushes a notification for every call state
//! change; only the completion edge (a party reaching `Disconnected`)
//! triggers work. Recordings lag the call end, so readiness is polled
//! under a bounded backoff policy before the transcript is fetched and
//! fanned out to every lead folder the participants resolve to.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::adapters::{CallSource, RecordingAvailability, RecordingInfo, SourceError};
use crate::domain::{PhoneNumber, TranscriptContent, TranscriptRecord};
use crate::store::{LeadFolderStore, StoreError};

use super::pipeline::IngestionPipeline;
use super::resolver::AssociationResolver;

/// Party status code that marks the call-completion edge.
const DISCONNECTED: &str = "Disconnected";

/// Bounded backoff for waiting on provider-side recording readiness.
///
/// A recording is never ready at the instant the disconnect notification
/// arrives; the provider keeps reporting it pending (or 404s the session
/// outright) while it renders. The policy caps how long one delivery is
/// willing to wait before dropping the event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessPolicy {
    /// Maximum number of probes (including the first)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first probe in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between probes in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each probe)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    3
}
fn default_initial_delay() -> u64 {
    5000
}
fn default_max_delay() -> u64 {
    30000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl ReadinessPolicy {
    /// Calculate delay for a specific probe (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms);
        }

        let delay =
            self.initial_delay_ms as f64 * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Check if another probe is allowed after `attempt` probes
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Why a call-completion event was dropped without a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    MissingSessionId,
    NoPhoneNumbers,
    RecordingNotReady(RecordingAvailability),
    TranscriptUnavailable,
    NoMatchingLeads,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingSessionId => write!(f, "event carried no session id"),
            Self::NoPhoneNumbers => write!(f, "no party carried a phone number"),
            Self::RecordingNotReady(availability) => {
                write!(f, "recording still {availability} after readiness polling")
            }
            Self::TranscriptUnavailable => {
                write!(f, "provider has no transcript for the session")
            }
            Self::NoMatchingLeads => write!(f, "no lead folder matched any participant"),
        }
    }
}

/// Terminal state of one webhook delivery.
///
/// `Dropped` is deliberate at-most-once behavior: nothing is persisted
/// and nothing is queued, so provider re-delivery (or a later backfill)
/// is the only recovery path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not a telephony-session event, or no party has disconnected yet
    Filtered,
    /// Transcript written into every listed lead folder
    Processed {
        session_id: String,
        folders: Vec<String>,
    },
    /// Call-completion event that could not be carried to a write
    Dropped {
        session_id: String,
        reason: DropReason,
    },
}

// Wire shapes of the provider's telephony-session notification. Anything
// the filter does not need is left unmodeled and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
struct WebhookEnvelope {
    #[serde(default)]
    body: Option<SessionBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    parties: Vec<Party>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Party {
    #[serde(default)]
    from: Option<PartyEndpoint>,
    #[serde(default)]
    to: Option<PartyEndpoint>,
    #[serde(default)]
    status: Option<PartyStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartyEndpoint {
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PartyStatus {
    #[serde(default)]
    code: Option<String>,
}

impl SessionBody {
    fn has_disconnected_party(&self) -> bool {
        self.parties
            .iter()
            .any(|p| p.status.as_ref().and_then(|s| s.code.as_deref()) == Some(DISCONNECTED))
    }

    /// All normalized numbers on either side of any party.
    fn phone_numbers(&self) -> BTreeSet<PhoneNumber> {
        self.parties
            .iter()
            .flat_map(|p| [p.from.as_ref(), p.to.as_ref()])
            .flatten()
            .filter_map(|endpoint| endpoint.phone_number.clone())
            .map(PhoneNumber::from)
            .collect()
    }
}

/// Consumes inbound call-event payloads and turns call completions into
/// transcript writes across every matching lead folder.
pub struct WebhookEventProcessor<'a> {
    source: &'a dyn CallSource,
    pipeline: &'a IngestionPipeline<'a>,
    resolver: AssociationResolver<'a>,
    search_root: String,
    readiness: ReadinessPolicy,
}

impl<'a> WebhookEventProcessor<'a> {
    pub fn new(
        source: &'a dyn CallSource,
        store: &'a dyn LeadFolderStore,
        pipeline: &'a IngestionPipeline<'a>,
        search_root: impl Into<String>,
    ) -> Self {
        Self {
            source,
            pipeline,
            resolver: AssociationResolver::new(store),
            search_root: search_root.into(),
            readiness: ReadinessPolicy::default(),
        }
    }

    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Process one webhook delivery.
    ///
    /// Returns `Ok` for every outcome the design accepts, including drops;
    /// `Err` is reserved for malformed payloads and failures that re-running
    /// the delivery might not share (credential rejection, transport).
    #[instrument(skip_all)]
    pub async fn process_event(&self, payload: &str) -> Result<EventOutcome> {
        let envelope: WebhookEnvelope =
            serde_json::from_str(payload).context("Failed to parse webhook payload")?;

        let Some(body) = envelope.body else {
            debug!("Ignoring non-telephony event");
            return Ok(EventOutcome::Filtered);
        };
        if !body.has_disconnected_party() {
            debug!("No party disconnected yet, ignoring event");
            return Ok(EventOutcome::Filtered);
        }

        let Some(session_id) = body.session_id.clone() else {
            warn!("Call-completion event carried no session id, dropping");
            return Ok(EventOutcome::Dropped {
                session_id: String::new(),
                reason: DropReason::MissingSessionId,
            });
        };

        let numbers = body.phone_numbers();
        if numbers.is_empty() {
            warn!(session_id, "Call-completion event carried no phone numbers, dropping");
            return Ok(EventOutcome::Dropped {
                session_id,
                reason: DropReason::NoPhoneNumbers,
            });
        }

        info!(
            session_id,
            participants = numbers.len(),
            "Call completed, waiting for recording"
        );

        let recording = match self.await_recording(&session_id).await {
            Ok(info) => info,
            Err(SourceError::RecordingNotReady { availability, .. }) => {
                warn!(
                    session_id,
                    %availability,
                    "Recording not ready after readiness polling, dropping event"
                );
                return Ok(EventOutcome::Dropped {
                    session_id,
                    reason: DropReason::RecordingNotReady(availability),
                });
            }
            Err(e) => {
                return Err(e).context("Failed to probe recording readiness");
            }
        };

        let transcript = match self.source.fetch_transcript(&session_id).await {
            Ok(payload) => TranscriptContent::Provider(payload),
            Err(SourceError::TranscriptUnavailable { .. }) => {
                warn!(session_id, "Provider has no transcript for session, dropping event");
                return Ok(EventOutcome::Dropped {
                    session_id,
                    reason: DropReason::TranscriptUnavailable,
                });
            }
            Err(e) => {
                return Err(e).context("Failed to fetch provider transcript");
            }
        };

        // Fan out resolution across every participant and union the matches;
        // one number failing to resolve must not starve the others.
        let mut folders: BTreeSet<String> = BTreeSet::new();
        for number in &numbers {
            match self
                .resolver
                .find_lead_folders(number, &self.search_root)
                .await
            {
                Ok(scan) => folders.extend(scan.matches),
                Err(e @ StoreError::AuthFailed(_)) => {
                    return Err(e).context("Document store rejected credentials during resolution");
                }
                Err(e) => warn!("Lead resolution failed for {}: {}", number, e),
            }
        }

        if folders.is_empty() {
            warn!(session_id, "No lead folder matched any participant, dropping event");
            return Ok(EventOutcome::Dropped {
                session_id,
                reason: DropReason::NoMatchingLeads,
            });
        }

        let record = TranscriptRecord::new(&session_id, recording.call.clone(), transcript);
        let now = Utc::now();

        let mut delivered = Vec::new();
        for folder in &folders {
            match self.pipeline.write_transcript(folder, &record, now).await {
                Ok(_) => delivered.push(folder.clone()),
                Err(e) => warn!("Failed to deliver transcript to {}: {:#}", folder, e),
            }
        }

        if delivered.is_empty() {
            bail!(
                "failed to write transcript for session {} to any of {} matched folders",
                session_id,
                folders.len()
            );
        }

        info!(
            session_id,
            folders = delivered.len(),
            "Webhook transcript delivered"
        );

        Ok(EventOutcome::Processed {
            session_id,
            folders: delivered,
        })
    }

    /// Poll recording metadata until the provider reports it available.
    ///
    /// The first probe is itself delayed. `Pending` and provider 404s (the
    /// session is not yet visible while the recording renders) keep polling
    /// under the policy; `Unknown` is terminal and fails immediately.
    async fn await_recording(&self, session_id: &str) -> Result<RecordingInfo, SourceError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            tokio::time::sleep(self.readiness.delay_for_attempt(attempt)).await;

            match self.source.recording_info(session_id).await {
                Ok(info) => match info.availability {
                    RecordingAvailability::Available => return Ok(info),
                    RecordingAvailability::Unknown => {
                        return Err(SourceError::RecordingNotReady {
                            recording_id: session_id.to_string(),
                            availability: RecordingAvailability::Unknown,
                        })
                    }
                    RecordingAvailability::Pending => {}
                },
                Err(SourceError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }

            if !self.readiness.should_retry(attempt) {
                return Err(SourceError::RecordingNotReady {
                    recording_id: session_id.to_string(),
                    availability: RecordingAvailability::Pending,
                });
            }

            debug!(session_id, attempt, "Recording still pending, waiting");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COMPLETED_EVENT: &str = r#"{
        "body": {
            "sessionId": "s-900",
            "parties": [
                {
                    "from": {"phoneNumber": "+15551234567"},
                    "to": {"phoneNumber": "5559876543"},
                    "status": {"code": "Disconnected"}
                }
            ]
        }
    }"#;

    #[test]
    fn test_default_readiness_delays() {
        let policy = ReadinessPolicy::default();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(5000));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(10000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(20000));
        // capped
        assert_eq!(policy.delay_for_attempt(5), Duration::from_millis(30000));

        assert!(policy.should_retry(1));
        assert!(policy.should_retry(2));
        assert!(!policy.should_retry(3));
    }

    #[test]
    fn test_completed_event_parses() {
        let envelope: WebhookEnvelope = serde_json::from_str(COMPLETED_EVENT).unwrap();
        let body = envelope.body.unwrap();

        assert_eq!(body.session_id.as_deref(), Some("s-900"));
        assert!(body.has_disconnected_party());

        let numbers = body.phone_numbers();
        assert_eq!(numbers.len(), 2);
        assert!(numbers.contains(&PhoneNumber::from("+15551234567")));
        // normalized on the way in
        assert!(numbers.contains(&PhoneNumber::from("+15559876543")));
    }

    #[test]
    fn test_in_progress_call_is_not_completed() {
        let payload = r#"{
            "body": {
                "sessionId": "s-901",
                "parties": [
                    {"status": {"code": "Answered"}},
                    {"status": {"code": "Proceeding"}}
                ]
            }
        }"#;
        let envelope: WebhookEnvelope = serde_json::from_str(payload).unwrap();
        let body = envelope.body.unwrap();

        assert!(!body.has_disconnected_party());
        assert!(body.phone_numbers().is_empty());
    }

    #[test]
    fn test_non_telephony_event_has_no_body() {
        let envelope: WebhookEnvelope =
            serde_json::from_str(r#"{"event": "/subscription/renewed"}"#).unwrap();
        assert!(envelope.body.is_none());
    }
}
