//! Webhook Ingestion Integration Tests
//!
//! Tests for Mode C: completion-edge filtering, bounded recording
//! readiness polling, lead fan-out, and deliberate event drops.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use callvault::adapters::{
    CallSource, RecordingAudio, RecordingAvailability, RecordingInfo, SourceError, Transcriber,
};
use callvault::domain::{
    CallDirection, CallMetadata, CallRecordEvent, PhoneNumber, TranscriptContent,
    TranscriptOutput, TranscriptRecord,
};
use callvault::ingest::{
    DropReason, EventOutcome, IngestionPipeline, ReadinessPolicy, WebhookEventProcessor,
};
use callvault::store::{LeadFolderStore, LocalFolderStore};
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

const ROOT: &str = "ProjectLeads";

/// Call source that counts every probe, reports the recording pending for
/// a configurable number of probes, and serves a canned transcript.
struct CountingSource {
    info_calls: AtomicUsize,
    transcript_calls: AtomicUsize,
    probes_until_ready: usize,
    transcript: Option<serde_json::Value>,
    call: CallMetadata,
}

impl CountingSource {
    fn new(probes_until_ready: usize) -> Self {
        Self {
            info_calls: AtomicUsize::new(0),
            transcript_calls: AtomicUsize::new(0),
            probes_until_ready,
            transcript: Some(serde_json::json!({"utterances": ["webhook call"]})),
            call: CallMetadata {
                direction: Some(CallDirection::Inbound),
                duration: Some(120),
                start_time: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()),
                end_time: None,
                from: Some(PhoneNumber::normalize("5551234567")),
                to: Some(PhoneNumber::normalize("5559876543")),
            },
        }
    }

    fn without_transcript(mut self) -> Self {
        self.transcript = None;
        self
    }

    fn info_count(&self) -> usize {
        self.info_calls.load(Ordering::SeqCst)
    }

    fn transcript_count(&self) -> usize {
        self.transcript_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CallSource for CountingSource {
    fn name(&self) -> &str {
        "counting"
    }

    async fn list_calls(
        &self,
        _number: &PhoneNumber,
        _since: DateTime<Utc>,
    ) -> Result<Vec<CallRecordEvent>, SourceError> {
        Ok(vec![])
    }

    async fn recording_info(&self, recording_id: &str) -> Result<RecordingInfo, SourceError> {
        let probe = self.info_calls.fetch_add(1, Ordering::SeqCst) + 1;
        // The provider 404s the session while the recording renders.
        if probe <= self.probes_until_ready {
            return Err(SourceError::NotFound(recording_id.to_string()));
        }
        Ok(RecordingInfo {
            recording_id: recording_id.to_string(),
            availability: RecordingAvailability::Available,
            content_uri: None,
            call: self.call.clone(),
        })
    }

    async fn fetch_recording_audio(
        &self,
        _recording_id: &str,
    ) -> Result<RecordingAudio, SourceError> {
        Ok(RecordingAudio {
            availability: RecordingAvailability::Pending,
            bytes: None,
        })
    }

    async fn fetch_transcript(&self, recording_id: &str) -> Result<serde_json::Value, SourceError> {
        self.transcript_calls.fetch_add(1, Ordering::SeqCst);
        match &self.transcript {
            Some(payload) => Ok(payload.clone()),
            None => Err(SourceError::TranscriptUnavailable {
                recording_id: recording_id.to_string(),
            }),
        }
    }
}

struct FakeTranscriber;

#[async_trait]
impl Transcriber for FakeTranscriber {
    fn name(&self) -> &str {
        "fake-engine"
    }

    async fn transcribe(&self, _audio: &[u8]) -> anyhow::Result<TranscriptOutput> {
        Ok(TranscriptOutput {
            text: "unused".to_string(),
            segments: vec![],
            language: None,
        })
    }
}

/// Tests never want to sit through real readiness delays.
fn instant_readiness(max_attempts: u32) -> ReadinessPolicy {
    ReadinessPolicy {
        max_attempts,
        initial_delay_ms: 0,
        max_delay_ms: 0,
        backoff_multiplier: 1.0,
    }
}

fn completed_event(session_id: &str, from: &str, to: &str) -> String {
    serde_json::json!({
        "body": {
            "sessionId": session_id,
            "parties": [{
                "from": {"phoneNumber": from},
                "to": {"phoneNumber": to},
                "status": {"code": "Disconnected"}
            }]
        }
    })
    .to_string()
}

/// Create a lead folder holding one transcript that involves `number`, so
/// the resolver associates the folder with it.
async fn seed_lead(store: &LocalFolderStore, lead: &str, number: &str) -> String {
    let folder = format!("{ROOT}/{lead}");
    store.ensure_folder_tree(&folder).await.unwrap();
    let record = TranscriptRecord::new(
        format!("seed_{lead}"),
        CallMetadata {
            start_time: Some(Utc.with_ymd_and_hms(2023, 6, 1, 9, 0, 0).unwrap()),
            from: Some(PhoneNumber::normalize(number)),
            to: Some(PhoneNumber::normalize("5550009999")),
            ..Default::default()
        },
        TranscriptContent::Provider(serde_json::json!({})),
    );
    let path = format!(
        "{folder}/Transcripts_JSON/{}",
        record.file_name(Utc::now())
    );
    store
        .write_file(&path, &serde_json::to_vec(&record).unwrap())
        .await
        .unwrap();
    folder
}

async fn transcript_count(store: &LocalFolderStore, folder: &str) -> usize {
    store
        .list_files(&format!("{folder}/Transcripts_JSON"))
        .await
        .map(|files| files.len())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_in_progress_event_touches_nothing() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());
    let transcriber = FakeTranscriber;
    let pipeline = IngestionPipeline::new(&store, &transcriber);
    let source = CountingSource::new(0);
    let lead = seed_lead(&store, "123_Main_Smith", "5551234567").await;

    let processor = WebhookEventProcessor::new(&source, &store, &pipeline, ROOT)
        .with_readiness(instant_readiness(3));

    let payload = serde_json::json!({
        "body": {
            "sessionId": "s-100",
            "parties": [{
                "from": {"phoneNumber": "+15551234567"},
                "status": {"code": "Answered"}
            }]
        }
    })
    .to_string();
    let outcome = processor.process_event(&payload).await.unwrap();

    // No provider traffic, no writes: the call is still in progress.
    assert_eq!(outcome, EventOutcome::Filtered);
    assert_eq!(source.info_count(), 0);
    assert_eq!(source.transcript_count(), 0);
    assert_eq!(transcript_count(&store, &lead).await, 1);
}

#[tokio::test]
async fn test_completed_call_lands_in_every_matching_folder() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());
    let transcriber = FakeTranscriber;
    let pipeline = IngestionPipeline::new(&store, &transcriber);
    let source = CountingSource::new(0);

    // One lead knows the caller, another knows the callee.
    let caller_lead = seed_lead(&store, "123_Main_Smith", "5551234567").await;
    let callee_lead = seed_lead(&store, "456_Oak_Jones", "5559876543").await;
    seed_lead(&store, "789_Pine_Brown", "5550001111").await;

    let processor = WebhookEventProcessor::new(&source, &store, &pipeline, ROOT)
        .with_readiness(instant_readiness(3));

    let payload = completed_event("s-200", "+15551234567", "5559876543");
    let outcome = processor.process_event(&payload).await.unwrap();

    assert_eq!(
        outcome,
        EventOutcome::Processed {
            session_id: "s-200".to_string(),
            folders: vec![caller_lead.clone(), callee_lead.clone()],
        }
    );

    // Each matched folder got the session transcript; the unrelated lead
    // keeps only its seed record.
    for folder in [&caller_lead, &callee_lead] {
        let files = store
            .list_files(&format!("{folder}/Transcripts_JSON"))
            .await
            .unwrap();
        assert_eq!(files.len(), 2);
        assert!(
            files.iter().any(|f| f.name.ends_with("_s-200.json")),
            "missing session transcript in {folder}"
        );
    }
    assert_eq!(
        transcript_count(&store, "ProjectLeads/789_Pine_Brown").await,
        1
    );
}

#[tokio::test]
async fn test_recording_readiness_is_polled_until_available() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());
    let transcriber = FakeTranscriber;
    let pipeline = IngestionPipeline::new(&store, &transcriber);

    // The first two probes 404, the third reports the recording ready.
    let source = CountingSource::new(2);
    seed_lead(&store, "123_Main_Smith", "5551234567").await;

    let processor = WebhookEventProcessor::new(&source, &store, &pipeline, ROOT)
        .with_readiness(instant_readiness(3));

    let payload = completed_event("s-300", "+15551234567", "5550008888");
    let outcome = processor.process_event(&payload).await.unwrap();

    assert!(matches!(outcome, EventOutcome::Processed { .. }));
    assert_eq!(source.info_count(), 3);
}

#[tokio::test]
async fn test_event_dropped_when_recording_never_ready() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());
    let transcriber = FakeTranscriber;
    let pipeline = IngestionPipeline::new(&store, &transcriber);

    let source = CountingSource::new(usize::MAX);
    let lead = seed_lead(&store, "123_Main_Smith", "5551234567").await;

    let processor = WebhookEventProcessor::new(&source, &store, &pipeline, ROOT)
        .with_readiness(instant_readiness(2));

    let payload = completed_event("s-400", "+15551234567", "5559876543");
    let outcome = processor.process_event(&payload).await.unwrap();

    assert_eq!(
        outcome,
        EventOutcome::Dropped {
            session_id: "s-400".to_string(),
            reason: DropReason::RecordingNotReady(RecordingAvailability::Pending),
        }
    );

    // The policy bounds the probes; nothing was fetched or written.
    assert_eq!(source.info_count(), 2);
    assert_eq!(source.transcript_count(), 0);
    assert_eq!(transcript_count(&store, &lead).await, 1);
}

#[tokio::test]
async fn test_event_dropped_when_no_lead_matches() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());
    let transcriber = FakeTranscriber;
    let pipeline = IngestionPipeline::new(&store, &transcriber);
    let source = CountingSource::new(0);

    // The only lead on file involves an unrelated number.
    let lead = seed_lead(&store, "789_Pine_Brown", "5550001111").await;

    let processor = WebhookEventProcessor::new(&source, &store, &pipeline, ROOT)
        .with_readiness(instant_readiness(3));

    let payload = completed_event("s-500", "+15551234567", "5559876543");
    let outcome = processor.process_event(&payload).await.unwrap();

    assert_eq!(
        outcome,
        EventOutcome::Dropped {
            session_id: "s-500".to_string(),
            reason: DropReason::NoMatchingLeads,
        }
    );
    assert_eq!(transcript_count(&store, &lead).await, 1);
}

#[tokio::test]
async fn test_event_dropped_when_provider_has_no_transcript() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());
    let transcriber = FakeTranscriber;
    let pipeline = IngestionPipeline::new(&store, &transcriber);
    let source = CountingSource::new(0).without_transcript();
    let lead = seed_lead(&store, "123_Main_Smith", "5551234567").await;

    let processor = WebhookEventProcessor::new(&source, &store, &pipeline, ROOT)
        .with_readiness(instant_readiness(3));

    let payload = completed_event("s-600", "+15551234567", "5559876543");
    let outcome = processor.process_event(&payload).await.unwrap();

    assert_eq!(
        outcome,
        EventOutcome::Dropped {
            session_id: "s-600".to_string(),
            reason: DropReason::TranscriptUnavailable,
        }
    );
    assert_eq!(transcript_count(&store, &lead).await, 1);
}

#[tokio::test]
async fn test_redelivered_event_lands_on_the_same_file() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());
    let transcriber = FakeTranscriber;
    let pipeline = IngestionPipeline::new(&store, &transcriber);
    let source = CountingSource::new(0);
    let lead = seed_lead(&store, "123_Main_Smith", "5551234567").await;

    let processor = WebhookEventProcessor::new(&source, &store, &pipeline, ROOT)
        .with_readiness(instant_readiness(3));

    // Providers re-deliver; both deliveries must land on one file.
    let payload = completed_event("s-700", "+15551234567", "5559876543");
    let first = processor.process_event(&payload).await.unwrap();
    let second = processor.process_event(&payload).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(transcript_count(&store, &lead).await, 2);
}
