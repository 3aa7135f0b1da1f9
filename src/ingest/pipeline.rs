//! The ingestion pipeline core.
//!
//! One pipeline, three entry modes:
//! - lookup: provider call log → transcript (or audio + local engine) → one
//!   known lead folder
//! - backfill: audio already sitting in other leads' folders → one target
//!   folder, with provenance
//! - webhook deliveries reuse the same write core via the webhook processor
//!
//! Work is strictly sequential: one recording at a time, one folder at a
//! time. A failure on one recording is logged and skipped; it never aborts
//! the rest of the batch. Credential rejections are the exception and abort
//! the invocation.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use crate::adapters::{CallSource, SourceError, Transcriber};
use crate::domain::{
    recording_file_name, CallDirection, CallMetadata, CallRecordEvent, PhoneNumber,
    TranscriptContent, TranscriptOutput, TranscriptRecord,
};
use crate::store::{join_path, recordings_folder, transcripts_folder, FileEntry, LeadFolderStore};

/// Default lookback window for provider call-log queries.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 30;

/// One successfully ingested recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedRecording {
    pub recording_id: String,
    pub transcript_path: String,
}

/// Result of a transcript write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// A new file was written at this path
    Written(String),

    /// The recording id already lives under this folder at this path
    AlreadyPresent(String),
}

impl WriteOutcome {
    pub fn path(&self) -> &str {
        match self {
            Self::Written(path) | Self::AlreadyPresent(path) => path,
        }
    }
}

/// Sidecar metadata some historical audio files carry (`<file>.mp3.json`).
#[derive(Debug, Default, Deserialize)]
struct RecordingSidecar {
    #[serde(default)]
    recording_id: Option<String>,
    #[serde(default)]
    direction: Option<CallDirection>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    from: Option<PhoneNumber>,
    #[serde(default)]
    to: Option<PhoneNumber>,
}

impl RecordingSidecar {
    fn involves(&self, number: &PhoneNumber) -> bool {
        self.from.as_ref() == Some(number) || self.to.as_ref() == Some(number)
    }

    fn call_metadata(&self) -> CallMetadata {
        CallMetadata {
            direction: self.direction,
            duration: self.duration,
            start_time: self.start_time,
            end_time: self.end_time,
            from: self.from.clone(),
            to: self.to.clone(),
        }
    }
}

/// Pseudo recording id for audio that never had a provider id: a stable
/// prefix of the content hash, so re-runs land on the same identity.
fn content_id(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    hex::encode(digest)[..12].to_string()
}

fn is_auth_failure(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<SourceError>(),
        Some(SourceError::AuthFailed(_))
    )
}

/// The pipeline core shared by every entry mode.
pub struct IngestionPipeline<'a> {
    store: &'a dyn LeadFolderStore,
    transcriber: &'a dyn Transcriber,
    lookback_days: i64,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(store: &'a dyn LeadFolderStore, transcriber: &'a dyn Transcriber) -> Self {
        Self {
            store,
            transcriber,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    /// Override the call-log lookback window
    pub fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }

    /// Mode A: pull recent calls for a known lead.
    ///
    /// Lists provider calls over the lookback window and ingests every
    /// recording into `lead_folder`. Per-recording failures are logged and
    /// skipped; the count of skips is visible only in the logs.
    #[instrument(skip(self, source), fields(phone = %phone, folder = lead_folder))]
    pub async fn run_lookup(
        &self,
        source: &dyn CallSource,
        phone: &PhoneNumber,
        lead_folder: &str,
    ) -> Result<Vec<ProcessedRecording>> {
        let since = Utc::now() - Duration::days(self.lookback_days);
        let calls = source
            .list_calls(phone, since)
            .await
            .context("Failed to list calls")?;

        info!(calls = calls.len(), "Retrieved call log");

        let mut processed = Vec::new();
        let mut skipped = 0usize;
        for call in &calls {
            let Some(recording_id) = call.recording_id.as_deref() else {
                continue;
            };
            match self.ingest_call(source, recording_id, call, lead_folder).await {
                Ok(Some(row)) => processed.push(row),
                Ok(None) => skipped += 1,
                Err(e) if is_auth_failure(&e) => {
                    return Err(e).context("call source rejected credentials mid-run")
                }
                Err(e) => {
                    skipped += 1;
                    warn!("Failed to ingest recording {}: {:#}", recording_id, e);
                }
            }
        }

        info!(
            processed = processed.len(),
            skipped, "Lookup ingestion complete"
        );
        Ok(processed)
    }

    /// Ingest one recorded call into a lead folder.
    ///
    /// The provider transcript wins when it exists; otherwise the audio is
    /// downloaded, persisted, and run through the local engine. Returns
    /// `None` when the recording had to be skipped (content not ready).
    async fn ingest_call(
        &self,
        source: &dyn CallSource,
        recording_id: &str,
        call: &CallRecordEvent,
        lead_folder: &str,
    ) -> Result<Option<ProcessedRecording>> {
        let content = match source.fetch_transcript(recording_id).await {
            Ok(payload) => TranscriptContent::Provider(payload),
            Err(SourceError::TranscriptUnavailable { .. }) => {
                match self
                    .transcribe_from_audio(source, recording_id, call, lead_folder)
                    .await?
                {
                    Some(output) => TranscriptContent::Native(output),
                    None => return Ok(None),
                }
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to fetch transcript for {recording_id}"))
            }
        };

        let record = TranscriptRecord::new(recording_id, CallMetadata::from(call), content);
        let outcome = self
            .write_transcript(lead_folder, &record, Utc::now())
            .await?;

        Ok(Some(ProcessedRecording {
            recording_id: recording_id.to_string(),
            transcript_path: outcome.path().to_string(),
        }))
    }

    /// Download a recording, persist the audio, and transcribe it locally.
    ///
    /// The audio write happens before transcription: if the engine fails the
    /// audio is already safe in the lead folder and a later run can retry.
    async fn transcribe_from_audio(
        &self,
        source: &dyn CallSource,
        recording_id: &str,
        call: &CallRecordEvent,
        lead_folder: &str,
    ) -> Result<Option<TranscriptOutput>> {
        let audio = source
            .fetch_recording_audio(recording_id)
            .await
            .with_context(|| format!("Failed to fetch audio for {recording_id}"))?;

        let Some(bytes) = audio.bytes else {
            info!(
                recording_id,
                availability = %audio.availability,
                "Recording content not available, skipping"
            );
            return Ok(None);
        };

        let file_name =
            recording_file_name(call.start_time, call.direction, call.duration, recording_id);
        self.write_recording(lead_folder, &file_name, &bytes).await?;

        let output = self
            .transcriber
            .transcribe(&bytes)
            .await
            .with_context(|| format!("Failed to transcribe recording {recording_id}"))?;
        Ok(Some(output))
    }

    /// Mode B: recover historical recordings for a new lead.
    ///
    /// Scans every other lead's recordings subfolder; a file matches by
    /// sidecar metadata when present, else by phone-digit substring against
    /// the filename. Matches are copied into `target_folder` with
    /// provenance. A recording id already ingested into the target is not
    /// copied again.
    #[instrument(skip(self), fields(phone = %phone, target = target_folder))]
    pub async fn run_backfill(
        &self,
        phone: &PhoneNumber,
        target_folder: &str,
        search_root: &str,
    ) -> Result<Vec<ProcessedRecording>> {
        let patterns = phone.search_patterns();
        let lead_folders = self
            .store
            .list_folders(search_root)
            .await
            .with_context(|| format!("Failed to list lead folders under {search_root}"))?;

        info!(folders = lead_folders.len(), "Scanning lead folders for backfill");

        let target_trimmed = target_folder.trim_end_matches('/');
        let mut processed = Vec::new();
        for lead in &lead_folders {
            // Copying a lead's own files back onto it only manufactures
            // duplicates.
            if lead.path.trim_end_matches('/') == target_trimmed {
                continue;
            }
            match self
                .backfill_from_folder(phone, &patterns, &lead.path, target_folder)
                .await
            {
                Ok(mut rows) => processed.append(&mut rows),
                Err(e) => {
                    warn!("Skipping folder {} during backfill: {:#}", lead.path, e)
                }
            }
        }

        info!(copied = processed.len(), "Backfill complete");
        Ok(processed)
    }

    async fn backfill_from_folder(
        &self,
        phone: &PhoneNumber,
        patterns: &[String],
        lead_folder: &str,
        target_folder: &str,
    ) -> Result<Vec<ProcessedRecording>> {
        let recordings = match self.store.list_files(&recordings_folder(lead_folder)).await {
            Ok(files) => files,
            Err(e) if e.is_not_found() => return Ok(Vec::new()),
            Err(e) => return Err(e).context("Failed to list recordings"),
        };

        let mut rows = Vec::new();
        for file in recordings
            .iter()
            .filter(|f| f.name.to_ascii_lowercase().ends_with(".mp3"))
        {
            match self
                .backfill_file(phone, patterns, file, lead_folder, target_folder)
                .await
            {
                Ok(Some(row)) => rows.push(row),
                Ok(None) => {}
                Err(e) => {
                    warn!("Failed to backfill {}: {:#}", file.path, e)
                }
            }
        }
        Ok(rows)
    }

    async fn backfill_file(
        &self,
        phone: &PhoneNumber,
        patterns: &[String],
        file: &FileEntry,
        lead_folder: &str,
        target_folder: &str,
    ) -> Result<Option<ProcessedRecording>> {
        // Sidecar metadata wins; the filename substring match is the fuzzy
        // fallback for audio that never had metadata.
        let sidecar = self.read_sidecar(&file.path).await;
        let matched = match &sidecar {
            Some(meta) => meta.involves(phone),
            None => patterns.iter().any(|p| file.name.contains(p.as_str())),
        };
        if !matched {
            return Ok(None);
        }

        let bytes = self
            .store
            .read_file(&file.path)
            .await
            .with_context(|| format!("Failed to read {}", file.path))?;

        let recording_id = sidecar
            .as_ref()
            .and_then(|meta| meta.recording_id.clone())
            .unwrap_or_else(|| content_id(&bytes));

        if self
            .existing_transcript(target_folder, &recording_id)
            .await?
            .is_some()
        {
            info!(recording_id, "Already ingested into target, skipping");
            return Ok(None);
        }

        let metadata = sidecar
            .as_ref()
            .map(RecordingSidecar::call_metadata)
            .unwrap_or_default();

        // No call metadata means no call start time; file names fall back
        // to the write time.
        let now = Utc::now();
        let stamp = metadata.start_time.unwrap_or(now);

        let output = self
            .transcriber
            .transcribe(&bytes)
            .await
            .with_context(|| format!("Failed to transcribe {}", file.name))?;

        let audio_name = recording_file_name(
            stamp,
            metadata.direction.unwrap_or_default(),
            metadata.duration.unwrap_or(0),
            &recording_id,
        );
        self.write_recording(target_folder, &audio_name, &bytes)
            .await?;

        let record = TranscriptRecord::new(
            recording_id.clone(),
            metadata,
            TranscriptContent::Native(output),
        )
        .with_provenance(file.name.clone(), lead_folder);

        let outcome = self.write_transcript(target_folder, &record, now).await?;
        info!(
            recording_id,
            from = lead_folder,
            "Backfilled recording into target"
        );

        Ok(Some(ProcessedRecording {
            recording_id,
            transcript_path: outcome.path().to_string(),
        }))
    }

    async fn read_sidecar(&self, audio_path: &str) -> Option<RecordingSidecar> {
        let sidecar_path = format!("{audio_path}.json");
        let bytes = self.store.read_file(&sidecar_path).await.ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Some(meta),
            Err(e) => {
                warn!("Ignoring unparseable sidecar {}: {}", sidecar_path, e);
                None
            }
        }
    }

    /// Find a transcript already carrying this recording id, regardless of
    /// the timestamp in its name.
    async fn existing_transcript(
        &self,
        lead_folder: &str,
        recording_id: &str,
    ) -> Result<Option<FileEntry>> {
        let folder = transcripts_folder(lead_folder);
        let suffix = format!("_{recording_id}.json");
        match self.store.list_files(&folder).await {
            Ok(files) => Ok(files.into_iter().find(|f| f.name.ends_with(&suffix))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to list {folder}")),
        }
    }

    /// Write a transcript record into a lead folder's transcripts subfolder.
    ///
    /// One recording id, one file: if the id already exists under the folder
    /// with a different timestamped name, the existing path is returned
    /// instead of writing a second copy. Writing to the exact same path is a
    /// plain overwrite.
    pub async fn write_transcript(
        &self,
        lead_folder: &str,
        record: &TranscriptRecord,
        fallback_time: DateTime<Utc>,
    ) -> Result<WriteOutcome> {
        let file_name = record.file_name(fallback_time);

        if let Some(existing) = self
            .existing_transcript(lead_folder, &record.recording_id)
            .await?
        {
            if existing.name != file_name {
                info!(
                    recording_id = %record.recording_id,
                    path = %existing.path,
                    "Recording already ingested under a different name"
                );
                return Ok(WriteOutcome::AlreadyPresent(existing.path));
            }
        }

        let path = join_path(&transcripts_folder(lead_folder), &file_name);
        let bytes =
            serde_json::to_vec_pretty(record).context("Failed to serialize transcript record")?;
        self.store
            .write_file(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {path}"))?;

        info!(path = %path, "Wrote transcript");
        Ok(WriteOutcome::Written(path))
    }

    /// Write recording audio into a lead folder's recordings subfolder.
    pub async fn write_recording(
        &self,
        lead_folder: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let path = join_path(&recordings_folder(lead_folder), file_name);
        self.store
            .write_file(&path, bytes)
            .await
            .with_context(|| format!("Failed to write {path}"))?;

        info!(path = %path, size = bytes.len(), "Wrote recording audio");
        Ok(path)
    }
}
