//! Transport-agnostic processing endpoint.
//!
//! A hosting trigger (the `process` CLI subcommand, an HTTP function)
//! parses a [`ProcessRequest`], calls [`handle`], and maps
//! [`ApiError::status_code`] onto its own wire format.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::adapters::ringcentral::RingCentralSettings;
use crate::adapters::{CallSource, RingCentralClient, SourceError, WhisperTranscriber};
use crate::config::{Settings, StoreBackend};
use crate::domain::PhoneNumber;
use crate::ingest::pipeline::{IngestionPipeline, ProcessedRecording};
use crate::store::sharepoint::SharePointSettings;
use crate::store::{LeadFolderStore, LocalFolderStore, SharePointStore, StoreError};

/// Request body of the processing endpoint.
///
/// Both fields default to empty so a partial body still parses; validation
/// is what produces the 400, matching a caller that omitted a field
/// entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    #[serde(default)]
    pub phone_number: String,
    #[serde(default)]
    pub folder_path: String,
}

impl ProcessRequest {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.phone_number.trim().is_empty() || self.folder_path.trim().is_empty() {
            return Err(ApiError::MissingFields);
        }
        Ok(())
    }
}

/// Success response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub status: String,
    pub processed_recordings: Vec<ProcessedRecording>,
}

impl ProcessResponse {
    pub fn success(processed_recordings: Vec<ProcessedRecording>) -> Self {
        Self {
            status: "success".to_string(),
            processed_recordings,
        }
    }
}

/// Failures of the processing endpoint, each carrying its HTTP status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Please pass phone_number and folder_path in the request body")]
    MissingFields,

    #[error("Call source authentication failed: {0}")]
    SourceAuth(String),

    #[error("Document store authentication failed: {0}")]
    StoreAuth(String),

    #[error("An error occurred: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// HTTP status the hosting trigger should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            Self::MissingFields => 400,
            Self::SourceAuth(_) | Self::StoreAuth(_) => 401,
            Self::Internal(_) => 500,
        }
    }
}

/// Sort a pipeline failure into the endpoint's error taxonomy.
fn classify(e: anyhow::Error) -> ApiError {
    if let Some(SourceError::AuthFailed(msg)) = e.downcast_ref::<SourceError>() {
        return ApiError::SourceAuth(msg.clone());
    }
    if let Some(StoreError::AuthFailed(msg)) = e.downcast_ref::<StoreError>() {
        return ApiError::StoreAuth(msg.clone());
    }
    ApiError::Internal(e)
}

/// Run a validated request against an already-wired pipeline.
///
/// Split out from [`handle`] so tests can drive the endpoint with
/// in-memory collaborators.
pub async fn run(
    pipeline: &IngestionPipeline<'_>,
    source: &dyn CallSource,
    request: &ProcessRequest,
) -> Result<ProcessResponse, ApiError> {
    request.validate()?;

    let phone = PhoneNumber::normalize(&request.phone_number);
    let processed = pipeline
        .run_lookup(source, &phone, &request.folder_path)
        .await
        .map_err(classify)?;

    Ok(ProcessResponse::success(processed))
}

/// Handle one processing request end to end.
///
/// Validates before touching the network, then authenticates both ends
/// (each mapping onto a 401), wires the pipeline and runs the lookup.
pub async fn handle(
    settings: &Settings,
    request: &ProcessRequest,
) -> Result<ProcessResponse, ApiError> {
    request.validate()?;

    let rc_settings = RingCentralSettings::from_env()?;
    let source = RingCentralClient::connect(&rc_settings)
        .await
        .map_err(|e| match e {
            SourceError::AuthFailed(msg) => ApiError::SourceAuth(msg),
            other => ApiError::Internal(other.into()),
        })?;

    let store: Box<dyn LeadFolderStore> = match settings.backend {
        StoreBackend::SharePoint => {
            let sp_settings = SharePointSettings::from_env()?;
            let store = SharePointStore::connect(&sp_settings)
                .await
                .map_err(|e| match e {
                    StoreError::AuthFailed(msg) => ApiError::StoreAuth(msg),
                    other => ApiError::Internal(other.into()),
                })?;
            Box::new(store)
        }
        StoreBackend::Local => Box::new(LocalFolderStore::new(&settings.local_root)),
    };

    let transcriber = WhisperTranscriber::new(&settings.whisper_model);
    let pipeline = IngestionPipeline::new(store.as_ref(), &transcriber)
        .with_lookback_days(settings.lookback_days);

    run(&pipeline, &source, request).await
}
