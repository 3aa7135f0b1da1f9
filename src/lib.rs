//! callvault - Call recording ingestion for lead folders
//!
//! Pulls recorded calls from a telephony provider, transcribes the ones
//! the provider has no transcript for, and files everything into per-lead
//! folders in a document store.
//!
//! # Architecture
//!
//! Writes are idempotent by construction:
//! - Every file name embeds the recording id
//! - Re-ingesting a recording finds the existing file instead of adding one
//! - Concurrent invocations never coordinate; they rely on those names
//!
//! # Modules
//!
//! - `adapters`: External system integrations (RingCentral, Whisper)
//! - `store`: Document store boundary (SharePoint, local filesystem)
//! - `ingest`: The three ingestion modes and the shared write core
//! - `domain`: Data structures (PhoneNumber, TranscriptRecord, CallRecordEvent)
//! - `api`: Transport-agnostic processing endpoint
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Onboard a lead and pull their recent calls
//! callvault onboard 123MainSt_Smith --phone "+15551234567" --backfill
//!
//! # Process one webhook delivery
//! callvault webhook --input event.json
//!
//! # Handle a processing request (HTTP endpoint contract)
//! echo '{"phone_number": "+15551234567", "folder_path": "..."}' | callvault process
//! ```

pub mod adapters;
pub mod api;
pub mod cli;
pub mod config;
pub mod domain;
pub mod ingest;
pub mod store;

// Re-export main types at crate root for convenience
pub use adapters::{CallSource, RingCentralClient, SourceError, Transcriber, WhisperTranscriber};
pub use domain::{CallRecordEvent, PhoneNumber, TranscriptRecord};
pub use ingest::{
    AssociationResolver, EventOutcome, IngestionPipeline, ReadinessPolicy, WebhookEventProcessor,
    WriteOutcome,
};
pub use store::{LeadFolderStore, LocalFolderStore, SharePointStore, StoreError};
