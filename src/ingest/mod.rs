//! Call recording ingestion.
//!
//! Three entry modes share one fetch → transcribe → build → write core:
//!
//! 1. **Lookup**: search the provider call log for a known lead's number
//!    over a bounded lookback window and ingest every recorded call
//! 2. **Backfill**: scan every existing lead's recordings for a newly
//!    onboarded number and copy matches into the new lead's folder
//! 3. **Webhook**: react to call-completion notifications, resolving
//!    target folders by scanning prior transcripts for the participants
//!
//! # Architecture
//!
//! ```text
//! CallSource → IngestionPipeline → LeadFolderStore
//!                   ↑
//!    WebhookEventProcessor → AssociationResolver
//! ```

pub mod pipeline;
pub mod resolver;
pub mod webhook;

// Re-export key types
pub use pipeline::{IngestionPipeline, ProcessedRecording, WriteOutcome};
pub use resolver::{AssociationResolver, FolderScan, ScanOutcome, SkipReason};
pub use webhook::{DropReason, EventOutcome, ReadinessPolicy, WebhookEventProcessor};
