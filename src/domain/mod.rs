//! Domain types for callvault.
//!
//! This module contains the core data structures:
//! - PhoneNumber: normalized phone numbers, the matching key everywhere
//! - CallRecordEvent: one provider call-log record
//! - TranscriptRecord: the persisted unit, plus file naming

pub mod call;
pub mod phone;
pub mod transcript;

// Re-export commonly used types
pub use call::{CallDirection, CallRecordEvent};
pub use phone::PhoneNumber;
pub use transcript::{
    recording_file_name, transcript_file_name, CallMetadata, TranscriptContent, TranscriptOutput,
    TranscriptRecord, TranscriptSegment,
};
