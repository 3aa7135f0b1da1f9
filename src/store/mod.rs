//! Lead folder document store.
//!
//! A lead is a folder; everything the system knows about a lead lives in a
//! fixed subtree under that folder. The store is addressed purely by
//! `/`-separated path strings so the same calling code runs against
//! SharePoint or a local directory tree.

pub mod local;
pub mod sharepoint;

use async_trait::async_trait;
use thiserror::Error;

// Re-export the concrete stores
pub use local::LocalFolderStore;
pub use sharepoint::SharePointStore;

/// Subfolder every lead folder is created with.
///
/// Creation is idempotent and folders are never deleted; downstream tooling
/// relies on the exact names.
pub const LEAD_SUBFOLDERS: [&str; 10] = [
    "Sources/RingCentral",
    "Sources/Walkthroughs",
    "Sources/ProposalCalls",
    "Sources/Polycam",
    "Transcripts_JSON",
    "AI_Outputs/Pre-Walk_Report",
    "AI_Outputs/Estimates",
    "AI_Outputs/Scope_JSON",
    "AI_Outputs/Moodboards",
    "AI_Outputs/Decks",
];

/// Where transcript JSON files live inside a lead folder.
pub const TRANSCRIPTS_SUBFOLDER: &str = "Transcripts_JSON";

/// Where call recordings live inside a lead folder.
pub const RECORDINGS_SUBFOLDER: &str = "Sources/RingCentral";

/// Join two store path fragments with exactly one separator.
pub fn join_path(base: &str, rest: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        rest.trim_start_matches('/')
    )
}

/// The transcripts subfolder of a lead folder.
pub fn transcripts_folder(lead_root: &str) -> String {
    join_path(lead_root, TRANSCRIPTS_SUBFOLDER)
}

/// The recordings subfolder of a lead folder.
pub fn recordings_folder(lead_root: &str) -> String {
    join_path(lead_root, RECORDINGS_SUBFOLDER)
}

/// Errors surfaced by a lead folder store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Credentials were rejected; the whole invocation aborts on this
    #[error("store authentication failed: {0}")]
    AuthFailed(String),

    /// The path does not exist
    #[error("store path not found: {0}")]
    NotFound(String),

    /// The store rejected or failed the operation
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether this error means "the path simply is not there".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// A file or folder listed by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Bare name, e.g. `transcript_20240115_103000_rec1.json`
    pub name: String,

    /// Full store path of the entry
    pub path: String,
}

/// Trait for the lead folder document store.
#[async_trait]
pub trait LeadFolderStore: Send + Sync {
    /// Human-readable store name
    fn name(&self) -> &str;

    /// Create the lead folder and its full category subtree. Idempotent.
    async fn ensure_folder_tree(&self, lead_root: &str) -> Result<(), StoreError>;

    /// Create or overwrite a file. Last write wins.
    async fn write_file(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;

    /// Read a file's bytes.
    async fn read_file(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    /// List the files directly inside a folder (non-recursive).
    async fn list_files(&self, folder: &str) -> Result<Vec<FileEntry>, StoreError>;

    /// List the immediate subfolders of a folder.
    async fn list_folders(&self, folder: &str) -> Result<Vec<FileEntry>, StoreError>;
}
