//! Reverse phone-number index over lead folders.
//!
//! There is no persistent index. To find which leads a number belongs to,
//! every lead folder's transcripts are scanned and each record's from/to
//! fields are compared against the normalized number: O(leads × transcripts)
//! per lookup, rebuilt every time. At the current scale (hundreds of leads,
//! tens of transcripts each) a scan is cheaper than keeping an index honest.

use std::collections::BTreeSet;

use tracing::{debug, instrument, warn};

use crate::domain::{PhoneNumber, TranscriptRecord};
use crate::store::{transcripts_folder, LeadFolderStore, StoreError};

/// Why a scanned lead folder did not make it into the match set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Scanned clean, no transcript involves the number
    NoMatch,

    /// The folder has no transcripts subfolder (nothing ingested yet)
    MissingTranscripts,

    /// The transcripts listing or a file read failed
    Unreadable(String),

    /// At least one record failed to parse, and nothing else matched
    Malformed(String),
}

/// Per-folder outcome of a resolver pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Matched { folder: String },
    Skipped { folder: String, reason: SkipReason },
}

/// Full result of one resolver pass.
#[derive(Debug, Default)]
pub struct FolderScan {
    /// Lead folders whose transcripts involve the number
    pub matches: BTreeSet<String>,

    /// One outcome per scanned folder, in scan order
    pub outcomes: Vec<ScanOutcome>,
}

/// Resolves a phone number to the lead folders it belongs to.
pub struct AssociationResolver<'a> {
    store: &'a dyn LeadFolderStore,
}

impl<'a> AssociationResolver<'a> {
    pub fn new(store: &'a dyn LeadFolderStore) -> Self {
        Self { store }
    }

    /// Find every lead folder under `search_root` holding a transcript that
    /// involves `number`.
    ///
    /// Per-folder failures become `Skipped` outcomes and never abort the
    /// scan; only failing to list `search_root` itself is a hard error.
    #[instrument(skip(self), fields(phone = %number, search_root))]
    pub async fn find_lead_folders(
        &self,
        number: &PhoneNumber,
        search_root: &str,
    ) -> Result<FolderScan, StoreError> {
        let lead_folders = self.store.list_folders(search_root).await?;
        debug!(count = lead_folders.len(), "Scanning lead folders");

        let mut scan = FolderScan::default();
        for lead in lead_folders {
            match self.scan_folder(number, &lead.path).await {
                Ok(true) => {
                    scan.matches.insert(lead.path.clone());
                    scan.outcomes.push(ScanOutcome::Matched { folder: lead.path });
                }
                Ok(false) => scan.outcomes.push(ScanOutcome::Skipped {
                    folder: lead.path,
                    reason: SkipReason::NoMatch,
                }),
                Err(reason) => {
                    warn!(folder = %lead.path, ?reason, "Skipping lead folder");
                    scan.outcomes.push(ScanOutcome::Skipped {
                        folder: lead.path,
                        reason,
                    });
                }
            }
        }

        debug!(matches = scan.matches.len(), "Resolver scan complete");
        Ok(scan)
    }

    /// Scan one lead folder. `Err` here is a skip reason, not a hard failure.
    async fn scan_folder(
        &self,
        number: &PhoneNumber,
        lead_folder: &str,
    ) -> Result<bool, SkipReason> {
        let transcripts = transcripts_folder(lead_folder);

        let files = match self.store.list_files(&transcripts).await {
            Ok(files) => files,
            Err(e) if e.is_not_found() => return Err(SkipReason::MissingTranscripts),
            Err(e) => return Err(SkipReason::Unreadable(e.to_string())),
        };

        // A lead matches at most once; the first hit wins. Problems with
        // individual files are remembered but do not stop the folder scan.
        let mut first_problem: Option<SkipReason> = None;
        for file in files.iter().filter(|f| f.name.ends_with(".json")) {
            let bytes = match self.store.read_file(&file.path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Could not read transcript {}: {}", file.path, e);
                    first_problem
                        .get_or_insert_with(|| SkipReason::Unreadable(format!("{}: {e}", file.name)));
                    continue;
                }
            };

            let record: TranscriptRecord = match serde_json::from_slice(&bytes) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Could not parse transcript {}: {}", file.path, e);
                    first_problem
                        .get_or_insert_with(|| SkipReason::Malformed(format!("{}: {e}", file.name)));
                    continue;
                }
            };

            if record.call_metadata.involves(number) {
                return Ok(true);
            }
        }

        match first_problem {
            Some(reason) => Err(reason),
            None => Ok(false),
        }
    }
}
