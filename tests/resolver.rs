//! Lead Resolution Integration Tests
//!
//! Tests for the reverse phone-number scan over lead folders: match
//! completeness, per-folder failure isolation, and skip-reason reporting.

use callvault::domain::{CallMetadata, PhoneNumber, TranscriptContent, TranscriptRecord};
use callvault::ingest::{AssociationResolver, ScanOutcome, SkipReason};
use callvault::store::{LeadFolderStore, LocalFolderStore};
use chrono::{TimeZone, Utc};
use tempfile::TempDir;

const ROOT: &str = "ProjectLeads";

fn record_involving(recording_id: &str, from: &str, to: &str) -> TranscriptRecord {
    TranscriptRecord::new(
        recording_id,
        CallMetadata {
            start_time: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()),
            from: Some(PhoneNumber::normalize(from)),
            to: Some(PhoneNumber::normalize(to)),
            ..Default::default()
        },
        TranscriptContent::Provider(serde_json::json!({"utterances": []})),
    )
}

/// Create a lead folder with its category subtree and persist the given
/// records into its transcripts subfolder.
async fn seed_lead(
    store: &LocalFolderStore,
    lead: &str,
    records: &[TranscriptRecord],
) -> String {
    let folder = format!("{ROOT}/{lead}");
    store.ensure_folder_tree(&folder).await.unwrap();
    for record in records {
        let name = record.file_name(Utc::now());
        let path = format!("{folder}/Transcripts_JSON/{name}");
        let bytes = serde_json::to_vec_pretty(record).unwrap();
        store.write_file(&path, &bytes).await.unwrap();
    }
    folder
}

#[tokio::test]
async fn test_resolver_finds_every_matching_lead() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());

    let matched_a = seed_lead(
        &store,
        "123_Main_Smith",
        &[record_involving("rec1", "5551234567", "5559876543")],
    )
    .await;
    seed_lead(
        &store,
        "456_Oak_Jones",
        &[record_involving("rec2", "5550001111", "5550002222")],
    )
    .await;
    let matched_b = seed_lead(
        &store,
        "789_Pine_Brown",
        &[
            record_involving("rec3", "5553334444", "5555556666"),
            // Second transcript is the one that matches.
            record_involving("rec4", "5559876543", "5551234567"),
        ],
    )
    .await;

    let resolver = AssociationResolver::new(&store);
    let number = PhoneNumber::normalize("(555) 123-4567");
    let scan = resolver.find_lead_folders(&number, ROOT).await.unwrap();

    assert_eq!(scan.outcomes.len(), 3);
    assert_eq!(
        scan.matches.iter().cloned().collect::<Vec<_>>(),
        vec![matched_a, matched_b]
    );
}

#[tokio::test]
async fn test_resolver_matches_across_formatting_differences() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());

    // Written by older tooling: the number is stored with punctuation.
    let folder = format!("{ROOT}/123_Main_Smith");
    store.ensure_folder_tree(&folder).await.unwrap();
    let raw = r#"{
        "recording_id": "r1",
        "call_metadata": {"from": "555-123-4567", "direction": null},
        "transcript": {"vendor": "blob"}
    }"#;
    store
        .write_file(
            &format!("{folder}/Transcripts_JSON/transcript_legacy_r1.json"),
            raw.as_bytes(),
        )
        .await
        .unwrap();

    let resolver = AssociationResolver::new(&store);
    let scan = resolver
        .find_lead_folders(&PhoneNumber::normalize("+1 555 123 4567"), ROOT)
        .await
        .unwrap();

    assert!(scan.matches.contains(&folder));
}

#[tokio::test]
async fn test_resolver_skips_leads_without_transcripts_folder() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());

    // A folder somebody created by hand, without the category subtree.
    store
        .write_file(&format!("{ROOT}/Bare_Lead/notes.txt"), b"call them back")
        .await
        .unwrap();
    let matched = seed_lead(
        &store,
        "123_Main_Smith",
        &[record_involving("rec1", "5551234567", "5559876543")],
    )
    .await;

    let resolver = AssociationResolver::new(&store);
    let number = PhoneNumber::normalize("5551234567");
    let scan = resolver.find_lead_folders(&number, ROOT).await.unwrap();

    // The bare folder is reported, not fatal.
    assert!(scan.outcomes.contains(&ScanOutcome::Skipped {
        folder: format!("{ROOT}/Bare_Lead"),
        reason: SkipReason::MissingTranscripts,
    }));
    assert_eq!(
        scan.matches.iter().cloned().collect::<Vec<_>>(),
        vec![matched]
    );
}

#[tokio::test]
async fn test_resolver_survives_malformed_records() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());

    // One lead holds only garbage.
    let broken = seed_lead(&store, "Broken_Lead", &[]).await;
    store
        .write_file(
            &format!("{broken}/Transcripts_JSON/transcript_bad.json"),
            b"not json at all",
        )
        .await
        .unwrap();

    // Another lead holds garbage next to a matching record.
    let mixed = seed_lead(
        &store,
        "Mixed_Lead",
        &[record_involving("rec9", "5551234567", "5559876543")],
    )
    .await;
    store
        .write_file(
            &format!("{mixed}/Transcripts_JSON/transcript_also_bad.json"),
            b"{truncated",
        )
        .await
        .unwrap();

    let resolver = AssociationResolver::new(&store);
    let number = PhoneNumber::normalize("5551234567");
    let scan = resolver.find_lead_folders(&number, ROOT).await.unwrap();

    // The mixed lead still matches; the broken one is skipped with a
    // malformed reason instead of aborting the scan.
    assert!(scan.matches.contains(&mixed));
    assert!(!scan.matches.contains(&broken));
    assert!(scan.outcomes.iter().any(|o| matches!(
        o,
        ScanOutcome::Skipped {
            folder,
            reason: SkipReason::Malformed(_),
        } if folder == &broken
    )));
}

#[tokio::test]
async fn test_resolver_reports_no_match_per_folder() {
    let dir = TempDir::new().unwrap();
    let store = LocalFolderStore::new(dir.path());

    seed_lead(
        &store,
        "123_Main_Smith",
        &[record_involving("rec1", "5550001111", "5550002222")],
    )
    .await;

    let resolver = AssociationResolver::new(&store);
    let number = PhoneNumber::normalize("5559998888");
    let scan = resolver.find_lead_folders(&number, ROOT).await.unwrap();

    assert!(scan.matches.is_empty());
    assert_eq!(
        scan.outcomes,
        vec![ScanOutcome::Skipped {
            folder: format!("{ROOT}/123_Main_Smith"),
            reason: SkipReason::NoMatch,
        }]
    );
}
