//! Command-line interface for callvault.
//!
//! One invocation handles one unit of work: onboarding a lead, a direct
//! lookup, a backfill scan, a single webhook delivery, or one processing
//! request. Concurrent invocations are independent processes; the document
//! store is the only thing they share.

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::adapters::ringcentral::RingCentralSettings;
use crate::adapters::{RingCentralClient, WhisperTranscriber};
use crate::api::{self, ProcessRequest};
use crate::config::{self, Settings, StoreBackend};
use crate::domain::PhoneNumber;
use crate::ingest::{EventOutcome, IngestionPipeline, ProcessedRecording, WebhookEventProcessor};
use crate::store::sharepoint::SharePointSettings;
use crate::store::{join_path, LeadFolderStore, LocalFolderStore, SharePointStore};

/// callvault - Call recording ingestion for lead folders
#[derive(Parser, Debug)]
#[command(name = "callvault")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Onboard a new lead: create its folder tree and pull recent calls
    Onboard {
        /// Lead folder name (e.g. "123MainSt_Smith")
        lead: String,

        /// Lead phone number
        #[arg(short, long)]
        phone: String,

        /// Also scan other leads' recordings for this number
        #[arg(long)]
        backfill: bool,
    },

    /// Pull recent recorded calls for a number into a lead folder
    Lookup {
        /// Phone number to search the call log for
        phone: String,

        /// Target lead folder path
        folder: String,
    },

    /// Scan every lead's recordings for a number and copy matches
    Backfill {
        /// Phone number to match
        phone: String,

        /// Target lead folder path
        folder: String,
    },

    /// Process one webhook delivery
    Webhook {
        /// Payload file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Handle one processing request (HTTP endpoint contract)
    Process {
        /// Request file (reads from stdin if not provided)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Onboard {
                lead,
                phone,
                backfill,
            } => onboard_lead(&lead, &phone, backfill).await,
            Commands::Lookup { phone, folder } => lookup_calls(&phone, &folder).await,
            Commands::Backfill { phone, folder } => backfill_calls(&phone, &folder).await,
            Commands::Webhook { input } => handle_webhook(input).await,
            Commands::Process { input } => handle_process(input).await,
            Commands::Config => show_config(),
        }
    }
}

/// Build the configured document store
async fn connect_store(settings: &Settings) -> Result<Box<dyn LeadFolderStore>> {
    match settings.backend {
        StoreBackend::SharePoint => {
            let sp_settings = SharePointSettings::from_env()?;
            let store = SharePointStore::connect(&sp_settings)
                .await
                .context("Failed to connect to SharePoint")?;
            Ok(Box::new(store))
        }
        StoreBackend::Local => Ok(Box::new(LocalFolderStore::new(&settings.local_root))),
    }
}

/// Authenticate against the telephony provider
async fn connect_source() -> Result<RingCentralClient> {
    let rc_settings = RingCentralSettings::from_env()?;
    let client = RingCentralClient::connect(&rc_settings)
        .await
        .context("Failed to authenticate with RingCentral")?;
    Ok(client)
}

/// Read a JSON payload from a file or stdin
fn read_payload(input: Option<PathBuf>) -> Result<String> {
    let payload = if let Some(path) = input {
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read input file: {}", path.display()))?
    } else {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read from stdin")?;
        buffer
    };

    if payload.trim().is_empty() {
        anyhow::bail!("No input provided. Use --input <file> or pipe to stdin");
    }

    Ok(payload)
}

fn print_processed(processed: &[ProcessedRecording]) {
    println!("{:<24} {:<60}", "RECORDING", "TRANSCRIPT");
    println!("{}", "-".repeat(84));

    for item in processed {
        println!("{:<24} {:<60}", item.recording_id, item.transcript_path);
    }

    println!("\nTotal: {} recording(s)", processed.len());
}

/// Onboard a new lead: folder tree, lookup, optional backfill
async fn onboard_lead(lead: &str, phone: &str, backfill: bool) -> Result<()> {
    let settings = config::settings()?;
    let store = connect_store(settings).await?;

    let lead_folder = join_path(&settings.root_folder, lead);
    store
        .ensure_folder_tree(&lead_folder)
        .await
        .with_context(|| format!("Failed to create folder tree for {lead}"))?;
    eprintln!("Created folder structure for {}", lead);

    let number = PhoneNumber::normalize(phone);
    let source = connect_source().await?;
    let transcriber = WhisperTranscriber::new(&settings.whisper_model);
    let pipeline = IngestionPipeline::new(store.as_ref(), &transcriber)
        .with_lookback_days(settings.lookback_days);

    let processed = pipeline.run_lookup(&source, &number, &lead_folder).await?;
    eprintln!(
        "✅ Ingested {} recorded call(s) into {}",
        processed.len(),
        lead_folder
    );

    if backfill {
        let copied = pipeline
            .run_backfill(&number, &lead_folder, &settings.root_folder)
            .await?;
        eprintln!("✅ Backfilled {} recording(s) from other leads", copied.len());
    }

    Ok(())
}

/// Pull recent recorded calls into an existing lead folder
async fn lookup_calls(phone: &str, folder: &str) -> Result<()> {
    let settings = config::settings()?;
    let store = connect_store(settings).await?;
    let source = connect_source().await?;
    let transcriber = WhisperTranscriber::new(&settings.whisper_model);
    let pipeline = IngestionPipeline::new(store.as_ref(), &transcriber)
        .with_lookback_days(settings.lookback_days);

    let number = PhoneNumber::normalize(phone);
    let processed = pipeline.run_lookup(&source, &number, folder).await?;

    if processed.is_empty() {
        println!(
            "No recorded calls found for {} in the last {} days",
            number, settings.lookback_days
        );
        return Ok(());
    }

    print_processed(&processed);
    Ok(())
}

/// Scan every lead's recordings for a number and copy matches
async fn backfill_calls(phone: &str, folder: &str) -> Result<()> {
    let settings = config::settings()?;
    let store = connect_store(settings).await?;
    let transcriber = WhisperTranscriber::new(&settings.whisper_model);
    let pipeline = IngestionPipeline::new(store.as_ref(), &transcriber);

    let number = PhoneNumber::normalize(phone);
    let copied = pipeline
        .run_backfill(&number, folder, &settings.root_folder)
        .await?;

    if copied.is_empty() {
        println!("No matching recordings found under {}", settings.root_folder);
        return Ok(());
    }

    print_processed(&copied);
    Ok(())
}

/// Process one webhook delivery
async fn handle_webhook(input: Option<PathBuf>) -> Result<()> {
    let payload = read_payload(input)?;

    let settings = config::settings()?;
    let store = connect_store(settings).await?;
    let source = connect_source().await?;
    let transcriber = WhisperTranscriber::new(&settings.whisper_model);
    let pipeline = IngestionPipeline::new(store.as_ref(), &transcriber);
    let processor = WebhookEventProcessor::new(
        &source,
        store.as_ref(),
        &pipeline,
        settings.root_folder.as_str(),
    )
    .with_readiness(settings.readiness.clone());

    match processor.process_event(&payload).await? {
        EventOutcome::Filtered => {
            eprintln!("[event filtered - no completed call]");
        }
        EventOutcome::Processed {
            session_id,
            folders,
        } => {
            eprintln!(
                "[session {} delivered to {} folder(s)]",
                session_id,
                folders.len()
            );
            for folder in folders {
                println!("{}", folder);
            }
        }
        EventOutcome::Dropped { session_id, reason } if session_id.is_empty() => {
            eprintln!("[event dropped: {}]", reason);
        }
        EventOutcome::Dropped { session_id, reason } => {
            eprintln!("[session {} dropped: {}]", session_id, reason);
        }
    }

    Ok(())
}

/// Handle one processing request using the HTTP endpoint contract
async fn handle_process(input: Option<PathBuf>) -> Result<()> {
    let body = read_payload(input)?;
    let request: ProcessRequest =
        serde_json::from_str(&body).context("Failed to parse request body")?;

    let settings = config::settings()?;
    match api::handle(settings, &request).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        Err(e) => {
            eprintln!("[{}] {}", e.status_code(), e);
            std::process::exit(1);
        }
    }
}

/// Show the resolved configuration (for debugging)
fn show_config() -> Result<()> {
    let settings = config::settings()?;

    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Store:");
    println!("  Backend:     {:?}", settings.backend);
    println!("  Root folder: {}", settings.root_folder);
    println!("  Local root:  {}", settings.local_root.display());
    println!();
    println!("Ingest:");
    println!("  Lookback:        {} days", settings.lookback_days);
    println!(
        "  Readiness:       {} probe(s), {}ms initial delay, {}ms cap",
        settings.readiness.max_attempts,
        settings.readiness.initial_delay_ms,
        settings.readiness.max_delay_ms
    );
    println!();
    println!("Whisper model: {}", settings.whisper_model);

    Ok(())
}
