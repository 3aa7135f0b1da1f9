//! Configuration for the callvault pipeline.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (CALLVAULT_STORE, CALLVAULT_LOCAL_ROOT)
//! 2. Config file (.callvault/config.yaml)
//! 3. Defaults (SharePoint store, `Shared Documents/ProjectLeads` root)
//!
//! Config file discovery:
//! - Searches current directory and parents for .callvault/config.yaml
//! - Paths in config file are relative to the config file's parent directory
//!
//! Credentials never live here: provider and store secrets come from the
//! environment at connect time (RC_*, SHAREPOINT_*).

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::ingest::pipeline::DEFAULT_LOOKBACK_DAYS;
use crate::ingest::webhook::ReadinessPolicy;

/// Lead folders live under this store path unless configured otherwise.
pub const DEFAULT_ROOT_FOLDER: &str = "Shared Documents/ProjectLeads";

/// Whisper model used when the config file names none.
pub const DEFAULT_WHISPER_MODEL: &str = "base";

/// Global cached settings (stores Result to handle init errors)
static SETTINGS: OnceLock<Result<Settings, String>> = OnceLock::new();

/// Which document store backend to talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    SharePoint,
    Local,
}

impl StoreBackend {
    fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sharepoint" => Ok(Self::SharePoint),
            "local" => Ok(Self::Local),
            other => anyhow::bail!("Unknown store backend: {other}"),
        }
    }
}

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub ingest: Option<IngestConfig>,
    #[serde(default)]
    pub whisper: Option<WhisperConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    pub backend: Option<StoreBackend>,
    /// Base directory of the local backend (relative to config file)
    pub local_root: Option<String>,
    /// Store path all lead folders live under
    pub root_folder: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
    pub lookback_days: Option<i64>,
    #[serde(default)]
    pub readiness: Option<ReadinessPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhisperConfig {
    pub model: Option<String>,
}

/// Resolved settings with defaults applied
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub backend: StoreBackend,
    /// Absolute base directory of the local backend
    pub local_root: PathBuf,
    /// Store path all lead folders live under
    pub root_folder: String,
    /// Call-log search window for lookups, in days
    pub lookback_days: i64,
    /// Webhook recording-readiness backoff
    pub readiness: ReadinessPolicy,
    pub whisper_model: String,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".callvault").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Load settings from all sources
fn load_settings() -> Result<Settings> {
    let default_local_root = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".callvault")
        .join("leads");

    let config_file = find_config_file();

    let (mut backend, mut local_root, root_folder, lookback_days, readiness, whisper_model) =
        if let Some(ref config_path) = config_file {
            let config = load_config_file(config_path)?;

            // Base directory is the parent of .callvault/ (the project root)
            let base_dir = config_path
                .parent()
                .and_then(|p| p.parent())
                .unwrap_or(Path::new("."));

            let backend = config.store.backend.unwrap_or(StoreBackend::SharePoint);
            let local_root = match config.store.local_root {
                Some(ref path) => resolve_path(base_dir, path),
                None => default_local_root,
            };
            let root_folder = config
                .store
                .root_folder
                .unwrap_or_else(|| DEFAULT_ROOT_FOLDER.to_string());
            let lookback_days = config
                .ingest
                .as_ref()
                .and_then(|i| i.lookback_days)
                .unwrap_or(DEFAULT_LOOKBACK_DAYS);
            let readiness = config
                .ingest
                .and_then(|i| i.readiness)
                .unwrap_or_default();
            let whisper_model = config
                .whisper
                .and_then(|w| w.model)
                .unwrap_or_else(|| DEFAULT_WHISPER_MODEL.to_string());

            (
                backend,
                local_root,
                root_folder,
                lookback_days,
                readiness,
                whisper_model,
            )
        } else {
            (
                StoreBackend::SharePoint,
                default_local_root,
                DEFAULT_ROOT_FOLDER.to_string(),
                DEFAULT_LOOKBACK_DAYS,
                ReadinessPolicy::default(),
                DEFAULT_WHISPER_MODEL.to_string(),
            )
        };

    // Environment variables beat the config file
    if let Ok(env_backend) = std::env::var("CALLVAULT_STORE") {
        backend = StoreBackend::parse(&env_backend)?;
    }
    if let Ok(env_root) = std::env::var("CALLVAULT_LOCAL_ROOT") {
        local_root = PathBuf::from(env_root);
    }

    Ok(Settings {
        backend,
        local_root,
        root_folder,
        lookback_days,
        readiness,
        whisper_model,
        config_file,
    })
}

/// Get the global settings (loads once, then cached)
pub fn settings() -> Result<&'static Settings> {
    let result = SETTINGS.get_or_init(|| load_settings().map_err(|e| e.to_string()));

    match result {
        Ok(settings) => Ok(settings),
        Err(e) => anyhow::bail!("{}", e),
    }
}

/// Force reload settings (useful for testing)
pub fn reload_settings() -> Result<Settings> {
    load_settings()
}
