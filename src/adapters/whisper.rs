//! Whisper transcription backend.
//!
//! Shells out to the local whisper binary. The binary only reads files, so
//! audio bytes are staged in a temp directory that also receives the JSON
//! output.

use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::adapters::Transcriber;
use crate::domain::{TranscriptOutput, TranscriptSegment};

const DEFAULT_WHISPER_PATH: &str = "/opt/homebrew/bin/whisper";

/// Transcriber backed by a local whisper install.
pub struct WhisperTranscriber {
    binary: String,
    model: String,
    language: Option<String>,
}

impl WhisperTranscriber {
    /// Create with the given model; the binary path comes from WHISPER_PATH
    /// when set.
    pub fn new(model: impl Into<String>) -> Self {
        let binary = std::env::var("WHISPER_PATH")
            .unwrap_or_else(|_| DEFAULT_WHISPER_PATH.to_string());
        Self {
            binary,
            model: model.into(),
            language: Some("en".to_string()),
        }
    }

    /// Override the binary path
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Force a language, or let whisper detect one with `None`
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }
}

/// Whisper output JSON structure
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    #[serde(default)]
    language: String,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    #[serde(default)]
    text: String,
}

fn convert(whisper: WhisperOutput) -> TranscriptOutput {
    TranscriptOutput {
        text: whisper.text.trim().to_string(),
        segments: whisper
            .segments
            .into_iter()
            .map(|s| TranscriptSegment {
                start: s.start,
                end: s.end,
                text: s.text.trim().to_string(),
            })
            .collect(),
        language: if whisper.language.is_empty() {
            None
        } else {
            Some(whisper.language)
        },
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        "whisper"
    }

    async fn transcribe(&self, audio: &[u8]) -> Result<TranscriptOutput> {
        let temp_dir = tempfile::tempdir().context("Failed to create temp dir")?;
        let audio_path = temp_dir.path().join("recording.mp3");
        tokio::fs::write(&audio_path, audio)
            .await
            .context("Failed to stage audio for whisper")?;

        let mut command = Command::new(&self.binary);
        command
            .arg(&audio_path)
            .arg("--model")
            .arg(&self.model)
            .arg("--output_dir")
            .arg(temp_dir.path())
            .arg("--output_format")
            .arg("json")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(language) = &self.language {
            command.arg("--language").arg(language);
        }

        let output = command.output().await.context("Failed to run whisper")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("Whisper failed: {}", stderr);
        }

        let json_path = temp_dir.path().join("recording.json");
        let json_content = tokio::fs::read_to_string(&json_path)
            .await
            .context("Failed to read whisper output")?;

        let whisper: WhisperOutput =
            serde_json::from_str(&json_content).context("Failed to parse whisper JSON")?;

        debug!(
            segments = whisper.segments.len(),
            language = %whisper.language,
            "Whisper transcription complete"
        );

        Ok(convert(whisper))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_output_conversion() {
        let json = r#"{
            "text": " Hello, this is a test. ",
            "language": "en",
            "segments": [
                {"id": 0, "start": 0.0, "end": 2.4, "text": " Hello,"},
                {"id": 1, "start": 2.4, "end": 4.1, "text": " this is a test."}
            ]
        }"#;

        let parsed: WhisperOutput = serde_json::from_str(json).unwrap();
        let output = convert(parsed);

        assert_eq!(output.text, "Hello, this is a test.");
        assert_eq!(output.segments.len(), 2);
        assert_eq!(output.segments[1].text, "this is a test.");
        assert_eq!(output.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_missing_language_maps_to_none() {
        let parsed: WhisperOutput = serde_json::from_str(r#"{"text": "hi"}"#).unwrap();
        let output = convert(parsed);
        assert!(output.language.is_none());
        assert!(output.segments.is_empty());
    }
}
