// ABOUTME: Export policy configuration loaded from YAML
// ABOUTME: Verification thresholds, retry bounds, backoff ladder and cooldown

use crate::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub verification: VerificationConfig,
    pub retry: RetryConfig,
    /// Mandatory pause between items, after a successful export.
    #[serde(with = "duration_serde")]
    pub inter_item_cooldown: Duration,
    /// Granularity at which waits observe cancellation.
    pub cancel_poll_interval_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            verification: VerificationConfig::default(),
            retry: RetryConfig::default(),
            inter_item_cooldown: Duration::from_secs(120),
            cancel_poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Transcripts of this many characters or fewer are rejected.
    pub min_length: usize,
    /// Number of trailing characters inspected by the ending checks.
    pub tail_window: usize,
    pub terminal_characters: String,
    pub natural_ending_phrases: Vec<String>,
    /// Case-insensitive regexes matched against the tail.
    pub truncation_patterns: Vec<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            min_length: 10_000,
            tail_window: 200,
            terminal_characters: ".!?\"')\u{201d}\u{2019}".into(),
            natural_ending_phrases: [
                "goodbye",
                "bye",
                "thanks",
                "thank you",
                "see you",
                "take care",
                "have a good",
                "talk soon",
                "speak soon",
                "until next time",
                "catch you later",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            truncation_patterns: vec![
                r"whose\s+title\.\s+Is\s+".into(),
                r"\.\s+Is\s+\w+\s+\w+\.\s*$".into(),
                r"(\.\.\.|\u{2026})\s*$".into(),
                r"\[(transcript\s+)?truncated\]".into(),
            ],
        }
    }
}

/// What happens once rate-limiting outlasts the backoff ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LadderExhaustion {
    /// Keep waiting the final ladder step.
    #[default]
    RepeatLast,
    /// Fail the item once every step has been used.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_verification_retries: u32,
    #[serde(with = "duration_serde")]
    pub verification_retry_delay: Duration,
    pub max_transport_retries: u32,
    #[serde(with = "duration_serde")]
    pub transport_retry_delay: Duration,
    #[serde(with = "duration_list_serde")]
    pub rate_limit_backoff_ladder: Vec<Duration>,
    pub on_ladder_exhausted: LadderExhaustion,
    /// Give up early when a refetch returns a transcript of identical length.
    pub stop_on_unchanged_transcript: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_verification_retries: 2,
            verification_retry_delay: Duration::from_secs(10),
            max_transport_retries: 2,
            transport_retry_delay: Duration::from_secs(5),
            rate_limit_backoff_ladder: [120, 180, 300, 420, 600]
                .into_iter()
                .map(Duration::from_secs)
                .collect(),
            on_ladder_exhausted: LadderExhaustion::RepeatLast,
            stop_on_unchanged_transcript: false,
        }
    }
}

impl ExportConfig {
    /// Loads from `path` if given, else from the default location if present,
    /// else returns the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.rate_limit_backoff_ladder.is_empty() {
            return Err(Error::Config(
                "rate_limit_backoff_ladder must contain at least one step".into(),
            ));
        }
        if self.cancel_poll_interval_ms == 0 {
            return Err(Error::Config(
                "cancel_poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.verification.terminal_characters.is_empty() {
            return Err(Error::Config("terminal_characters must not be empty".into()));
        }
        // Surfaces bad regexes before any network traffic.
        crate::verify::Verifier::new(&self.verification)?;
        Ok(())
    }

    pub fn cancel_poll_interval(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_interval_ms)
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("ai", "granola", "granola-export")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}

mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_list_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ptr_arg)]
    pub fn serialize<S>(durations: &Vec<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(durations.iter().map(|d| d.as_secs()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Vec::<u64>::deserialize(deserializer)?;
        Ok(secs.into_iter().map(Duration::from_secs).collect())
    }
}
