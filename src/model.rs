// ABOUTME: Data models for meetings, fetch attempts and export results
// ABOUTME: Encodes the binary success criterion in BatchResult

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// One exportable meeting as listed by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub participants: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// Why the verifier rejected a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteReason {
    TooShort,
    MidSentenceCutoff,
    NoNaturalEnding,
    KnownTruncationPattern,
}

impl fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncompleteReason::TooShort => "transcript too short",
            IncompleteReason::MidSentenceCutoff => "ends mid-sentence",
            IncompleteReason::NoNaturalEnding => "no natural conversation ending",
            IncompleteReason::KnownTruncationPattern => "known truncation pattern at end",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    pub passed: bool,
    pub reason: Option<IncompleteReason>,
    /// Human-readable explanation of the deciding check.
    pub detail: String,
}

impl VerificationResult {
    pub fn pass(detail: impl Into<String>) -> Self {
        Self {
            passed: true,
            reason: None,
            detail: detail.into(),
        }
    }

    pub fn fail(reason: IncompleteReason, detail: impl Into<String>) -> Self {
        Self {
            passed: false,
            reason: Some(reason),
            detail: detail.into(),
        }
    }
}

/// Result of a single fetch try within an item's retry loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    RateLimited,
    VerificationFailed(IncompleteReason),
    TransportError(String),
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptOutcome::Success => f.write_str("success"),
            AttemptOutcome::RateLimited => f.write_str("rate limited"),
            AttemptOutcome::VerificationFailed(reason) => {
                write!(f, "verification failed ({})", reason)
            }
            AttemptOutcome::TransportError(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based, strictly increasing per item.
    pub number: u32,
    pub outcome: AttemptOutcome,
}

/// Terminal reason an item could not be exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    TransportError(String),
    VerificationFailed(IncompleteReason),
    RateLimitExhausted,
    Io { path: PathBuf, message: String },
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::TransportError(msg) => write!(f, "transport error: {}", msg),
            FailureReason::VerificationFailed(reason) => {
                write!(f, "verification failed after retries: {}", reason)
            }
            FailureReason::RateLimitExhausted => f.write_str("rate limit backoff exhausted"),
            FailureReason::Io { path, message } => {
                write!(f, "could not write {}: {}", path.display(), message)
            }
            FailureReason::Cancelled => f.write_str("cancelled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportStatus {
    Exported(PathBuf),
    Failed(FailureReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOutcome {
    pub item_id: String,
    pub status: ExportStatus,
}

impl ExportOutcome {
    pub fn is_exported(&self) -> bool {
        matches!(self.status, ExportStatus::Exported(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOverall {
    Success,
    Aborted {
        /// The failing item; `None` when cancelled between items.
        item_id: Option<String>,
        reason: FailureReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Outcomes of attempted items, in batch order. Items never started are absent.
    pub outcomes: Vec<ExportOutcome>,
    pub total: usize,
    pub overall: BatchOverall,
}

impl BatchResult {
    /// Folds outcomes into a result. Stops at the first failure; a batch is a
    /// success only when every one of `total` items was exported.
    pub fn from_outcomes(outcomes: Vec<ExportOutcome>, total: usize) -> Self {
        let first_failure = outcomes.iter().find_map(|o| match &o.status {
            ExportStatus::Failed(reason) => Some((o.item_id.clone(), reason.clone())),
            ExportStatus::Exported(_) => None,
        });

        let overall = match first_failure {
            Some((item_id, reason)) => BatchOverall::Aborted {
                item_id: Some(item_id),
                reason,
            },
            None if outcomes.len() == total => BatchOverall::Success,
            None => BatchOverall::Aborted {
                item_id: None,
                reason: FailureReason::Cancelled,
            },
        };

        BatchResult {
            outcomes,
            total,
            overall,
        }
    }

    pub fn is_success(&self) -> bool {
        self.overall == BatchOverall::Success
    }

    pub fn exported_paths(&self) -> Vec<&PathBuf> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.status {
                ExportStatus::Exported(path) => Some(path),
                ExportStatus::Failed(_) => None,
            })
            .collect()
    }
}

/// Ordered progress notifications emitted by the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEvent {
    BatchStarted {
        total: usize,
    },
    ItemStarted {
        index: usize,
        total: usize,
        item_id: String,
        title: String,
    },
    AttemptStarted {
        item_id: String,
        attempt: u32,
    },
    AttemptFailed {
        item_id: String,
        attempt: u32,
        reason: AttemptOutcome,
        /// `None` when the failure was terminal for the item.
        next_wait: Option<Duration>,
    },
    CooldownStarted {
        remaining: Duration,
    },
    ItemSucceeded {
        item_id: String,
        path: PathBuf,
    },
    ItemFailed {
        item_id: String,
        reason: FailureReason,
    },
    BatchFinished {
        result: BatchResult,
    },
}
