// ABOUTME: Export orchestration: per-item fetch/verify/retry state machine
// ABOUTME: Runs a batch sequentially with cooldowns, cancellation and all-or-nothing success

use crate::backoff::{BackoffPolicy, RetryCause};
use crate::cancel::CancelToken;
use crate::config::{ExportConfig, RetryConfig};
use crate::model::{
    Attempt, AttemptOutcome, BatchOverall, BatchResult, ExportEvent, ExportOutcome, ExportStatus,
    FailureReason, Item,
};
use crate::ports::{CredentialProvider, FetchOutcome, ProgressSink, TranscriptSource, TranscriptWriter};
use crate::verify::Verifier;
use crate::{Error, Result};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub struct Exporter<'a> {
    verifier: Verifier,
    backoff: BackoffPolicy,
    retry: RetryConfig,
    cooldown: Duration,
    poll_interval: Duration,
    credentials: &'a dyn CredentialProvider,
    source: Arc<dyn TranscriptSource + Send + Sync>,
    writer: &'a dyn TranscriptWriter,
    sink: &'a dyn ProgressSink,
    cancel: CancelToken,
}

impl<'a> Exporter<'a> {
    pub fn new(
        config: &ExportConfig,
        credentials: &'a dyn CredentialProvider,
        source: Arc<dyn TranscriptSource + Send + Sync>,
        writer: &'a dyn TranscriptWriter,
        sink: &'a dyn ProgressSink,
        cancel: CancelToken,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Exporter {
            verifier: Verifier::new(&config.verification)?,
            backoff: BackoffPolicy::new(&config.retry),
            retry: config.retry.clone(),
            cooldown: config.inter_item_cooldown,
            poll_interval: config.cancel_poll_interval(),
            credentials,
            source,
            writer,
            sink,
            cancel,
        })
    }

    /// Exports `items` one at a time, stopping at the first item that fails.
    ///
    /// Only a missing or unusable credential before the first fetch is
    /// returned as `Err`; every other failure is reported in the
    /// [`BatchResult`].
    pub fn export_batch(&self, items: &[Item]) -> Result<BatchResult> {
        self.credentials.get_valid_credential().map_err(|e| match e {
            Error::Auth(_) => e,
            other => Error::Auth(other.to_string()),
        })?;

        let total = items.len();
        info!(total, "starting export batch");
        self.sink.on_event(ExportEvent::BatchStarted { total });

        let mut outcomes = Vec::with_capacity(total);
        for (index, item) in items.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!(item_id = %item.id, "cancelled before item started");
                break;
            }

            self.sink.on_event(ExportEvent::ItemStarted {
                index,
                total,
                item_id: item.id.clone(),
                title: item.title.clone(),
            });

            let outcome = self.export_item(item);
            let exported = outcome.is_exported();
            outcomes.push(outcome);

            if !exported {
                error!(item_id = %item.id, "item failed, aborting batch");
                break;
            }

            if index + 1 < total && self.cool_down().is_err() {
                warn!("cancelled during cooldown");
                break;
            }
        }

        let result = BatchResult::from_outcomes(outcomes, total);
        match &result.overall {
            BatchOverall::Success => info!(total, "export batch complete"),
            BatchOverall::Aborted { item_id, reason } => error!(
                item_id = item_id.as_deref().unwrap_or("-"),
                %reason,
                exported = result.exported_paths().len(),
                total,
                "export batch aborted"
            ),
        }
        self.sink.on_event(ExportEvent::BatchFinished {
            result: result.clone(),
        });
        Ok(result)
    }

    /// Drives one item to a terminal outcome.
    pub fn export_item(&self, item: &Item) -> ExportOutcome {
        info!(item_id = %item.id, title = %item.title, "exporting item");

        let mut attempt = 0;
        let mut rate_limits = 0;
        let mut transport_failures = 0;
        let mut verification_failures = 0;
        let mut last_failed_len = None;

        loop {
            if self.cancel.is_cancelled() {
                return self.fail(item, FailureReason::Cancelled);
            }

            attempt += 1;
            self.sink.on_event(ExportEvent::AttemptStarted {
                item_id: item.id.clone(),
                attempt,
            });

            let fetched = match self.credentials.get_valid_credential() {
                Ok(token) => match self.fetch(&item.id, token) {
                    Some(fetched) => fetched,
                    None => return self.fail(item, FailureReason::Cancelled),
                },
                Err(e) => FetchOutcome::TransportError(format!("credential unavailable: {}", e)),
            };
            // The ladder restarts once the service answers with anything else.
            if fetched != FetchOutcome::RateLimited {
                rate_limits = 0;
            }

            let (outcome, next_wait, terminal) = match fetched {
                FetchOutcome::Transcript(text) => {
                    let reason = match self.verifier.verify(&text).reason {
                        None => return self.finish(item, attempt, &text),
                        Some(reason) => reason,
                    };
                    verification_failures += 1;

                    let length = text.chars().count();
                    let unchanged =
                        self.retry.stop_on_unchanged_transcript && last_failed_len == Some(length);
                    last_failed_len = Some(length);
                    if unchanged {
                        warn!(item_id = %item.id, length, "transcript unchanged since last attempt");
                    }

                    let wait = (verification_failures <= self.retry.max_verification_retries
                        && !unchanged)
                        .then(|| {
                            self.backoff
                                .delay_for(verification_failures, RetryCause::VerificationFailed)
                        });
                    (
                        AttemptOutcome::VerificationFailed(reason),
                        wait,
                        FailureReason::VerificationFailed(reason),
                    )
                }
                FetchOutcome::RateLimited => {
                    rate_limits += 1;
                    let wait = self
                        .backoff
                        .allows_rate_limit_retry(rate_limits)
                        .then(|| self.backoff.delay_for(rate_limits, RetryCause::RateLimited));
                    (
                        AttemptOutcome::RateLimited,
                        wait,
                        FailureReason::RateLimitExhausted,
                    )
                }
                FetchOutcome::TransportError(message) => {
                    transport_failures += 1;
                    let wait = (transport_failures <= self.retry.max_transport_retries).then(|| {
                        self.backoff
                            .delay_for(transport_failures, RetryCause::TransportError)
                    });
                    (
                        AttemptOutcome::TransportError(message.clone()),
                        wait,
                        FailureReason::TransportError(message),
                    )
                }
            };

            self.record_failure(
                item,
                Attempt {
                    number: attempt,
                    outcome,
                },
                next_wait,
            );

            match next_wait {
                None => return self.fail(item, terminal),
                Some(wait) => {
                    if self.cancel.wait(wait, self.poll_interval).is_err() {
                        return self.fail(item, FailureReason::Cancelled);
                    }
                }
            }
        }
    }

    /// Runs one fetch on a helper thread and polls for cancellation while it
    /// is in flight. Returns `None` when cancelled; a late result is dropped.
    fn fetch(&self, item_id: &str, token: String) -> Option<FetchOutcome> {
        let (tx, rx) = mpsc::channel();
        let source = Arc::clone(&self.source);
        let id = item_id.to_string();

        let spawned = thread::Builder::new()
            .name("transcript-fetch".into())
            .spawn(move || {
                let _ = tx.send(source.fetch_transcript(&id, &token));
            });
        if let Err(e) = spawned {
            return Some(FetchOutcome::TransportError(format!(
                "cannot start fetch: {}",
                e
            )));
        }

        loop {
            match rx.recv_timeout(self.poll_interval) {
                Ok(fetched) => return Some(fetched),
                Err(RecvTimeoutError::Timeout) => {
                    if self.cancel.is_cancelled() {
                        warn!(item_id, "cancelled during fetch, abandoning it");
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Some(FetchOutcome::TransportError(
                        "fetch ended without a result".into(),
                    ))
                }
            }
        }
    }

    fn finish(&self, item: &Item, attempt: u32, text: &str) -> ExportOutcome {
        debug!(item_id = %item.id, attempt, chars = text.chars().count(), "transcript verified");

        match self.writer.write(item, text) {
            Ok(path) => {
                info!(item_id = %item.id, path = %path.display(), "export complete");
                self.sink.on_event(ExportEvent::ItemSucceeded {
                    item_id: item.id.clone(),
                    path: path.clone(),
                });
                ExportOutcome {
                    item_id: item.id.clone(),
                    status: ExportStatus::Exported(path),
                }
            }
            Err(e) => self.fail(
                item,
                FailureReason::Io {
                    path: self.writer.path_for(item),
                    message: e.to_string(),
                },
            ),
        }
    }

    fn record_failure(&self, item: &Item, attempt: Attempt, next_wait: Option<Duration>) {
        match next_wait {
            Some(wait) => warn!(
                item_id = %item.id,
                attempt = attempt.number,
                outcome = %attempt.outcome,
                wait_secs = wait.as_secs(),
                "attempt failed, retrying"
            ),
            None => warn!(
                item_id = %item.id,
                attempt = attempt.number,
                outcome = %attempt.outcome,
                "attempt failed, no retries left"
            ),
        }
        self.sink.on_event(ExportEvent::AttemptFailed {
            item_id: item.id.clone(),
            attempt: attempt.number,
            reason: attempt.outcome,
            next_wait,
        });
    }

    fn fail(&self, item: &Item, reason: FailureReason) -> ExportOutcome {
        error!(item_id = %item.id, %reason, "export failed");
        self.sink.on_event(ExportEvent::ItemFailed {
            item_id: item.id.clone(),
            reason: reason.clone(),
        });
        ExportOutcome {
            item_id: item.id.clone(),
            status: ExportStatus::Failed(reason),
        }
    }

    fn cool_down(&self) -> std::result::Result<(), crate::cancel::Cancelled> {
        info!(wait_secs = self.cooldown.as_secs(), "cooling down before next item");
        self.sink.on_event(ExportEvent::CooldownStarted {
            remaining: self.cooldown,
        });
        self.source.reset_session();
        self.cancel.wait(self.cooldown, self.poll_interval)
    }
}
