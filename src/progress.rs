// ABOUTME: Terminal rendering of export progress events
// ABOUTME: Drains the event channel on the main thread and drives indicatif bars

use crate::model::{AttemptOutcome, BatchOverall, BatchResult, ExportEvent};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

const TICK: Duration = Duration::from_millis(500);

/// Consumes events until the batch finishes or the sender hangs up.
/// Returns the final result when one was delivered.
pub fn render(events: Receiver<ExportEvent>) -> Option<BatchResult> {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template("[{bar:40}] {pos}/{len} {msg}") {
        pb.set_style(style.progress_chars("##-"));
    }
    pb.enable_steady_tick(TICK);

    let mut wait_until: Option<(Instant, &'static str)> = None;
    let mut finished = None;

    loop {
        let event = match events.recv_timeout(TICK) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => {
                if let Some((deadline, label)) = wait_until {
                    let left = deadline.saturating_duration_since(Instant::now());
                    pb.set_message(format!("{} ({}s left)", label, left.as_secs()));
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match event {
            ExportEvent::BatchStarted { total } => {
                pb.set_length(total as u64);
                pb.set_message(format!("exporting {} meetings", total));
            }
            ExportEvent::ItemStarted { title, .. } => {
                wait_until = None;
                pb.set_message(format!("fetching: {}", title));
            }
            ExportEvent::AttemptStarted { attempt, .. } if attempt > 1 => {
                wait_until = None;
                pb.set_message(format!("refetching (attempt {})", attempt));
            }
            ExportEvent::AttemptStarted { .. } => {}
            ExportEvent::AttemptFailed {
                reason, next_wait, ..
            } => {
                let label = match &reason {
                    AttemptOutcome::RateLimited => "rate limited, backing off",
                    AttemptOutcome::VerificationFailed(_) => "incomplete transcript, retrying",
                    _ => "fetch failed, retrying",
                };
                match next_wait {
                    Some(wait) => wait_until = Some((Instant::now() + wait, label)),
                    None => pb.println(format!("  ✗ {}", reason)),
                }
            }
            ExportEvent::CooldownStarted { remaining } => {
                wait_until = Some((Instant::now() + remaining, "cooling down"));
            }
            ExportEvent::ItemSucceeded { path, .. } => {
                pb.inc(1);
                pb.println(format!("  ✓ {}", path.display()));
            }
            ExportEvent::ItemFailed { item_id, reason } => {
                pb.println(format!("  ✗ {}: {}", item_id, reason));
            }
            ExportEvent::BatchFinished { result } => {
                finished = Some(result);
                break;
            }
        }
    }

    match &finished {
        Some(result) => pb.finish_with_message(summary_line(result)),
        None => pb.abandon(),
    }
    finished
}

pub fn summary_line(result: &BatchResult) -> String {
    let exported = result.exported_paths().len();
    match &result.overall {
        BatchOverall::Success => format!("export successful: all {} meetings verified", result.total),
        BatchOverall::Aborted { item_id: Some(id), reason } => format!(
            "export FAILED at {} ({}); {} of {} meetings exported",
            id, reason, exported, result.total
        ),
        BatchOverall::Aborted { item_id: None, reason } => format!(
            "export aborted ({}); {} of {} meetings exported",
            reason, exported, result.total
        ),
    }
}
