// ABOUTME: Collaborator interfaces consumed by the export orchestrator
// ABOUTME: Credentials, transcript fetching, file writing and progress delivery

use crate::model::{ExportEvent, Item};
use crate::Result;
use std::path::PathBuf;
use std::sync::mpsc::Sender;

/// Supplies an unexpired bearer token. Refreshing is the provider's job.
pub trait CredentialProvider {
    fn get_valid_credential(&self) -> Result<String>;
}

/// Closed set of results from a single transcript fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Transcript(String),
    RateLimited,
    TransportError(String),
}

pub trait TranscriptSource {
    fn fetch_transcript(&self, item_id: &str, token: &str) -> FetchOutcome;

    /// Drops any per-session transport state. Called during cooldowns.
    fn reset_session(&self) {}
}

/// Persists a verified transcript and returns where it landed.
pub trait TranscriptWriter {
    /// Destination `write` would use for `item`.
    fn path_for(&self, item: &Item) -> PathBuf;

    fn write(&self, item: &Item, text: &str) -> Result<PathBuf>;
}

pub trait ProgressSink {
    fn on_event(&self, event: ExportEvent);
}

impl ProgressSink for Sender<ExportEvent> {
    fn on_event(&self, event: ExportEvent) {
        // A dropped receiver means nobody is rendering; the batch carries on.
        let _ = self.send(event);
    }
}

/// A fixed token, e.g. passed on the command line.
pub struct StaticToken(pub String);

impl CredentialProvider for StaticToken {
    fn get_valid_credential(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_sender_sink_preserves_order() {
        let (tx, rx) = mpsc::channel();
        tx.on_event(ExportEvent::BatchStarted { total: 2 });
        tx.on_event(ExportEvent::AttemptStarted {
            item_id: "m1".into(),
            attempt: 1,
        });
        drop(tx);

        let events: Vec<_> = rx.iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ExportEvent::BatchStarted { total: 2 });
    }

    #[test]
    fn test_sender_sink_ignores_closed_receiver() {
        let (tx, rx) = mpsc::channel::<ExportEvent>();
        drop(rx);
        tx.on_event(ExportEvent::BatchStarted { total: 1 });
    }

    #[test]
    fn test_static_token() {
        let provider = StaticToken("abc".into());
        assert_eq!(provider.get_valid_credential().unwrap(), "abc");
    }
}
