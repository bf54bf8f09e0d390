// ABOUTME: Integration tests for config loading and the export-then-verify workflow
// ABOUTME: Exercises files on disk without API mocking

use assert_fs::prelude::*;
use granola_export::config::{ExportConfig, LadderExhaustion};
use granola_export::convert::extract_transcript;
use granola_export::model::{IncompleteReason, Item};
use granola_export::ports::TranscriptWriter;
use granola_export::storage::{MarkdownWriter, Paths};
use granola_export::verify::Verifier;
use granola_export::{Error, Result};
use std::fs;
use std::time::Duration;

fn meeting(title: &str) -> Item {
    Item {
        id: "mtg-789".into(),
        title: title.into(),
        date: "2024-01-15T10:00:00Z".parse().unwrap(),
        participants: vec![],
        summary: None,
    }
}

#[test]
fn test_partial_config_file_keeps_defaults() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("config.yaml");
    file.write_str(
        r#"
verification:
  min_length: 500
retry:
  rate_limit_backoff_ladder: [30, 60]
  on_ladder_exhausted: fail
inter_item_cooldown: 45
"#,
    )
    .unwrap();

    let config = ExportConfig::load(Some(file.path()))?;
    assert_eq!(config.verification.min_length, 500);
    assert_eq!(config.verification.tail_window, 200);
    assert_eq!(
        config.retry.rate_limit_backoff_ladder,
        vec![Duration::from_secs(30), Duration::from_secs(60)]
    );
    assert_eq!(config.retry.on_ladder_exhausted, LadderExhaustion::Fail);
    assert_eq!(config.retry.max_verification_retries, 2);
    assert_eq!(config.inter_item_cooldown, Duration::from_secs(45));
    Ok(())
}

#[test]
fn test_invalid_config_file_is_config_error() {
    let temp = assert_fs::TempDir::new().unwrap();
    let bad_regex = temp.child("regex.yaml");
    bad_regex
        .write_str("verification:\n  truncation_patterns: ['(unclosed']\n")
        .unwrap();
    let empty_ladder = temp.child("ladder.yaml");
    empty_ladder
        .write_str("retry:\n  rate_limit_backoff_ladder: []\n")
        .unwrap();

    assert!(matches!(
        ExportConfig::load(Some(bad_regex.path())),
        Err(Error::Config(_))
    ));
    assert!(matches!(
        ExportConfig::load(Some(empty_ladder.path())),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_written_config_round_trips() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("config.yaml");
    file.write_str(&ExportConfig::default().to_yaml()?).unwrap();

    let loaded = ExportConfig::load(Some(file.path()))?;
    assert_eq!(loaded.to_yaml()?, ExportConfig::default().to_yaml()?);
    Ok(())
}

#[test]
fn test_export_then_verify_file() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let writer = MarkdownWriter::new(Paths::new(Some(temp.path().to_path_buf()))?)?;

    let mut transcript = "Speaker A: Status updates from each team. ".repeat(300);
    transcript.push_str("Speaker B: That's all for today, goodbye.");
    let path = writer.write(&meeting("Weekly Sync: Eng/Product"), &transcript)?;

    // Path separators and colons never reach the filename.
    assert!(temp.child("2024-01-15_Weekly_Sync__Eng_Product.md").path().exists());
    assert_eq!(path, temp.path().join("2024-01-15_Weekly_Sync__Eng_Product.md"));

    let content = fs::read_to_string(&path)?;
    assert!(content.contains("**Participants:** Unknown"));
    assert!(content.contains("No summary available"));

    let verifier = Verifier::new(&ExportConfig::default().verification)?;
    assert!(verifier.verify(extract_transcript(&content)).passed);

    // Nothing is left behind in the staging directory.
    assert_eq!(fs::read_dir(temp.path().join(".tmp"))?.count(), 0);
    Ok(())
}

#[test]
fn test_verify_truncated_file() -> Result<()> {
    let temp = assert_fs::TempDir::new().unwrap();
    let file = temp.child("transcript.txt");
    let mut transcript = "Speaker A: Status updates from each team. ".repeat(300);
    transcript.push_str("Speaker B: The next item is whose title. Is ");
    file.write_str(&transcript).unwrap();

    let content = fs::read_to_string(file.path())?;
    let result = Verifier::new(&ExportConfig::default().verification)?
        .verify(extract_transcript(&content));

    assert!(!result.passed);
    assert_eq!(result.reason, Some(IncompleteReason::MidSentenceCutoff));
    Ok(())
}
