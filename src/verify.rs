// ABOUTME: Heuristic completeness checks for fetched transcripts
// ABOUTME: Length, cutoff, natural ending and truncation-pattern checks, first failure wins

use crate::config::VerificationConfig;
use crate::model::{IncompleteReason, VerificationResult};
use crate::{Error, Result};
use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Compiled form of [`VerificationConfig`]. Verification is a pure function of
/// the text and this configuration.
#[derive(Debug, Clone)]
pub struct Verifier {
    min_length: usize,
    tail_window: usize,
    terminal_characters: Vec<char>,
    natural_ending_phrases: Vec<String>,
    truncation_patterns: Vec<Regex>,
}

impl Verifier {
    pub fn new(config: &VerificationConfig) -> Result<Self> {
        let truncation_patterns = config
            .truncation_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::Config(format!("invalid truncation pattern {:?}: {}", p, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Verifier {
            min_length: config.min_length,
            tail_window: config.tail_window,
            terminal_characters: config.terminal_characters.chars().collect(),
            natural_ending_phrases: config
                .natural_ending_phrases
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            truncation_patterns,
        })
    }

    pub fn verify(&self, text: &str) -> VerificationResult {
        let result = self
            .check_length(text)
            .or_else(|| self.check_cutoff(text))
            .or_else(|| self.check_natural_ending(text))
            .or_else(|| self.check_truncation_pattern(text))
            .unwrap_or_else(|| VerificationResult::pass("all completeness checks passed"));

        debug!(
            passed = result.passed,
            reason = ?result.reason,
            detail = %result.detail,
            "transcript verified"
        );
        result
    }

    fn check_length(&self, text: &str) -> Option<VerificationResult> {
        let length = text.chars().count();
        if length <= self.min_length {
            return Some(VerificationResult::fail(
                IncompleteReason::TooShort,
                format!("{} characters (minimum {})", length, self.min_length),
            ));
        }
        None
    }

    fn check_cutoff(&self, text: &str) -> Option<VerificationResult> {
        let ending = tail(text, self.tail_window).trim_end();
        match ending.chars().last() {
            Some(c) if self.terminal_characters.contains(&c) => None,
            _ => Some(VerificationResult::fail(
                IncompleteReason::MidSentenceCutoff,
                format!("ends without terminal punctuation: ...{}", tail(ending, 60)),
            )),
        }
    }

    fn check_natural_ending(&self, text: &str) -> Option<VerificationResult> {
        let tail = tail(text, self.tail_window).to_lowercase();
        if self
            .natural_ending_phrases
            .iter()
            .any(|phrase| tail.contains(phrase.as_str()))
        {
            return None;
        }
        Some(VerificationResult::fail(
            IncompleteReason::NoNaturalEnding,
            "no closing phrase in the final characters",
        ))
    }

    fn check_truncation_pattern(&self, text: &str) -> Option<VerificationResult> {
        let tail = tail(text, self.tail_window);
        self.truncation_patterns.iter().find_map(|pattern| {
            pattern.find(tail).map(|m| {
                VerificationResult::fail(
                    IncompleteReason::KnownTruncationPattern,
                    format!("matched {:?}", m.as_str()),
                )
            })
        })
    }
}

/// The last `chars` characters of `text`, on a char boundary.
fn tail(text: &str, chars: usize) -> &str {
    if chars == 0 {
        return "";
    }
    match text.char_indices().rev().nth(chars - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}
