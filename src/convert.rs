// ABOUTME: Renders a verified transcript as the exported Markdown document
// ABOUTME: Title, metadata block, summary and the verbatim transcript

use crate::model::Item;
use chrono::SecondsFormat;

pub const TRANSCRIPT_HEADING: &str = "## Full Verbatim Transcript";

pub fn to_markdown(item: &Item, transcript: &str) -> String {
    let participants = if item.participants.is_empty() {
        "Unknown".to_string()
    } else {
        item.participants.join(", ")
    };
    let summary = item
        .summary
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("No summary available");

    format!(
        "# {title}\n\
         \n\
         **Date:** {date}\n\
         **Meeting ID:** {id}\n\
         **Participants:** {participants}\n\
         \n\
         ---\n\
         \n\
         ## Summary\n\
         \n\
         {summary}\n\
         \n\
         ---\n\
         \n\
         {heading}\n\
         \n\
         {transcript}\n",
        title = item.title,
        date = item.date.to_rfc3339_opts(SecondsFormat::Secs, true),
        id = item.id,
        participants = participants,
        summary = summary,
        heading = TRANSCRIPT_HEADING,
        transcript = transcript,
    )
}

/// Pulls the transcript section back out of an exported document. Falls back
/// to the whole input for plain transcript files.
pub fn extract_transcript(document: &str) -> &str {
    let marker = format!("{}\n\n", TRANSCRIPT_HEADING);
    match document.find(&marker) {
        Some(pos) => {
            let body = &document[pos + marker.len()..];
            body.strip_suffix('\n').unwrap_or(body)
        }
        None => document,
    }
}
