// ABOUTME: Blocking JSON-RPC client for the Granola MCP endpoint
// ABOUTME: Handles session setup, SSE replies, throttling and rate-limit detection

use crate::model::Item;
use crate::ports::{FetchOutcome, TranscriptSource};
use crate::util::{parse_meeting_date, unescape_xml};
use crate::{Error, Result};
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Utc};
use rand::Rng;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_MCP_URL: &str = "https://mcp.granola.ai/mcp";
const PROTOCOL_VERSION: &str = "2025-03-26";

/// Rate-limit notices are short; long text mentioning "rate limit" is content.
const RATE_LIMIT_TEXT_MAX: usize = 200;

fn truncate_str(s: &str, max_chars: usize) -> String {
    if s.len() <= max_chars {
        return s.to_string();
    }

    // Find a valid UTF-8 boundary at or before max_chars
    let mut boundary = max_chars;
    while boundary > 0 && !s.is_char_boundary(boundary) {
        boundary -= 1;
    }

    if boundary == 0 {
        return String::new();
    }

    format!("{}...", &s[..boundary])
}

pub fn is_rate_limit_text(text: &str) -> bool {
    text.chars().count() < RATE_LIMIT_TEXT_MAX && text.to_lowercase().contains("rate limit")
}

/// Meeting listing window understood by `list_meetings`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateRange {
    ThisWeek,
    LastWeek,
    Last30Days,
    ThisMonth,
    LastMonth,
    ThisYear,
    LastYear,
    Custom { start: NaiveDate, end: NaiveDate },
}

impl DateRange {
    /// Tool arguments for this range, resolving calendar presets against `today`.
    pub fn tool_args(&self, today: NaiveDate) -> Value {
        let custom = |start: NaiveDate, end: NaiveDate| {
            json!({
                "time_range": "custom",
                "custom_start": start.format("%Y-%m-%d").to_string(),
                "custom_end": end.format("%Y-%m-%d").to_string(),
            })
        };
        let first_of_month = today.with_day(1).unwrap_or(today);
        let first_of_year = today.with_ordinal(1).unwrap_or(today);

        match self {
            DateRange::ThisWeek => json!({ "time_range": "this_week" }),
            DateRange::LastWeek => json!({ "time_range": "last_week" }),
            DateRange::Last30Days => json!({ "time_range": "last_30_days" }),
            DateRange::ThisMonth => custom(first_of_month, today),
            DateRange::LastMonth => {
                let end = first_of_month - ChronoDuration::days(1);
                custom(end.with_day(1).unwrap_or(end), end)
            }
            DateRange::ThisYear => custom(first_of_year, today),
            DateRange::LastYear => {
                let end = first_of_year - ChronoDuration::days(1);
                custom(end.with_ordinal(1).unwrap_or(end), end)
            }
            DateRange::Custom { start, end } => custom(*start, *end),
        }
    }
}

/// Result of a tool call once rate-limit notices are separated out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolReply {
    Text(String),
    RateLimited(String),
}

pub struct ApiClient {
    client: Client,
    mcp_url: String,
    throttle_min: u64,
    throttle_max: u64,
    request_id: AtomicU64,
    initialized: AtomicBool,
}

impl ApiClient {
    pub fn new(mcp_url: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(60)).build()?;

        Ok(ApiClient {
            client,
            mcp_url: mcp_url.unwrap_or_else(|| DEFAULT_MCP_URL.into()),
            throttle_min: 100,
            throttle_max: 300,
            request_id: AtomicU64::new(0),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn with_throttle(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.throttle_min = min_ms;
        self.throttle_max = max_ms;
        self
    }

    pub fn disable_throttle(mut self) -> Self {
        self.throttle_min = 0;
        self.throttle_max = 0;
        self
    }

    fn throttle(&self) {
        if self.throttle_max > 0 {
            let sleep_ms = rand::thread_rng().gen_range(self.throttle_min..=self.throttle_max);
            std::thread::sleep(Duration::from_millis(sleep_ms));
        }
    }

    fn post(&self, token: &str, method: &str, body: &Value) -> Result<reqwest::blocking::Response> {
        let response = self
            .client
            .post(&self.mcp_url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json, text/event-stream")
            .header("Content-Type", "application/json")
            .header("User-Agent", concat!("granola-export/", env!("CARGO_PKG_VERSION")))
            .json(body)
            .send()?;

        self.throttle();

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            let preview = truncate_str(&message, 100);
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(Error::RateLimited(preview));
            }
            return Err(Error::Api {
                endpoint: method.into(),
                status: status.as_u16(),
                message: preview,
            });
        }
        Ok(response)
    }

    fn rpc(&self, token: &str, method: &str, params: Value) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        debug!(method, id, "MCP request");

        let response = self.post(token, method, &body)?;
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);
        let text = response.text()?;
        parse_rpc_reply(&text, is_json)
    }

    fn notify(&self, token: &str, method: &str) -> Result<()> {
        let body = json!({ "jsonrpc": "2.0", "method": method });
        self.post(token, method, &body)?;
        Ok(())
    }

    fn ensure_initialized(&self, token: &str) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.rpc(
            token,
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": { "name": "granola-export", "version": env!("CARGO_PKG_VERSION") },
            }),
        )?;
        self.notify(token, "notifications/initialized")?;
        self.initialized.store(true, Ordering::SeqCst);
        info!("MCP session initialized");
        Ok(())
    }

    /// Calls an MCP tool once and returns its joined text content.
    pub fn call_tool(&self, token: &str, name: &str, arguments: Value) -> Result<ToolReply> {
        self.ensure_initialized(token)?;
        let result = self.rpc(
            token,
            "tools/call",
            json!({ "name": name, "arguments": arguments }),
        )?;
        let text = tool_text(&result);

        if is_rate_limit_text(&text) {
            warn!(tool = name, "rate limited");
            return Ok(ToolReply::RateLimited(text));
        }
        Ok(ToolReply::Text(text))
    }

    fn call_tool_text(&self, token: &str, name: &str, arguments: Value) -> Result<String> {
        match self.call_tool(token, name, arguments)? {
            ToolReply::Text(text) => Ok(text),
            ToolReply::RateLimited(text) => Err(Error::RateLimited(text)),
        }
    }

    pub fn list_meetings(&self, token: &str, range: &DateRange) -> Result<Vec<Item>> {
        let args = range.tool_args(Utc::now().date_naive());
        info!(?args, "listing meetings");
        let text = self.call_tool_text(token, "list_meetings", args)?;
        let meetings = parse_meetings(&text);
        info!(count = meetings.len(), "retrieved meetings");
        Ok(meetings)
    }

    /// Full details (participants, summary) for the given meetings.
    pub fn get_meetings(&self, token: &str, ids: &[String]) -> Result<Vec<Item>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let text = self.call_tool_text(token, "get_meetings", json!({ "meeting_ids": ids }))?;
        Ok(parse_meetings(&text))
    }

    pub fn get_transcript(&self, token: &str, meeting_id: &str) -> Result<ToolReply> {
        info!(meeting_id, "fetching transcript");
        let reply = self.call_tool(
            token,
            "get_meeting_transcript",
            json!({ "meeting_id": meeting_id }),
        )?;
        let text = match reply {
            ToolReply::Text(text) => text,
            rate_limited => return Ok(rate_limited),
        };

        let transcript = extract_transcript_field(&text);
        if transcript.trim().is_empty() {
            return Err(Error::Protocol(format!(
                "empty transcript for meeting {}",
                meeting_id
            )));
        }
        info!(meeting_id, chars = transcript.chars().count(), "retrieved transcript");
        Ok(ToolReply::Text(transcript))
    }

    pub fn reset(&self) {
        if self.initialized.swap(false, Ordering::SeqCst) {
            info!("MCP session reset");
        }
    }
}

impl TranscriptSource for ApiClient {
    fn fetch_transcript(&self, item_id: &str, token: &str) -> FetchOutcome {
        match self.get_transcript(token, item_id) {
            Ok(ToolReply::Text(text)) => FetchOutcome::Transcript(text),
            Ok(ToolReply::RateLimited(_)) | Err(Error::RateLimited(_)) => FetchOutcome::RateLimited,
            Err(e) => FetchOutcome::TransportError(e.to_string()),
        }
    }

    fn reset_session(&self) {
        self.reset();
    }
}

/// Extracts the JSON-RPC `result` from an SSE stream or a plain JSON body.
fn parse_rpc_reply(body: &str, is_json: bool) -> Result<Value> {
    let message: Value = if let Some(data) = body
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
    {
        serde_json::from_str(data)?
    } else if is_json {
        serde_json::from_str(body)?
    } else {
        return Err(Error::Protocol(format!(
            "unexpected MCP response: {}",
            truncate_str(body, 200)
        )));
    };

    if let Some(err) = message.get("error") {
        let msg = err
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| err.to_string());
        return Err(Error::Protocol(msg));
    }
    Ok(message.get("result").cloned().unwrap_or_else(|| json!({})))
}

fn tool_text(result: &Value) -> String {
    result
        .get("content")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter(|c| c.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|c| c.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default()
}

/// Transcript tool replies are `{"transcript": "..."}`, occasionally bare text.
fn extract_transcript_field(text: &str) -> String {
    match serde_json::from_str::<Value>(text) {
        Ok(v) => v
            .get("transcript")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Err(_) => text.to_string(),
    }
}

fn meeting_regexes() -> &'static (Regex, Regex, Regex) {
    static RE: OnceLock<(Regex, Regex, Regex)> = OnceLock::new();
    RE.get_or_init(|| {
        (
            Regex::new(r#"<meeting\s+id="([^"]+)"\s+title="([^"]*)"\s+date="([^"]+)""#)
                .expect("static regex"),
            Regex::new(r"(?s)<known_participants>(.*?)</known_participants>")
                .expect("static regex"),
            Regex::new(r"(?s)<summary>(.*?)</summary>").expect("static regex"),
        )
    })
}

/// Parses the XML-like meeting blocks returned by `list_meetings` and
/// `get_meetings`.
pub fn parse_meetings(text: &str) -> Vec<Item> {
    let (meeting_re, participants_re, summary_re) = meeting_regexes();

    meeting_re
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let rest = &text[whole.end()..];
            let block = rest.find("</meeting>").map(|end| &rest[..end]).unwrap_or("");

            let raw_date = &caps[3];
            let date = parse_meeting_date(raw_date).unwrap_or_else(|| {
                warn!(date = raw_date, "unparseable meeting date, using now");
                Utc::now()
            });

            let participants = participants_re
                .captures(block)
                .map(|p| {
                    p[1].lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(unescape_xml)
                        .collect()
                })
                .unwrap_or_default();

            let summary = summary_re
                .captures(block)
                .map(|s| unescape_xml(s[1].trim()))
                .filter(|s| !s.is_empty());

            Some(Item {
                id: caps[1].to_string(),
                title: unescape_xml(&caps[2]),
                date,
                participants,
                summary,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_str_short() {
        assert_eq!(truncate_str("hello", 100), "hello");
    }

    #[test]
    fn test_truncate_str_long() {
        let result = truncate_str("hello world", 7);
        assert!(result.starts_with("hello"));
        assert!(result.ends_with("..."));
    }

    #[test]
    fn test_truncate_str_utf8() {
        // Multi-byte characters must not split
        let text = "Hello 世界 World";
        let result = truncate_str(text, 10);
        assert!(!result.is_empty());
        assert!(result.len() <= 13);
    }

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limit_text("Rate limit exceeded. Try again later."));
        assert!(!is_rate_limit_text("Everything is fine."));

        let long = format!("We talked about the rate limit on our API. {}", "x".repeat(300));
        assert!(!is_rate_limit_text(&long));
    }

    #[test]
    fn test_rate_limit_detection_counts_chars() {
        // 170 characters but over 300 bytes.
        let notice = format!("Rate limit reached. {}", "é".repeat(150));
        assert!(notice.len() > RATE_LIMIT_TEXT_MAX);
        assert!(is_rate_limit_text(&notice));
    }

    #[test]
    fn test_api_client_new() {
        let client = ApiClient::new(None).unwrap();
        assert_eq!(client.mcp_url, DEFAULT_MCP_URL);
    }

    #[test]
    fn test_api_client_throttle_config() {
        let client = ApiClient::new(None).unwrap().with_throttle(50, 150);
        assert_eq!(client.throttle_min, 50);
        assert_eq!(client.throttle_max, 150);

        let client = client.disable_throttle();
        assert_eq!(client.throttle_max, 0);
    }

    #[test]
    fn test_reset_clears_session() {
        let client = ApiClient::new(None).unwrap();
        client.initialized.store(true, Ordering::SeqCst);
        client.reset_session();
        assert!(!client.initialized.load(Ordering::SeqCst));
    }
}
