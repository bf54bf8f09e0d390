// ABOUTME: Utility functions for filenames, dates and text
// ABOUTME: Provides consistent filename generation and tolerant date parsing

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const MAX_TITLE_CHARS: usize = 100;

/// Makes a meeting title safe for use in a filename. Keeps case, replaces
/// reserved characters and spaces with `_`, and caps the length.
pub fn sanitize_title(title: &str) -> String {
    let title = title.trim();
    if title.is_empty() {
        return "Untitled_Meeting".into();
    }

    title
        .chars()
        .map(|c| {
            if INVALID_FILENAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .take(MAX_TITLE_CHARS)
        .collect::<String>()
        .replace(' ', "_")
}

/// Parses the timestamp formats the meeting listing uses: RFC 3339, naive
/// date-times (assumed UTC) and bare dates.
pub fn parse_meeting_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%b %d, %Y %I:%M %p"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Reverses the XML entity escaping used in tool responses.
pub fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_title_basic() {
        assert_eq!(sanitize_title("Q4 Planning Meeting"), "Q4_Planning_Meeting");
        assert_eq!(sanitize_title("What? Why/How"), "What__Why_How");
        assert_eq!(sanitize_title("a<b>c:d\"e|f*g\\h"), "a_b_c_d_e_f_g_h");
    }

    #[test]
    fn test_sanitize_title_empty() {
        assert_eq!(sanitize_title(""), "Untitled_Meeting");
        assert_eq!(sanitize_title("   "), "Untitled_Meeting");
    }

    #[test]
    fn test_sanitize_title_caps_length() {
        let long = "x".repeat(250);
        assert_eq!(sanitize_title(&long).chars().count(), 100);

        let unicode = "é".repeat(150);
        assert_eq!(sanitize_title(&unicode).chars().count(), 100);
    }
}
