// ABOUTME: Error types with structured exit codes for CLI
// ABOUTME: Maps domain errors to specific exit codes for shell scripting

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status} on {endpoint}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Export incomplete: {0}")]
    Incomplete(String),

    #[error("Export cancelled by user")]
    Cancelled,
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Auth(_) => 2,
            Error::Network(_) => 3,
            Error::Api { .. } => 4,
            Error::Parse(_) => 5,
            Error::Filesystem(_) => 6,
            Error::Config(_) => 7,
            Error::Protocol(_) => 8,
            Error::RateLimited(_) => 9,
            Error::Incomplete(_) => 10,
            Error::Cancelled => 130,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_exit_codes() {
        assert_eq!(Error::Auth("test".into()).exit_code(), 2);
        assert_eq!(
            Error::Api {
                endpoint: "tools/call".into(),
                status: 404,
                message: "not found".into()
            }
            .exit_code(),
            4
        );
        assert_eq!(Error::Config("bad".into()).exit_code(), 7);
        assert_eq!(Error::Incomplete("item 2".into()).exit_code(), 10);
        assert_eq!(Error::Cancelled.exit_code(), 130);
    }

    #[test]
    fn test_error_messages() {
        let err = Error::Api {
            endpoint: "tools/call".into(),
            status: 429,
            message: "slow down".into(),
        };
        assert_eq!(err.to_string(), "API error 429 on tools/call: slow down");
        assert_eq!(Error::Cancelled.to_string(), "Export cancelled by user");
    }
}
