// ABOUTME: Credential discovery with precedence chain and token refresh
// ABOUTME: CLI flag → GRANOLA_TOKEN env var → stored OAuth tokens (auto-refreshed)

use crate::ports::{CredentialProvider, StaticToken};
use crate::storage::write_atomic;
use crate::{Error, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::info;

pub const TOKEN_URL: &str = "https://mcp-auth.granola.ai/oauth2/token";
pub const TOKEN_ENV_VAR: &str = "GRANOLA_TOKEN";

/// Tokens this close to expiry are refreshed before use.
const EXPIRY_MARGIN_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: u64,
    #[serde(default)]
    pub client_id: Option<String>,
}

impl StoredTokens {
    pub fn needs_refresh(&self, now: u64) -> bool {
        now + EXPIRY_MARGIN_SECS >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// OAuth tokens persisted on disk, refreshed with the `refresh_token` grant.
pub struct TokenFile {
    path: PathBuf,
    token_url: String,
    http: reqwest::blocking::Client,
    tokens: Mutex<StoredTokens>,
}

impl TokenFile {
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let tokens: StoredTokens = serde_json::from_str(&content)?;
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Some(TokenFile {
            path: path.to_path_buf(),
            token_url: TOKEN_URL.into(),
            http,
            tokens: Mutex::new(tokens),
        }))
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    fn refresh(&self, current: &StoredTokens) -> Result<StoredTokens> {
        let refresh_token = current.refresh_token.as_deref().ok_or_else(|| {
            Error::Auth("access token expired and no refresh token is stored".into())
        })?;
        let client_id = current
            .client_id
            .as_deref()
            .ok_or_else(|| Error::Auth("no client_id stored for token refresh".into()))?;

        info!("refreshing access token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", client_id),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Auth(format!("token refresh failed with HTTP {}", status)));
        }
        let fresh: TokenResponse = serde_json::from_str(&response.text()?)?;

        Ok(StoredTokens {
            access_token: fresh.access_token,
            // Refresh tokens may be single-use; keep the rotated one.
            refresh_token: fresh.refresh_token.or_else(|| current.refresh_token.clone()),
            expires_at: now_secs() + fresh.expires_in,
            client_id: current.client_id.clone(),
        })
    }

    fn save(&self, tokens: &StoredTokens) -> Result<()> {
        let content = serde_json::to_vec_pretty(tokens)?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;
        write_atomic(&self.path, &content, dir)
    }
}

impl CredentialProvider for TokenFile {
    fn get_valid_credential(&self) -> Result<String> {
        let mut tokens = self
            .tokens
            .lock()
            .map_err(|_| Error::Auth("token state poisoned".into()))?;

        if tokens.needs_refresh(now_secs()) {
            let fresh = self.refresh(&tokens)?;
            // Persist before use so a crash cannot lose a rotated refresh token.
            self.save(&fresh)?;
            info!(expires_at = fresh.expires_at, "access token refreshed");
            *tokens = fresh;
        }
        Ok(tokens.access_token.clone())
    }
}

pub fn default_token_path() -> Option<PathBuf> {
    ProjectDirs::from("ai", "granola", "granola-export")
        .map(|dirs| dirs.config_dir().join("tokens.json"))
}

pub fn resolve_credentials(
    cli_token: Option<String>,
    token_file: Option<PathBuf>,
) -> Result<Box<dyn CredentialProvider + Send + Sync>> {
    // 1. CLI flag
    if let Some(token) = cli_token {
        return Ok(Box::new(StaticToken(token)));
    }

    // 2. Environment variable
    if let Ok(token) = env::var(TOKEN_ENV_VAR) {
        if !token.trim().is_empty() {
            return Ok(Box::new(StaticToken(token)));
        }
    }

    // 3. Stored OAuth tokens
    if let Some(path) = token_file.or_else(default_token_path) {
        if let Some(file) = TokenFile::load(&path)? {
            return Ok(Box::new(file));
        }
    }

    Err(Error::Auth(format!(
        "No bearer token found. Provide via --token, the {} env var, or a tokens.json file",
        TOKEN_ENV_VAR
    )))
}
