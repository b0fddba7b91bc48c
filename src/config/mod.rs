//! Configuration management.
//!
//! Supports configuration from:
//! - TOML config files
//! - Environment variables
//! - CLI arguments (applied by the binary on top of the other two)

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Listener configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Route paths
    #[serde(default)]
    pub routes: RoutesConfig,

    /// Credential checking
    #[serde(default)]
    pub auth: AuthConfig,

    /// Per-identity rate limiting
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Upstream providers
    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            GatewayError::Config(format!("Failed to read config file {}: {e}", path.display()))
        })?;

        toml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("Failed to parse config: {e}")))
    }

    /// Default config file location (`<config dir>/speech-gateway/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("speech-gateway").join("config.toml"))
    }

    /// Load from `path`, or from the default location when it exists,
    /// falling back to defaults. Environment overrides are applied last.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(path)?,
                None => Self::default(),
            },
        };
        base.with_env()
    }

    /// Apply environment variable overrides.
    pub fn with_env(mut self) -> Result<Self> {
        if let Ok(host) = std::env::var("GATEWAY_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("GATEWAY_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| GatewayError::Config(format!("Invalid GATEWAY_PORT: {port}")))?;
        }
        if let Ok(keys) = std::env::var("GATEWAY_API_KEYS") {
            self.auth.keys.extend(parse_key_list(&keys)?);
        }
        if let Ok(limit) = std::env::var("GATEWAY_RATE_LIMIT") {
            self.rate_limit.limit = limit.parse().map_err(|_| {
                GatewayError::Config(format!("Invalid GATEWAY_RATE_LIMIT: {limit}"))
            })?;
        }
        if let Ok(window) = std::env::var("GATEWAY_RATE_WINDOW_SECS") {
            self.rate_limit.window_secs = window.parse().map_err(|_| {
                GatewayError::Config(format!("Invalid GATEWAY_RATE_WINDOW_SECS: {window}"))
            })?;
        }
        if let Some(key) = env_any(&["GATEWAY_CHAT_API_KEY", "OPENAI_API_KEY"]) {
            self.upstream.chat_api_key = Some(key);
        }
        if let Some(key) = env_any(&["GATEWAY_STT_API_KEY", "DEEPGRAM_API_KEY"]) {
            self.upstream.stt_api_key = Some(key);
        }
        Ok(self)
    }

    /// Check numeric ranges. Paths are checked when the route table is built.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limit.limit == 0 {
            return Err(GatewayError::Config(
                "rate_limit.limit must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(GatewayError::Config(
                "rate_limit.window_secs must be greater than zero".to_string(),
            ));
        }
        if self.rate_limit.max_identities == 0 {
            return Err(GatewayError::Config(
                "rate_limit.max_identities must be greater than zero".to_string(),
            ));
        }
        if self.upstream.timeout_secs == 0 {
            return Err(GatewayError::Config(
                "upstream.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.upstream.connect_timeout_secs == 0 {
            return Err(GatewayError::Config(
                "upstream.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        // Identities are logged and reported; the secret must never double as one.
        if let Some(index) = self.auth.keys.iter().position(|e| e.key == e.identity) {
            return Err(GatewayError::Config(format!(
                "auth.keys[{index}] uses its key as its identity"
            )));
        }
        self.server.listen_addr()?;
        Ok(())
    }
}

fn env_any(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

/// Parse `key:identity,key2:identity2`. Every key must name its identity.
pub fn parse_key_list(raw: &str) -> Result<Vec<ApiKeyEntry>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| {
            let Some((key, identity)) = entry.split_once(':') else {
                return Err(GatewayError::Config(
                    "API key entry without an identity (expected key:identity)".to_string(),
                ));
            };
            let (key, identity) = (key.trim(), identity.trim());
            if key.is_empty() || identity.is_empty() || key == identity {
                return Err(GatewayError::Config(
                    "Invalid API key entry (expected key:identity)".to_string(),
                ));
            }
            Ok(ApiKeyEntry {
                key: key.to_string(),
                identity: identity.to_string(),
            })
        })
        .collect()
}

/// Listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum buffered request body size in bytes
    pub max_body_size: usize,

    /// Add CORS headers to every response
    pub cors_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_size: 25 * 1024 * 1024, // 25 MB, audio uploads
            cors_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Get the full listen address
    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| GatewayError::Config(format!("Invalid listen address: {e}")))
    }
}

/// Route paths. Exact strings are configuration, not contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Chat completions (POST)
    pub chat_completions: String,
    /// Model listing (GET)
    pub models: String,
    /// File transcription (POST) and streaming listen (WebSocket upgrade)
    pub listen: String,
    /// Voice transcription (POST)
    pub voice_transcription: String,
    /// Liveness check (GET, unauthenticated)
    pub health: String,
    /// Gateway counters (GET)
    pub stats: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            chat_completions: "/v1/chat/completions".to_string(),
            models: "/v1/models".to_string(),
            listen: "/v1/listen".to_string(),
            voice_transcription: "/v1/voice/transcribe".to_string(),
            health: "/health".to_string(),
            stats: "/v1/stats".to_string(),
        }
    }
}

/// A configured client credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKeyEntry {
    /// The secret the client presents
    pub key: String,
    /// Identity the key resolves to
    pub identity: String,
}

/// Credential checking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the credential
    pub header: String,
    /// Static keys
    pub keys: Vec<ApiKeyEntry>,
    /// Remote verification endpoint, used instead of static keys when set
    pub verify_url: Option<String>,
    /// Identities allowed to read the stats route
    pub admin_identities: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: "authorization".to_string(),
            keys: Vec::new(),
            verify_url: None,
            admin_identities: Vec::new(),
        }
    }
}

/// Fixed-window rate limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per window
    pub limit: u32,
    /// Window length in seconds
    pub window_secs: u64,
    /// Cap on tracked identities
    pub max_identities: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 60,
            window_secs: 60,
            max_identities: 100_000,
        }
    }
}

impl RateLimitConfig {
    /// Window length as a `Duration`
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Upstream provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Chat completion endpoint
    pub chat_url: String,
    /// Model catalog endpoint
    pub models_url: String,
    /// Speech-to-text endpoint for file uploads
    pub transcription_url: String,
    /// Streaming speech-to-text endpoint (ws:// or wss://)
    pub streaming_url: String,
    /// Key for the chat and model catalog provider
    pub chat_api_key: Option<String>,
    /// Key for the speech-to-text provider
    pub stt_api_key: Option<String>,
    /// Batch call timeout in seconds
    pub timeout_secs: u64,
    /// Streaming dial timeout in seconds
    pub connect_timeout_secs: u64,
    /// How long a closing session may keep flushing upstream results
    pub drain_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            chat_url: "https://api.openai.com/v1/chat/completions".to_string(),
            models_url: "https://api.openai.com/v1/models".to_string(),
            transcription_url: "https://api.deepgram.com/v1/listen".to_string(),
            streaming_url: "wss://api.deepgram.com/v1/listen".to_string(),
            chat_api_key: None,
            stt_api_key: None,
            timeout_secs: 120,
            connect_timeout_secs: 10,
            drain_timeout_secs: 5,
        }
    }
}

impl UpstreamConfig {
    /// Batch call timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Streaming dial timeout
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Drain timeout
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }
}
