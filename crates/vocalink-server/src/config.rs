//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use vocalink_pipeline::{CompletionConfig, SegmenterKind, SessionConfig};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-call session defaults.
    #[serde(default)]
    pub session: SessionSettings,

    /// Provider endpoints and credentials.
    #[serde(default)]
    pub providers: ProvidersConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum concurrent call sessions this process will accept. The
    /// process-wide capacity tunable; additional connections get 503.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "vocalink_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Session persona and segmentation defaults. The records lookup can
/// override the voice and enrich the system instruction per call.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSettings {
    /// Standing instructions for the model.
    #[serde(default = "default_system_instruction")]
    pub system_instruction: String,

    /// Scripted assistant opening that seeds the conversation history.
    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Segmentation strategy: "marker" or "sentence".
    #[serde(default = "default_segmenter")]
    pub segmenter: String,

    /// Marker character for the "marker" strategy.
    #[serde(default = "default_marker")]
    pub marker: String,
}

/// Provider endpoints and credentials.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub chat: ChatProviderConfig,
    #[serde(default)]
    pub stt: SttProviderConfig,
    #[serde(default)]
    pub tts: TtsProviderConfig,
    #[serde(default)]
    pub records: RecordsProviderConfig,
}

/// OpenAI-compatible generative-text endpoint.
#[derive(Clone, Deserialize)]
pub struct ChatProviderConfig {
    #[serde(default = "default_chat_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
}

/// Streaming speech-to-text WebSocket endpoint.
#[derive(Clone, Deserialize)]
pub struct SttProviderConfig {
    /// Full WebSocket URL including model/encoding query parameters.
    #[serde(default = "default_stt_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
}

/// Text-to-speech endpoint.
#[derive(Clone, Deserialize)]
pub struct TtsProviderConfig {
    #[serde(default = "default_tts_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

/// Read-only record store. An empty base URL disables the lookup and the
/// configured session defaults are used as-is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordsProviderConfig {
    #[serde(default)]
    pub base_url: String,
    /// Contact whose context string is read at session start.
    #[serde(default)]
    pub contact_id: Option<i64>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    5000
}

fn default_max_sessions() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_system_instruction() -> String {
    "You are a helpful voice assistant on a phone call. Respond in less than \
     ten words at a time and add a '•' after every complete thought so your \
     reply can be spoken as it is written."
        .to_string()
}

fn default_greeting() -> String {
    "Hello! How can I help you today?".to_string()
}

fn default_segmenter() -> String {
    "marker".to_string()
}

fn default_marker() -> String {
    "•".to_string()
}

fn default_chat_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/openai".to_string()
}

fn default_chat_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_stt_endpoint() -> String {
    "wss://api.deepgram.com/v1/listen?model=nova-2&encoding=mulaw&sample_rate=8000&smart_format=true"
        .to_string()
}

fn default_tts_base_url() -> String {
    "https://api.elevenlabs.io".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_sessions: default_max_sessions(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            system_instruction: default_system_instruction(),
            greeting: default_greeting(),
            segmenter: default_segmenter(),
            marker: default_marker(),
        }
    }
}

impl Default for ChatProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_chat_base_url(),
            api_key: String::new(),
            model: default_chat_model(),
        }
    }
}

impl Default for SttProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: default_stt_endpoint(),
            api_key: String::new(),
        }
    }
}

impl Default for TtsProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_tts_base_url(),
            api_key: String::new(),
        }
    }
}

impl fmt::Debug for ChatProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatProviderConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for SttProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SttProviderConfig")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for TtsProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TtsProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl SessionSettings {
    /// Resolves the configured segmentation strategy.
    pub fn segmenter_kind(&self) -> SegmenterKind {
        match self.segmenter.as_str() {
            "sentence" => SegmenterKind::Sentence,
            _ => SegmenterKind::Marker(self.marker.chars().next().unwrap_or('•')),
        }
    }
}

impl Config {
    /// Builds the per-call session template from the configured defaults.
    /// The records lookup may still override the voice and enrich the
    /// system instruction per call.
    pub fn session_template(&self) -> SessionConfig {
        SessionConfig {
            system_instruction: self.session.system_instruction.clone(),
            greeting: self.session.greeting.clone(),
            completion: CompletionConfig {
                segmenter: self.session.segmenter_kind(),
                ..CompletionConfig::default()
            },
            ..SessionConfig::default()
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VOCALINK_HOST` overrides `server.host`
/// - `VOCALINK_PORT` overrides `server.port`
/// - `VOCALINK_MAX_SESSIONS` overrides `server.max_sessions`
/// - `VOCALINK_LOG_LEVEL` overrides `logging.level`
/// - `VOCALINK_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VOCALINK_CHAT_API_KEY`, `VOCALINK_STT_API_KEY`,
///   `VOCALINK_TTS_API_KEY` override the provider credentials
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    // Environment variable overrides
    if let Ok(host) = std::env::var("VOCALINK_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("VOCALINK_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(max) = std::env::var("VOCALINK_MAX_SESSIONS") {
        if let Ok(parsed) = max.parse() {
            config.server.max_sessions = parsed;
        }
    }
    if let Ok(level) = std::env::var("VOCALINK_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("VOCALINK_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Ok(key) = std::env::var("VOCALINK_CHAT_API_KEY") {
        config.providers.chat.api_key = key;
    }
    if let Ok(key) = std::env::var("VOCALINK_STT_API_KEY") {
        config.providers.stt.api_key = key;
    }
    if let Ok(key) = std::env::var("VOCALINK_TTS_API_KEY") {
        config.providers.tts.api_key = key;
    }

    Ok(config)
}
