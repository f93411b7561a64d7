//! Server configuration loading from file and environment variables.

use callrelay_tools::{KnowledgeConfig, SchedulingConfig};
use callrelay_voice::AgentConfig;
use serde::Deserialize;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Outbound HTTP client settings shared by every collaborator.
    #[serde(default)]
    pub http: HttpConfig,

    /// Voice agent platform.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Knowledge assistant behind `question_and_answer`.
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// Meeting locations for `schedule_meeting`.
    #[serde(default)]
    pub scheduling: SchedulingConfig,

    /// Telephony REST API.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Workflow webhook receiving opening-message lookups, transcripts and bookings.
    #[serde(default)]
    pub webhook: WebhookConfig,
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

    /// Externally reachable base URL (e.g. `https://relay.example.com`).
    /// Used for the media-stream URL in TwiML and for status callbacks.
    #[serde(default)]
    pub public_url: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "callrelay_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout for collaborator calls, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Twilio account used to originate and end calls.
#[derive(Clone, Deserialize)]
pub struct TelephonyConfig {
    #[serde(default = "default_telephony_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub account_sid: String,
    #[serde(default)]
    pub auth_token: String,
    /// Caller id for outbound calls.
    #[serde(default)]
    pub phone_number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Workflow endpoint. Empty disables opening-message lookup, transcript
    /// delivery and booking.
    #[serde(default)]
    pub url: String,

    /// Opening message used when the workflow does not supply one.
    #[serde(default = "default_first_message")]
    pub default_first_message: String,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_telephony_api_url() -> String {
    "https://api.twilio.com".to_string()
}

fn default_first_message() -> String {
    "Hey, this is Sara from Agenix AI solutions. How can I assist you today?".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: String::new(),
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

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            api_url: default_telephony_api_url(),
            account_sid: String::new(),
            auth_token: String::new(),
            phone_number: String::new(),
        }
    }
}

impl fmt::Debug for TelephonyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelephonyConfig")
            .field("api_url", &self.api_url)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("phone_number", &self.phone_number)
            .finish()
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            default_first_message: default_first_message(),
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
/// - `CALLRELAY_HOST` overrides `server.host`
/// - `CALLRELAY_PORT` overrides `server.port`
/// - `CALLRELAY_PUBLIC_URL` overrides `server.public_url`
/// - `CALLRELAY_LOG_LEVEL` overrides `logging.level`
/// - `CALLRELAY_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `ULTRAVOX_API_KEY` overrides `agent.api_key`
/// - `PINECONE_API_KEY` overrides `knowledge.api_key`
/// - `TWILIO_ACCOUNT_SID`, `TWILIO_AUTH_TOKEN`, `TWILIO_PHONE_NUMBER`
///   override the matching `telephony` fields
/// - `N8N_WEBHOOK_URL` overrides `webhook.url`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let config = match path {
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

    Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
}

/// Applies environment overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(mut config: Config, lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = lookup("CALLRELAY_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("CALLRELAY_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(public_url) = lookup("CALLRELAY_PUBLIC_URL") {
        config.server.public_url = public_url;
    }
    if let Some(level) = lookup("CALLRELAY_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("CALLRELAY_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }

    // Secrets
    if let Some(key) = lookup("ULTRAVOX_API_KEY") {
        config.agent.api_key = key;
    }
    if let Some(key) = lookup("PINECONE_API_KEY") {
        config.knowledge.api_key = key;
    }
    if let Some(sid) = lookup("TWILIO_ACCOUNT_SID") {
        config.telephony.account_sid = sid;
    }
    if let Some(token) = lookup("TWILIO_AUTH_TOKEN") {
        config.telephony.auth_token = token;
    }
    if let Some(number) = lookup("TWILIO_PHONE_NUMBER") {
        config.telephony.phone_number = number;
    }
    if let Some(url) = lookup("N8N_WEBHOOK_URL") {
        config.webhook.url = url;
    }

    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let config = load_config(Some("/nonexistent/callrelay.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.http.request_timeout_secs, 30);
        assert_eq!(config.agent.sample_rate, 8000);
        assert_eq!(config.telephony.api_url, "https://api.twilio.com");
        assert!(config.webhook.default_first_message.starts_with("Hey, this is Sara"));
    }

    #[test]
    fn parses_sections_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100
public_url = "https://relay.example.com"

[agent]
voice = "Mark"

[scheduling.calendars]
London = "london@calendar"
Brighton = "brighton@calendar"

[webhook]
url = "https://n8n.example.com/webhook/voice"
"#
        )
        .unwrap();

        let config = load_config(file.path().to_str()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.public_url, "https://relay.example.com");
        assert_eq!(config.agent.voice, "Mark");
        assert_eq!(config.agent.model, "fixie-ai/ultravox-70B");
        assert_eq!(config.scheduling.calendars.len(), 2);
        assert_eq!(config.webhook.url, "https://n8n.example.com/webhook/voice");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(matches!(
            load_config(file.path().to_str()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("CALLRELAY_PORT", "9200"),
            ("CALLRELAY_HOST", "0.0.0.0"),
            ("CALLRELAY_LOG_JSON", "1"),
            ("ULTRAVOX_API_KEY", "uv-key"),
            ("TWILIO_AUTH_TOKEN", "tw-token"),
            ("N8N_WEBHOOK_URL", "https://n8n.example.com/hook"),
        ]);

        let config = apply_env_overrides(Config::default(), |key| {
            env.get(key).map(|v| v.to_string())
        });

        assert_eq!(config.server.port, 9200);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert!(config.logging.json);
        assert_eq!(config.agent.api_key, "uv-key");
        assert_eq!(config.telephony.auth_token, "tw-token");
        assert_eq!(config.webhook.url, "https://n8n.example.com/hook");
    }

    #[test]
    fn unparsable_port_override_is_ignored() {
        let config = apply_env_overrides(Config::default(), |key| {
            (key == "CALLRELAY_PORT").then(|| "not-a-port".to_string())
        });
        assert_eq!(config.server.port, 8000);
    }

    #[test]
    fn telephony_debug_redacts_token() {
        let config = TelephonyConfig {
            auth_token: "tw-secret".to_string(),
            ..TelephonyConfig::default()
        };
        assert!(!format!("{:?}", config).contains("tw-secret"));
    }
}
