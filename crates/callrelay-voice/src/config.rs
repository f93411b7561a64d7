use serde::{Deserialize, Serialize};
use std::fmt;

/// Prompt used when no `agent.system_prompt` is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly phone receptionist. \
Keep answers short and conversational. Use the question_and_answer tool for \
questions about the company, schedule_meeting to book meetings, and hangUp \
once the caller says goodbye.";

fn default_api_url() -> String {
    "https://api.ultravox.ai".to_string()
}

fn default_model() -> String {
    "fixie-ai/ultravox-70B".to_string()
}

fn default_voice() -> String {
    "Tanya-English".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_sample_rate() -> u32 {
    8000
}

fn default_buffer_size_ms() -> u32 {
    60
}

fn default_system_prompt() -> String {
    DEFAULT_SYSTEM_PROMPT.to_string()
}

/// Agent platform settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Sample rate used in both directions. Must match the telephony leg.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Client-side playback buffer requested from the platform, in milliseconds.
    #[serde(default = "default_buffer_size_ms")]
    pub buffer_size_ms: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            model: default_model(),
            voice: default_voice(),
            temperature: default_temperature(),
            sample_rate: default_sample_rate(),
            buffer_size_ms: default_buffer_size_ms(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("api_url", &self.api_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("temperature", &self.temperature)
            .field("sample_rate", &self.sample_rate)
            .field("buffer_size_ms", &self.buffer_size_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_api_key() {
        let config = AgentConfig {
            api_key: "uv-secret".to_string(),
            ..AgentConfig::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("uv-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn telephony_rate_is_the_default() {
        let config = AgentConfig::default();
        assert_eq!(config.sample_rate, 8000);
        assert_eq!(config.buffer_size_ms, 60);
    }
}
