use crate::channel::{Frame, WsChannel, DEFAULT_CHANNEL_CAPACITY};
use crate::config::AgentConfig;
use crate::error::VoiceError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info};

/// Parameters for starting one agent conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentCallRequest {
    pub system_prompt: String,
    /// Sent to the agent as the first user turn.
    pub opening_user_message: String,
    pub sample_rate: u32,
    /// Tool manifest in the platform's `selectedTools` shape.
    pub tools: Value,
}

/// The per-deployment part of an [`AgentCallRequest`]; only the opening
/// message varies from call to call.
#[derive(Debug, Clone)]
pub struct ConversationTemplate {
    pub system_prompt: String,
    pub sample_rate: u32,
    pub tools: Value,
}

impl ConversationTemplate {
    pub fn request(&self, opening_user_message: impl Into<String>) -> AgentCallRequest {
        AgentCallRequest {
            system_prompt: self.system_prompt.clone(),
            opening_user_message: opening_user_message.into(),
            sample_rate: self.sample_rate,
            tools: self.tools.clone(),
        }
    }
}

/// Conversational agent platform.
#[async_trait]
pub trait AgentPlatform: Send + Sync {
    /// Creates a conversation and returns the address of its media channel.
    async fn create_call(&self, request: &AgentCallRequest) -> Result<String, VoiceError>;

    /// Opens the media channel returned by [`AgentPlatform::create_call`].
    async fn join(&self, join_url: &str) -> Result<WsChannel, VoiceError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateCallResponse {
    join_url: Option<String>,
}

/// Ultravox `serverWebSocket` client.
#[derive(Debug, Clone)]
pub struct UltravoxClient {
    http: reqwest::Client,
    config: AgentConfig,
}

impl UltravoxClient {
    pub fn new(http: reqwest::Client, config: AgentConfig) -> Self {
        Self { http, config }
    }

    pub fn is_configured(&self) -> bool {
        !self.config.api_key.is_empty()
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Builds the `POST /api/calls` body.
    pub fn call_payload(&self, request: &AgentCallRequest) -> Value {
        json!({
            "systemPrompt": request.system_prompt,
            "model": self.config.model,
            "voice": self.config.voice,
            "temperature": self.config.temperature,
            "initialMessages": [
                {
                    "role": "MESSAGE_ROLE_USER",
                    "text": request.opening_user_message,
                }
            ],
            "medium": {
                "serverWebSocket": {
                    "inputSampleRate": request.sample_rate,
                    "outputSampleRate": request.sample_rate,
                    "clientBufferSizeMs": self.config.buffer_size_ms,
                }
            },
            "selectedTools": request.tools,
        })
    }
}

#[async_trait]
impl AgentPlatform for UltravoxClient {
    async fn create_call(&self, request: &AgentCallRequest) -> Result<String, VoiceError> {
        if !self.is_configured() {
            return Err(VoiceError::Config(
                "agent.api_key is not set; set it in config or ULTRAVOX_API_KEY".to_string(),
            ));
        }

        let url = format!("{}/api/calls", self.config.api_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .header("X-API-Key", &self.config.api_key)
            .json(&self.call_payload(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VoiceError::AgentPlatform(format!(
                "create call returned {}: {}",
                status, body
            )));
        }

        let body: CreateCallResponse = response.json().await?;
        let join_url = body
            .join_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| VoiceError::AgentPlatform("response carried no joinUrl".to_string()))?;

        info!(join_url = %join_url, "agent conversation created");
        Ok(join_url)
    }

    async fn join(&self, join_url: &str) -> Result<WsChannel, VoiceError> {
        open_agent_channel(join_url).await
    }
}

/// Connects to an agent media channel and adapts it into a [`WsChannel`].
///
/// A writer task drains the outbound queue into the socket and closes the
/// socket once every sender is dropped. A reader task forwards data frames
/// until the peer closes or the bridge stops listening.
pub async fn open_agent_channel(join_url: &str) -> Result<WsChannel, VoiceError> {
    let (socket, _response) = tokio_tungstenite::connect_async(join_url)
        .await
        .map_err(|e| VoiceError::AgentConnect(e.to_string()))?;
    let (mut sink, mut stream) = socket.split();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Frame>(DEFAULT_CHANNEL_CAPACITY);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Frame>(DEFAULT_CHANNEL_CAPACITY);

    tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let message = match frame {
                Frame::Text(text) => Message::Text(text.into()),
                Frame::Binary(bytes) => Message::Binary(bytes.into()),
            };
            if let Err(e) = sink.send(message).await {
                debug!("agent channel write failed: {}", e);
                break;
            }
        }
        if let Err(e) = sink.close().await {
            debug!("agent channel close failed: {}", e);
        }
    });

    tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            let frame = match message {
                Ok(Message::Text(text)) => Frame::Text(text.as_str().to_owned()),
                Ok(Message::Binary(bytes)) => Frame::Binary(bytes.to_vec()),
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    debug!("agent channel read failed: {}", e);
                    break;
                }
            };
            if inbound_tx.send(frame).await.is_err() {
                break;
            }
        }
    });

    Ok(WsChannel::new(outbound_tx, inbound_rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> ConversationTemplate {
        ConversationTemplate {
            system_prompt: "Be helpful".to_string(),
            sample_rate: 8000,
            tools: json!([{"temporaryTool": {"modelToolName": "hangUp"}}]),
        }
    }

    #[test]
    fn template_fills_opening_message() {
        let request = template().request("Hi there");
        assert_eq!(request.opening_user_message, "Hi there");
        assert_eq!(request.system_prompt, "Be helpful");
        assert_eq!(request.sample_rate, 8000);
    }

    #[test]
    fn payload_uses_server_websocket_medium() {
        let client = UltravoxClient::new(reqwest::Client::new(), AgentConfig::default());
        let payload = client.call_payload(&template().request("Hi there"));

        assert_eq!(payload["initialMessages"][0]["role"], "MESSAGE_ROLE_USER");
        assert_eq!(payload["initialMessages"][0]["text"], "Hi there");
        assert_eq!(payload["medium"]["serverWebSocket"]["inputSampleRate"], 8000);
        assert_eq!(payload["medium"]["serverWebSocket"]["outputSampleRate"], 8000);
        assert_eq!(payload["medium"]["serverWebSocket"]["clientBufferSizeMs"], 60);
        assert_eq!(payload["selectedTools"][0]["temporaryTool"]["modelToolName"], "hangUp");
        assert_eq!(payload["model"], "fixie-ai/ultravox-70B");
    }

    #[tokio::test]
    async fn create_call_requires_api_key() {
        let client = UltravoxClient::new(reqwest::Client::new(), AgentConfig::default());
        let err = client
            .create_call(&template().request("Hi"))
            .await
            .expect_err("missing key must fail");
        assert!(matches!(err, VoiceError::Config(_)));
    }
}
