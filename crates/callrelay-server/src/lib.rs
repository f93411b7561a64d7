//! Call relay server library logic.

pub mod api_calls;
pub mod api_media;
pub mod bridge;
pub mod config;
pub mod error;
pub mod registry;
pub mod telephony;
pub mod webhook;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use bridge::BridgeDeps;
use callrelay_tools::{tool_manifest, CalendarDirectory, PineconeAssistant, ToolDispatcher};
use callrelay_voice::{ConversationTemplate, UltravoxClient};
use config::Config;
use registry::InMemorySessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use telephony::TwilioClient;
use tower_http::trace::TraceLayer;
use webhook::{GreetingSource, WorkflowWebhook};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Collaborators handed to every call bridge.
    pub bridge: BridgeDeps,
    /// Opening-message lookup for inbound calls.
    pub greetings: Arc<dyn GreetingSource>,
    /// The public URL of the server.
    pub public_url: String,
    /// Opening message used when the workflow supplies none.
    pub default_first_message: String,
}

impl AppState {
    /// Wires the HTTP-backed collaborators described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.http.request_timeout_secs))
            .build()?;

        let webhook = Arc::new(WorkflowWebhook::new(http.clone(), config.webhook.url.clone()));
        let calendars = CalendarDirectory::new(config.scheduling.calendars.clone());
        let template = ConversationTemplate {
            system_prompt: config.agent.system_prompt.clone(),
            sample_rate: config.agent.sample_rate,
            tools: tool_manifest(&calendars.locations()),
        };
        let dispatcher = ToolDispatcher::new(
            Arc::new(PineconeAssistant::new(http.clone(), config.knowledge.clone())),
            webhook.clone(),
            calendars,
        );

        Ok(Self {
            bridge: BridgeDeps {
                registry: Arc::new(InMemorySessionRegistry::new()),
                agent: Arc::new(UltravoxClient::new(http.clone(), config.agent.clone())),
                dispatcher: Arc::new(dispatcher),
                transcripts: webhook.clone(),
                calls: Arc::new(TwilioClient::new(http, config.telephony.clone())),
                template,
            },
            greetings: webhook,
            public_url: config.server.public_url.clone(),
            default_first_message: config.webhook.default_first_message.clone(),
        })
    }
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(api_calls::root_handler))
        .route("/health", get(api_calls::health_handler))
        .route("/incoming-call", post(api_calls::incoming_call_handler))
        .route("/outgoing-call", post(api_calls::outgoing_call_handler))
        .route("/call-status", post(api_calls::call_status_handler))
        .route("/media-stream", get(api_media::media_stream_handler))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
