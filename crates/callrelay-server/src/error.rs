use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crate::bridge::BridgePhase;
use callrelay_voice::VoiceError;
use thiserror::Error;

/// HTTP API error type mapping to status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

/// Failures talking to the telephony REST API or the workflow webhook.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Failures that stop a call before audio starts flowing.
///
/// The telephony channel is closed and the call never streams.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("no session registered for call {0}")]
    SessionNotFound(String),

    #[error("call {call_id} already bound to stream {existing}")]
    StreamAlreadyBound { call_id: String, existing: String },

    #[error("agent platform refused the call: {0}")]
    AgentPlatform(String),

    #[error("could not open agent channel: {0}")]
    AgentConnect(String),

    #[error("telephony channel closed before the stream started")]
    TelephonyClosed,

    #[error("bridge already used (phase {0:?}); each call needs a new bridge")]
    AlreadyUsed(BridgePhase),
}

impl From<VoiceError> for BridgeError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::AgentConnect(detail) => BridgeError::AgentConnect(detail),
            other => BridgeError::AgentPlatform(other.to_string()),
        }
    }
}
