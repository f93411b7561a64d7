//! Call setup endpoints: inbound webhook, outbound origination and status callbacks.

use crate::error::ApiError;
use crate::registry::RegistryError;
use crate::telephony::{connect_stream_twiml, media_stream_url, OriginateRequest};
use crate::AppState;
use axum::{
    extract::{Extension, Form, Json},
    http::{header, HeaderMap},
    response::IntoResponse,
};
use callrelay_types::Session;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

const UNKNOWN_CALLER: &str = "Unknown";

/// Request body for `POST /outgoing-call`.
#[derive(Debug, Deserialize)]
pub struct OutgoingCallRequest {
    #[serde(rename = "phoneNumber", default)]
    pub phone_number: Option<String>,
    #[serde(rename = "firstMessage", default)]
    pub first_message: Option<String>,
}

/// Handler for `GET /`.
pub async fn root_handler() -> Json<Value> {
    Json(json!({ "message": "Call relay media stream server is running!" }))
}

/// Handler for `GET /health`.
pub async fn health_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "activeCalls": state.bridge.registry.len()
    }))
}

/// Base URL telephony should use to reach this server.
///
/// Prefers the configured public URL and falls back to the request's `Host`
/// header.
fn public_base(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    if !state.public_url.is_empty() {
        return Ok(state.public_url.trim_end_matches('/').to_string());
    }
    headers
        .get(header::HOST)
        .and_then(|host| host.to_str().ok())
        .map(|host| format!("https://{}", host))
        .ok_or_else(|| {
            ApiError::InternalServerError("server.public_url is not configured".to_string())
        })
}

fn registry_error(err: RegistryError) -> ApiError {
    match err {
        RegistryError::DuplicateCall(call_id) => {
            ApiError::Conflict(format!("call {} is already registered", call_id))
        }
    }
}

/// Handler for `POST /incoming-call`.
///
/// Looks up the opening message, registers the session and answers with
/// TwiML that connects the call to `/media-stream`.
pub async fn incoming_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Form(params): Form<HashMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let call_sid = params
        .get("CallSid")
        .filter(|sid| !sid.is_empty())
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("CallSid is required".to_string()))?;
    let caller_number = params
        .get("From")
        .filter(|from| !from.is_empty())
        .cloned()
        .unwrap_or_else(|| UNKNOWN_CALLER.to_string());
    tracing::info!(call_sid = %call_sid, caller = %caller_number, "incoming call");

    let first_message = match state.greetings.opening_message(&caller_number).await {
        Ok(Some(message)) => message,
        Ok(None) => state.default_first_message.clone(),
        Err(e) => {
            tracing::warn!(call_sid = %call_sid, "opening message lookup failed: {}", e);
            state.default_first_message.clone()
        }
    };

    let stream_url = media_stream_url(&public_base(&state, &headers)?);

    let mut metadata: Map<String, Value> = params
        .iter()
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    metadata.insert(
        "receivedAt".to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    let session = Session::new(&call_sid, &caller_number, &first_message).with_metadata(metadata);
    state
        .bridge
        .registry
        .create(session)
        .map_err(registry_error)?;

    let twiml = connect_stream_twiml(
        &stream_url,
        &[
            ("firstMessage", first_message.as_str()),
            ("callerNumber", caller_number.as_str()),
            ("callSid", call_sid.as_str()),
        ],
    );
    Ok(([(header::CONTENT_TYPE, "text/xml")], twiml))
}

/// Handler for `POST /outgoing-call`.
pub async fn outgoing_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let request: OutgoingCallRequest = serde_json::from_value(body.clone())
        .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?;
    let phone_number = request
        .phone_number
        .filter(|number| !number.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Phone number is required".to_string()))?;
    let first_message = request.first_message.unwrap_or_default();
    tracing::info!(to = %phone_number, "initiating outbound call");

    let base = public_base(&state, &headers)?;
    let twiml = connect_stream_twiml(
        &media_stream_url(&base),
        &[
            ("firstMessage", first_message.as_str()),
            ("callerNumber", phone_number.as_str()),
        ],
    );
    let originate = OriginateRequest {
        to: phone_number.clone(),
        twiml,
        status_callback: Some(format!("{}/call-status", base)),
    };

    let call_sid = state
        .bridge
        .calls
        .originate(&originate)
        .await
        .map_err(|e| {
            tracing::error!(to = %phone_number, "failed to create call: {}", e);
            ApiError::InternalServerError(e.to_string())
        })?;

    let mut metadata = Map::new();
    metadata.insert("originalRequest".to_string(), body);
    metadata.insert(
        "startTime".to_string(),
        Value::String(chrono::Utc::now().to_rfc3339()),
    );
    let session = Session::new(&call_sid, &phone_number, &first_message).with_metadata(metadata);
    state
        .bridge
        .registry
        .create(session)
        .map_err(registry_error)?;

    Ok(Json(json!({ "success": true, "callSid": call_sid })))
}

/// Handler for `POST /call-status`.
pub async fn call_status_handler(Form(params): Form<HashMap<String, String>>) -> Json<Value> {
    let field = |name: &str| params.get(name).map(String::as_str).unwrap_or("");
    tracing::info!(
        call_sid = field("CallSid"),
        status = field("CallStatus"),
        duration = field("CallDuration"),
        timestamp = field("Timestamp"),
        "call status update"
    );
    Json(json!({ "success": true }))
}
