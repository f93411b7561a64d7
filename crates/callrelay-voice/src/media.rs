//! Telephony media-stream envelope.
//!
//! Every frame on the telephony WebSocket is a JSON text frame with an
//! `event` discriminant. Audio travels base64-encoded inside `media.payload`
//! in both directions.

use crate::error::MediaError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Details carried by the `start` event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamStart {
    pub stream_sid: String,
    pub call_sid: String,
    /// `<Parameter>` values declared on the `<Stream>` element.
    pub custom_parameters: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelephonyEvent {
    Connected,
    Start(StreamStart),
    /// Decoded mu-law audio.
    Media(Vec<u8>),
    Stop,
    Mark(Option<String>),
    Other(String),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: Option<String>,
    start: Option<RawStart>,
    media: Option<RawMedia>,
    mark: Option<RawMark>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStart {
    stream_sid: Option<String>,
    call_sid: Option<String>,
    #[serde(default)]
    custom_parameters: HashMap<String, Value>,
}

#[derive(Debug, Deserialize, Serialize)]
struct RawMedia {
    payload: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMark {
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OutboundMedia<'a> {
    event: &'static str,
    stream_sid: &'a str,
    media: RawMedia,
}

/// Parses one telephony text frame.
pub fn parse_event(text: &str) -> Result<TelephonyEvent, MediaError> {
    let raw: RawEvent = serde_json::from_str(text)?;
    let event = raw.event.ok_or(MediaError::MissingField("event"))?;

    match event.as_str() {
        "connected" => Ok(TelephonyEvent::Connected),
        "start" => {
            let start = raw.start.ok_or(MediaError::MissingField("start"))?;
            let stream_sid = start
                .stream_sid
                .ok_or(MediaError::MissingField("start.streamSid"))?;
            let call_sid = start
                .call_sid
                .ok_or(MediaError::MissingField("start.callSid"))?;
            let custom_parameters = start
                .custom_parameters
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(s) => (key, s),
                    other => (key, other.to_string()),
                })
                .collect();
            Ok(TelephonyEvent::Start(StreamStart {
                stream_sid,
                call_sid,
                custom_parameters,
            }))
        }
        "media" => {
            let payload = raw
                .media
                .and_then(|m| m.payload)
                .ok_or(MediaError::MissingField("media.payload"))?;
            Ok(TelephonyEvent::Media(STANDARD.decode(payload)?))
        }
        "stop" => Ok(TelephonyEvent::Stop),
        "mark" => Ok(TelephonyEvent::Mark(raw.mark.and_then(|m| m.name))),
        _ => Ok(TelephonyEvent::Other(event)),
    }
}

/// Builds an outbound `media` frame carrying mu-law audio for `stream_sid`.
pub fn encode_media(stream_sid: &str, mu_law: &[u8]) -> Result<String, MediaError> {
    let frame = OutboundMedia {
        event: "media",
        stream_sid,
        media: RawMedia {
            payload: Some(STANDARD.encode(mu_law)),
        },
    };
    Ok(serde_json::to_string(&frame)?)
}
