use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("agent platform error: {0}")]
    AgentPlatform(String),

    #[error("agent channel connect failed: {0}")]
    AgentConnect(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Audio conversion failures. The offending frame is dropped.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty audio frame")]
    Empty,

    #[error("PCM frame has odd length {0}; expected whole 16-bit samples")]
    OddLength(usize),
}

/// Malformed telephony media-stream frames.
#[derive(Error, Debug)]
pub enum MediaError {
    #[error("invalid media-stream JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("media-stream frame missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid base64 media payload: {0}")]
    Payload(#[from] base64::DecodeError),
}

/// Malformed agent control messages. The message is logged and ignored.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("agent message is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("agent message is not a JSON object")]
    NotAnObject,

    #[error("agent message missing field: {0}")]
    MissingField(&'static str),

    #[error("unknown transcript role: {0}")]
    UnknownRole(String),
}
