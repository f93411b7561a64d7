//! Per-call session record.
//!
//! A `Session` is registered by call setup before the media stream opens and
//! is mutated by the call bridge while the call is live: the caller number is
//! confirmed, the media stream is bound and transcript turns are appended.

use crate::transcript::{Transcript, TranscriptTurn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Lifecycle of a session as seen by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Registered by call setup; no media stream yet.
    #[default]
    Registered,
    /// A bridge is relaying audio for this call.
    Streaming,
    /// The call has ended and the transcript was flushed.
    Terminated,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("media stream already bound: {0}")]
    StreamAlreadyBound(String),
}

/// Record kept for one call from setup to termination.
#[derive(Debug, Clone)]
pub struct Session {
    pub call_id: String,
    pub caller_number: String,
    /// Raw details supplied by call setup (webhook form fields, origination request).
    pub call_metadata: Map<String, Value>,
    /// Opening message handed to the agent as the first user turn.
    pub initial_prompt: String,
    pub transcript: Transcript,
    pub state: SessionState,
    media_stream_id: Option<String>,
}

impl Session {
    pub fn new(
        call_id: impl Into<String>,
        caller_number: impl Into<String>,
        initial_prompt: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            caller_number: caller_number.into(),
            call_metadata: Map::new(),
            initial_prompt: initial_prompt.into(),
            transcript: Transcript::new(),
            state: SessionState::Registered,
            media_stream_id: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.call_metadata = metadata;
        self
    }

    pub fn media_stream_id(&self) -> Option<&str> {
        self.media_stream_id.as_deref()
    }

    /// Binds the telephony media stream to this session.
    ///
    /// The stream id can only be set once; later attempts fail and leave the
    /// original binding untouched.
    pub fn bind_media_stream(&mut self, stream_id: impl Into<String>) -> Result<(), SessionError> {
        if let Some(existing) = &self.media_stream_id {
            return Err(SessionError::StreamAlreadyBound(existing.clone()));
        }
        self.media_stream_id = Some(stream_id.into());
        Ok(())
    }

    pub fn append_turn(&mut self, turn: TranscriptTurn) {
        self.transcript.push(turn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Role;

    #[test]
    fn new_session_is_registered_without_stream() {
        let session = Session::new("CA123", "+15551234567", "Hi there");
        assert_eq!(session.state, SessionState::Registered);
        assert_eq!(session.media_stream_id(), None);
        assert!(session.transcript.is_empty());
    }

    #[test]
    fn media_stream_binds_exactly_once() {
        let mut session = Session::new("CA123", "+15551234567", "Hi there");
        session.bind_media_stream("MZ1").expect("first bind should succeed");

        let err = session
            .bind_media_stream("MZ2")
            .expect_err("second bind must fail");
        assert_eq!(err, SessionError::StreamAlreadyBound("MZ1".to_string()));
        assert_eq!(session.media_stream_id(), Some("MZ1"));
    }

    #[test]
    fn append_turn_grows_transcript() {
        let mut session = Session::new("CA123", "+15551234567", "Hi there");
        session.append_turn(TranscriptTurn::new(Role::User, "Hello", true));
        assert_eq!(session.transcript.render(), "User: Hello\n");
    }
}
