//! Voice plumbing for callrelay.
//!
//! Converts telephony audio (8-bit mu-law) to the 16-bit linear PCM the
//! voice agent speaks and back, parses the two wire protocols a call bridge
//! sits between, and talks to the agent platform to start conversations.
//!
//! The telephony side speaks the media-stream envelope in [`media`]; the
//! agent side sends binary PCM frames plus JSON control messages described
//! in [`protocol`]. Both connections are surfaced to the bridge as a
//! [`WsChannel`], a pair of bounded queues, so the bridge itself never
//! touches a socket.

pub mod agent;
pub mod channel;
pub mod codec;
pub mod config;
pub mod error;
pub mod media;
pub mod protocol;

pub use agent::{open_agent_channel, AgentCallRequest, AgentPlatform, ConversationTemplate, UltravoxClient};
pub use channel::{Frame, WsChannel, DEFAULT_CHANNEL_CAPACITY};
pub use codec::{decode_telephony_frame, encode_agent_frame};
pub use config::AgentConfig;
pub use error::{CodecError, MediaError, ProtocolError, VoiceError};
pub use media::{StreamStart, TelephonyEvent};
pub use protocol::{AgentEvent, DebugNotice};
