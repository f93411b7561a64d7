//! Shared types for the callrelay workspace.
//!
//! This crate holds the per-call records that every other crate passes
//! around: the [`Session`] registered for a call, the [`Transcript`] it
//! accumulates, and the [`ToolInvocation`] / [`ToolResult`] pair exchanged
//! with the voice agent.
//!
//! It carries no I/O and no runtime dependencies so that the codec, tool and
//! server crates can all depend on it without cycles.

pub mod session;
pub mod tool;
pub mod transcript;

pub use session::{Session, SessionError, SessionState};
pub use tool::{InvocationStatus, ToolInvocation, ToolKind, ToolResult, DEFAULT_TOOL_DEADLINE};
pub use transcript::{Role, Transcript, TranscriptTurn};
