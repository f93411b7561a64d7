//! Client-side tools the voice agent can invoke during a call.
//!
//! The [`ToolDispatcher`] validates each invocation, routes it to the
//! knowledge base or the scheduling workflow, and always produces a single
//! result for the agent. Collaborators sit behind the [`KnowledgeBase`] and
//! [`Scheduler`] traits.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod knowledge;
pub mod manifest;
pub mod scheduling;

pub use config::{KnowledgeConfig, SchedulingConfig};
pub use dispatcher::{generic_failure, missing_schedule_params, ToolDispatcher, ToolOutcome};
pub use error::ToolError;
pub use knowledge::{collect_answer, AnswerChunk, AnswerStream, KnowledgeBase, PineconeAssistant};
pub use manifest::tool_manifest;
pub use scheduling::{parse_booking_response, BookingRequest, CalendarDirectory, Scheduler};
