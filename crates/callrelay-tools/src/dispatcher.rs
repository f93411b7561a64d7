//! Routes agent tool invocations to their handlers.
//!
//! Every invocation yields exactly one [`ToolResult`]. Handlers that need an
//! external collaborator are awaited through [`ToolDispatcher::dispatch`];
//! everything that can be answered without one (end-call, unknown tools,
//! parameter validation) is available synchronously from
//! [`ToolDispatcher::answer_inline`] so the caller can reply without leaving
//! the audio path.

use crate::knowledge::{collect_answer, KnowledgeBase};
use crate::scheduling::{BookingRequest, CalendarDirectory, Scheduler};
use callrelay_types::{ToolInvocation, ToolKind, ToolResult};
use std::sync::Arc;
use tracing::{info, warn};

pub const QUESTION_FAILED: &str = "An error occurred while processing your request.";
pub const SCHEDULING_FAILED: &str = "An error occurred while scheduling your meeting.";
pub const SCHEDULING_UNAVAILABLE: &str = "I'm sorry, I couldn't schedule the meeting at this time.";
pub const CALL_ENDED: &str = "Call ended successfully";
pub const TOOL_UNAVAILABLE: &str = "This tool is not available.";

/// Parameters `schedule_meeting` requires, in the order they are asked for.
pub const SCHEDULE_PARAMS: [&str; 5] = ["name", "email", "purpose", "datetime", "location"];

/// What the bridge should do with a finished invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// Send the result and keep the call going.
    Reply(ToolResult),
    /// Send the result, then end the call.
    EndCall(ToolResult),
}

impl ToolOutcome {
    pub fn result(&self) -> &ToolResult {
        match self {
            Self::Reply(result) | Self::EndCall(result) => result,
        }
    }

    pub fn ends_call(&self) -> bool {
        matches!(self, Self::EndCall(_))
    }
}

pub struct ToolDispatcher {
    knowledge: Arc<dyn KnowledgeBase>,
    scheduler: Arc<dyn Scheduler>,
    calendars: CalendarDirectory,
}

impl ToolDispatcher {
    pub fn new(
        knowledge: Arc<dyn KnowledgeBase>,
        scheduler: Arc<dyn Scheduler>,
        calendars: CalendarDirectory,
    ) -> Self {
        Self {
            knowledge,
            scheduler,
            calendars,
        }
    }

    pub fn calendars(&self) -> &CalendarDirectory {
        &self.calendars
    }

    /// Answers the invocation without contacting a collaborator, if possible.
    ///
    /// Returns `None` when the invocation is valid and must go through
    /// [`ToolDispatcher::dispatch`].
    pub fn answer_inline(&self, invocation: &ToolInvocation) -> Option<ToolOutcome> {
        let id = invocation.invocation_id.as_str();
        match &invocation.tool {
            ToolKind::HangUp => Some(ToolOutcome::EndCall(ToolResult::success(id, CALL_ENDED))),
            ToolKind::Unknown(name) => {
                warn!(tool = %name, invocation_id = %id, "agent invoked an unknown tool");
                Some(ToolOutcome::Reply(ToolResult::failure(id, TOOL_UNAVAILABLE)))
            }
            ToolKind::QuestionAndAnswer => {
                if invocation.param("question").is_some() {
                    return None;
                }
                warn!(invocation_id = %id, "question_and_answer invoked without a question");
                Some(ToolOutcome::Reply(ToolResult::failure(id, QUESTION_FAILED)))
            }
            ToolKind::ScheduleMeeting => {
                let missing = missing_schedule_params(invocation);
                if !missing.is_empty() {
                    info!(invocation_id = %id, missing = ?missing, "schedule_meeting missing parameters");
                    let prompt = format!(
                        "Please provide the following information to schedule your meeting: {}.",
                        missing.join(", ")
                    );
                    return Some(ToolOutcome::Reply(ToolResult::success(id, prompt)));
                }

                let location = invocation.param("location").unwrap_or_default();
                match self.calendars.resolve(&location) {
                    Ok(_) => None,
                    Err(e) => {
                        warn!(invocation_id = %id, "schedule_meeting rejected: {}", e);
                        Some(ToolOutcome::Reply(ToolResult::failure(id, SCHEDULING_FAILED)))
                    }
                }
            }
        }
    }

    /// Runs the invocation to completion and returns its single result.
    pub async fn dispatch(&self, invocation: &ToolInvocation, caller_number: &str) -> ToolOutcome {
        if let Some(outcome) = self.answer_inline(invocation) {
            return outcome;
        }

        let result = match invocation.tool {
            ToolKind::QuestionAndAnswer => self.answer_question(invocation).await,
            ToolKind::ScheduleMeeting => self.schedule_meeting(invocation, caller_number).await,
            // answer_inline covers every other kind.
            ToolKind::HangUp | ToolKind::Unknown(_) => {
                ToolResult::failure(invocation.invocation_id.as_str(), TOOL_UNAVAILABLE)
            }
        };
        ToolOutcome::Reply(result)
    }

    async fn answer_question(&self, invocation: &ToolInvocation) -> ToolResult {
        let id = invocation.invocation_id.as_str();
        let question = invocation.param("question").unwrap_or_default();
        info!(invocation_id = %id, question = %question, "answering question");

        let answer = match self.knowledge.ask(&question).await {
            Ok(chunks) => collect_answer(chunks).await,
            Err(e) => Err(e),
        };
        match answer {
            Ok(answer) => ToolResult::success(id, answer),
            Err(e) => {
                warn!(invocation_id = %id, "knowledge lookup failed: {}", e);
                ToolResult::failure(id, QUESTION_FAILED)
            }
        }
    }

    async fn schedule_meeting(&self, invocation: &ToolInvocation, caller_number: &str) -> ToolResult {
        let id = invocation.invocation_id.as_str();
        let param = |name: &str| invocation.param(name).unwrap_or_default();

        let calendar_id = match self.calendars.resolve(&param("location")) {
            Ok(calendar_id) => calendar_id.to_string(),
            Err(e) => {
                warn!(invocation_id = %id, "schedule_meeting rejected: {}", e);
                return ToolResult::failure(id, SCHEDULING_FAILED);
            }
        };
        let request = BookingRequest {
            name: param("name"),
            email: param("email"),
            purpose: param("purpose"),
            datetime: param("datetime"),
            calendar_id,
        };

        match self.scheduler.book(caller_number, &request).await {
            Ok(Some(message)) => ToolResult::success(id, message),
            Ok(None) => ToolResult::success(id, SCHEDULING_UNAVAILABLE),
            Err(e) => {
                warn!(invocation_id = %id, "booking failed: {}", e);
                ToolResult::failure(id, SCHEDULING_FAILED)
            }
        }
    }
}

/// The generic failure reported when a tool could not run to completion.
pub fn generic_failure(invocation: &ToolInvocation) -> ToolResult {
    let message = match invocation.tool {
        ToolKind::QuestionAndAnswer => QUESTION_FAILED,
        ToolKind::ScheduleMeeting => SCHEDULING_FAILED,
        ToolKind::HangUp | ToolKind::Unknown(_) => TOOL_UNAVAILABLE,
    };
    ToolResult::failure(invocation.invocation_id.as_str(), message)
}

/// Required `schedule_meeting` parameters that are absent, null or empty.
pub fn missing_schedule_params(invocation: &ToolInvocation) -> Vec<&'static str> {
    SCHEDULE_PARAMS
        .iter()
        .copied()
        .filter(|name| invocation.param(name).is_none())
        .collect()
}
