//! Agent tool invocations and their results.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Deadline advertised to the agent platform for client-side tools.
pub const DEFAULT_TOOL_DEADLINE: Duration = Duration::from_secs(20);

/// Tools the bridge knows how to run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// `question_and_answer`: answers customer questions from the knowledge base.
    QuestionAndAnswer,
    /// `schedule_meeting`: books a meeting through the scheduling workflow.
    ScheduleMeeting,
    /// `hangUp`: ends the call.
    HangUp,
    /// Any other name the agent sends.
    Unknown(String),
}

impl ToolKind {
    pub const QUESTION_AND_ANSWER: &'static str = "question_and_answer";
    pub const SCHEDULE_MEETING: &'static str = "schedule_meeting";
    pub const HANG_UP: &'static str = "hangUp";

    pub fn from_name(name: &str) -> Self {
        match name {
            Self::QUESTION_AND_ANSWER => Self::QuestionAndAnswer,
            Self::SCHEDULE_MEETING => Self::ScheduleMeeting,
            Self::HANG_UP => Self::HangUp,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::QuestionAndAnswer => Self::QUESTION_AND_ANSWER,
            Self::ScheduleMeeting => Self::SCHEDULE_MEETING,
            Self::HangUp => Self::HANG_UP,
            Self::Unknown(name) => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStatus {
    Pending,
    Completed,
    Failed,
}

/// A single tool call requested by the agent.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub invocation_id: String,
    pub tool: ToolKind,
    pub parameters: Map<String, Value>,
    pub status: InvocationStatus,
    pub deadline: Duration,
}

impl ToolInvocation {
    pub fn new(
        invocation_id: impl Into<String>,
        tool_name: &str,
        parameters: Map<String, Value>,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool: ToolKind::from_name(tool_name),
            parameters,
            status: InvocationStatus::Pending,
            deadline: DEFAULT_TOOL_DEADLINE,
        }
    }

    /// Returns a parameter as text.
    ///
    /// Absent, `null` and empty-string values count as missing. Non-string
    /// values are rendered as JSON.
    pub fn param(&self, name: &str) -> Option<String> {
        match self.parameters.get(name)? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Outcome reported back to the agent for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    Success {
        invocation_id: String,
        result: String,
    },
    Failure {
        invocation_id: String,
        message: String,
    },
}

impl ToolResult {
    pub fn success(invocation_id: impl Into<String>, result: impl Into<String>) -> Self {
        Self::Success {
            invocation_id: invocation_id.into(),
            result: result.into(),
        }
    }

    pub fn failure(invocation_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            invocation_id: invocation_id.into(),
            message: message.into(),
        }
    }

    pub fn invocation_id(&self) -> &str {
        match self {
            Self::Success { invocation_id, .. } | Self::Failure { invocation_id, .. } => {
                invocation_id
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Final status of the invocation this result answers.
    pub fn status(&self) -> InvocationStatus {
        if self.is_success() {
            InvocationStatus::Completed
        } else {
            InvocationStatus::Failed
        }
    }
}
