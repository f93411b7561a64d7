//! Agent channel control messages.
//!
//! Binary frames on the agent channel are raw PCM and never reach this
//! module. Text frames are JSON objects whose kind is named by `type`, or
//! by `eventType` when `type` is absent. Parsing maps every frame onto the
//! closed [`AgentEvent`] enumeration; anything not understood becomes
//! [`AgentEvent::Unrecognized`] rather than an error so the caller can log
//! and move on.

use crate::error::ProtocolError;
use callrelay_types::{Role, ToolInvocation, ToolResult, TranscriptTurn};
use serde::Serialize;
use serde_json::{Map, Value};

/// Platform event kinds that are surfaced for logging only.
pub const OBSERVED_EVENT_KINDS: [&str; 4] = [
    "response.content.done",
    "response.done",
    "session.created",
    "conversation.item.input_audio_transcription.completed",
];

const TOOL_RESULT_KIND: &str = "client_tool_result";
const TOOL_RESPONSE: &str = "tool-response";
const IMPLEMENTATION_ERROR: &str = "implementation-error";

/// Structured notice nested inside a `debug` message, e.g. a tool result echo.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugNotice {
    pub kind: Option<String>,
    pub tool_name: Option<String>,
    pub output: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Transcript(TranscriptTurn),
    ToolInvocation(ToolInvocation),
    State(Option<String>),
    Debug {
        message: String,
        /// `None` when the message is not itself a JSON object.
        nested: Option<DebugNotice>,
    },
    Observed {
        kind: String,
        payload: Value,
    },
    Unrecognized {
        kind: Option<String>,
    },
}

/// Parses one text frame received from the agent.
pub fn parse_agent_message(text: &str) -> Result<AgentEvent, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(message) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let kind = string_field(&message, "type").or_else(|| string_field(&message, "eventType"));
    let Some(kind) = kind else {
        return Ok(AgentEvent::Unrecognized { kind: None });
    };

    match kind.as_str() {
        "transcript" => parse_transcript(&message).map(AgentEvent::Transcript),
        "client_tool_invocation" => parse_tool_invocation(message).map(AgentEvent::ToolInvocation),
        "state" => Ok(AgentEvent::State(string_field(&message, "state"))),
        "debug" => {
            let message = match message.get("message") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            let nested = parse_debug_notice(&message);
            Ok(AgentEvent::Debug { message, nested })
        }
        observed if OBSERVED_EVENT_KINDS.contains(&observed) => Ok(AgentEvent::Observed {
            kind: observed.to_string(),
            payload: Value::Object(message),
        }),
        other => Ok(AgentEvent::Unrecognized {
            kind: Some(other.to_string()),
        }),
    }
}

fn string_field(message: &Map<String, Value>, key: &str) -> Option<String> {
    match message.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn parse_transcript(message: &Map<String, Value>) -> Result<TranscriptTurn, ProtocolError> {
    let raw_role = string_field(message, "role").ok_or(ProtocolError::MissingField("role"))?;
    let role = Role::parse(&raw_role).ok_or(ProtocolError::UnknownRole(raw_role))?;
    let text = string_field(message, "text")
        .or_else(|| string_field(message, "delta"))
        .ok_or(ProtocolError::MissingField("text"))?;
    let is_final = message
        .get("final")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    Ok(TranscriptTurn::new(role, text, is_final))
}

fn parse_tool_invocation(mut message: Map<String, Value>) -> Result<ToolInvocation, ProtocolError> {
    let invocation_id = string_field(&message, "invocationId")
        .ok_or(ProtocolError::MissingField("invocationId"))?;
    let tool_name = string_field(&message, "toolName").unwrap_or_default();
    let parameters = match message.remove("parameters") {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };

    Ok(ToolInvocation::new(invocation_id, &tool_name, parameters))
}

fn parse_debug_notice(message: &str) -> Option<DebugNotice> {
    let Ok(Value::Object(nested)) = serde_json::from_str::<Value>(message) else {
        return None;
    };
    Some(DebugNotice {
        kind: string_field(&nested, "type"),
        tool_name: string_field(&nested, "toolName"),
        output: nested.get("output").cloned(),
    })
}

#[derive(Debug, Serialize)]
struct ToolResultMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "invocationId")]
    invocation_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_type: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

/// Serializes a tool result into the `client_tool_result` message.
pub fn encode_tool_result(result: &ToolResult) -> Result<String, ProtocolError> {
    let message = match result {
        ToolResult::Success {
            invocation_id,
            result,
        } => ToolResultMessage {
            kind: TOOL_RESULT_KIND,
            invocation_id,
            result: Some(result),
            response_type: Some(TOOL_RESPONSE),
            error_type: None,
            error_message: None,
        },
        ToolResult::Failure {
            invocation_id,
            message,
        } => ToolResultMessage {
            kind: TOOL_RESULT_KIND,
            invocation_id,
            result: None,
            response_type: None,
            error_type: Some(IMPLEMENTATION_ERROR),
            error_message: Some(message),
        },
    };
    Ok(serde_json::to_string(&message)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use callrelay_types::ToolKind;
    use serde_json::json;

    #[test]
    fn transcript_prefers_text_over_delta() {
        let event = parse_agent_message(
            &json!({"type": "transcript", "role": "agent", "text": "Hello", "delta": "He", "final": true})
                .to_string(),
        )
        .unwrap();
        assert_eq!(
            event,
            AgentEvent::Transcript(TranscriptTurn::new(Role::Agent, "Hello", true))
        );
    }

    #[test]
    fn transcript_falls_back_to_delta() {
        let event = parse_agent_message(
            &json!({"type": "transcript", "role": "user", "delta": "pric"}).to_string(),
        )
        .unwrap();
        assert_eq!(
            event,
            AgentEvent::Transcript(TranscriptTurn::new(Role::User, "pric", false))
        );
    }

    #[test]
    fn transcript_without_text_is_rejected() {
        let err = parse_agent_message(&json!({"type": "transcript", "role": "user"}).to_string())
            .unwrap_err();
        assert!(matches!(err, ProtocolError::MissingField("text")));
    }

    #[test]
    fn event_type_is_used_when_type_is_absent() {
        let event =
            parse_agent_message(&json!({"eventType": "state", "state": "listening"}).to_string())
                .unwrap();
        assert_eq!(event, AgentEvent::State(Some("listening".to_string())));
    }

    #[test]
    fn tool_invocation_carries_parameters() {
        let event = parse_agent_message(
            &json!({
                "type": "client_tool_invocation",
                "toolName": "question_and_answer",
                "invocationId": "inv-7",
                "parameters": {"question": "What is your pricing?"}
            })
            .to_string(),
        )
        .unwrap();

        let AgentEvent::ToolInvocation(invocation) = event else {
            panic!("expected tool invocation");
        };
        assert_eq!(invocation.invocation_id, "inv-7");
        assert_eq!(invocation.tool, ToolKind::QuestionAndAnswer);
        assert_eq!(
            invocation.param("question").as_deref(),
            Some("What is your pricing?")
        );
    }

    #[test]
    fn debug_with_nested_tool_result() {
        let nested = json!({"type": "toolResult", "toolName": "hangUp", "output": "done"}).to_string();
        let event =
            parse_agent_message(&json!({"type": "debug", "message": nested}).to_string()).unwrap();

        let AgentEvent::Debug { nested, .. } = event else {
            panic!("expected debug");
        };
        let nested = nested.expect("nested notice should parse");
        assert_eq!(nested.kind.as_deref(), Some("toolResult"));
        assert_eq!(nested.tool_name.as_deref(), Some("hangUp"));
        assert_eq!(nested.output, Some(json!("done")));
    }

    #[test]
    fn debug_with_plain_text_is_not_an_error() {
        let event =
            parse_agent_message(&json!({"type": "debug", "message": "LLM warmup"}).to_string())
                .unwrap();
        assert_eq!(
            event,
            AgentEvent::Debug {
                message: "LLM warmup".to_string(),
                nested: None
            }
        );
    }

    #[test]
    fn observed_and_unknown_kinds() {
        let observed = parse_agent_message(r#"{"type":"session.created"}"#).unwrap();
        assert!(matches!(observed, AgentEvent::Observed { ref kind, .. } if kind == "session.created"));

        let unknown = parse_agent_message(r#"{"type":"playback_clear_buffer"}"#).unwrap();
        assert_eq!(
            unknown,
            AgentEvent::Unrecognized {
                kind: Some("playback_clear_buffer".to_string())
            }
        );
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            parse_agent_message("not json"),
            Err(ProtocolError::Json(_))
        ));
        assert!(matches!(
            parse_agent_message("[1,2]"),
            Err(ProtocolError::NotAnObject)
        ));
    }

    #[test]
    fn success_result_shape() {
        let text = encode_tool_result(&ToolResult::success("inv-1", "Call ended successfully")).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "client_tool_result",
                "invocationId": "inv-1",
                "result": "Call ended successfully",
                "response_type": "tool-response"
            })
        );
    }

    #[test]
    fn failure_result_shape() {
        let text = encode_tool_result(&ToolResult::failure("inv-2", "An error occurred.")).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "client_tool_result",
                "invocationId": "inv-2",
                "error_type": "implementation-error",
                "error_message": "An error occurred."
            })
        );
    }
}
