use callrelay_types::{ToolKind, DEFAULT_TOOL_DEADLINE};
use serde_json::{json, Value};

fn body_parameter(name: &str, description: &str) -> Value {
    json!({
        "name": name,
        "location": "PARAMETER_LOCATION_BODY",
        "schema": { "type": "string", "description": description },
        "required": true,
    })
}

/// Builds the client-side tool list offered to the agent.
///
/// `locations` restricts the meeting `location` parameter to the configured
/// calendars; an empty list leaves it free-form.
pub fn tool_manifest(locations: &[String]) -> Value {
    let timeout = format!("{}s", DEFAULT_TOOL_DEADLINE.as_secs());

    let mut location = body_parameter("location", "Meeting location");
    if !locations.is_empty() {
        location["schema"]["enum"] = json!(locations);
    }

    json!([
        {
            "temporaryTool": {
                "modelToolName": ToolKind::QUESTION_AND_ANSWER,
                "description": "Get answers to customer questions especially about AI employees",
                "dynamicParameters": [body_parameter("question", "Question to be answered")],
                "timeout": timeout,
                "client": {},
            }
        },
        {
            "temporaryTool": {
                "modelToolName": ToolKind::SCHEDULE_MEETING,
                "description": "Schedule a meeting for a customer. Returns a message indicating whether the booking was successful or not.",
                "dynamicParameters": [
                    body_parameter("name", "Customer's name"),
                    body_parameter("email", "Customer's email"),
                    body_parameter("purpose", "Purpose of the Meeting"),
                    body_parameter("datetime", "Meeting Datetime"),
                    location,
                ],
                "timeout": timeout,
                "client": {},
            }
        },
        {
            "temporaryTool": {
                "modelToolName": ToolKind::HANG_UP,
                "description": "End the call",
                "client": {},
            }
        }
    ])
}
