use crate::error::ToolError;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Booking forwarded to the scheduling workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingRequest {
    pub name: String,
    pub email: String,
    pub purpose: String,
    pub datetime: String,
    pub calendar_id: String,
}

#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Books a meeting on behalf of `caller_number`.
    ///
    /// Returns the workflow's human-readable outcome, or `None` when the
    /// response carried no message.
    async fn book(
        &self,
        caller_number: &str,
        request: &BookingRequest,
    ) -> Result<Option<String>, ToolError>;
}

/// Extracts the `message` field from a scheduling workflow response body.
pub fn parse_booking_response(body: &str) -> Result<Option<String>, ToolError> {
    let value: Value = serde_json::from_str(body)?;
    if !value.is_object() {
        return Err(ToolError::Scheduling(
            "booking response is not a JSON object".to_string(),
        ));
    }
    Ok(value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string))
}

/// Static mapping from meeting location to calendar id.
#[derive(Debug, Clone, Default)]
pub struct CalendarDirectory {
    calendars: BTreeMap<String, String>,
}

impl CalendarDirectory {
    pub fn new(calendars: BTreeMap<String, String>) -> Self {
        Self { calendars }
    }

    /// Location names in the order they are offered to the agent.
    pub fn locations(&self) -> Vec<String> {
        self.calendars.keys().cloned().collect()
    }

    /// Resolves a location to its calendar id.
    ///
    /// Exact matches win; otherwise the lookup ignores case and surrounding
    /// whitespace, since the agent relays what the caller said.
    pub fn resolve(&self, location: &str) -> Result<&str, ToolError> {
        if let Some(id) = self.calendars.get(location) {
            return Ok(id);
        }
        let wanted = location.trim();
        self.calendars
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, id)| id.as_str())
            .ok_or_else(|| ToolError::UnknownLocation(location.to_string()))
    }
}
