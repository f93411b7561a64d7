//! Workflow webhook collaborator.
//!
//! A single endpoint receives `{"route", "number", "data"}` envelopes:
//! route `1` looks up the opening message for a caller, route `2` delivers
//! the finished transcript and route `3` books a meeting.

use crate::error::CollaboratorError;
use async_trait::async_trait;
use callrelay_tools::{parse_booking_response, BookingRequest, Scheduler, ToolError};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

const SERVICE: &str = "workflow webhook";

/// Supplies the opening message for an inbound caller.
#[async_trait]
pub trait GreetingSource: Send + Sync {
    /// Returns `None` when the workflow has nothing to say for this caller.
    async fn opening_message(&self, caller_number: &str) -> Result<Option<String>, CollaboratorError>;
}

/// Receives the transcript once a call ends.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    async fn deliver(&self, caller_number: &str, transcript: &str) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    route: &'static str,
    number: &'a str,
    data: &'a str,
}

/// Extracts the opening message from a route-1 response body.
///
/// JSON bodies contribute their `firstMessage` field; anything that is not
/// JSON is taken as the message text itself.
pub fn parse_opening_message(body: &str) -> Option<String> {
    match serde_json::from_str::<Value>(body) {
        Ok(value) => value
            .get("firstMessage")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string),
        Err(_) => {
            let text = body.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowWebhook {
    http: reqwest::Client,
    url: String,
}

impl WorkflowWebhook {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    async fn post(&self, route: &'static str, number: &str, data: &str) -> Result<String, CollaboratorError> {
        if self.url.is_empty() {
            return Err(CollaboratorError::NotConfigured("webhook.url"));
        }

        debug!(route, number, "posting to workflow webhook");
        let response = self
            .http
            .post(&self.url)
            .json(&Envelope { route, number, data })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(CollaboratorError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[async_trait]
impl GreetingSource for WorkflowWebhook {
    async fn opening_message(&self, caller_number: &str) -> Result<Option<String>, CollaboratorError> {
        let body = self.post("1", caller_number, "empty").await?;
        Ok(parse_opening_message(&body))
    }
}

#[async_trait]
impl TranscriptSink for WorkflowWebhook {
    async fn deliver(&self, caller_number: &str, transcript: &str) -> Result<(), CollaboratorError> {
        self.post("2", caller_number, transcript).await?;
        info!(number = caller_number, bytes = transcript.len(), "transcript delivered");
        Ok(())
    }
}

#[async_trait]
impl Scheduler for WorkflowWebhook {
    async fn book(
        &self,
        caller_number: &str,
        request: &BookingRequest,
    ) -> Result<Option<String>, ToolError> {
        let data = serde_json::to_string(request)?;
        let body = self
            .post("3", caller_number, &data)
            .await
            .map_err(|e| ToolError::Scheduling(e.to_string()))?;
        parse_booking_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_message_from_json() {
        assert_eq!(
            parse_opening_message(r#"{"firstMessage":"Welcome back, Ada!"}"#),
            Some("Welcome back, Ada!".to_string())
        );
        assert_eq!(parse_opening_message(r#"{"firstMessage":""}"#), None);
        assert_eq!(parse_opening_message(r#"{"other":1}"#), None);
    }

    #[test]
    fn opening_message_from_raw_text() {
        assert_eq!(
            parse_opening_message("  Hello from the workflow \n"),
            Some("Hello from the workflow".to_string())
        );
        assert_eq!(parse_opening_message("   "), None);
    }

    #[test]
    fn envelope_shape() {
        let value = serde_json::to_value(Envelope {
            route: "2",
            number: "+15551234567",
            data: "User: Hi\n",
        })
        .unwrap();
        assert_eq!(
            value,
            serde_json::json!({"route": "2", "number": "+15551234567", "data": "User: Hi\n"})
        );
    }

    #[tokio::test]
    async fn unconfigured_webhook_is_reported() {
        let webhook = WorkflowWebhook::new(reqwest::Client::new(), "");
        assert!(matches!(
            webhook.deliver("+15551234567", "User: Hi\n").await,
            Err(CollaboratorError::NotConfigured(_))
        ));
    }
}
