//! Telephony REST API and TwiML.

use crate::config::TelephonyConfig;
use crate::error::CollaboratorError;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

const SERVICE: &str = "telephony";

/// Events the telephony provider reports to the status callback.
const STATUS_CALLBACK_EVENTS: [&str; 4] = ["initiated", "ringing", "answered", "completed"];

/// Outbound call to place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginateRequest {
    pub to: String,
    /// Call instructions executed once the callee answers.
    pub twiml: String,
    pub status_callback: Option<String>,
}

#[async_trait]
pub trait CallControl: Send + Sync {
    /// Places an outbound call and returns its call id.
    async fn originate(&self, request: &OriginateRequest) -> Result<String, CollaboratorError>;

    /// Hangs up a live call.
    async fn end_call(&self, call_id: &str) -> Result<(), CollaboratorError>;
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: Option<String>,
}

/// Twilio Programmable Voice client.
#[derive(Debug, Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    config: TelephonyConfig,
}

impl TwilioClient {
    pub fn new(http: reqwest::Client, config: TelephonyConfig) -> Self {
        Self { http, config }
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls",
            self.config.api_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }

    fn ensure_configured(&self) -> Result<(), CollaboratorError> {
        if self.config.account_sid.is_empty() || self.config.auth_token.is_empty() {
            return Err(CollaboratorError::NotConfigured(
                "telephony.account_sid / telephony.auth_token",
            ));
        }
        Ok(())
    }

    async fn post_form(
        &self,
        url: String,
        form: &[(&str, &str)],
    ) -> Result<reqwest::Response, CollaboratorError> {
        let response = self
            .http
            .post(url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Status {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CallControl for TwilioClient {
    async fn originate(&self, request: &OriginateRequest) -> Result<String, CollaboratorError> {
        self.ensure_configured()?;
        if self.config.phone_number.is_empty() {
            return Err(CollaboratorError::NotConfigured("telephony.phone_number"));
        }

        let mut form = vec![
            ("To", request.to.as_str()),
            ("From", self.config.phone_number.as_str()),
            ("Twiml", request.twiml.as_str()),
        ];
        if let Some(callback) = &request.status_callback {
            form.push(("StatusCallback", callback.as_str()));
            for event in STATUS_CALLBACK_EVENTS {
                form.push(("StatusCallbackEvent", event));
            }
        }

        let response = self
            .post_form(format!("{}.json", self.calls_url()), &form)
            .await?;
        let call: CallResource = response.json().await?;
        let sid = call
            .sid
            .ok_or_else(|| CollaboratorError::InvalidResponse("call resource has no sid".to_string()))?;

        info!(call_sid = %sid, to = %request.to, "outbound call created");
        Ok(sid)
    }

    async fn end_call(&self, call_id: &str) -> Result<(), CollaboratorError> {
        self.ensure_configured()?;
        self.post_form(
            format!("{}/{}.json", self.calls_url(), call_id),
            &[("Status", "completed")],
        )
        .await?;
        info!(call_sid = %call_id, "telephony call ended");
        Ok(())
    }
}

/// Derives the media-stream WebSocket URL from the public base URL.
pub fn media_stream_url(public_url: &str) -> String {
    let base = public_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/media-stream", base)
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Builds TwiML that connects the call to a bidirectional media stream.
///
/// Each parameter is delivered back in the stream's `start` event as a
/// custom parameter.
pub fn connect_stream_twiml(stream_url: &str, parameters: &[(&str, &str)]) -> String {
    let mut twiml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response><Connect>"#);
    twiml.push_str(&format!(r#"<Stream url="{}">"#, escape_xml(stream_url)));
    for (name, value) in parameters {
        twiml.push_str(&format!(
            r#"<Parameter name="{}" value="{}" />"#,
            escape_xml(name),
            escape_xml(value)
        ));
    }
    twiml.push_str("</Stream></Connect></Response>");
    twiml
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn https_becomes_wss() {
        assert_eq!(
            media_stream_url("https://relay.example.com/"),
            "wss://relay.example.com/media-stream"
        );
        assert_eq!(
            media_stream_url("http://localhost:8000"),
            "ws://localhost:8000/media-stream"
        );
    }

    #[test]
    fn twiml_escapes_parameter_values() {
        let twiml = connect_stream_twiml(
            "wss://relay.example.com/media-stream",
            &[("firstMessage", "Hi \"Ada\" & <co>"), ("callerNumber", "+15551234567")],
        );

        assert!(twiml.contains(r#"<Stream url="wss://relay.example.com/media-stream">"#));
        assert!(twiml.contains(
            r#"<Parameter name="firstMessage" value="Hi &quot;Ada&quot; &amp; &lt;co&gt;" />"#
        ));
        assert!(twiml.contains(r#"<Parameter name="callerNumber" value="+15551234567" />"#));
        assert!(twiml.ends_with("</Stream></Connect></Response>"));
    }

    #[tokio::test]
    async fn unconfigured_client_refuses_to_call() {
        let client = TwilioClient::new(reqwest::Client::new(), TelephonyConfig::default());
        assert!(matches!(
            client.end_call("CA1").await,
            Err(CollaboratorError::NotConfigured(_))
        ));
    }
}
