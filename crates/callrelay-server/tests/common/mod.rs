//! In-process fakes for every collaborator the server talks to.

#![allow(dead_code)]

use async_trait::async_trait;
use callrelay_server::bridge::BridgeDeps;
use callrelay_server::error::CollaboratorError;
use callrelay_server::registry::InMemorySessionRegistry;
use callrelay_server::telephony::{CallControl, OriginateRequest};
use callrelay_server::webhook::{GreetingSource, TranscriptSink};
use callrelay_server::AppState;
use callrelay_tools::{
    tool_manifest, AnswerChunk, AnswerStream, BookingRequest, CalendarDirectory, KnowledgeBase,
    Scheduler, ToolDispatcher, ToolError,
};
use callrelay_voice::media::encode_media;
use callrelay_voice::{AgentCallRequest, AgentPlatform, ConversationTemplate, Frame, VoiceError, WsChannel};
use futures_util::stream::{self, StreamExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

pub const CALL_SID: &str = "CA100";
pub const STREAM_SID: &str = "MZ100";
pub const CALLER: &str = "+15551234567";
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Agent platform handing out one pre-built channel.
pub struct FakeAgent {
    pub fail_create: bool,
    channel: Mutex<Option<WsChannel>>,
    pub requests: Mutex<Vec<AgentCallRequest>>,
}

#[async_trait]
impl AgentPlatform for FakeAgent {
    async fn create_call(&self, request: &AgentCallRequest) -> Result<String, VoiceError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail_create {
            return Err(VoiceError::AgentPlatform("create call returned 503".to_string()));
        }
        Ok("wss://agent.test/join/1".to_string())
    }

    async fn join(&self, _join_url: &str) -> Result<WsChannel, VoiceError> {
        self.channel
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| VoiceError::AgentConnect("channel already taken".to_string()))
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub deliveries: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl TranscriptSink for RecordingSink {
    async fn deliver(&self, caller_number: &str, transcript: &str) -> Result<(), CollaboratorError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((caller_number.to_string(), transcript.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingCalls {
    pub fail_originate: bool,
    pub originated: Mutex<Vec<OriginateRequest>>,
    pub ended: Mutex<Vec<String>>,
}

#[async_trait]
impl CallControl for RecordingCalls {
    async fn originate(&self, request: &OriginateRequest) -> Result<String, CollaboratorError> {
        self.originated.lock().unwrap().push(request.clone());
        if self.fail_originate {
            return Err(CollaboratorError::Status {
                service: "telephony",
                status: 401,
                body: "Authenticate".to_string(),
            });
        }
        Ok("CA-out-1".to_string())
    }

    async fn end_call(&self, call_id: &str) -> Result<(), CollaboratorError> {
        self.ended.lock().unwrap().push(call_id.to_string());
        Ok(())
    }
}

pub enum KnowledgeBehavior {
    Answer(Vec<&'static str>),
    Fail,
    /// Signals `started` and never finishes.
    Hang(Arc<Notify>),
}

pub struct FakeKnowledge(pub KnowledgeBehavior);

#[async_trait]
impl KnowledgeBase for FakeKnowledge {
    async fn ask(&self, _question: &str) -> Result<AnswerStream, ToolError> {
        match &self.0 {
            KnowledgeBehavior::Answer(parts) => {
                let chunks: Vec<Result<AnswerChunk, ToolError>> = parts
                    .iter()
                    .map(|p| Ok(AnswerChunk::Content(p.to_string())))
                    .collect();
                Ok(stream::iter(chunks).boxed())
            }
            KnowledgeBehavior::Fail => Err(ToolError::Knowledge("assistant returned 500".to_string())),
            KnowledgeBehavior::Hang(started) => {
                started.notify_one();
                std::future::pending::<()>().await;
                unreachable!("pending never resolves")
            }
        }
    }
}

pub struct NoBookings;

#[async_trait]
impl Scheduler for NoBookings {
    async fn book(&self, _caller: &str, _request: &BookingRequest) -> Result<Option<String>, ToolError> {
        Ok(None)
    }
}

pub struct FakeGreetings {
    pub message: Option<String>,
    pub fail: bool,
}

#[async_trait]
impl GreetingSource for FakeGreetings {
    async fn opening_message(&self, _caller: &str) -> Result<Option<String>, CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::NotConfigured("webhook.url"));
        }
        Ok(self.message.clone())
    }
}

pub struct Harness {
    pub registry: Arc<InMemorySessionRegistry>,
    pub agent: Arc<FakeAgent>,
    pub sink: Arc<RecordingSink>,
    pub calls: Arc<RecordingCalls>,
    pub deps: BridgeDeps,
    /// Far end of the agent channel, as the agent platform sees it.
    pub agent_peer: WsChannel,
}

pub fn harness(knowledge: KnowledgeBehavior) -> Harness {
    harness_with(knowledge, false, RecordingCalls::default())
}

pub fn harness_with(knowledge: KnowledgeBehavior, fail_create: bool, calls: RecordingCalls) -> Harness {
    let (bridge_side, agent_peer) = WsChannel::pair(64);
    let registry = Arc::new(InMemorySessionRegistry::new());
    let agent = Arc::new(FakeAgent {
        fail_create,
        channel: Mutex::new(Some(bridge_side)),
        requests: Mutex::new(Vec::new()),
    });
    let sink = Arc::new(RecordingSink::default());
    let calls = Arc::new(calls);

    let calendars = CalendarDirectory::new(BTreeMap::from([(
        "London".to_string(),
        "london@calendar".to_string(),
    )]));
    let template = ConversationTemplate {
        system_prompt: "You are a receptionist.".to_string(),
        sample_rate: 8000,
        tools: tool_manifest(&calendars.locations()),
    };
    let dispatcher = ToolDispatcher::new(
        Arc::new(FakeKnowledge(knowledge)),
        Arc::new(NoBookings),
        calendars,
    );

    let deps = BridgeDeps {
        registry: registry.clone(),
        agent: agent.clone(),
        dispatcher: Arc::new(dispatcher),
        transcripts: sink.clone(),
        calls: calls.clone(),
        template,
    };

    Harness {
        registry,
        agent,
        sink,
        calls,
        deps,
        agent_peer,
    }
}

pub fn app_state(deps: BridgeDeps, greetings: FakeGreetings) -> AppState {
    AppState {
        bridge: deps,
        greetings: Arc::new(greetings),
        public_url: "https://relay.example.com".to_string(),
        default_first_message: "Hey, this is Sara. How can I help?".to_string(),
    }
}

pub fn start_event(call_sid: &str, stream_sid: &str, params: Value) -> String {
    json!({
        "event": "start",
        "sequenceNumber": "1",
        "start": {
            "streamSid": stream_sid,
            "callSid": call_sid,
            "customParameters": params
        },
        "streamSid": stream_sid
    })
    .to_string()
}

pub fn media_event(mu_law: &[u8]) -> String {
    encode_media(STREAM_SID, mu_law).unwrap()
}

pub fn stop_event() -> String {
    json!({ "event": "stop", "streamSid": STREAM_SID }).to_string()
}

pub fn tool_invocation(tool: &str, invocation_id: &str, parameters: Value) -> String {
    json!({
        "type": "client_tool_invocation",
        "toolName": tool,
        "invocationId": invocation_id,
        "parameters": parameters
    })
    .to_string()
}

pub fn transcript(role: &str, text: &str) -> String {
    json!({ "type": "transcript", "role": role, "text": text, "final": true }).to_string()
}

/// Receives the next frame or fails the test after [`RECV_TIMEOUT`].
pub async fn next_frame(rx: &mut mpsc::Receiver<Frame>) -> Option<Frame> {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for a frame")
}
