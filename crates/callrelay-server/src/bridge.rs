//! Per-call bridge between the telephony media stream and the voice agent.
//!
//! A bridge waits for the telephony `start` event, resolves the session that
//! call setup registered, starts an agent conversation and then runs two
//! pumps until either side ends the call:
//!
//! - the inbound pump moves telephony audio to the agent;
//! - the outbound pump moves agent audio to telephony and handles
//!   transcripts and tool invocations.
//!
//! Both pumps are polled concurrently and never wait on each other's
//! queues. Audio is offered with `try_send` and dropped when the receiving
//! queue is full. Tool results that find the agent queue full wait in a
//! backlog that the outbound pump flushes as room appears.
//!
//! Phases: `Init -> AwaitingAgent -> Streaming -> Terminating -> Closed`.
//! Setup failures jump straight to `Closed` without streaming. Leaving
//! `Streaming` is a compare-and-set so only one termination ever runs.
//!
//! Tool invocations that reach an external collaborator run on their own
//! tasks in a `JoinSet`. Whatever is still running when the call ends is
//! aborted and reported as abandoned.

use crate::error::BridgeError;
use crate::registry::{lock_session, SessionHandle, SessionRegistry};
use crate::telephony::CallControl;
use crate::webhook::TranscriptSink;
use callrelay_tools::{generic_failure, ToolDispatcher, ToolOutcome};
use callrelay_types::{InvocationStatus, SessionError, SessionState, ToolInvocation};
use callrelay_voice::media::{encode_media, parse_event};
use callrelay_voice::protocol::{encode_tool_result, parse_agent_message};
use callrelay_voice::{
    decode_telephony_frame, encode_agent_frame, AgentEvent, AgentPlatform, ConversationTemplate,
    Frame, StreamStart, TelephonyEvent, WsChannel,
};
use futures_util::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, trace, warn};

/// Opening message used when neither the session nor the stream supplies one.
pub const DEFAULT_OPENING_MESSAGE: &str = "Hello, how can I assist you?";

const FIRST_MESSAGE_PARAM: &str = "firstMessage";
const CALLER_NUMBER_PARAM: &str = "callerNumber";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BridgePhase {
    Init = 0,
    AwaitingAgent = 1,
    Streaming = 2,
    Terminating = 3,
    Closed = 4,
}

impl BridgePhase {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Init,
            1 => Self::AwaitingAgent,
            2 => Self::Streaming,
            3 => Self::Terminating,
            _ => Self::Closed,
        }
    }
}

#[derive(Debug)]
struct PhaseCell(AtomicU8);

impl PhaseCell {
    fn new() -> Self {
        Self(AtomicU8::new(BridgePhase::Init as u8))
    }

    fn load(&self) -> BridgePhase {
        BridgePhase::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves `from -> to`. Returns `false` if the bridge was not in `from`.
    fn advance(&self, from: BridgePhase, to: BridgePhase) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn close(&self) {
        self.0.store(BridgePhase::Closed as u8, Ordering::Release);
    }
}

/// What ended a streaming call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    TelephonyDisconnected,
    TelephonyStop,
    AgentClosed,
    EndCallTool,
}

/// Summary of a call that reached streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeReport {
    pub call_id: String,
    pub reason: TerminationReason,
    /// Tool invocations still in flight at termination, sorted.
    pub abandoned: Vec<String>,
    /// Audio frames dropped because the receiving queue was full.
    pub dropped_audio: u64,
}

/// Collaborators shared by every bridge.
#[derive(Clone)]
pub struct BridgeDeps {
    pub registry: Arc<dyn SessionRegistry>,
    pub agent: Arc<dyn AgentPlatform>,
    pub dispatcher: Arc<ToolDispatcher>,
    pub transcripts: Arc<dyn TranscriptSink>,
    pub calls: Arc<dyn CallControl>,
    pub template: ConversationTemplate,
}

/// Queues an audio frame without waiting for room.
///
/// Returns `false` once the receiving writer has gone away.
fn offer_audio(
    tx: &mpsc::Sender<Frame>,
    frame: Frame,
    dropped: &mut u64,
    call_id: &str,
    direction: &'static str,
) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            *dropped += 1;
            if dropped.is_power_of_two() {
                warn!(call_sid = %call_id, direction, dropped = *dropped, "queue full, dropping audio");
            }
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Telephony to agent.
struct InboundPump {
    call_id: String,
    telephony_rx: mpsc::Receiver<Frame>,
    agent_tx: mpsc::Sender<Frame>,
    dropped: u64,
}

impl InboundPump {
    async fn run(&mut self) -> TerminationReason {
        while let Some(frame) = self.telephony_rx.recv().await {
            if let Some(reason) = self.on_frame(frame) {
                return reason;
            }
        }
        TerminationReason::TelephonyDisconnected
    }

    fn on_frame(&mut self, frame: Frame) -> Option<TerminationReason> {
        let text = match frame {
            Frame::Text(text) => text,
            Frame::Binary(bytes) => {
                debug!(call_sid = %self.call_id, len = bytes.len(), "ignoring binary telephony frame");
                return None;
            }
        };

        match parse_event(&text) {
            Ok(TelephonyEvent::Media(mu_law)) => match decode_telephony_frame(&mu_law) {
                Ok(pcm) => {
                    let open = offer_audio(
                        &self.agent_tx,
                        Frame::Binary(pcm),
                        &mut self.dropped,
                        &self.call_id,
                        "telephony->agent",
                    );
                    if !open {
                        trace!(call_sid = %self.call_id, "agent channel writer has gone away");
                    }
                }
                Err(e) => debug!(call_sid = %self.call_id, "dropping telephony audio: {}", e),
            },
            Ok(TelephonyEvent::Stop) => {
                info!(call_sid = %self.call_id, "telephony stream stopped");
                return Some(TerminationReason::TelephonyStop);
            }
            Ok(TelephonyEvent::Start(start)) => {
                warn!(
                    call_sid = %self.call_id,
                    stream_sid = %start.stream_sid,
                    "ignoring repeated start event"
                );
            }
            Ok(TelephonyEvent::Connected) => {}
            Ok(TelephonyEvent::Mark(name)) => {
                trace!(call_sid = %self.call_id, mark = ?name, "telephony mark");
            }
            Ok(TelephonyEvent::Other(kind)) => {
                debug!(call_sid = %self.call_id, event = %kind, "unhandled telephony event");
            }
            Err(e) => warn!(call_sid = %self.call_id, "dropping malformed telephony frame: {}", e),
        }
        None
    }
}

/// Agent to telephony, plus transcripts and tool invocations.
struct OutboundPump {
    call_id: String,
    stream_sid: String,
    session: SessionHandle,
    dispatcher: Arc<ToolDispatcher>,
    agent_tx: mpsc::Sender<Frame>,
    agent_rx: mpsc::Receiver<Frame>,
    telephony_tx: mpsc::Sender<Frame>,
    tools: JoinSet<ToolOutcome>,
    /// Every invocation seen on this call, by id.
    invocations: HashMap<String, ToolInvocation>,
    /// Tool results waiting for room on the agent queue, in send order.
    backlog: VecDeque<Frame>,
    dropped: u64,
}

impl OutboundPump {
    async fn run(&mut self) -> TerminationReason {
        loop {
            let agent_tx = self.agent_tx.clone();
            tokio::select! {
                frame = self.agent_rx.recv() => {
                    let Some(frame) = frame else {
                        return TerminationReason::AgentClosed;
                    };
                    if let Some(reason) = self.on_agent_frame(frame).await {
                        return reason;
                    }
                }
                Some(joined) = self.tools.join_next(), if !self.tools.is_empty() => {
                    if let Some(reason) = self.on_tool_joined(joined).await {
                        return reason;
                    }
                }
                permit = agent_tx.reserve(), if !self.backlog.is_empty() => match permit {
                    Ok(permit) => {
                        if let Some(frame) = self.backlog.pop_front() {
                            permit.send(frame);
                        }
                    }
                    Err(_) => {
                        debug!(call_sid = %self.call_id, queued = self.backlog.len(), "agent channel gone, discarding tool results");
                        self.backlog.clear();
                    }
                },
            }
        }
    }

    async fn on_agent_frame(&mut self, frame: Frame) -> Option<TerminationReason> {
        let text = match frame {
            Frame::Binary(pcm) => return self.forward_agent_audio(&pcm),
            Frame::Text(text) => text,
        };

        match parse_agent_message(&text) {
            Ok(AgentEvent::Transcript(turn)) => {
                debug!(
                    call_sid = %self.call_id,
                    role = %turn.role,
                    is_final = turn.is_final,
                    "{}",
                    turn.text
                );
                lock_session(&self.session).append_turn(turn);
            }
            Ok(AgentEvent::ToolInvocation(invocation)) => {
                return self.on_tool_invocation(invocation).await;
            }
            Ok(AgentEvent::State(state)) => {
                debug!(call_sid = %self.call_id, state = ?state, "agent state");
            }
            Ok(AgentEvent::Debug { message, nested }) => match nested {
                Some(notice) if notice.kind.as_deref() == Some("toolResult") => {
                    debug!(
                        call_sid = %self.call_id,
                        tool = ?notice.tool_name,
                        output = ?notice.output,
                        "agent echoed tool result"
                    );
                }
                _ => trace!(call_sid = %self.call_id, "agent debug: {}", message),
            },
            Ok(AgentEvent::Observed { kind, payload }) => {
                debug!(call_sid = %self.call_id, kind = %kind, payload = %payload, "agent event");
            }
            Ok(AgentEvent::Unrecognized { kind }) => {
                debug!(call_sid = %self.call_id, kind = ?kind, "unhandled agent message");
            }
            Err(e) => warn!(call_sid = %self.call_id, "dropping malformed agent message: {}", e),
        }
        None
    }

    fn forward_agent_audio(&mut self, pcm: &[u8]) -> Option<TerminationReason> {
        let mu_law = match encode_agent_frame(pcm) {
            Ok(mu_law) => mu_law,
            Err(e) => {
                debug!(call_sid = %self.call_id, "dropping agent audio: {}", e);
                return None;
            }
        };
        let text = match encode_media(&self.stream_sid, &mu_law) {
            Ok(text) => text,
            Err(e) => {
                warn!(call_sid = %self.call_id, "failed to frame agent audio: {}", e);
                return None;
            }
        };
        let open = offer_audio(
            &self.telephony_tx,
            Frame::Text(text),
            &mut self.dropped,
            &self.call_id,
            "agent->telephony",
        );
        (!open).then_some(TerminationReason::TelephonyDisconnected)
    }

    async fn on_tool_invocation(&mut self, invocation: ToolInvocation) -> Option<TerminationReason> {
        info!(
            call_sid = %self.call_id,
            tool = invocation.tool.name(),
            invocation_id = %invocation.invocation_id,
            "tool invoked"
        );
        self.invocations
            .insert(invocation.invocation_id.clone(), invocation.clone());

        if let Some(outcome) = self.dispatcher.answer_inline(&invocation) {
            return self.finish_invocation(outcome).await;
        }

        let dispatcher = self.dispatcher.clone();
        let caller_number = lock_session(&self.session).caller_number.clone();
        self.tools.spawn(async move {
            match AssertUnwindSafe(dispatcher.dispatch(&invocation, &caller_number))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(invocation_id = %invocation.invocation_id, "tool handler panicked");
                    ToolOutcome::Reply(generic_failure(&invocation))
                }
            }
        });
        None
    }

    async fn on_tool_joined(
        &mut self,
        joined: Result<ToolOutcome, JoinError>,
    ) -> Option<TerminationReason> {
        match joined {
            Ok(outcome) => self.finish_invocation(outcome).await,
            Err(e) => {
                warn!(call_sid = %self.call_id, "tool task did not complete: {}", e);
                None
            }
        }
    }

    /// Records the result and sends it to the agent.
    ///
    /// Results queue behind the backlog so they reach the agent in the order
    /// they finished. An end-call result is flushed before returning so the
    /// agent sees it before its channel closes.
    async fn finish_invocation(&mut self, outcome: ToolOutcome) -> Option<TerminationReason> {
        let result = outcome.result();
        if let Some(invocation) = self.invocations.get_mut(result.invocation_id()) {
            invocation.status = result.status();
        }
        debug!(
            call_sid = %self.call_id,
            invocation_id = %result.invocation_id(),
            success = result.is_success(),
            "sending tool result"
        );

        match encode_tool_result(result) {
            Ok(text) => self.queue_for_agent(Frame::Text(text)),
            Err(e) => error!(call_sid = %self.call_id, "failed to encode tool result: {}", e),
        }

        if !outcome.ends_call() {
            return None;
        }
        self.flush_backlog().await;
        Some(TerminationReason::EndCallTool)
    }

    fn queue_for_agent(&mut self, frame: Frame) {
        if !self.backlog.is_empty() {
            self.backlog.push_back(frame);
            return;
        }
        match self.agent_tx.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => self.backlog.push_back(frame),
            Err(TrySendError::Closed(_)) => {
                debug!(call_sid = %self.call_id, "agent channel writer has gone away");
            }
        }
    }

    async fn flush_backlog(&mut self) {
        while let Some(frame) = self.backlog.pop_front() {
            if self.agent_tx.send(frame).await.is_err() {
                self.backlog.clear();
                break;
            }
        }
    }

    /// Invocations that never produced a result, sorted by id.
    fn abandoned(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .invocations
            .values()
            .filter(|invocation| invocation.status == InvocationStatus::Pending)
            .map(|invocation| invocation.invocation_id.clone())
            .collect();
        ids.sort();
        ids
    }

    fn count(&self, status: InvocationStatus) -> usize {
        self.invocations
            .values()
            .filter(|invocation| invocation.status == status)
            .count()
    }
}

/// State owned by one streaming call.
struct LiveCall {
    call_id: String,
    session: SessionHandle,
    inbound: InboundPump,
    outbound: OutboundPump,
}

pub struct CallBridge {
    deps: BridgeDeps,
    phase: PhaseCell,
}

impl CallBridge {
    pub fn new(deps: BridgeDeps) -> Self {
        Self {
            deps,
            phase: PhaseCell::new(),
        }
    }

    pub fn phase(&self) -> BridgePhase {
        self.phase.load()
    }

    /// Runs the call to completion.
    ///
    /// Returns an error only when the call never reached streaming. Dropping
    /// `telephony` on return closes the telephony socket. A bridge serves a
    /// single call; running it again fails with [`BridgeError::AlreadyUsed`].
    pub async fn run(&self, mut telephony: WsChannel) -> Result<BridgeReport, BridgeError> {
        let start = match await_start(&mut telephony).await {
            Ok(start) => start,
            Err(e) => {
                self.phase.close();
                return Err(e);
            }
        };
        if !self.phase.advance(BridgePhase::Init, BridgePhase::AwaitingAgent) {
            let phase = self.phase();
            warn!(call_sid = %start.call_sid, phase = ?phase, "bridge reused for another stream");
            return Err(BridgeError::AlreadyUsed(phase));
        }
        info!(
            call_sid = %start.call_sid,
            stream_sid = %start.stream_sid,
            "media stream started"
        );

        let (session, agent) = match self.connect(&start).await {
            Ok(connected) => connected,
            Err(e) => {
                warn!(call_sid = %start.call_sid, "call setup failed: {}", e);
                self.phase.close();
                return Err(e);
            }
        };

        if !self
            .phase
            .advance(BridgePhase::AwaitingAgent, BridgePhase::Streaming)
        {
            warn!(call_sid = %start.call_sid, phase = ?self.phase(), "unexpected phase entering streaming");
        }
        lock_session(&session).state = SessionState::Streaming;
        info!(call_sid = %start.call_sid, "agent channel open, streaming");

        let WsChannel {
            tx: telephony_tx,
            rx: telephony_rx,
        } = telephony;
        let WsChannel {
            tx: agent_tx,
            rx: agent_rx,
        } = agent;
        let mut call = LiveCall {
            call_id: start.call_sid.clone(),
            session: session.clone(),
            inbound: InboundPump {
                call_id: start.call_sid.clone(),
                telephony_rx,
                agent_tx: agent_tx.clone(),
                dropped: 0,
            },
            outbound: OutboundPump {
                call_id: start.call_sid,
                stream_sid: start.stream_sid,
                session,
                dispatcher: self.deps.dispatcher.clone(),
                agent_tx,
                agent_rx,
                telephony_tx,
                tools: JoinSet::new(),
                invocations: HashMap::new(),
                backlog: VecDeque::new(),
                dropped: 0,
            },
        };

        let reason = tokio::select! {
            reason = call.inbound.run() => reason,
            reason = call.outbound.run() => reason,
        };
        let call_id = call.call_id.clone();
        let dropped_audio = call.inbound.dropped + call.outbound.dropped;
        let abandoned = self.terminate(call, reason).await;

        Ok(BridgeReport {
            call_id,
            reason,
            abandoned,
            dropped_audio,
        })
    }

    /// Resolves the session and opens the agent channel.
    ///
    /// Once the session is resolved, any later failure removes it: the call
    /// cannot stream and nothing will be reported for it.
    async fn connect(&self, start: &StreamStart) -> Result<(SessionHandle, WsChannel), BridgeError> {
        let session = self
            .deps
            .registry
            .lookup(&start.call_sid)
            .ok_or_else(|| BridgeError::SessionNotFound(start.call_sid.clone()))?;

        let opening = {
            let mut record = lock_session(&session);
            if let Err(SessionError::StreamAlreadyBound(existing)) =
                record.bind_media_stream(start.stream_sid.as_str())
            {
                return Err(BridgeError::StreamAlreadyBound {
                    call_id: start.call_sid.clone(),
                    existing,
                });
            }
            if let Some(number) = non_empty(start.custom_parameters.get(CALLER_NUMBER_PARAM)) {
                record.caller_number = number.to_string();
            }
            opening_message(
                &record.initial_prompt,
                non_empty(start.custom_parameters.get(FIRST_MESSAGE_PARAM)),
            )
        };
        debug!(call_sid = %start.call_sid, opening = %opening, "requesting agent conversation");

        let request = self.deps.template.request(opening);
        let agent = async {
            let join_url = self.deps.agent.create_call(&request).await?;
            self.deps.agent.join(&join_url).await
        }
        .await;

        match agent {
            Ok(channel) => Ok((session, channel)),
            Err(e) => {
                self.deps.registry.remove(&start.call_sid);
                Err(BridgeError::from(e))
            }
        }
    }

    /// Closes both channels, ends the call if asked to, flushes the
    /// transcript and removes the session. Returns the abandoned invocations.
    async fn terminate(&self, call: LiveCall, reason: TerminationReason) -> Vec<String> {
        if !self
            .phase
            .advance(BridgePhase::Streaming, BridgePhase::Terminating)
        {
            debug!(call_sid = %call.call_id, "termination already under way");
            return Vec::new();
        }
        info!(call_sid = %call.call_id, reason = ?reason, "call terminating");

        let LiveCall {
            call_id,
            session,
            inbound,
            mut outbound,
        } = call;

        outbound.tools.abort_all();
        let abandoned = outbound.abandoned();
        if !abandoned.is_empty() {
            warn!(call_sid = %call_id, abandoned = ?abandoned, "abandoning in-flight tool invocations");
        }
        if !outbound.backlog.is_empty() {
            warn!(call_sid = %call_id, queued = outbound.backlog.len(), "tool results never reached the agent");
        }
        debug!(
            call_sid = %call_id,
            completed = outbound.count(InvocationStatus::Completed),
            failed = outbound.count(InvocationStatus::Failed),
            "tool invocations settled"
        );

        // Dropping both pumps drops every sender; each writer drains what is queued, then closes its socket.
        drop(inbound);
        drop(outbound);

        if reason == TerminationReason::EndCallTool {
            if let Err(e) = self.deps.calls.end_call(&call_id).await {
                warn!(call_sid = %call_id, "failed to end telephony call: {}", e);
            }
        }

        let (caller_number, transcript) = {
            let mut record = lock_session(&session);
            record.state = SessionState::Terminated;
            (record.caller_number.clone(), record.transcript.render())
        };
        if let Err(e) = self.deps.transcripts.deliver(&caller_number, &transcript).await {
            warn!(call_sid = %call_id, "transcript delivery failed: {}", e);
        }

        if self.deps.registry.remove(&call_id).is_none() {
            debug!(call_sid = %call_id, "session was already removed");
        }
        self.phase.close();
        info!(call_sid = %call_id, "call closed");

        abandoned
    }
}

/// Reads telephony frames until the stream starts.
///
/// Audio that arrives before `start` has nowhere to go and is dropped.
async fn await_start(telephony: &mut WsChannel) -> Result<StreamStart, BridgeError> {
    while let Some(frame) = telephony.rx.recv().await {
        let Frame::Text(text) = frame else {
            continue;
        };
        match parse_event(&text) {
            Ok(TelephonyEvent::Start(start)) => return Ok(start),
            Ok(TelephonyEvent::Stop) => break,
            Ok(TelephonyEvent::Connected) => debug!("telephony stream connected"),
            Ok(TelephonyEvent::Media(_)) => trace!("dropping audio received before start"),
            Ok(other) => debug!(event = ?other, "ignoring telephony event before start"),
            Err(e) => warn!("dropping malformed telephony frame: {}", e),
        }
    }
    Err(BridgeError::TelephonyClosed)
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

/// Picks the first user turn handed to the agent.
pub fn opening_message(initial_prompt: &str, stream_first_message: Option<&str>) -> String {
    if !initial_prompt.trim().is_empty() {
        return initial_prompt.to_string();
    }
    stream_first_message
        .unwrap_or(DEFAULT_OPENING_MESSAGE)
        .to_string()
}
