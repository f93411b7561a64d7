//! Knowledge retrieval for the `question_and_answer` tool.
//!
//! The assistant streams its answer as server-sent events. Each `data:` line
//! carries one JSON chunk; only `content_chunk` deltas contribute text.

use crate::config::KnowledgeConfig;
use crate::error::ToolError;
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use futures_util::{Stream, StreamExt};
use serde_json::{json, Value};
use std::pin::Pin;
use tracing::{debug, trace};

const CONTENT_CHUNK: &str = "content_chunk";

/// One decoded chunk of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerChunk {
    /// Text to append to the answer.
    Content(String),
    /// Any other chunk kind (message start/end, citations).
    Other(String),
}

pub type AnswerStream = BoxStream<'static, Result<AnswerChunk, ToolError>>;

#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Asks a question and returns the answer as a stream of chunks.
    async fn ask(&self, question: &str) -> Result<AnswerStream, ToolError>;
}

/// Drains an answer stream, concatenating every content delta.
///
/// The first error aborts the whole answer; partial text is discarded.
pub async fn collect_answer(mut chunks: AnswerStream) -> Result<String, ToolError> {
    let mut answer = String::new();
    while let Some(chunk) = chunks.next().await {
        match chunk? {
            AnswerChunk::Content(text) => answer.push_str(&text),
            AnswerChunk::Other(kind) => trace!(kind = %kind, "skipping answer chunk"),
        }
    }
    Ok(answer)
}

/// Parses one server-sent-event line.
///
/// Returns `Ok(None)` for lines that carry no chunk: blank lines, comments,
/// `event:`/`id:` fields and the `[DONE]` sentinel.
pub fn parse_sse_line(line: &str) -> Result<Option<AnswerChunk>, ToolError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(data)?;
    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    if kind == CONTENT_CHUNK {
        let content = value
            .pointer("/delta/content")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(Some(AnswerChunk::Content(content.to_string())))
    } else {
        Ok(Some(AnswerChunk::Other(kind.to_string())))
    }
}

struct SseState<S> {
    bytes: Pin<Box<S>>,
    buffer: Vec<u8>,
    done: bool,
}

impl<S> SseState<S> {
    fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim_end().to_string())
    }
}

/// Turns a raw SSE byte stream into answer chunks.
///
/// Lines may be split across network reads; bytes are buffered until a full
/// line is available. A trailing line without a newline is parsed at end of
/// stream.
pub fn sse_chunks<S, B>(bytes: S) -> AnswerStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        buffer: Vec::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            while let Some(line) = state.next_line() {
                match parse_sse_line(&line) {
                    Ok(Some(chunk)) => return Some((Ok(chunk), state)),
                    Ok(None) => {}
                    Err(e) => return Some((Err(e), state)),
                }
            }

            if state.done {
                if state.buffer.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut state.buffer);
                let line = String::from_utf8_lossy(&rest).trim_end().to_string();
                return match parse_sse_line(&line) {
                    Ok(Some(chunk)) => Some((Ok(chunk), state)),
                    Ok(None) => None,
                    Err(e) => Some((Err(e), state)),
                };
            }

            match state.bytes.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    state.done = true;
                    state.buffer.clear();
                    return Some((Err(ToolError::Http(e)), state));
                }
                None => state.done = true,
            }
        }
    })
    .boxed()
}

/// Pinecone assistant chat client.
#[derive(Debug, Clone)]
pub struct PineconeAssistant {
    http: reqwest::Client,
    config: KnowledgeConfig,
}

impl PineconeAssistant {
    pub fn new(http: reqwest::Client, config: KnowledgeConfig) -> Self {
        Self { http, config }
    }

    fn chat_url(&self) -> String {
        format!(
            "{}/assistant/chat/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.assistant_name
        )
    }
}

#[async_trait]
impl KnowledgeBase for PineconeAssistant {
    async fn ask(&self, question: &str) -> Result<AnswerStream, ToolError> {
        if self.config.api_key.is_empty() {
            return Err(ToolError::Knowledge(
                "knowledge.api_key is not set; set it in config or PINECONE_API_KEY".to_string(),
            ));
        }

        let body = json!({
            "messages": [{ "role": "user", "content": question }],
            "stream": true,
        });
        let response = self
            .http
            .post(self.chat_url())
            .header("Api-Key", &self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(ToolError::Knowledge(format!(
                "assistant returned {}: {}",
                status, detail
            )));
        }

        debug!(assistant = %self.config.assistant_name, "streaming assistant answer");
        Ok(sse_chunks(response.bytes_stream()))
    }
}
