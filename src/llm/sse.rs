//! SSE normalization
//!
//! Reduces the three upstream wire protocols to one canonical event
//! format. Upstream bodies are consumed as byte streams, split into lines
//! with the partial tail retained, and each `data:` payload is parsed as
//! JSON and handed to the adapter's delta extractor. Every non-empty delta
//! becomes one canonical `content_block_delta` event; the downstream
//! always ends with exactly one `[DONE]` terminator, whatever happened
//! upstream.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::providers::DeltaExtractor;
use super::{GatewayError, GatewayResult};

/// The terminal SSE frame
pub const DONE_FRAME: &str = "data: [DONE]\n\n";

/// Render one canonical delta event
pub fn delta_frame(text: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"type": "content_block_delta", "delta": {"text": text}})
    )
}

/// Render one canonical error event, emitted before the terminator when an
/// upstream stream fails mid-flight
pub fn error_frame(message: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"type": "error", "error": {"message": message}})
    )
}

/// Destination for normalized frames. Implemented for the hyper body
/// sender in the HTTP layer and by channel collectors in tests.
#[async_trait]
pub trait EventSink: Send {
    /// Returns `Err` when the client has gone away
    async fn send_frame(&mut self, frame: String) -> Result<(), ()>;
}

#[async_trait]
impl EventSink for hyper::body::Sender {
    async fn send_frame(&mut self, frame: String) -> Result<(), ()> {
        self.send_data(Bytes::from(frame)).await.map_err(|_| ())
    }
}

#[async_trait]
impl EventSink for tokio::sync::mpsc::Sender<String> {
    async fn send_frame(&mut self, frame: String) -> Result<(), ()> {
        self.send(frame).await.map_err(|_| ())
    }
}

/// How the normalized stream ended
#[derive(Debug)]
pub enum StreamOutcome {
    Completed,
    Failed(GatewayError),
    Cancelled,
}

/// Byte-to-line splitter that keeps the partial tail between chunks.
///
/// Splitting happens on raw `\n` bytes, which is safe for UTF-8 input
/// because continuation bytes never collide with the newline byte, so
/// multi-byte characters split across chunks reassemble in the tail.
pub struct SseLineBuffer {
    buf: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Feed one chunk, returning the complete lines it closed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(text.trim_end_matches('\r').to_string());
        }
        lines
    }
}

impl Default for SseLineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract the deltas carried by one upstream line, if any.
///
/// Non-`data:` lines, blank payloads, literal `[DONE]` markers, and
/// unparseable JSON are all dropped.
pub fn deltas_from_line(line: &str, extract: DeltaExtractor) -> Vec<String> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Vec::new();
    };
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return Vec::new();
    }
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(event) => extract(&event)
            .into_iter()
            .filter(|delta| !delta.is_empty())
            .collect(),
        Err(_) => {
            debug!("ignoring non-JSON data line");
            Vec::new()
        }
    }
}

/// Pump an upstream byte stream into a sink as canonical SSE.
///
/// `on_delta` fires before the corresponding downstream enqueue so callers
/// can accumulate the assistant text. Exactly one `[DONE]` frame is sent
/// at the end on every path, and the returned outcome is produced exactly
/// once; callers run their completion hook on it.
pub async fn pump_sse<S>(
    mut upstream: S,
    extract: DeltaExtractor,
    sink: &mut dyn EventSink,
    on_delta: &mut (dyn FnMut(&str) + Send),
    cancel: &CancellationToken,
) -> StreamOutcome
where
    S: Stream<Item = reqwest::Result<Bytes>> + Unpin + Send,
{
    let mut lines = SseLineBuffer::new();
    let mut client_gone = false;

    let outcome = loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => break StreamOutcome::Cancelled,
            chunk = upstream.next() => chunk,
        };

        match chunk {
            None => break StreamOutcome::Completed,
            Some(Err(e)) => {
                warn!("upstream stream error: {}", e);
                let err = GatewayError::Internal(e.to_string());
                if !client_gone {
                    let _ = sink.send_frame(error_frame(&e.to_string())).await;
                }
                break StreamOutcome::Failed(err);
            }
            Some(Ok(bytes)) => {
                for line in lines.push(&bytes) {
                    for delta in deltas_from_line(&line, extract) {
                        on_delta(&delta);
                        if !client_gone && sink.send_frame(delta_frame(&delta)).await.is_err() {
                            client_gone = true;
                        }
                    }
                }
            }
        }
    };

    if !client_gone {
        let _ = sink.send_frame(DONE_FRAME.to_string()).await;
    }
    outcome
}

/// Consume an adapter stream to completion and return the concatenated
/// text. Used where a whole completion is wanted as a value: debate
/// challengers and memory summarization.
pub async fn collect_stream_text(
    mut stream: super::providers::AdapterStream,
) -> GatewayResult<String> {
    let mut lines = SseLineBuffer::new();
    let mut text = String::new();
    while let Some(chunk) = stream.bytes.next().await {
        let bytes = chunk.map_err(|e| GatewayError::Internal(e.to_string()))?;
        for line in lines.push(&bytes) {
            for delta in deltas_from_line(&line, stream.extract_deltas) {
                text.push_str(&delta);
            }
        }
    }
    Ok(text)
}
