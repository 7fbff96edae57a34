//! Streaming completion processor.
//!
//! Consumes the ordered event sequence of one generation call,
//! reassembles partial fragments into complete top-level JSON-object
//! chunks, and pushes each chunk to the task's sink the instant it
//! closes. The upstream output is assumed to be a concatenation of
//! well-formed top-level objects possibly interleaved with prose; only
//! text between a top-level `{` and its matching `}` is deliverable.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::errors::CoreError;
use crate::providers::{CompletionEvent, StreamingLlmClient};
use crate::task::CompletionTask;

/// Per-task reassembly state: a chunk buffer, the full-text buffer and
/// the brace-depth counter. Depth never goes negative; a stray `}` at
/// depth zero is ignored.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    chunk: String,
    full_text: String,
    depth: u32,
}

impl ChunkAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment; returns every chunk completed by it, in order.
    ///
    /// Line breaks are normalized to single spaces first: the push
    /// protocol's framing is line-break-sensitive and must never see a
    /// literal line break inside a payload.
    pub fn push_fragment(&mut self, fragment: &str) -> Vec<String> {
        let normalized = normalize_line_breaks(fragment);
        self.full_text.push_str(&normalized);

        let mut completed = Vec::new();
        for c in normalized.chars() {
            if c == '{' {
                self.depth += 1;
            }
            if self.depth > 0 {
                self.chunk.push(c);
            }
            if c == '}' && self.depth > 0 {
                self.depth -= 1;
                if self.depth == 0 {
                    completed.push(std::mem::take(&mut self.chunk));
                }
            }
        }
        completed
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Buffered text of a chunk that never closed. Left undelivered when
    /// the stream ends with unbalanced braces.
    pub fn residual(&self) -> &str {
        &self.chunk
    }

    /// The full normalized response text accumulated so far.
    pub fn into_text(self) -> String {
        self.full_text
    }
}

/// Replace every line break (any of the Unicode line-break forms, with
/// `\r\n` counting as one) with a single space.
pub fn normalize_line_breaks(fragment: &str) -> String {
    let mut out = String::with_capacity(fragment.len());
    let mut chars = fragment.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                out.push(' ');
            }
            '\n' | '\u{b}' | '\u{c}' | '\u{85}' | '\u{2028}' | '\u{2029}' => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// First top-level `{...}` span of `text`, braces included.
pub fn extract_first_object(text: &str) -> Option<&str> {
    let mut depth = 0u32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Drive one task against the upstream streaming service.
///
/// Chunks go to the task's sink as they complete; the final text or the
/// error resolves the task's handle, which in turn guarantees the sink
/// receives exactly one terminal signal on every exit path.
pub async fn run_completion(task: CompletionTask, upstream: Arc<dyn StreamingLlmClient>) {
    let CompletionTask {
        id,
        tier,
        request,
        sink,
        handle,
    } = task;

    let mut events = match upstream.stream_chat(&request).await {
        Ok(rx) => rx,
        Err(e) => {
            error!(task = %id, %tier, "failed to open upstream stream: {e:#}");
            handle
                .fail(CoreError::upstream(format!("failed to open stream: {e}")))
                .await;
            return;
        }
    };

    let mut acc = ChunkAccumulator::new();
    while let Some(event) = events.recv().await {
        match event {
            CompletionEvent::Delta(fragment) => {
                for chunk in acc.push_fragment(&fragment) {
                    if let Err(e) = sink.send(&chunk).await {
                        warn!(task = %id, %tier, "push delivery failed: {e}");
                        handle.fail(CoreError::delivery(e.to_string())).await;
                        return;
                    }
                }
            }
            CompletionEvent::Done => {
                if !acc.residual().is_empty() {
                    debug!(
                        task = %id,
                        residual_len = acc.residual().len(),
                        "unbalanced braces; residual buffered text undelivered"
                    );
                }
                sink.complete().await;
                handle.succeed(acc.into_text());
                return;
            }
            CompletionEvent::Error(message) => {
                error!(task = %id, %tier, "upstream error during completion: {message}");
                handle.fail(CoreError::upstream(message)).await;
                return;
            }
        }
    }

    // Producer went away without a terminal event; treat as upstream loss
    // so the sink still gets its error signal.
    warn!(task = %id, %tier, "event stream ended without a terminal event");
    handle
        .fail(CoreError::upstream("event stream ended unexpectedly"))
        .await;
}
