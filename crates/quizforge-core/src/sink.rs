//! Push channel: one-way delivery of incremental results to a waiting
//! client.
//!
//! Each deliverable unit is a raw structured-text chunk, no envelope.
//! A sink ends with exactly one terminal signal, normal or error; the
//! first close wins and later closes are no-ops. Connections are held
//! open indefinitely by design (generation may legitimately take long),
//! so there is no timeout here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// A push-sink write failure.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// The receiving side disconnected; nothing further can be delivered.
    #[error("push channel disconnected")]
    Disconnected,
    /// The sink was already closed by a terminal signal.
    #[error("push channel already closed")]
    Closed,
}

/// Server-to-client streaming channel for partial results.
///
/// `complete` and `fail` are idempotent: implementations must guarantee
/// that only the first terminal signal is delivered.
#[async_trait]
pub trait PushSink: Send + Sync {
    /// Deliver one complete structured chunk.
    async fn send(&self, chunk: &str) -> Result<(), SinkError>;

    /// Close with the normal-completion signal.
    async fn complete(&self);

    /// Close with an error signal.
    async fn fail(&self, message: &str);
}

/// Event delivered to the consuming side of a [`ChannelSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Chunk(String),
    Complete,
    Failed(String),
}

/// In-process [`PushSink`] backed by a bounded tokio channel. The
/// transport adapter (SSE, websocket, ...) owns the receiving half.
pub struct ChannelSink {
    tx: mpsc::Sender<SinkEvent>,
    closed: AtomicBool,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<SinkEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Arc::new(Self {
                tx,
                closed: AtomicBool::new(false),
            }),
            rx,
        )
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl PushSink for ChannelSink {
    async fn send(&self, chunk: &str) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.tx
            .send(SinkEvent::Chunk(chunk.to_string()))
            .await
            .map_err(|_| SinkError::Disconnected)
    }

    async fn complete(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(SinkEvent::Complete).await;
        }
    }

    async fn fail(&self, message: &str) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.tx.send(SinkEvent::Failed(message.to_string())).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_terminal_signal_wins() {
        let (sink, mut rx) = ChannelSink::new(8);
        sink.send("{\"a\":1}").await.unwrap();
        sink.complete().await;
        sink.fail("too late").await;
        sink.complete().await;

        assert_eq!(rx.recv().await, Some(SinkEvent::Chunk("{\"a\":1}".into())));
        assert_eq!(rx.recv().await, Some(SinkEvent::Complete));
        drop(sink);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let (sink, _rx) = ChannelSink::new(8);
        sink.fail("boom").await;
        assert!(matches!(sink.send("{}").await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn dropped_receiver_surfaces_disconnect() {
        let (sink, rx) = ChannelSink::new(8);
        drop(rx);
        assert!(matches!(
            sink.send("{\"a\":1}").await,
            Err(SinkError::Disconnected)
        ));
    }
}
