//! Completion tasks and their result handles.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::errors::{CoreError, CoreResult};
use crate::model::CompletionRequest;
use crate::sink::PushSink;

/// Caller classification; decides the pool and its saturation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Privileged,
    Standard,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Privileged => write!(f, "privileged"),
            Tier::Standard => write!(f, "standard"),
        }
    }
}

/// One unit of generation work. Owned by the dispatcher from submission
/// until a pool worker picks it up; the sink and handle then pass to the
/// streaming processor.
pub struct CompletionTask {
    pub id: Uuid,
    pub tier: Tier,
    pub request: CompletionRequest,
    pub sink: Arc<dyn PushSink>,
    pub handle: TaskHandle,
}

impl CompletionTask {
    /// Build a task and the receiver its final result will arrive on.
    pub fn new(
        tier: Tier,
        request: CompletionRequest,
        sink: Arc<dyn PushSink>,
    ) -> (Self, oneshot::Receiver<CoreResult<String>>) {
        let (handle, rx) = TaskHandle::new(sink.clone());
        (
            Self {
                id: Uuid::new_v4(),
                tier,
                request,
                sink,
                handle,
            },
            rx,
        )
    }
}

/// The task's completion handle: resolves exactly once with the final
/// text or an error, observable through the paired oneshot receiver.
///
/// Failing the handle — from the processor or from any external holder —
/// also closes the task's push sink with an error signal. Combined with
/// idempotent sink close this guarantees the sink sees exactly one
/// terminal signal on every exit path.
#[derive(Clone)]
pub struct TaskHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    tx: Mutex<Option<oneshot::Sender<CoreResult<String>>>>,
    sink: Arc<dyn PushSink>,
}

impl TaskHandle {
    pub fn new(sink: Arc<dyn PushSink>) -> (Self, oneshot::Receiver<CoreResult<String>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                inner: Arc::new(HandleInner {
                    tx: Mutex::new(Some(tx)),
                    sink,
                }),
            },
            rx,
        )
    }

    fn take_sender(&self) -> Option<oneshot::Sender<CoreResult<String>>> {
        self.inner.tx.lock().expect("handle lock poisoned").take()
    }

    /// Resolve with the final accumulated text. No-op if already resolved.
    pub fn succeed(&self, text: String) {
        if let Some(tx) = self.take_sender() {
            let _ = tx.send(Ok(text));
        }
    }

    /// Resolve with a failure and close the push sink with an error
    /// signal. No-op if already resolved.
    pub async fn fail(&self, err: CoreError) {
        if let Some(tx) = self.take_sender() {
            self.inner.sink.fail(&err.to_string()).await;
            let _ = tx.send(Err(err));
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.tx.lock().expect("handle lock poisoned").is_none()
    }
}
