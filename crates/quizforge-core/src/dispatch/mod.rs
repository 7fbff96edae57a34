//! Tiered execution dispatcher.
//!
//! Two independently configured pools keep the tiers isolated: a burst
//! of standard traffic cannot starve privileged callers, and privileged
//! traffic is never silently dropped — it gets a synchronous rejection
//! it can retry on instead.

mod pool;

use std::sync::Arc;

use pool::WorkerPool;

use crate::config::DispatchConfig;
use crate::errors::CoreResult;
use crate::providers::StreamingLlmClient;
use crate::task::{CompletionTask, Tier};

/// Process-wide dispatcher owning the privileged and standard pools.
pub struct TieredDispatcher {
    privileged: WorkerPool,
    standard: WorkerPool,
    cfg: DispatchConfig,
}

impl TieredDispatcher {
    /// Must be called from within a tokio runtime: both pools spawn
    /// their core workers here.
    pub fn new(cfg: DispatchConfig, upstream: Arc<dyn StreamingLlmClient>) -> Self {
        let privileged =
            WorkerPool::new("privileged-pool", cfg.privileged.clone(), upstream.clone());
        let standard = WorkerPool::new("standard-pool", cfg.standard.clone(), upstream);
        Self {
            privileged,
            standard,
            cfg,
        }
    }

    /// Route a task to its tier's pool.
    ///
    /// `Ok(())` means the task was accepted for queuing purposes — for
    /// the standard tier that still includes the silent-drop outcome
    /// under saturation. `Err(CapacityRejected)` is the privileged
    /// tier's synchronous fail-fast answer.
    pub fn submit(&self, task: CompletionTask) -> CoreResult<()> {
        match task.tier {
            Tier::Privileged => self.privileged.submit(task),
            Tier::Standard => self.standard.submit(task),
        }
    }

    /// Graceful drain: stop intake, wait up to the configured grace for
    /// in-flight tasks, abort the rest. Idempotent.
    pub async fn shutdown(&self) {
        let grace = self.cfg.shutdown_grace();
        tokio::join!(
            self.privileged.shutdown(grace),
            self.standard.shutdown(grace)
        );
    }
}
