//! One bounded worker pool.
//!
//! Core workers are spawned eagerly and live for the pool's lifetime;
//! when the queue is full the pool grows with overflow workers up to
//! `max_workers`, each of which takes the overflowing task directly and
//! then expires after `idle_expiry` without further work.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::{PoolConfig, SaturationPolicy};
use crate::errors::{CoreError, CoreResult};
use crate::providers::StreamingLlmClient;
use crate::stream::run_completion;
use crate::task::CompletionTask;

pub(crate) struct WorkerPool {
    name: String,
    cfg: PoolConfig,
    /// Intake side of the queue; taken on shutdown to stop admissions.
    tx: StdMutex<Option<mpsc::Sender<CompletionTask>>>,
    rx: Arc<Mutex<mpsc::Receiver<CompletionTask>>>,
    upstream: Arc<dyn StreamingLlmClient>,
    live_workers: Arc<AtomicUsize>,
    worker_seq: AtomicUsize,
    workers: StdMutex<JoinSet<()>>,
    /// Handles of discarded tasks. A discarded task's handle must never
    /// resolve — dropping the sender would signal the caller — so the
    /// handle is parked here instead.
    shed: StdMutex<Vec<crate::task::TaskHandle>>,
    shutting_down: AtomicBool,
}

impl WorkerPool {
    /// Must be called from within a tokio runtime: core workers are
    /// spawned here.
    pub(crate) fn new(
        name: impl Into<String>,
        cfg: PoolConfig,
        upstream: Arc<dyn StreamingLlmClient>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(cfg.queue_capacity.max(1));
        let pool = Self {
            name: name.into(),
            cfg,
            tx: StdMutex::new(Some(tx)),
            rx: Arc::new(Mutex::new(rx)),
            upstream,
            live_workers: Arc::new(AtomicUsize::new(0)),
            worker_seq: AtomicUsize::new(0),
            workers: StdMutex::new(JoinSet::new()),
            shed: StdMutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
        };
        for _ in 0..pool.cfg.core_workers {
            pool.live_workers.fetch_add(1, Ordering::SeqCst);
            pool.spawn_worker(true, None);
        }
        pool
    }

    /// Non-blocking submission: enqueue, grow, or apply the saturation
    /// policy.
    pub(crate) fn submit(&self, task: CompletionTask) -> CoreResult<()> {
        let sender = { self.tx.lock().expect("pool lock poisoned").clone() };
        let Some(sender) = sender else {
            return self.refuse_closed(task);
        };

        match sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task)) => {
                // Queue exhausted: grow toward max_workers, handing the
                // overflowing task straight to the new worker.
                if self.try_claim_overflow_slot() {
                    self.spawn_worker(false, Some(task));
                    Ok(())
                } else {
                    self.saturated(task)
                }
            }
            Err(mpsc::error::TrySendError::Closed(task)) => self.refuse_closed(task),
        }
    }

    fn try_claim_overflow_slot(&self) -> bool {
        if self.shutting_down.load(Ordering::SeqCst) {
            return false;
        }
        let max = self.cfg.max_workers;
        self.live_workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < max).then_some(n + 1)
            })
            .is_ok()
    }

    fn saturated(&self, task: CompletionTask) -> CoreResult<()> {
        match self.cfg.saturation {
            SaturationPolicy::Reject => {
                warn!(
                    pool = %self.name,
                    task = %task.id,
                    tier = %task.tier,
                    "pool saturated; rejecting submission"
                );
                Err(CoreError::CapacityRejected { tier: task.tier })
            }
            SaturationPolicy::Discard => {
                // Deliberate load shedding: accepted, never executed, no
                // notification beyond the handle never resolving.
                debug!(
                    pool = %self.name,
                    task = %task.id,
                    tier = %task.tier,
                    "pool saturated; discarding task"
                );
                self.shed_silently(task);
                Ok(())
            }
        }
    }

    fn refuse_closed(&self, task: CompletionTask) -> CoreResult<()> {
        match self.cfg.saturation {
            SaturationPolicy::Reject => Err(CoreError::Shutdown),
            SaturationPolicy::Discard => {
                debug!(pool = %self.name, task = %task.id, "pool shut down; discarding task");
                self.shed_silently(task);
                Ok(())
            }
        }
    }

    fn shed_silently(&self, task: CompletionTask) {
        self.shed
            .lock()
            .expect("pool lock poisoned")
            .push(task.handle.clone());
        drop(task);
    }

    /// The worker slot count must already be claimed by the caller.
    fn spawn_worker(&self, permanent: bool, initial: Option<CompletionTask>) {
        let seq = self.worker_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let worker = format!("{}-worker-{}", self.name, seq);
        info!(worker = %worker, pool = %self.name, permanent, "created pool worker");

        let rx = self.rx.clone();
        let live = self.live_workers.clone();
        let upstream = self.upstream.clone();
        let start_delay = self.cfg.start_delay();
        let idle_expiry = self.cfg.idle_expiry();

        let fut = async move {
            if let Some(task) = initial {
                execute(&worker, start_delay, upstream.clone(), task).await;
            }
            loop {
                let task = if permanent {
                    rx.lock().await.recv().await
                } else {
                    match timeout(idle_expiry, async { rx.lock().await.recv().await }).await {
                        Ok(task) => task,
                        Err(_) => {
                            debug!(worker = %worker, "overflow worker idle-expired");
                            break;
                        }
                    }
                };
                let Some(task) = task else { break };
                execute(&worker, start_delay, upstream.clone(), task).await;
            }
            live.fetch_sub(1, Ordering::SeqCst);
        };
        self.workers.lock().expect("pool lock poisoned").spawn(fut);
    }

    /// Stop intake, drain for up to `grace`, then abort what remains.
    /// Idempotent.
    pub(crate) async fn shutdown(&self, grace: Duration) {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            return;
        }
        // Dropping the sender closes the queue; workers finish what is
        // already queued and then exit.
        drop(self.tx.lock().expect("pool lock poisoned").take());

        let mut workers = std::mem::take(&mut *self.workers.lock().expect("pool lock poisoned"));
        let drained = timeout(grace, async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(pool = %self.name, "shutdown grace elapsed; aborting remaining workers");
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }
        info!(pool = %self.name, "pool shut down");
    }
}

async fn execute(
    worker: &str,
    start_delay: Duration,
    upstream: Arc<dyn StreamingLlmClient>,
    task: CompletionTask,
) {
    let task_id = task.id;
    info!(worker = %worker, task = %task_id, tier = %task.tier, "task started");
    if !start_delay.is_zero() {
        debug!(
            worker = %worker,
            task = %task_id,
            delay_ms = start_delay.as_millis() as u64,
            "throttling before execution"
        );
        tokio::time::sleep(start_delay).await;
    }
    run_completion(task, upstream).await;
    info!(worker = %worker, task = %task_id, "task completed");
}
