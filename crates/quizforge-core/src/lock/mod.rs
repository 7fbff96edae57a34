//! Cluster-wide mutual exclusion, scoped per lock name.
//!
//! Acquisition has a bounded wait; once held, the lock carries a bounded
//! lease after which the lock service reclaims it even if the holder has
//! not returned. Holders must tolerate losing the lease mid-computation:
//! the only symptom is `release` reporting `false`, and that is
//! non-fatal by contract.

mod memory;

pub use memory::InMemoryLockProvider;

use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

/// A held lock. The token fences release: a guard can only release the
/// lease it actually acquired, never one reassigned past expiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGuard {
    name: String,
    token: Uuid,
}

impl LockGuard {
    pub(crate) fn new(name: String, token: Uuid) -> Self {
        Self { name, token }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn token(&self) -> Uuid {
        self.token
    }
}

/// Named-lock service seam. Cross-instance implementations live outside
/// this crate; [`InMemoryLockProvider`] is the single-node default.
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to acquire `name`, waiting up to `wait`. Returns `None` on
    /// timeout — the caller treats that as "someone else is computing".
    /// A successful acquisition is leased for at most `lease`.
    async fn try_acquire(&self, name: &str, wait: Duration, lease: Duration)
        -> Option<LockGuard>;

    /// Release a held lock. Returns `false` when the lease had already
    /// expired (and may have been reassigned) — the guard must never
    /// unlock a lock it no longer holds.
    async fn release(&self, guard: &LockGuard) -> bool;
}
