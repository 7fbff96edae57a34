//! In-process lock provider with real lease semantics.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use uuid::Uuid;

use super::{LockGuard, LockProvider};

#[derive(Debug)]
struct Lease {
    token: Uuid,
    expires_at: Instant,
}

/// Single-node [`LockProvider`]: a lease table plus waiter wake-up on
/// release. Expired leases are reclaimed lazily by the next acquirer.
#[derive(Default)]
pub struct InMemoryLockProvider {
    leases: Mutex<HashMap<String, Lease>>,
    released: Notify,
}

impl InMemoryLockProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockProvider for InMemoryLockProvider {
    async fn try_acquire(
        &self,
        name: &str,
        wait: Duration,
        lease: Duration,
    ) -> Option<LockGuard> {
        let deadline = Instant::now() + wait;
        loop {
            let holder_expiry = {
                let mut leases = self.leases.lock().await;
                let now = Instant::now();
                let live_expiry = leases
                    .get(name)
                    .and_then(|held| (held.expires_at > now).then_some(held.expires_at));
                match live_expiry {
                    Some(expires_at) => expires_at,
                    None => {
                        // free, or the previous lease expired unreclaimed
                        let token = Uuid::new_v4();
                        leases.insert(
                            name.to_string(),
                            Lease {
                                token,
                                expires_at: now + lease,
                            },
                        );
                        return Some(LockGuard::new(name.to_string(), token));
                    }
                }
            };

            if Instant::now() >= deadline {
                return None;
            }
            // Wake on release, or at whichever comes first of the
            // holder's lease expiry and our own deadline.
            let wake_at = holder_expiry.min(deadline);
            tokio::select! {
                _ = self.released.notified() => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn release(&self, guard: &LockGuard) -> bool {
        let mut leases = self.leases.lock().await;
        let still_held = leases
            .get(guard.name())
            .is_some_and(|held| held.token == guard.token());
        if still_held {
            leases.remove(guard.name());
            drop(leases);
            self.released.notify_waiters();
            true
        } else {
            // expired and possibly reassigned; leave it alone
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WAIT: Duration = Duration::from_millis(200);
    const LEASE: Duration = Duration::from_secs(5);

    #[tokio::test]
    async fn second_acquirer_times_out_while_held() {
        let locks = InMemoryLockProvider::new();
        let guard = locks.try_acquire("fp:1", WAIT, LEASE).await.unwrap();
        assert!(locks.try_acquire("fp:1", WAIT, LEASE).await.is_none());
        assert!(locks.release(&guard).await);
    }

    #[tokio::test]
    async fn unrelated_names_never_contend() {
        let locks = InMemoryLockProvider::new();
        let a = locks.try_acquire("fp:a", WAIT, LEASE).await.unwrap();
        let b = locks.try_acquire("fp:b", WAIT, LEASE).await.unwrap();
        assert!(locks.release(&a).await);
        assert!(locks.release(&b).await);
    }

    #[tokio::test]
    async fn waiter_wakes_when_holder_releases() {
        let locks = Arc::new(InMemoryLockProvider::new());
        let guard = locks.try_acquire("fp:1", WAIT, LEASE).await.unwrap();

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                locks
                    .try_acquire("fp:1", Duration::from_secs(3), LEASE)
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(locks.release(&guard).await);

        let acquired = contender.await.unwrap();
        assert!(acquired.is_some());
    }

    #[tokio::test]
    async fn expired_lease_is_reclaimed_and_release_reports_loss() {
        tokio::time::pause();
        let locks = InMemoryLockProvider::new();
        let stale = locks
            .try_acquire("fp:1", WAIT, Duration::from_millis(100))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;

        // lease ran out: a second caller takes the lock over
        let fresh = locks.try_acquire("fp:1", WAIT, LEASE).await.unwrap();
        assert!(!locks.release(&stale).await, "stale guard must not unlock");
        assert!(locks.release(&fresh).await);
    }
}
