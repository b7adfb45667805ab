use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::platform::types::PullRequestRef;

/// Per-pull-request mutual exclusion.
///
/// Events for the same `(repository, number)` run one at a time so two
/// scripts never act on the same branch concurrently. Events for different
/// pull requests are not serialized. Idle entries are removed on release.
#[derive(Default)]
pub struct PrLocks {
    entries: Mutex<HashMap<PullRequestRef, Arc<AsyncMutex<()>>>>,
}

/// Held for the duration of one event's actions.
pub struct PrGuard<'a> {
    locks: &'a PrLocks,
    key: PullRequestRef,
    guard: Option<OwnedMutexGuard<()>>,
}

impl PrLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: PullRequestRef) -> PrGuard<'_> {
        let mutex = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        if mutex.try_lock().is_err() {
            tracing::info!(pr = %key, "Waiting for in-flight event on the same pull request");
        }

        let guard = mutex.lock_owned().await;
        PrGuard {
            locks: self,
            key,
            guard: Some(guard),
        }
    }

    /// Number of pull requests with an event running or waiting.
    pub fn in_flight(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Drop for PrGuard<'_> {
    fn drop(&mut self) {
        // Release before pruning so the strong count reflects remaining waiters.
        drop(self.guard.take());

        let mut entries = self.locks.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mutex) = entries.get(&self.key) {
            if Arc::strong_count(mutex) == 1 {
                entries.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn pr(number: u64) -> PullRequestRef {
        PullRequestRef {
            repo_full_name: "acme/widgets".to_string(),
            number,
        }
    }

    #[tokio::test]
    async fn test_same_pr_is_exclusive() {
        let locks = PrLocks::new();
        let first = locks.lock(pr(42)).await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), locks.lock(pr(42))).await;
        assert!(blocked.is_err());

        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(50), locks.lock(pr(42))).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_different_prs_do_not_block() {
        let locks = PrLocks::new();
        let _first = locks.lock(pr(1)).await;
        let other = tokio::time::timeout(Duration::from_millis(50), locks.lock(pr(2))).await;
        assert!(other.is_ok());
        assert_eq!(locks.in_flight(), 2);
    }

    #[tokio::test]
    async fn test_idle_entries_are_pruned() {
        let locks = PrLocks::new();
        {
            let _guard = locks.lock(pr(42)).await;
            assert_eq!(locks.in_flight(), 1);
        }
        assert_eq!(locks.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_entry_kept_while_waiter_pending() {
        let locks = Arc::new(PrLocks::new());
        let first = locks.lock(pr(42)).await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(pr(42)).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.in_flight(), 1);

        waiter.await.unwrap();
        assert_eq!(locks.in_flight(), 0);
    }
}
