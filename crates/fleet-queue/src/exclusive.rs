//! Named exclusive tasks.
//!
//! A key can be held by at most one task at a time. Callers that lose the
//! race may schedule a single delayed retry per key; further retries for a
//! key that already has one pending are refused.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct Inner {
    held: Mutex<HashSet<String>>,
    retrying: Mutex<HashSet<String>>,
}

/// Registry of held keys and pending retries.
///
/// Cloned cheaply; clones share state.
#[derive(Debug, Clone, Default)]
pub struct ExclusiveTasks {
    inner: Arc<Inner>,
}

impl ExclusiveTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key`. Returns `None` while another guard holds it.
    pub fn try_acquire(&self, key: impl Into<String>) -> Option<ExclusiveGuard> {
        let key = key.into();
        if !self.inner.held.lock().insert(key.clone()) {
            return None;
        }
        Some(ExclusiveGuard {
            inner: self.inner.clone(),
            key,
        })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.inner.held.lock().contains(key)
    }

    pub fn retry_pending(&self, key: &str) -> bool {
        self.inner.retrying.lock().contains(key)
    }

    /// Run `task` once after `delay`, unless a retry for `key` is already
    /// pending in this process.
    ///
    /// Returns `false` when the retry was refused. The pending mark is
    /// cleared just before `task` runs, so `task` may schedule again.
    pub fn retry_after<F, Fut>(&self, key: impl Into<String>, delay: Duration, task: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        if !self.inner.retrying.lock().insert(key.clone()) {
            debug!(key = %key, "retry already pending");
            return false;
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.retrying.lock().remove(&key);
            task().await;
        });
        true
    }
}

/// Holds an exclusive key until dropped.
#[derive(Debug)]
pub struct ExclusiveGuard {
    inner: Arc<Inner>,
    key: String,
}

impl ExclusiveGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the key and schedule `task` after `delay` when `retry` is set.
    pub fn release_and_maybe_retry<F, Fut>(self, retry: bool, delay: Duration, task: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let tasks = ExclusiveTasks {
            inner: self.inner.clone(),
        };
        let key = self.key.clone();
        drop(self);
        retry && tasks.retry_after(key, delay, task)
    }
}

impl Drop for ExclusiveGuard {
    fn drop(&mut self) {
        self.inner.held.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn second_acquire_is_refused_until_release() {
        let tasks = ExclusiveTasks::new();
        let guard = tasks.try_acquire("profile-a").unwrap();
        assert!(tasks.is_held("profile-a"));
        assert!(tasks.try_acquire("profile-a").is_none());
        assert!(tasks.try_acquire("profile-b").is_some());

        drop(guard);
        assert!(!tasks.is_held("profile-a"));
        assert!(tasks.try_acquire("profile-a").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn one_pending_retry_per_key() {
        let tasks = ExclusiveTasks::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let runs = runs.clone();
            tasks.retry_after("profile-a", Duration::from_secs(10), move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(tasks.retry_pending("profile-a"));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(!tasks.retry_pending("profile-a"));
    }

    #[tokio::test(start_paused = true)]
    async fn release_and_retry_frees_key_first() {
        let tasks = ExclusiveTasks::new();
        let guard = tasks.try_acquire("profile-a").unwrap();
        let observed = Arc::new(AtomicUsize::new(0));

        let check = tasks.clone();
        let seen = observed.clone();
        let scheduled = guard.release_and_maybe_retry(true, Duration::from_secs(1), move || async move {
            if check.try_acquire("profile-a").is_some() {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(scheduled);
        assert!(!tasks.is_held("profile-a"));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn release_without_retry_schedules_nothing() {
        let tasks = ExclusiveTasks::new();
        let guard = tasks.try_acquire("k").unwrap();
        assert!(!guard.release_and_maybe_retry(false, Duration::ZERO, || async {}));
        assert!(!tasks.retry_pending("k"));
    }
}
