//! RAII guard for queued jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

use crate::exclusive::ExclusiveGuard;

/// Depth counter shared by a queue and its in-flight jobs.
#[derive(Debug)]
pub(crate) struct Depth {
    name: &'static str,
    count: AtomicUsize,
    idle: Notify,
}

impl Depth {
    pub(crate) fn new(name: &'static str) -> Self {
        Self {
            name,
            count: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    pub(crate) fn load(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn idle(&self) -> &Notify {
        &self.idle
    }
}

/// Counts a job from submission until it finishes or is dropped, and keeps
/// its dedup key held for the same span. Accurate even if the handler
/// panics.
pub(crate) struct JobGuard {
    depth: Arc<Depth>,
    _key: Option<ExclusiveGuard>,
}

impl JobGuard {
    pub(crate) fn acquire(depth: &Arc<Depth>, key: Option<ExclusiveGuard>) -> Self {
        let now = depth.count.fetch_add(1, Ordering::AcqRel) + 1;
        fleet_metrics::set_queue_depth(depth.name, now);
        Self {
            depth: depth.clone(),
            _key: key,
        }
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let now = self.depth.count.fetch_sub(1, Ordering::AcqRel) - 1;
        fleet_metrics::set_queue_depth(self.depth.name, now);
        if now == 0 {
            self.depth.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExclusiveTasks;

    #[test]
    fn guard_tracks_depth_and_key() {
        let depth = Arc::new(Depth::new("test"));
        let keys = ExclusiveTasks::new();

        let g1 = JobGuard::acquire(&depth, keys.try_acquire("a"));
        let g2 = JobGuard::acquire(&depth, None);
        assert_eq!(depth.load(), 2);
        assert!(keys.is_held("a"));

        drop(g1);
        assert_eq!(depth.load(), 1);
        assert!(!keys.is_held("a"));

        drop(g2);
        assert_eq!(depth.load(), 0);
    }
}
