//! Bounded-concurrency FIFO work queue with per-key deduplication.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::exclusive::ExclusiveTasks;
use crate::guard::{Depth, JobGuard};
use crate::rate::RateGate;

/// A unit of queued work.
pub trait Job: Send + 'static {
    /// Short label used in logs and metrics.
    fn kind(&self) -> &'static str;

    /// Jobs sharing a key are not queued twice; a second submission while
    /// the first is waiting or running is rejected.
    fn dedup_key(&self) -> Option<String> {
        None
    }
}

/// Executes jobs taken from a [`WorkQueue`].
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Job: Job;
    type Error: Display + Send;

    async fn handle(&self, job: Self::Job) -> Result<(), Self::Error>;
}

/// Result of [`WorkQueue::submit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Queued,
    /// A job with the same key is already waiting or running.
    Duplicate,
    /// The queue has been shut down.
    Closed,
}

/// Construction options for a [`WorkQueue`].
#[derive(Debug, Clone)]
pub struct QueueOptions {
    name: &'static str,
    concurrency: usize,
    rate: Option<(u32, Duration)>,
}

impl QueueOptions {
    pub fn new(name: &'static str, concurrency: usize) -> Self {
        Self {
            name,
            concurrency: concurrency.max(1),
            rate: None,
        }
    }

    /// Cap job starts at `max` per `window`.
    pub fn rate_limit(mut self, max: u32, window: Duration) -> Self {
        self.rate = Some((max.max(1), window));
        self
    }
}

type Entry<J> = (J, JobGuard);

struct Shared<J> {
    name: &'static str,
    tx: mpsc::UnboundedSender<Entry<J>>,
    keys: ExclusiveTasks,
    depth: Arc<Depth>,
    shutdown: CancellationToken,
}

/// Job queue feeding a [`JobHandler`].
///
/// Jobs start in submission order; at most `concurrency` run at once.
/// Cloning yields another handle to the same queue.
pub struct WorkQueue<J: Job> {
    shared: Arc<Shared<J>>,
}

impl<J: Job> Clone for WorkQueue<J> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<J: Job> WorkQueue<J> {
    /// Spawn the queue's dispatcher on the current runtime.
    pub fn start<H>(options: QueueOptions, handler: Arc<H>) -> Self
    where
        H: JobHandler<Job = J>,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            name: options.name,
            tx,
            keys: ExclusiveTasks::new(),
            depth: Arc::new(Depth::new(options.name)),
            shutdown: CancellationToken::new(),
        });

        let rate = options
            .rate
            .map(|(max, window)| Arc::new(RateGate::new(max, window)));
        tokio::spawn(run_dispatcher(
            options.name,
            rx,
            Arc::new(Semaphore::new(options.concurrency)),
            rate,
            handler,
            shared.shutdown.clone(),
        ));

        Self { shared }
    }

    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// Jobs waiting or running.
    pub fn depth(&self) -> usize {
        self.shared.depth.load()
    }

    pub fn submit(&self, job: J) -> SubmitOutcome {
        match self.enqueue(job) {
            Ok(()) => SubmitOutcome::Queued,
            Err((outcome, _)) => outcome,
        }
    }

    /// Submit `job`; if it is rejected as a duplicate, resubmit it after
    /// `delay`. Only one delayed resubmission per key is pending at a time.
    pub fn submit_or_retry(&self, job: J, delay: Duration) -> SubmitOutcome {
        match self.enqueue(job) {
            Ok(()) => SubmitOutcome::Queued,
            Err((SubmitOutcome::Duplicate, job)) => {
                let Some(key) = job.dedup_key() else {
                    return SubmitOutcome::Duplicate;
                };
                let queue = self.clone();
                let scheduled = self.shared.keys.retry_after(key.clone(), delay, move || async move {
                    queue.submit_or_retry(job, delay);
                });
                if scheduled {
                    debug!(queue = self.shared.name, key = %key, ?delay, "duplicate job, retry scheduled");
                }
                SubmitOutcome::Duplicate
            }
            Err((outcome, _)) => outcome,
        }
    }

    fn enqueue(&self, job: J) -> Result<(), (SubmitOutcome, J)> {
        if self.shared.shutdown.is_cancelled() {
            return Err((SubmitOutcome::Closed, job));
        }

        let key = match job.dedup_key() {
            Some(key) => match self.shared.keys.try_acquire(key) {
                Some(guard) => Some(guard),
                None => {
                    fleet_metrics::record_queue_duplicate(self.shared.name);
                    return Err((SubmitOutcome::Duplicate, job));
                }
            },
            None => None,
        };

        let guard = JobGuard::acquire(&self.shared.depth, key);
        self.shared
            .tx
            .send((job, guard))
            .map_err(|mpsc::error::SendError((job, _guard))| (SubmitOutcome::Closed, job))
    }

    /// Wait until no job is waiting or running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.depth.idle().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.depth.load() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting jobs and drop those not yet started.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }
}

async fn run_dispatcher<H: JobHandler>(
    name: &'static str,
    mut rx: mpsc::UnboundedReceiver<Entry<H::Job>>,
    slots: Arc<Semaphore>,
    rate: Option<Arc<RateGate>>,
    handler: Arc<H>,
    shutdown: CancellationToken,
) {
    loop {
        let (job, guard) = tokio::select! {
            _ = shutdown.cancelled() => break,
            entry = rx.recv() => match entry {
                Some(entry) => entry,
                None => break,
            },
        };

        let permit = tokio::select! {
            _ = shutdown.cancelled() => break,
            permit = slots.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        if let Some(rate) = &rate {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = rate.acquire() => {}
            }
        }

        let handler = handler.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            let kind = job.kind();
            if let Err(e) = handler.handle(job).await {
                warn!(queue = name, job = kind, error = %e, "job failed");
            }
        });
    }

    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    debug!(queue = name, dropped, "queue dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[derive(Debug)]
    struct TestJob {
        id: u32,
        key: Option<&'static str>,
    }

    impl Job for TestJob {
        fn kind(&self) -> &'static str {
            "test"
        }

        fn dedup_key(&self) -> Option<String> {
            self.key.map(str::to_string)
        }
    }

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<u32>>,
        running: AtomicUsize,
        peak: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl JobHandler for Recorder {
        type Job = TestJob;
        type Error = String;

        async fn handle(&self, job: TestJob) -> Result<(), String> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            } else {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            self.seen.lock().push(job.id);
            self.running.fetch_sub(1, Ordering::SeqCst);
            if job.id == 13 {
                return Err("unlucky".into());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn single_slot_runs_in_submission_order() {
        let handler = Arc::new(Recorder::default());
        let queue = WorkQueue::start(QueueOptions::new("fifo", 1), handler.clone());

        for id in 0..10 {
            assert_eq!(queue.submit(TestJob { id, key: None }), SubmitOutcome::Queued);
        }
        queue.wait_idle().await;

        assert_eq!(*handler.seen.lock(), (0..10).collect::<Vec<_>>());
        assert_eq!(handler.peak.load(Ordering::SeqCst), 1);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let handler = Arc::new(Recorder::default());
        let queue = WorkQueue::start(QueueOptions::new("bounded", 3), handler.clone());

        for id in 0..30 {
            queue.submit(TestJob { id, key: None });
        }
        queue.wait_idle().await;

        assert_eq!(handler.seen.lock().len(), 30);
        assert!(handler.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn duplicate_key_rejected_while_in_flight() {
        let gate = Arc::new(Notify::new());
        let handler = Arc::new(Recorder {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let queue = WorkQueue::start(QueueOptions::new("dedup", 4), handler.clone());

        let first = TestJob { id: 1, key: Some("profile-a") };
        let second = TestJob { id: 2, key: Some("profile-a") };
        let other = TestJob { id: 3, key: Some("profile-b") };
        assert_eq!(queue.submit(first), SubmitOutcome::Queued);
        assert_eq!(queue.submit(second), SubmitOutcome::Duplicate);
        assert_eq!(queue.submit(other), SubmitOutcome::Queued);

        while handler.running.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }
        gate.notify_waiters();
        queue.wait_idle().await;

        assert_eq!(queue.submit(TestJob { id: 4, key: Some("profile-a") }), SubmitOutcome::Queued);
        while handler.running.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        gate.notify_waiters();
        queue.wait_idle().await;

        let mut seen = handler.seen.lock().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 3, 4]);
    }

    #[tokio::test]
    async fn failing_job_does_not_stop_queue() {
        let handler = Arc::new(Recorder::default());
        let queue = WorkQueue::start(QueueOptions::new("errors", 2), handler.clone());

        for id in [12, 13, 14] {
            queue.submit(TestJob { id, key: None });
        }
        queue.wait_idle().await;

        assert_eq!(handler.seen.lock().len(), 3);
    }

    #[tokio::test]
    async fn duplicate_is_resubmitted_after_delay() {
        let gate = Arc::new(Notify::new());
        let handler = Arc::new(Recorder {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let queue = WorkQueue::start(QueueOptions::new("retry", 2), handler.clone());
        let delay = Duration::from_millis(20);

        assert_eq!(
            queue.submit_or_retry(TestJob { id: 1, key: Some("p") }, delay),
            SubmitOutcome::Queued
        );
        assert_eq!(
            queue.submit_or_retry(TestJob { id: 2, key: Some("p") }, delay),
            SubmitOutcome::Duplicate
        );
        // A second duplicate does not stack another retry.
        assert_eq!(
            queue.submit_or_retry(TestJob { id: 3, key: Some("p") }, delay),
            SubmitOutcome::Duplicate
        );

        while handler.running.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }
        gate.notify_waiters();

        // Job 2 comes back once job 1 has released the key.
        loop {
            tokio::time::sleep(Duration::from_millis(5)).await;
            if handler.running.load(Ordering::SeqCst) == 1 {
                gate.notify_waiters();
            }
            if handler.seen.lock().len() == 2 {
                break;
            }
        }
        assert_eq!(*handler.seen.lock(), vec![1, 2]);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_jobs() {
        let handler = Arc::new(Recorder::default());
        let queue = WorkQueue::start(QueueOptions::new("closed", 1), handler);
        queue.shutdown();
        assert_eq!(queue.submit(TestJob { id: 1, key: None }), SubmitOutcome::Closed);
    }

    #[tokio::test]
    async fn rate_limit_spaces_job_starts() {
        let handler = Arc::new(Recorder::default());
        let queue = WorkQueue::start(
            QueueOptions::new("notify", 4).rate_limit(2, Duration::from_millis(50)),
            handler.clone(),
        );

        let started = std::time::Instant::now();
        for id in 0..5 {
            queue.submit(TestJob { id, key: None });
        }
        queue.wait_idle().await;

        assert_eq!(handler.seen.lock().len(), 5);
        assert!(started.elapsed() >= Duration::from_millis(100));
    }
}
