use std::collections::VecDeque;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::MissedTickBehavior;
use tracing::info;

use super::{ConversionTask, TaskOutcome};

/// Cadence of the throttled progress callback.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Point-in-time view of the pool handed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub queued: usize,
    pub running: usize,
    pub finished: usize,
    pub total: usize,
}

impl PoolSnapshot {
    pub fn remaining(&self) -> usize {
        self.queued + self.running
    }
}

/// Bounded-parallelism FIFO scheduler for conversion tasks.
///
/// Tasks are started in submission order whenever fewer than `max_parallel`
/// are running. Failures are recorded in the task's outcome and never halt
/// the pool; there is no retry, cancellation or timeout.
pub struct TaskPool {
    max_parallel: usize,
    pending: VecDeque<ConversionTask>,
}

impl TaskPool {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
            pending: VecDeque::new(),
        }
    }

    /// Append a task to the pending queue.
    pub fn submit(&mut self, task: ConversionTask) {
        self.pending.push_back(task);
    }

    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    /// Drive all submitted tasks to a terminal state and return their
    /// outcomes in submission order.
    ///
    /// The queue and the running set are touched only from this loop; task
    /// completion arrives through the polled future, so no shared mutation
    /// is involved. The callback fires on a throttled tick and once more
    /// after the last task finishes.
    pub async fn process<F>(&mut self, mut progress: F) -> Vec<TaskOutcome>
    where
        F: FnMut(PoolSnapshot),
    {
        let total = self.pending.len();
        if total == 0 {
            return Vec::new();
        }

        info!(
            "processing {} tasks with up to {} in parallel",
            total, self.max_parallel
        );

        let mut running = FuturesUnordered::new();
        let mut finished: Vec<TaskOutcome> = Vec::with_capacity(total);

        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            while running.len() < self.max_parallel {
                match self.pending.pop_front() {
                    Some(task) => running.push(task.run()),
                    None => break,
                }
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                Some(outcome) = running.next() => {
                    finished.push(outcome);
                }
                _ = ticker.tick() => {
                    progress(PoolSnapshot {
                        queued: self.pending.len(),
                        running: running.len(),
                        finished: finished.len(),
                        total,
                    });
                }
            }
        }

        progress(PoolSnapshot {
            queued: 0,
            running: 0,
            finished: finished.len(),
            total,
        });

        finished.sort_by_key(|outcome| outcome.index);
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioCodec, AudioFormat};
    use crate::convert::{ConversionOptions, ConversionTask, Encoder};
    use crate::error::{MergeError, Result};
    use crate::media::ToolOutput;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Encoder double that tracks concurrency and start order.
    struct MockEncoder {
        current: AtomicUsize,
        max_observed: AtomicUsize,
        start_order: Mutex<Vec<usize>>,
        fail_on: Option<usize>,
    }

    impl MockEncoder {
        fn new() -> Self {
            Self {
                current: AtomicUsize::new(0),
                max_observed: AtomicUsize::new(0),
                start_order: Mutex::new(Vec::new()),
                fail_on: None,
            }
        }

        fn failing_on(index: usize) -> Self {
            Self {
                fail_on: Some(index),
                ..Self::new()
            }
        }

        fn source_index(options: &ConversionOptions) -> usize {
            options
                .source
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse().ok())
                .unwrap_or(0)
        }
    }

    #[async_trait]
    impl Encoder for MockEncoder {
        async fn convert(&self, options: &ConversionOptions) -> Result<ToolOutput> {
            let index = Self::source_index(options);
            self.start_order.lock().unwrap().push(index);

            let running = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_observed.fetch_max(running, Ordering::SeqCst);

            tokio::time::sleep(Duration::from_millis(10)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on == Some(index) {
                return Err(MergeError::Conversion("mock failure".to_string()));
            }

            Ok(ToolOutput::succeeded(
                options.destination.clone(),
                String::new(),
            ))
        }

        fn name(&self) -> &'static str {
            "Mock"
        }
    }

    fn options(index: usize) -> ConversionOptions {
        ConversionOptions {
            source: PathBuf::from(format!("/in/{index}.mp3")),
            destination: PathBuf::from(format!("/tmp/{index}.m4b")),
            temp_dir: PathBuf::from("/tmp"),
            extension: "m4b".to_string(),
            codec: AudioCodec::Aac,
            format: AudioFormat::Mp4,
            channels: None,
            sample_rate: None,
            bit_rate: None,
            force: false,
        }
    }

    fn fill_pool(pool: &mut TaskPool, encoder: &Arc<MockEncoder>, count: usize) {
        for index in 0..count {
            pool.submit(ConversionTask::new(
                index,
                encoder.clone() as Arc<dyn Encoder>,
                options(index),
            ));
        }
    }

    #[tokio::test]
    async fn test_empty_pool_returns_immediately() {
        let mut pool = TaskPool::new(4);
        let outcomes = pool.process(|_| {}).await;
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_running_never_exceeds_max_parallel() {
        let encoder = Arc::new(MockEncoder::new());
        let mut pool = TaskPool::new(2);
        fill_pool(&mut pool, &encoder, 10);

        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let snapshots_ref = snapshots.clone();
        let outcomes = pool
            .process(move |snapshot| snapshots_ref.lock().unwrap().push(snapshot))
            .await;

        assert_eq!(outcomes.len(), 10);
        assert!(encoder.max_observed.load(Ordering::SeqCst) <= 2);
        assert!(snapshots
            .lock()
            .unwrap()
            .iter()
            .all(|s| s.running <= 2 && s.total == 10));
    }

    #[tokio::test]
    async fn test_final_snapshot_is_drained() {
        let encoder = Arc::new(MockEncoder::new());
        let mut pool = TaskPool::new(3);
        fill_pool(&mut pool, &encoder, 5);

        let last = Arc::new(Mutex::new(None));
        let last_ref = last.clone();
        pool.process(move |snapshot| *last_ref.lock().unwrap() = Some(snapshot))
            .await;

        let last = last.lock().unwrap().unwrap();
        assert_eq!(last.queued, 0);
        assert_eq!(last.running, 0);
        assert_eq!(last.finished, 5);
    }

    #[tokio::test]
    async fn test_serial_pool_starts_in_submission_order() {
        let encoder = Arc::new(MockEncoder::new());
        let mut pool = TaskPool::new(1);
        fill_pool(&mut pool, &encoder, 6);

        pool.process(|_| {}).await;

        let order = encoder.start_order.lock().unwrap().clone();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_failure_does_not_halt_pool() {
        let encoder = Arc::new(MockEncoder::failing_on(2));
        let mut pool = TaskPool::new(2);
        fill_pool(&mut pool, &encoder, 5);

        let outcomes = pool.process(|_| {}).await;

        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes.iter().filter(|o| o.succeeded()).count(), 4);
        assert!(!outcomes[2].succeeded());
        // outcomes come back in submission order
        let indices: Vec<usize> = outcomes.iter().map(|o| o.index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }
}
