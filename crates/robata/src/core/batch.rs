use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify};
use tokio::time::{self, error::Elapsed, Instant};
use tracing::debug;
use crate::config::BatchingConfig;
use crate::constant::WORKER_POLL_INTERVAL;
use super::handler::BatchHandler;

/// Runs batch groups until `running` is cleared.
///
/// Each round waits for a request, keeps collecting until either the queue
/// holds `max_batch_size` requests or `max_latency_ms` has passed since the
/// round started, then drains up to `max_batch_size` requests in arrival
/// order. Requests whose caller went away are dropped before merging.
pub(crate) async fn batching_loop<BH: BatchHandler>(
    handler: &BH,
    policy: &BatchingConfig,
    running: Arc<AtomicBool>,
    notifier: Arc<Notify>,
    waiting_requests: Arc<Mutex<VecDeque<BH::Request>>>,
) {
    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        if waiting_requests.lock().await.is_empty() {
            // No work to do, wait for notification or check periodically
            let _ = timeout_await_notifier(&notifier).await;
            continue;
        }

        wait_for_group(policy, &running, &notifier, &waiting_requests).await;

        let drained = drain_group(policy.max_batch_size, &waiting_requests).await;
        let drained_len = drained.len();
        let group: Vec<BH::Request> = drained
            .into_iter()
            .filter(|request| !handler.is_abandoned(request))
            .collect();
        if group.len() < drained_len {
            debug!(dropped = drained_len - group.len(), "dropped cancelled callers from group");
        }
        if group.is_empty() {
            continue;
        }

        debug!(size = group.len(), "dispatching batch group");
        let output = match handler.make_batch_input(&group).await {
            Ok(input) => handler.forward(input).await,
            Err(err) => Err(err),
        };
        handler.handle_outputs(group, output).await;
    }
}

#[inline]
async fn timeout_await_notifier(notifier: &Notify) -> Result<(), Elapsed> {
    time::timeout(WORKER_POLL_INTERVAL, notifier.notified()).await
}

/// Waits until the queue can fill a whole group or the latency window closes.
async fn wait_for_group<T>(
    policy: &BatchingConfig,
    running: &AtomicBool,
    notifier: &Notify,
    waiting_requests: &Mutex<VecDeque<T>>,
) {
    let window = policy.max_latency();
    if window.is_zero() {
        return;
    }
    let deadline = Instant::now() + window;
    while running.load(Ordering::SeqCst) {
        if waiting_requests.lock().await.len() >= policy.max_batch_size {
            return;
        }
        if time::timeout_at(deadline, notifier.notified()).await.is_err() {
            return;
        }
    }
}

async fn drain_group<T>(batch_size: usize, waiting_requests: &Mutex<VecDeque<T>>) -> Vec<T> {
    let mut requests = waiting_requests.lock().await;
    let take = batch_size.min(requests.len());
    requests.drain(..take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use async_trait::async_trait;
    use crate::error::{Result, RobataError};

    /// Sums the numbers of a group and records each group's members.
    struct SumHandler {
        groups: parking_lot::Mutex<Vec<Vec<i64>>>,
    }

    #[async_trait]
    impl BatchHandler for SumHandler {
        type Request = i64;
        type ModelInput = Vec<i64>;
        type ModelOutput = i64;

        fn is_abandoned(&self, request: &i64) -> bool {
            *request < 0
        }

        async fn make_batch_input(&self, requests: &[i64]) -> Result<Vec<i64>> {
            if requests.contains(&0) {
                return Err(RobataError::incompatible("zero"));
            }
            Ok(requests.to_vec())
        }

        async fn forward(&self, input: Vec<i64>) -> Result<i64> {
            Ok(input.iter().sum())
        }

        async fn handle_outputs(&self, requests: Vec<i64>, _output: Result<i64>) {
            self.groups.lock().push(requests);
        }
    }

    fn spawn_loop(
        policy: BatchingConfig,
        queue: Arc<Mutex<VecDeque<i64>>>,
    ) -> (Arc<SumHandler>, Arc<AtomicBool>, Arc<Notify>) {
        let handler = Arc::new(SumHandler { groups: Default::default() });
        let running = Arc::new(AtomicBool::new(true));
        let notifier = Arc::new(Notify::new());
        {
            let handler = handler.clone();
            let running = running.clone();
            let notifier = notifier.clone();
            tokio::spawn(async move {
                batching_loop(handler.as_ref(), &policy, running, notifier, queue).await;
            });
        }
        (handler, running, notifier)
    }

    #[tokio::test]
    async fn test_groups_respect_max_batch_size_and_order() {
        let queue = Arc::new(Mutex::new(VecDeque::from(vec![1, 2, 3, 4, 5])));
        let policy = BatchingConfig { enabled: true, max_batch_size: 2, max_latency_ms: 0 };
        let (handler, running, notifier) = spawn_loop(policy, queue);

        notifier.notify_one();
        time::sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::SeqCst);

        assert_eq!(*handler.groups.lock(), vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[tokio::test]
    async fn test_latency_window_collects_late_arrivals() {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        let policy = BatchingConfig { enabled: true, max_batch_size: 8, max_latency_ms: 100 };
        let (handler, running, notifier) = spawn_loop(policy, queue.clone());

        queue.lock().await.push_back(1);
        notifier.notify_one();
        time::sleep(Duration::from_millis(20)).await;
        queue.lock().await.push_back(2);
        notifier.notify_one();

        time::sleep(Duration::from_millis(250)).await;
        running.store(false, Ordering::SeqCst);

        assert_eq!(*handler.groups.lock(), vec![vec![1, 2]]);
    }

    #[tokio::test]
    async fn test_abandoned_requests_are_dropped() {
        let queue = Arc::new(Mutex::new(VecDeque::from(vec![-1, 7, -2])));
        let policy = BatchingConfig { enabled: true, max_batch_size: 8, max_latency_ms: 0 };
        let (handler, running, notifier) = spawn_loop(policy, queue.clone());

        notifier.notify_one();
        time::sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::SeqCst);

        assert_eq!(*handler.groups.lock(), vec![vec![7]]);
        assert!(queue.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_merge_still_reaches_handle_outputs() {
        let queue = Arc::new(Mutex::new(VecDeque::from(vec![0, 3])));
        let policy = BatchingConfig { enabled: true, max_batch_size: 8, max_latency_ms: 0 };
        let (handler, running, notifier) = spawn_loop(policy, queue);

        notifier.notify_one();
        time::sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::SeqCst);

        assert_eq!(*handler.groups.lock(), vec![vec![0, 3]]);
    }
}
