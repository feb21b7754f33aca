//! Bounded Concurrent Runner

use std::future::Future;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::debug;

/// Why a bounded run stopped early
#[derive(Debug, Error)]
pub enum RunError<E> {
    /// First task failure; remaining tasks were not started
    #[error("task {index} failed: {error}")]
    Failed { index: usize, error: E },

    /// A task panicked
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Run `task` over every item with at most `max_concurrency` in flight.
///
/// Results come back in input order. On the first failure nothing new is
/// dispatched; tasks already running are detached (not cancelled) and their
/// results dropped. An empty input yields once before resolving.
pub async fn run_bounded<T, R, E, F, Fut>(
    items: Vec<T>,
    max_concurrency: usize,
    mut task: F,
) -> Result<Vec<R>, RunError<E>>
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    if items.is_empty() {
        tokio::task::yield_now().await;
        return Ok(Vec::new());
    }

    let limit = max_concurrency.max(1);
    let total = items.len();
    let mut slots: Vec<Option<R>> = (0..total).map(|_| None).collect();
    let mut pending = items.into_iter().enumerate();
    let mut in_flight = JoinSet::new();

    for (index, item) in pending.by_ref().take(limit) {
        let fut = task(item);
        in_flight.spawn(async move { (index, fut.await) });
    }

    while let Some(joined) = in_flight.join_next().await {
        match joined {
            Ok((index, Ok(result))) => {
                slots[index] = Some(result);
                if let Some((next, item)) = pending.next() {
                    let fut = task(item);
                    in_flight.spawn(async move { (next, fut.await) });
                }
            }
            Ok((index, Err(error))) => {
                debug!(
                    "Task {} of {} failed, abandoning {} in flight",
                    index,
                    total,
                    in_flight.len()
                );
                in_flight.detach_all();
                return Err(RunError::Failed { index, error });
            }
            Err(join_err) => {
                in_flight.detach_all();
                return Err(RunError::Panicked(join_err.to_string()));
            }
        }
    }

    slots
        .into_iter()
        .collect::<Option<Vec<R>>>()
        .ok_or_else(|| RunError::Panicked("task finished without a result".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::pin;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll, Wake, Waker};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_results_follow_input_order() {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let delays = vec![30u64, 10, 20];

        let log = completed.clone();
        let results = run_bounded(delays, 3, move |delay| {
            let log = log.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                log.lock().unwrap().push(delay);
                Ok::<_, String>(delay * 2)
            }
        })
        .await
        .unwrap();

        assert_eq!(results, vec![60, 20, 40]);
        assert_eq!(*completed.lock().unwrap(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_sequential_run_keeps_order() {
        let results = run_bounded(vec!["a", "b", "c"], 1, |item| async move {
            Ok::<_, String>(item.to_uppercase())
        })
        .await
        .unwrap();
        assert_eq!(results, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_first_failure_stops_dispatch() {
        let started = Arc::new(Mutex::new(Vec::new()));

        let log = started.clone();
        let result = run_bounded(vec!["A", "B", "C"], 1, move |item| {
            log.lock().unwrap().push(item);
            async move {
                if item == "B" {
                    Err(format!("{} failed", item))
                } else {
                    Ok(item)
                }
            }
        })
        .await;

        match result {
            Err(RunError::Failed { index, error }) => {
                assert_eq!(index, 1);
                assert_eq!(error, "B failed");
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(*started.lock().unwrap(), vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_tasks_are_not_cancelled() {
        let finished = Arc::new(AtomicBool::new(false));

        let flag = finished.clone();
        let result = run_bounded(vec![0u64, 10], 2, move |delay| {
            let flag = flag.clone();
            async move {
                if delay == 0 {
                    return Err("fast failure");
                }
                tokio::time::sleep(Duration::from_millis(delay)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(delay)
            }
        })
        .await;

        assert!(matches!(result, Err(RunError::Failed { index: 0, .. })));
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_concurrency_limit() {
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (cur, top) = (current.clone(), peak.clone());
        let results = run_bounded((1..=6u64).collect(), 2, move |n| {
            let (cur, top) = (cur.clone(), top.clone());
            async move {
                let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
                top.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(7 * n)).await;
                cur.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, String>(n)
            }
        })
        .await
        .unwrap();

        assert_eq!(results, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_concurrency_runs_sequentially() {
        let results = run_bounded(vec![1, 2], 0, |n| async move { Ok::<_, String>(n) })
            .await
            .unwrap();
        assert_eq!(results, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let result = run_bounded(vec![1, 2], 1, |n| async move {
            if n == 2 {
                panic!("fetch task blew up");
            }
            Ok::<_, String>(n)
        })
        .await;
        assert!(matches!(result, Err(RunError::Panicked(_))));
    }

    struct NoopWake;

    impl Wake for NoopWake {
        fn wake(self: Arc<Self>) {}
    }

    #[tokio::test]
    async fn test_empty_input_resolves_asynchronously() {
        let waker = Waker::from(Arc::new(NoopWake));
        let mut cx = Context::from_waker(&waker);

        let mut run = pin!(run_bounded(Vec::<u8>::new(), 1, |n| async move {
            Ok::<_, String>(n)
        }));

        assert!(run.as_mut().poll(&mut cx).is_pending());
        match run.as_mut().poll(&mut cx) {
            Poll::Ready(Ok(results)) => assert!(results.is_empty()),
            other => panic!("expected empty result, got {:?}", other),
        }
    }
}
