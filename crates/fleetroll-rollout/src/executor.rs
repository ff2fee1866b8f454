//! Bounded parallel executor.
//!
//! Runs one unit of work per item on its own tokio task, with at most
//! `limit` units running at once. Every item is attempted exactly once;
//! a failing or panicking item never cancels its siblings. Outcomes come
//! back in completion order.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::error::{CompositeError, Failure, RolloutError, RolloutResult};

/// Default limit: fully sequential.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Result of one item's work.
#[derive(Debug)]
pub struct Outcome<R> {
    pub origin: String,
    pub result: RolloutResult<R>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundedExecutor {
    limit: usize,
}

impl Default for BoundedExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

impl BoundedExecutor {
    /// A limit of zero is treated as one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Run `work` for every `(origin, item)` pair and wait for all of them.
    pub async fn run<T, R, F, Fut>(&self, items: Vec<(String, T)>, work: F) -> Vec<Outcome<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RolloutResult<R>> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.limit));
        let work = Arc::new(work);
        let mut set = JoinSet::new();
        let mut origins = HashMap::with_capacity(items.len());

        for (origin, item) in items {
            let semaphore = Arc::clone(&semaphore);
            let work = Arc::clone(&work);
            let task_origin = origin.clone();

            let handle = set.spawn(async move {
                // Held until the work finishes. Tasks queue on the semaphore
                // in spawn order.
                let _permit = semaphore.acquire_owned().await;
                debug!(origin = %task_origin, "work started");
                (*work)(item).await
            });
            origins.insert(handle.id(), origin);
        }

        let mut outcomes = Vec::with_capacity(origins.len());
        while let Some(joined) = set.join_next_with_id().await {
            let outcome = match joined {
                Ok((id, result)) => Outcome {
                    origin: origins.remove(&id).unwrap_or_default(),
                    result,
                },
                Err(join_err) => {
                    let origin = origins.remove(&join_err.id()).unwrap_or_default();
                    error!(%origin, error = %join_err, "work task panicked");
                    Outcome {
                        result: Err(RolloutError::TaskPanicked {
                            origin: origin.clone(),
                        }),
                        origin,
                    }
                }
            };
            debug!(origin = %outcome.origin, ok = outcome.result.is_ok(), "work finished");
            outcomes.push(outcome);
        }

        outcomes
    }
}

/// Split outcomes into successes, or a [`CompositeError`] listing every
/// failure if there was at least one.
pub fn collect<R>(outcomes: Vec<Outcome<R>>) -> RolloutResult<Vec<(String, R)>> {
    let mut successes = Vec::new();
    let mut failures = Vec::new();

    for outcome in outcomes {
        match outcome.result {
            Ok(value) => successes.push((outcome.origin, value)),
            Err(error) => failures.push(Failure {
                origin: outcome.origin,
                error,
            }),
        }
    }

    if failures.is_empty() {
        Ok(successes)
    } else {
        Err(CompositeError::new(failures).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn items(n: usize) -> Vec<(String, usize)> {
        (0..n).map(|i| (format!("item-{i}"), i)).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let executor = BoundedExecutor::new(3);
        let outcomes = {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            let seen = seen.clone();
            executor
                .run(items(10), move |i| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    let seen = seen.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        seen.lock().unwrap().push(i);
                        tokio::time::sleep(Duration::from_millis(10 * (i as u64 % 4 + 1))).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        Ok(i)
                    }
                })
                .await
        };

        assert_eq!(outcomes.len(), 10);
        assert_eq!(peak.load(Ordering::SeqCst), 3);

        let seen = seen.lock().unwrap();
        let unique: HashSet<_> = seen.iter().copied().collect();
        assert_eq!(seen.len(), 10);
        assert_eq!(unique.len(), 10);
    }

    #[tokio::test]
    async fn limit_one_is_sequential() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let executor = BoundedExecutor::default();
        let (in_flight2, peak2) = (in_flight.clone(), peak.clone());
        let outcomes = executor
            .run(items(5), move |i| {
                let in_flight = in_flight2.clone();
                let peak = peak2.clone();
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(i)
                }
            })
            .await;

        assert_eq!(outcomes.len(), 5);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_do_not_stop_siblings() {
        let executor = BoundedExecutor::new(2);
        let outcomes = executor
            .run(items(6), |i| async move {
                if i % 2 == 1 {
                    Err(RolloutError::RemoteDeploy {
                        instance: format!("item-{i}"),
                        message: "boom".to_string(),
                    })
                } else {
                    Ok(i)
                }
            })
            .await;

        assert_eq!(outcomes.len(), 6);

        let err = collect(outcomes).unwrap_err();
        let RolloutError::Composite(composite) = err else {
            panic!("expected composite error");
        };
        let mut origins: Vec<_> = composite.failures.iter().map(|f| f.origin.as_str()).collect();
        origins.sort();
        assert_eq!(origins, ["item-1", "item-3", "item-5"]);
    }

    #[tokio::test]
    async fn all_successes_collect_ok() {
        let executor = BoundedExecutor::new(4);
        let outcomes = executor.run(items(4), |i| async move { Ok(i * 2) }).await;
        let mut values: Vec<_> = collect(outcomes).unwrap().into_iter().map(|(_, v)| v).collect();
        values.sort();
        assert_eq!(values, [0, 2, 4, 6]);
    }

    #[tokio::test]
    async fn panicking_item_is_recorded() {
        let executor = BoundedExecutor::new(2);
        let outcomes = executor
            .run(items(3), |i| async move {
                if i == 1 {
                    panic!("worker exploded");
                }
                Ok(i)
            })
            .await;

        assert_eq!(outcomes.len(), 3);
        let panicked: Vec<_> = outcomes
            .iter()
            .filter(|o| matches!(o.result, Err(RolloutError::TaskPanicked { .. })))
            .map(|o| o.origin.as_str())
            .collect();
        assert_eq!(panicked, ["item-1"]);
    }

    #[tokio::test]
    async fn empty_input_is_a_noop() {
        let executor = BoundedExecutor::new(2);
        let outcomes = executor
            .run(Vec::<(String, u32)>::new(), |i| async move { Ok(i) })
            .await;
        assert!(outcomes.is_empty());
        assert!(collect(outcomes).unwrap().is_empty());
    }
}
