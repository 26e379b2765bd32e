//! Bounded concurrent fan-out with a join barrier.

use std::future::Future;
use std::sync::Arc;

use futures::future;
use log::warn;
use tokio::sync::Semaphore;

/// Runs batches of units concurrently, at most `limit` at a time.
///
/// `run_all` spawns one task per unit and returns only once every unit has
/// finished. There is no result channel: callers accumulate into their own
/// mutex-guarded containers. A unit that panics is logged and does not
/// abort its siblings.
#[derive(Clone)]
pub struct TaskRunner {
    permits: Arc<Semaphore>,
}

impl TaskRunner {
    pub fn new(limit: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limit.max(1))),
        }
    }

    /// Spawn every future and block until the slowest one completes.
    pub async fn run_all<F>(&self, tasks: Vec<F>)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut handles = Vec::with_capacity(tasks.len());

        for task in tasks {
            let permits = Arc::clone(&self.permits);
            handles.push(tokio::spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                task.await;
            }));
        }

        for result in future::join_all(handles).await {
            if let Err(e) = result {
                warn!("worker task aborted: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::Duration;

    #[tokio::test]
    async fn joins_every_unit() {
        let runner = TaskRunner::new(4);
        let completed = Arc::new(Mutex::new(0usize));

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let completed = Arc::clone(&completed);
            tasks.push(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                *completed.lock() += 1;
            });
        }

        runner.run_all(tasks).await;
        assert_eq!(*completed.lock(), 20);
    }

    #[tokio::test]
    async fn a_panicking_unit_does_not_poison_the_batch() {
        let runner = TaskRunner::new(2);
        let completed = Arc::new(Mutex::new(0usize));

        let counter = Arc::clone(&completed);
        let good = vec![
            async move {
                *counter.lock() += 1;
            },
        ];
        runner.run_all(good).await;

        let bad: Vec<_> = (0..3)
            .map(|i| {
                let completed = Arc::clone(&completed);
                async move {
                    if i == 1 {
                        panic!("boom");
                    }
                    *completed.lock() += 1;
                }
            })
            .collect();
        runner.run_all(bad).await;

        assert_eq!(*completed.lock(), 3);
    }

    #[tokio::test]
    async fn zero_limit_is_clamped() {
        let runner = TaskRunner::new(0);
        let done = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&done);
        runner
            .run_all(vec![async move {
                *flag.lock() = true;
            }])
            .await;
        assert!(*done.lock());
    }
}
