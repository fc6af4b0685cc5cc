//! Bounded worker pool for independent insert/search calls

use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::error;

use super::error::PoolError;

/// Default number of concurrently running tasks
pub const DEFAULT_WORKERS: usize = 4;

/// Runs futures with at most `size` of them in flight
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::InvalidSize);
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Permits not currently held by a running task
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run every task and return their outputs in submission order
    pub async fn run_all<F, T>(&self, tasks: Vec<F>) -> Vec<Result<T, PoolError>>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let semaphore = Arc::clone(&self.semaphore);
                tokio::spawn(async move {
                    match semaphore.acquire_owned().await {
                        Ok(_permit) => Ok(task.await),
                        Err(e) => Err(PoolError::TaskFailed {
                            reason: e.to_string(),
                        }),
                    }
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("Worker task failed: {}", e);
                    Err(PoolError::TaskFailed {
                        reason: e.to_string(),
                    })
                }
            })
            .collect()
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(DEFAULT_WORKERS)),
            size: DEFAULT_WORKERS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_zero_size_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(PoolError::InvalidSize)));
        assert_eq!(WorkerPool::default().size(), DEFAULT_WORKERS);
    }

    #[tokio::test]
    async fn test_run_all_preserves_order_and_bounds_concurrency() {
        let pool = WorkerPool::new(2).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8u64)
            .map(|i| {
                let running = Arc::clone(&running);
                let peak = Arc::clone(&peak);
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10 * (8 - i))).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    i * 10
                }
            })
            .collect();

        let results = pool.run_all(tasks).await;
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40, 50, 60, 70]);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available(), 2);
    }

    async fn explode() -> u32 {
        panic!("boom")
    }

    #[tokio::test]
    async fn test_panicking_task_reported() {
        let pool = WorkerPool::new(1).unwrap();
        let tasks: Vec<std::pin::Pin<Box<dyn Future<Output = u32> + Send>>> = vec![
            Box::pin(async { 1 }),
            Box::pin(explode()),
            Box::pin(async { 3 }),
        ];
        let results = pool.run_all(tasks).await;
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert!(matches!(results[1], Err(PoolError::TaskFailed { .. })));
        assert_eq!(*results[2].as_ref().unwrap(), 3);
    }
}
