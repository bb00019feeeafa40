//! Scatter/gather over independent tasks
//!
//! Every task runs on its own tokio task inside a [`TaskScope`]. Leaving
//! the scope by any path (first result, timeout, error, or the caller's
//! future being dropped) aborts whatever is still running.

use std::future::Future;
use std::time::Duration;

use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;

use crate::error::{Result, TreeError};

/// JoinSet that cancels its outstanding tasks when dropped
#[derive(Debug)]
struct TaskScope<T: 'static> {
    label: &'static str,
    inner: JoinSet<T>,
}

impl<T> TaskScope<T>
where
    T: Send + 'static,
{
    fn new(label: &'static str) -> Self {
        Self {
            label,
            inner: JoinSet::new(),
        }
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    fn spawn<F>(&mut self, fut: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.inner.spawn(fut);
    }

    /// Next completion, or a timeout error once `deadline` passes
    async fn join_next_before(&mut self, deadline: Instant) -> Result<Option<T>> {
        match tokio::time::timeout_at(deadline, self.inner.join_next()).await {
            Ok(Some(Ok(value))) => Ok(Some(value)),
            Ok(Some(Err(e))) => Err(task_failure(e)),
            Ok(None) => Ok(None),
            Err(_) => Err(TreeError::Timeout(format!(
                "{}: {} task(s) still running at the deadline",
                self.label,
                self.len()
            ))),
        }
    }
}

impl<T: 'static> Drop for TaskScope<T> {
    fn drop(&mut self) {
        if !self.inner.is_empty() {
            tracing::trace!(
                scope = self.label,
                pending = self.inner.len(),
                "cancelling outstanding tasks"
            );
            self.inner.abort_all();
        }
    }
}

fn task_failure(error: JoinError) -> TreeError {
    if error.is_panic() {
        TreeError::TaskFailure(format!("task panicked: {}", error))
    } else {
        TreeError::TaskFailure(format!("task cancelled: {}", error))
    }
}

/// Return the first non-empty result; cancel the rest
///
/// `Ok(None)` when every task finished empty-handed. Fails with
/// [`TreeError::Timeout`] if nothing non-empty arrives within `timeout`.
pub async fn await_first<I, F, T>(tasks: I, timeout: Duration) -> Result<Option<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = Option<T>> + Send + 'static,
    T: Send + 'static,
{
    let deadline = Instant::now() + timeout;
    let mut scope = TaskScope::new("await_first");
    for task in tasks {
        scope.spawn(task);
    }

    while let Some(result) = scope.join_next_before(deadline).await? {
        if result.is_some() {
            return Ok(result);
        }
    }
    Ok(None)
}

/// Wait for every task; results come back in submission order
pub async fn await_all<I, F, T>(tasks: I, timeout: Duration) -> Result<Vec<T>>
where
    I: IntoIterator<Item = F>,
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let deadline = Instant::now() + timeout;
    let mut scope = TaskScope::new("await_all");
    let mut submitted = 0;
    for (index, task) in tasks.into_iter().enumerate() {
        scope.spawn(async move { (index, task.await) });
        submitted += 1;
    }

    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(submitted).collect();
    while let Some((index, value)) = scope.join_next_before(deadline).await? {
        slots[index] = Some(value);
    }
    Ok(slots.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Finished(Arc<AtomicUsize>);

    impl Drop for Finished {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_first_cancels_the_rest() {
        // Task 3 replies at once; the other four would outlive the deadline
        let dropped = Arc::new(AtomicUsize::new(0));
        let started = Instant::now();
        let tasks = (1..=5u64).map(|n| {
            let guard = Finished(dropped.clone());
            async move {
                let _guard = guard;
                if n == 3 {
                    return Some(n);
                }
                tokio::time::sleep(Duration::from_secs(60)).await;
                Some(n)
            }
        });

        let first = await_first(tasks, Duration::from_secs(10)).await.unwrap();
        assert_eq!(first, Some(3));
        assert!(started.elapsed() < Duration::from_secs(10));

        // The four sleepers were aborted, dropping their guards
        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) == 5 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_await_first_all_empty() {
        let tasks = (0..3).map(|_| async { None::<u8> });
        assert_eq!(await_first(tasks, Duration::from_secs(1)).await.unwrap(), None);

        let none: Vec<std::future::Ready<Option<u8>>> = Vec::new();
        assert_eq!(await_first(none, Duration::from_secs(1)).await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_first_times_out() {
        let tasks = vec![async {
            std::future::pending::<()>().await;
            Some(1)
        }];
        let result = await_first(tasks, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(TreeError::Timeout(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_all_keeps_submission_order() {
        let tasks = [30u64, 10, 20].into_iter().map(|delay| async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            delay
        });
        let results = await_all(tasks, Duration::from_secs(1)).await.unwrap();
        assert_eq!(results, vec![30, 10, 20]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_await_all_times_out_and_cancels() {
        let dropped = Arc::new(AtomicUsize::new(0));
        let tasks = [1u64, 60, 60].into_iter().map(|secs| {
            let guard = Finished(dropped.clone());
            async move {
                let _guard = guard;
                tokio::time::sleep(Duration::from_secs(secs)).await;
                secs
            }
        });

        let result = await_all(tasks, Duration::from_secs(10)).await;
        assert!(matches!(result, Err(TreeError::Timeout(_))));

        for _ in 0..100 {
            if dropped.load(Ordering::SeqCst) == 3 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(dropped.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_await_first_surfaces_panics() {
        let tasks = (0..2u64).map(|n| async move {
            if n == 0 {
                panic!("boom");
            }
            std::future::pending::<()>().await;
            Some(n)
        });
        let result = await_first(tasks, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(TreeError::TaskFailure(_))));
    }

    #[tokio::test]
    async fn test_await_all_surfaces_panics() {
        let tasks = (0..2).map(|n| async move {
            if n == 1 {
                panic!("boom");
            }
            n
        });
        let result = await_all(tasks, Duration::from_secs(1)).await;
        assert!(matches!(result, Err(TreeError::TaskFailure(_))));
    }
}
