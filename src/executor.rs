use futures::StreamExt;
use futures::stream;
use std::future::Future;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub succeeded: usize,
    pub failed: usize,
}

/// Runs one async unit of work per item with at most `limit` in flight.
///
/// A failing item is handed to the error handler and does not stop the
/// remaining items. Completion order is not submission order.
#[derive(Debug, Clone, Copy)]
pub struct BoundedExecutor {
    limit: usize,
}

impl BoundedExecutor {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub async fn run<I, T, F, Fut, H>(&self, items: I, work: F, mut on_error: H) -> ExecutionSummary
    where
        I: IntoIterator<Item = T>,
        T: Clone,
        F: Fn(T) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
        H: FnMut(T, anyhow::Error),
    {
        let mut summary = ExecutionSummary::default();

        let mut results = stream::iter(items)
            .map(|item| {
                let fut = work(item.clone());
                async move { (item, fut.await) }
            })
            .buffer_unordered(self.limit);

        while let Some((item, result)) = results.next().await {
            match result {
                Ok(()) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    on_error(item, e);
                }
            }
        }

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn never_exceeds_limit() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let summary = BoundedExecutor::new(3)
            .run(
                0..20u64,
                |_| {
                    let in_flight = in_flight.clone();
                    let peak = peak.clone();
                    async move {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        anyhow::Ok(())
                    }
                },
                |_, _| {},
            )
            .await;

        assert_eq!(summary.succeeded, 20);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let mut failed_items = Vec::new();

        let summary = BoundedExecutor::new(2)
            .run(
                vec![1u64, 2, 3, 4],
                |n| async move {
                    if n == 2 {
                        anyhow::bail!("block {n} is malformed");
                    }
                    anyhow::Ok(())
                },
                |n, e| failed_items.push((n, e.to_string())),
            )
            .await;

        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        assert_eq!(failed_items, vec![(2, "block 2 is malformed".to_string())]);
    }

    #[test]
    fn zero_limit_is_clamped() {
        assert_eq!(BoundedExecutor::new(0).limit(), 1);
    }
}
