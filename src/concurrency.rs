//! The three bounded pools from the concurrency model, plus an
//! order-preserving fan-out primitive built on them.
//!
//! Every fan-out in the orchestrator (per-chunk transcription, per-frame
//! gatekeeping, per-cluster hero description, per-cluster upload) goes
//! through [`fan_out_ordered`]: it builds one future per input item, gates
//! each behind a semaphore permit, and joins them with `join_all`, which
//! returns results aligned to input order regardless of completion order.
//! There is no "sort by completion, `inf` on exception" step to reproduce:
//! per-item failures degrade to a placeholder value *inside* the caller's
//! closure (see `orchestrator.rs`), so the join itself never has to think
//! about exceptions (Open Question 1 in DESIGN.md).

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Semaphore;

use crate::config::Config;

/// The three named semaphores from the concurrency model. Process-wide in
/// spirit; in practice one per `Orchestrator`, shared across jobs it runs
/// sequentially.
#[derive(Clone)]
pub struct Pools {
    pub transcribe: Arc<Semaphore>,
    pub vision: Arc<Semaphore>,
    pub upload: Arc<Semaphore>,
}

impl Pools {
    pub fn new(config: &Config) -> Self {
        Self {
            transcribe: Arc::new(Semaphore::new(config.max_concurrent_transcribes.max(1))),
            vision: Arc::new(Semaphore::new(config.max_concurrent_vision_tasks.max(1))),
            upload: Arc::new(Semaphore::new(config.max_concurrent_uploads.max(1))),
        }
    }
}

/// Run `f` over every item in `items` under `semaphore`'s permit cap,
/// returning results in input order.
///
/// `f` takes the item's index alongside the item itself so callers can
/// label placeholders (e.g. "frame 3 failed") without threading an
/// out-of-band index through their own closures.
pub async fn fan_out_ordered<T, R, F, Fut>(items: Vec<T>, semaphore: &Arc<Semaphore>, f: F) -> Vec<R>
where
    F: Fn(usize, T) -> Fut,
    Fut: Future<Output = R>,
{
    let futures = items.into_iter().enumerate().map(|(idx, item)| {
        let sem = Arc::clone(semaphore);
        let item_fut = f(idx, item);
        async move {
            let _permit = sem.acquire().await.expect("semaphore never closes");
            item_fut.await
        }
    });
    join_all(futures).await
}

/// Cooperative cancellation flag checked between orchestrator stages.
///
/// Not a `CancellationToken`: the orchestrator only needs a poll point
/// between stages, never mid-stage preemption, so a shared flag is enough.
#[derive(Clone, Default)]
pub struct Cancellation(Arc<std::sync::atomic::AtomicBool>);

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fan_out_ordered_preserves_input_order_under_random_delays() {
        let semaphore = Arc::new(Semaphore::new(3));
        let items: Vec<u32> = (0..10).collect();
        let results = fan_out_ordered(items, &semaphore, |idx, item| async move {
            // Inverse delay: later items finish first, order must still hold.
            let delay_ms = 10 - (idx as u64 % 10);
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            item * 2
        })
        .await;
        assert_eq!(results, vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 18]);
    }

    #[tokio::test]
    async fn fan_out_ordered_respects_semaphore_cap() {
        let semaphore = Arc::new(Semaphore::new(2));
        let in_flight = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let max_seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let items: Vec<u32> = (0..8).collect();
        let in_flight_c = in_flight.clone();
        let max_seen_c = max_seen.clone();
        let _ = fan_out_ordered(items, &semaphore, move |_idx, item| {
            let in_flight = in_flight_c.clone();
            let max_seen = max_seen_c.clone();
            async move {
                let now = in_flight.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
                item
            }
        })
        .await;

        assert!(max_seen.load(std::sync::atomic::Ordering::SeqCst) <= 2);
    }

    #[test]
    fn cancellation_starts_uncancelled() {
        let c = Cancellation::new();
        assert!(!c.is_cancelled());
        c.cancel();
        assert!(c.is_cancelled());
    }
}
