use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::engine::scheduler::{Scheduler, TimerHandle};

/// Delayed, best-effort cache warming for the page after the one just read.
///
/// At most one prefetch per page number is pending at a time.
pub struct PrefetchScheduler {
    scheduler: Arc<dyn Scheduler>,
    delay: Duration,
    pending: Arc<Mutex<HashMap<u32, TimerHandle>>>,
}

impl PrefetchScheduler {
    pub fn new(scheduler: Arc<dyn Scheduler>, delay: Duration) -> Self {
        Self {
            scheduler,
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `fetch` for `page_number` after the prefetch delay. Returns false
    /// when that page already has a prefetch pending.
    pub fn schedule<F>(&self, page_number: u32, fetch: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.pending.lock();
        if pending.contains_key(&page_number) {
            return false;
        }

        let slots = self.pending.clone();
        let handle = self.scheduler.schedule(
            self.delay,
            Box::new(move || {
                slots.lock().remove(&page_number);
                fetch();
            }),
        );

        debug!(page = page_number, delay_ms = self.delay.as_millis() as u64, "prefetch scheduled");
        pending.insert(page_number, handle);
        true
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock();
        for (_, handle) in pending.drain() {
            handle.cancel();
        }
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scheduler::ManualScheduler;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn setup() -> (Arc<ManualScheduler>, PrefetchScheduler) {
        let scheduler = Arc::new(ManualScheduler::new());
        let prefetch = PrefetchScheduler::new(scheduler.clone(), Duration::from_secs(1));
        (scheduler, prefetch)
    }

    #[test]
    fn runs_after_delay_only() {
        let (clock, prefetch) = setup();
        let hits = Arc::new(AtomicU32::new(0));

        let h = hits.clone();
        assert!(prefetch.schedule(4, move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));

        clock.advance(Duration::from_millis(999));
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        clock.advance(Duration::from_millis(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(prefetch.pending_count(), 0);
    }

    #[test]
    fn duplicate_page_is_not_scheduled_twice() {
        let (clock, prefetch) = setup();
        let hits = Arc::new(AtomicU32::new(0));

        for _ in 0..3 {
            let h = hits.clone();
            prefetch.schedule(4, move || {
                h.fetch_add(1, Ordering::SeqCst);
            });
        }

        clock.advance(Duration::from_secs(2));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancel_all_stops_pending_work() {
        let (clock, prefetch) = setup();
        let hits = Arc::new(AtomicU32::new(0));

        let h = hits.clone();
        prefetch.schedule(2, move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        prefetch.cancel_all();

        clock.advance(Duration::from_secs(2));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(prefetch.pending_count(), 0);
    }
}
