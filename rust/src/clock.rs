use std::sync::atomic::{AtomicU64, Ordering};

use souk_storage_traits::Timestamp;

/// Hands out strictly increasing send timestamps for one process.
///
/// Wall-clock time is used when it moves forward; otherwise the previous value plus one
/// millisecond, so two sends from the same session never share a `sent_at`.
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicU64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> Timestamp {
        self.next_after(Timestamp::now())
    }

    fn next_after(&self, now: Timestamp) -> Timestamp {
        let now = now.as_millis();
        let mut assigned = now;
        let _ = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                assigned = now.max(last.saturating_add(1));
                Some(assigned)
            });
        Timestamp::from_millis(assigned)
    }
}
