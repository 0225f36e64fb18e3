#[cfg(test)]
mod tests;

use std::{
    sync::atomic::{AtomicU32, AtomicU64, Ordering::Relaxed},
    time::{Duration, Instant},
};

/// A lock-free message rate limiter that can be consulted from interrupt context.
///
/// At most `burst` messages are allowed per `interval`. Suppressed messages are counted and
/// reported to the first caller of the next window.
pub struct RateLimit {
    base: Instant,
    interval_ms: u64,
    burst: u32,
    window: AtomicU64,
    printed: AtomicU32,
    missed: AtomicU32,
}

impl RateLimit {
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            base: Instant::now(),
            interval_ms: interval.as_millis() as u64,
            burst,
            window: AtomicU64::new(0),
            printed: AtomicU32::new(0),
            missed: AtomicU32::new(0),
        }
    }

    /// Returns `Some(missed)` if a message may be emitted now.
    pub fn check(&self) -> Option<u32> {
        let now = self.base.elapsed().as_millis() as u64;
        let window = self.window.load(Relaxed);
        if now.saturating_sub(window) >= self.interval_ms
            && self
                .window
                .compare_exchange(window, now, Relaxed, Relaxed)
                .is_ok()
        {
            self.printed.store(0, Relaxed);
        }
        if self.printed.fetch_add(1, Relaxed) < self.burst {
            Some(self.missed.swap(0, Relaxed))
        } else {
            self.missed.fetch_add(1, Relaxed);
            None
        }
    }
}
