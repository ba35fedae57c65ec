//! Generation numbering for catalog writes.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of generation numbers.
///
/// Every call returns a value strictly greater than any value previously
/// returned by the same source, even for back-to-back calls within one
/// clock tick or under a clock that steps backwards.
pub trait GenerationSource: Send + Sync {
    /// Returns the next generation number.
    fn next(&self) -> i64;
}

/// The default generation source.
///
/// Returns wall-clock nanoseconds since the UNIX epoch, bumped past the
/// last issued value whenever the clock has not advanced.
#[derive(Debug, Default)]
pub struct MonotonicGenerations {
    last: AtomicI64,
}

impl MonotonicGenerations {
    /// Creates a new source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn wall_clock_nanos() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }
}

impl GenerationSource for MonotonicGenerations {
    fn next(&self) -> i64 {
        let now = Self::wall_clock_nanos();
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self.last.compare_exchange_weak(
                prev,
                candidate,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn strictly_increasing_across_rapid_calls() {
        let generations = MonotonicGenerations::new();
        let mut prev = generations.next();
        for _ in 0..10_000 {
            let next = generations.next();
            assert!(next > prev, "generations must strictly increase");
            prev = next;
        }
    }

    #[test]
    fn unique_across_threads() {
        let generations = Arc::new(MonotonicGenerations::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let generations = Arc::clone(&generations);
            handles.push(thread::spawn(move || {
                (0..500).map(|_| generations.next()).collect::<Vec<_>>()
            }));
        }

        let mut all: Vec<i64> = Vec::new();
        for handle in handles {
            all.extend(handle.join().unwrap());
        }

        let len = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), len, "generations must be unique across threads");
    }
}
