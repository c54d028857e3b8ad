//! Amortized sweep scheduling.
//!
//! Sweeping scans every counter, so it only runs once the number of events
//! recorded since the last sweep exceeds twice the number of counters created
//! so far. Evictions do not lower that count; only `clear` resets it.

use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Counters inspected
    pub scanned: usize,
    /// Counters removed because they no longer track any event
    pub evicted: usize,
}

/// Decides when the limiter should sweep.
#[derive(Debug, Default)]
pub struct SweepTrigger {
    /// Events recorded since the last sweep
    ticks: AtomicU64,
    /// Counters created since the limiter was built or last cleared
    created: AtomicU64,
}

impl SweepTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event and report whether the caller should sweep now.
    ///
    /// At most one of several racing callers gets `true` for a given batch of
    /// ticks: the one that resets the tick count.
    pub fn tick(&self) -> bool {
        let ticks = self.ticks.fetch_add(1, Ordering::AcqRel) + 1;
        let created = self.created.load(Ordering::Acquire);
        if created.saturating_mul(2) >= ticks {
            return false;
        }

        let claimed = self.ticks.swap(0, Ordering::AcqRel);
        created.saturating_mul(2) < claimed
    }

    /// A new counter was installed.
    pub fn record_created(&self) {
        self.created.fetch_add(1, Ordering::AcqRel);
    }

    /// Forget every counter and tick.
    pub fn reset(&self) {
        self.ticks.store(0, Ordering::Release);
        self.created.store(0, Ordering::Release);
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_with_no_counters_sweeps() {
        let trigger = SweepTrigger::new();
        assert!(trigger.tick());
        assert_eq!(trigger.ticks(), 0);
    }

    #[test]
    fn test_sweeps_once_ticks_exceed_twice_created() {
        let trigger = SweepTrigger::new();
        trigger.record_created();
        trigger.record_created();

        // 2 × 2 created counters: ticks 1..=4 do not sweep, tick 5 does
        for _ in 0..4 {
            assert!(!trigger.tick());
        }
        assert!(trigger.tick());
        assert_eq!(trigger.ticks(), 0);

        // The count starts over after a sweep
        assert!(!trigger.tick());
        assert_eq!(trigger.ticks(), 1);
    }

    #[test]
    fn test_created_count_is_monotonic() {
        let trigger = SweepTrigger::new();
        for _ in 0..3 {
            trigger.record_created();
        }

        // Evictions are not reported, so the threshold stays at 2 × 3
        for _ in 0..6 {
            assert!(!trigger.tick());
        }
        assert!(trigger.tick());
        assert_eq!(trigger.created(), 3);

        for _ in 0..6 {
            assert!(!trigger.tick());
        }
        assert!(trigger.tick());
    }

    #[test]
    fn test_reset() {
        let trigger = SweepTrigger::new();
        trigger.record_created();
        trigger.tick();
        trigger.reset();
        assert_eq!(trigger.created(), 0);
        assert_eq!(trigger.ticks(), 0);
    }
}
