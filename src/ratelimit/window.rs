//! Multi-resolution sliding-window counter.
//!
//! A counter keeps `depth` FIFO queues of event timestamps. Level `i` holds
//! events no older than `2^i × interval`. When an event ages out of its level
//! it is folded into the first larger level whose window still covers it, and
//! dropped once it is older than the largest window. This bounds the number of
//! queues per session while still approximating a sliding window.

use std::collections::VecDeque;
use std::time::Duration;

/// Number of fold levels used when no depth is configured.
pub const DEFAULT_DEPTH: usize = 4;

/// Largest supported depth; `2^(depth-1)` must fit the capacity arithmetic.
pub const MAX_DEPTH: usize = 32;

/// Sliding-window event counter for a single (scope, session) pair.
///
/// Not synchronized on its own; the limiter wraps each counter in a mutex.
#[derive(Debug, Clone)]
pub struct SlidingWindow {
    /// Base interval covered by level 0
    interval: Duration,
    /// Events allowed per base interval
    max_events: u64,
    /// Timestamp queues, one per fold level, oldest entry at the front
    levels: Vec<VecDeque<Duration>>,
}

impl SlidingWindow {
    /// Create an empty counter.
    ///
    /// `depth` is clamped to `1..=MAX_DEPTH`.
    pub fn new(interval: Duration, max_events: u64, depth: usize) -> Self {
        let depth = depth.clamp(1, MAX_DEPTH);
        Self {
            interval,
            max_events,
            levels: vec![VecDeque::new(); depth],
        }
    }

    /// Record an event at `now` if capacity allows.
    ///
    /// Returns `true` when the event was accepted. A rejected event leaves the
    /// queues exactly as `adjust(now)` left them.
    pub fn add(&mut self, now: Duration) -> bool {
        self.adjust(now);
        if !self.is_accepted() {
            return false;
        }
        self.levels[0].push_back(now);
        true
    }

    /// Fold aged entries into larger levels and drop the ones that outlived
    /// every level.
    ///
    /// Levels are processed from the largest down so that anything folded into
    /// a larger level is newer than what that level already holds.
    pub fn adjust(&mut self, now: Duration) {
        let depth = self.levels.len();
        for level in (0..depth).rev() {
            let Some(cutoff) = now.checked_sub(self.span(level)) else {
                // Nothing can be older than a window reaching past the origin.
                continue;
            };

            while let Some(&oldest) = self.levels[level].front() {
                if oldest >= cutoff {
                    break;
                }
                self.levels[level].pop_front();

                let target = (level + 1..depth).find(|&j| self.covers(now, j, oldest));
                if let Some(target) = target {
                    self.levels[target].push_back(oldest);
                }
            }
        }
    }

    /// Check whether one more event fits.
    ///
    /// The running total over levels `0..=i` is compared against
    /// `max_events × 2^i`; the first level that reaches its bound rejects.
    pub fn is_accepted(&self) -> bool {
        let mut sum: u64 = 0;
        for (level, queue) in self.levels.iter().enumerate() {
            sum += queue.len() as u64;
            if sum >= self.level_capacity(level) {
                return false;
            }
        }
        true
    }

    /// True when no event is tracked at any level.
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(VecDeque::is_empty)
    }

    /// Total number of tracked events across all levels.
    pub fn len(&self) -> usize {
        self.levels.iter().map(VecDeque::len).sum()
    }

    /// Number of tracked events per level, smallest window first.
    pub fn level_lens(&self) -> Vec<usize> {
        self.levels.iter().map(VecDeque::len).collect()
    }

    /// Number of fold levels.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Ceiling on the total number of events the counter will hold.
    pub fn ceiling(&self) -> u64 {
        self.level_capacity(self.levels.len() - 1)
    }

    /// Length of the window covered by `level`.
    fn span(&self, level: usize) -> Duration {
        self.interval.saturating_mul(1u32 << level)
    }

    fn level_capacity(&self, level: usize) -> u64 {
        self.max_events.saturating_mul(1u64 << level)
    }

    fn covers(&self, now: Duration, level: usize, timestamp: Duration) -> bool {
        match now.checked_sub(self.span(level)) {
            Some(cutoff) => timestamp >= cutoff,
            None => true,
        }
    }
}
