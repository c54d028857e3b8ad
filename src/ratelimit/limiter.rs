//! Core rate limiter implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use super::key::CounterKey;
use super::restriction::{Restriction, RestrictionRegistry, RestrictionSet};
use super::sweep::{SweepStats, SweepTrigger};
use super::window::SlidingWindow;
use crate::clock::{Clock, MonotonicClock};
use crate::config::LimiterConfig;
use crate::error::{RateFoldError, Result};

type SharedWindow = Arc<Mutex<SlidingWindow>>;

/// Approximate per-session rate limiter.
///
/// Each scope carries one [`Restriction`]; each (scope, session) pair gets its
/// own [`SlidingWindow`], created on first use and evicted by the periodic
/// sweep once it no longer tracks any event.
///
/// This struct is thread-safe and can be shared across threads.
pub struct RateLimiter<C: Clock = MonotonicClock> {
    config: LimiterConfig,
    restrictions: RestrictionRegistry,
    /// Sliding-window counters indexed by (scope, session)
    counters: DashMap<CounterKey, SharedWindow>,
    /// Held shared while recording events, exclusively while sweeping
    sweep_gate: RwLock<()>,
    trigger: SweepTrigger,
    clock: C,
}

impl RateLimiter<MonotonicClock> {
    /// Create a rate limiter with default settings and the monotonic clock.
    pub fn new() -> Self {
        Self::build(LimiterConfig::default(), MonotonicClock::new())
    }
}

impl Default for RateLimiter<MonotonicClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RateLimiter<C> {
    /// Create a rate limiter from a validated configuration.
    pub fn with_config(config: LimiterConfig, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, clock))
    }

    /// Create a rate limiter and register every restriction in `set`.
    pub fn with_restrictions(config: LimiterConfig, set: &RestrictionSet, clock: C) -> Result<Self> {
        let limiter = Self::with_config(config, clock)?;
        limiter.load_restrictions(set)?;
        Ok(limiter)
    }

    fn build(config: LimiterConfig, clock: C) -> Self {
        Self {
            config,
            restrictions: RestrictionRegistry::new(),
            counters: DashMap::new(),
            sweep_gate: RwLock::new(()),
            trigger: SweepTrigger::new(),
            clock,
        }
    }

    /// Register or overwrite the restriction for `scope`.
    ///
    /// Counters that already exist keep the parameters they were created with
    /// until they are evicted.
    pub fn set_restriction(&self, scope: &str, interval: Duration, max_events: u64) {
        debug!(
            scope = %scope,
            interval = ?interval,
            max_events = max_events,
            "Setting restriction"
        );
        self.restrictions
            .set(scope, Restriction::new(interval, max_events));
    }

    /// Register every restriction in `set`. Nothing is registered if any rule
    /// is invalid.
    pub fn load_restrictions(&self, set: &RestrictionSet) -> Result<usize> {
        let resolved = set.resolve()?;
        for (scope, restriction) in &resolved {
            self.set_restriction(scope, restriction.interval, restriction.max_events);
        }
        info!(
            count = resolved.len(),
            scopes = self.restrictions.len(),
            "Restrictions loaded"
        );
        Ok(resolved.len())
    }

    /// Look up the restriction for `scope`.
    pub fn restriction(&self, scope: &str) -> Option<Restriction> {
        self.restrictions.get(scope)
    }

    /// Record one event for `session` under `scope`.
    ///
    /// Returns `Ok(true)` if the event was accepted and `Ok(false)` if the
    /// session is over its limit. Fails only when `scope` has no restriction.
    pub fn add_event(&self, scope: &str, session: &str) -> Result<bool> {
        if self.trigger.tick() {
            self.sweep();
        }

        let restriction = self
            .restrictions
            .get(scope)
            .ok_or_else(|| RateFoldError::UnconfiguredScope(scope.to_string()))?;

        let key = CounterKey::new(scope, session);
        trace!(key = %key, "Recording event");

        let accepted = {
            let _gate = self.sweep_gate.read();
            let counter = self.counter_for(&key, restriction);
            let mut window = counter.lock();
            window.add(self.clock.now())
        };

        if !accepted {
            info!(
                key = %key,
                max_events = restriction.max_events,
                interval = ?restriction.interval,
                "Rate limit exceeded"
            );
        }
        Ok(accepted)
    }

    /// Get the counter for `key`, installing a new one if none exists.
    fn counter_for(&self, key: &CounterKey, restriction: Restriction) -> SharedWindow {
        if let Some(existing) = self.counters.get(key) {
            return Arc::clone(existing.value());
        }

        match self.counters.entry(key.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                debug!(
                    key = %key,
                    max_events = restriction.max_events,
                    interval = ?restriction.interval,
                    depth = self.config.depth,
                    "Creating new sliding-window counter"
                );
                self.trigger.record_created();
                let window = SlidingWindow::new(
                    restriction.interval,
                    restriction.max_events,
                    self.config.depth,
                );
                let inserted = entry.insert(Arc::new(Mutex::new(window)));
                Arc::clone(inserted.value())
            }
        }
    }

    /// Age every counter and evict the ones left empty.
    ///
    /// Runs automatically from [`add_event`](Self::add_event); calling it
    /// directly forces a sweep. Event recording pauses while it runs.
    pub fn sweep(&self) -> SweepStats {
        let _gate = self.sweep_gate.write();
        let now = self.clock.now();

        let mut stats = SweepStats::default();
        self.counters.retain(|_, counter| {
            stats.scanned += 1;
            let mut window = counter.lock();
            window.adjust(now);
            let keep = !window.is_empty();
            if !keep {
                stats.evicted += 1;
            }
            keep
        });

        debug!(
            scanned = stats.scanned,
            evicted = stats.evicted,
            remaining = self.counters.len(),
            "Swept idle counters"
        );
        stats
    }

    /// Number of events currently tracked for a session, as of its last
    /// adjustment.
    ///
    /// Returns `None` if no counter exists for the pair.
    pub fn event_count(&self, scope: &str, session: &str) -> Option<usize> {
        let key = CounterKey::new(scope, session);
        self.counters.get(&key).map(|c| c.value().lock().len())
    }

    /// Get the number of active counters.
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Drop all counters. Restrictions are kept.
    pub fn clear(&self) {
        let _gate = self.sweep_gate.write();
        self.counters.clear();
        self.trigger.reset();
    }

    /// Number of fold levels per counter.
    pub fn depth(&self) -> usize {
        self.config.depth
    }

    /// The clock driving this limiter.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}
