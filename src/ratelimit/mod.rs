//! Rate limiting logic and state management.

mod key;
mod limiter;
mod restriction;
mod sweep;
mod window;

pub use key::CounterKey;
pub use limiter::RateLimiter;
pub use restriction::{
    parse_interval, IntervalSpec, Restriction, RestrictionRule, RestrictionSet, TimeUnit,
};
pub use sweep::{SweepStats, SweepTrigger};
pub use window::{SlidingWindow, DEFAULT_DEPTH, MAX_DEPTH};
