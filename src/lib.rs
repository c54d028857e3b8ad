//! Ratefold - In-Process Sliding-Window Rate Limiting
//!
//! This crate implements an approximate, per-session rate limiter. Events are
//! tracked in multi-resolution sliding windows whose aged entries fold into
//! exponentially larger windows, and idle sessions are evicted by an amortized
//! sweep.
//!
//! ```
//! use std::time::Duration;
//! use ratefold::ratelimit::RateLimiter;
//!
//! let limiter = RateLimiter::new();
//! limiter.set_restriction("login", Duration::from_secs(60), 5);
//!
//! for _ in 0..5 {
//!     assert!(limiter.add_event("login", "alice").unwrap());
//! }
//! assert!(!limiter.add_event("login", "alice").unwrap());
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod ratelimit;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{RateFoldError, Result};
pub use ratelimit::RateLimiter;
