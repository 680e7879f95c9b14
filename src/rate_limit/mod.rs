//! Per-key request limiting for teaching turns.

mod limiter;
mod store;

pub use limiter::{RateLimitCheck, RateLimiter};
pub use store::{InMemoryRateLimitStore, RateLimitStore, WindowState};
