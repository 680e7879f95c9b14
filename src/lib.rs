//! AI Pupil - teach a simulated student JavaScript and track what it remembers.

pub mod ai;
pub mod config;
pub mod display;
pub mod knowledge;
pub mod rate_limit;
pub mod server;
pub mod session;
pub mod store;
