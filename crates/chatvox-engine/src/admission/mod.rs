//! Admission control: permission checks and per-user rate limits.

mod permission;
mod rate_limit;

pub use permission::{GateDecision, GatePolicy, PermissionGate, evaluate};
pub use rate_limit::{Admission, RateLimitConfig, RateLimiter};
