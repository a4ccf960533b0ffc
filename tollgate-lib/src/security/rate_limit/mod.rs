//! Per-client fixed-window rate limiting by route class.
//!
//! - [`ClassResolver`] maps a request path to a [`RouteClass`] by longest prefix.
//! - [`FixedWindowLimiter`] counts requests per client IP within one class window.
//! - [`RateLimitManager`] combines both with the memory pressure signal, the
//!   privileged-caller exemption and the block list, and records every decision
//!   in the analytics store.

mod class;
mod limiter;
mod manager;

pub use class::{path_is_endpoint, path_matches, ClassResolver, RouteClass};
pub use limiter::{FixedWindowLimiter, RateLimitResult};
pub use manager::{extract_client_ip, EffectiveLimit, RateDecision, RateLimitManager, RequestMeta};
