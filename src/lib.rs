//! Tollgate - Client-Side Quota Admission Control
//!
//! This crate wraps an exchange API client and keeps its caller inside the
//! exchange's published rate quotas. Each operation is priced by weight and
//! admitted through sliding-window budgets for request weight, order rate
//! and daily order count, waiting rather than failing when a budget is
//! spent.

pub mod config;
pub mod error;
pub mod ratelimit;

pub use ratelimit::{ApiClient, RateLimitedClient};
