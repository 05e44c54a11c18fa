//! Quota classification, resolution and enforcement.

mod client;
mod clock;
mod limiter;
mod rules;
mod weights;
mod window;

pub use client::ApiClient;
#[cfg(any(test, feature = "test-helpers"))]
pub use clock::ManualClock;
pub use clock::{Clock, Sleeper, SystemClock, TokioSleeper};
pub use limiter::RateLimitedClient;
pub use rules::{
    IntervalUnit, LimitPolicies, QuotaDescriptor, QuotaDescriptors, QuotaPolicy, RateLimitType,
};
pub use weights::{Operation, OperationTable};
pub use window::{AdmissionWindow, WindowKind};
