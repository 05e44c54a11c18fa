//! Quota descriptors and limit policy resolution.
//!
//! The remote service publishes its quotas as a list of descriptors shaped
//! like `{rateLimitType, limit, interval, intervalNum}`. This module turns
//! such a list into the three policies the limiter enforces, shaving a
//! safety margin off every published limit.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, TollgateError};

/// Fraction of the published request-weight limit we allow ourselves.
pub const REQUEST_WEIGHT_MARGIN: f64 = 0.95;
/// Fraction of the published per-second order limit we allow ourselves.
pub const ORDER_RATE_MARGIN: f64 = 0.90;
/// Fraction of the published daily order limit we allow ourselves.
pub const ORDER_DAILY_MARGIN: f64 = 0.98;

/// Limit used by every policy when nothing better is known.
const DEFAULT_LIMIT: u64 = 10;
const DEFAULT_REQUEST_WEIGHT_INTERVAL: u64 = 60;
const DEFAULT_ORDER_RATE_INTERVAL: u64 = 10;
const DEFAULT_ORDER_DAILY_INTERVAL: u64 = 10;

/// Kind of quota a descriptor describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateLimitType {
    RequestWeight,
    Orders,
    /// Anything else the service publishes (e.g. raw request counts).
    #[serde(other)]
    Other,
}

/// Unit of a descriptor's interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntervalUnit {
    Second,
    Minute,
    Day,
    /// Missing or unrecognised units are treated as minutes.
    #[default]
    #[serde(other)]
    Other,
}

/// Accept any value for a unit, mapping non-strings to [`IntervalUnit::Other`].
fn lenient_unit<'de, D>(deserializer: D) -> std::result::Result<IntervalUnit, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

impl IntervalUnit {
    /// Length of one unit in seconds.
    pub fn seconds(&self) -> u64 {
        match self {
            IntervalUnit::Second => 1,
            IntervalUnit::Minute => 60,
            IntervalUnit::Day => 86_400,
            IntervalUnit::Other => 60,
        }
    }
}

/// A quota as published by the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDescriptor {
    /// What the quota counts
    pub rate_limit_type: RateLimitType,
    /// Raw published limit
    pub limit: u64,
    /// Interval unit
    #[serde(default, deserialize_with = "lenient_unit")]
    pub interval: IntervalUnit,
    /// Number of units in the interval
    #[serde(default = "default_interval_num")]
    pub interval_num: u64,
}

fn default_interval_num() -> u64 {
    1
}

impl QuotaDescriptor {
    /// Interval length in seconds (`unit × intervalNum`).
    pub fn interval_secs(&self) -> u64 {
        self.interval.seconds().saturating_mul(self.interval_num)
    }
}

/// Loaders for standalone descriptor files.
pub struct QuotaDescriptors;

impl QuotaDescriptors {
    /// Load a raw descriptor payload from a JSON or YAML file.
    ///
    /// The payload is returned untyped so it can go through the same
    /// tolerant resolution as a remote response.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Value> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading quota descriptors");

        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse a raw descriptor payload from JSON or YAML text.
    pub fn parse(contents: &str) -> Result<Value> {
        // YAML is a superset of JSON, so one parser covers both formats.
        serde_yaml::from_str(contents)
            .map_err(|e| TollgateError::Parse(format!("Failed to parse quota descriptors: {}", e)))
    }
}

/// A resolved budget: at most `limit` cost units per `interval_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaPolicy {
    /// Maximum cost permitted within the interval
    pub limit: u64,
    /// Interval length in seconds
    pub interval_secs: u64,
}

impl QuotaPolicy {
    /// Create a new policy.
    pub fn new(limit: u64, interval_secs: u64) -> Self {
        Self {
            limit,
            interval_secs,
        }
    }

    /// Interval as a `Duration`.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

/// The three policies enforced by the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitPolicies {
    /// Budget on total request weight
    pub request_weight: QuotaPolicy,
    /// Short-interval budget on order operations
    pub order_rate: QuotaPolicy,
    /// Daily budget on order operations
    pub order_daily: QuotaPolicy,
}

impl Default for LimitPolicies {
    /// Conservative stand-ins, not meant for production traffic.
    fn default() -> Self {
        Self {
            request_weight: QuotaPolicy::new(DEFAULT_LIMIT, DEFAULT_REQUEST_WEIGHT_INTERVAL),
            order_rate: QuotaPolicy::new(DEFAULT_LIMIT, DEFAULT_ORDER_RATE_INTERVAL),
            order_daily: QuotaPolicy::new(DEFAULT_LIMIT, DEFAULT_ORDER_DAILY_INTERVAL),
        }
    }
}

fn with_margin(limit: u64, margin: f64) -> u64 {
    (limit as f64 * margin).round() as u64
}

impl LimitPolicies {
    /// Resolve policies from a raw descriptor payload.
    ///
    /// Never fails. A payload that is not a list, or that contains no
    /// usable descriptor, leaves the defaults in place and logs a warning.
    /// Individual entries that don't deserialize are skipped.
    pub fn resolve(payload: &Value) -> Self {
        let Some(entries) = payload.as_array() else {
            warn!(
                payload = %payload,
                "Quota descriptors are not a list, using default limits"
            );
            return Self::default();
        };

        let descriptors: Vec<QuotaDescriptor> = entries
            .iter()
            .filter_map(|entry| match serde_json::from_value(entry.clone()) {
                Ok(descriptor) => Some(descriptor),
                Err(e) => {
                    debug!(entry = %entry, error = %e, "Skipping malformed quota descriptor");
                    None
                }
            })
            .collect();

        Self::from_descriptors(&descriptors)
    }

    /// Resolve policies from already-typed descriptors.
    ///
    /// Descriptors that don't match a known shape are ignored. Later
    /// descriptors for the same policy override earlier ones.
    pub fn from_descriptors(descriptors: &[QuotaDescriptor]) -> Self {
        let mut policies = Self::default();
        let mut matched = 0usize;

        for descriptor in descriptors {
            let interval = descriptor.interval_secs();
            match (descriptor.rate_limit_type, descriptor.interval) {
                (RateLimitType::RequestWeight, _) => {
                    policies.request_weight = QuotaPolicy::new(
                        with_margin(descriptor.limit, REQUEST_WEIGHT_MARGIN),
                        interval,
                    );
                }
                (RateLimitType::Orders, IntervalUnit::Second) => {
                    policies.order_rate = QuotaPolicy::new(
                        with_margin(descriptor.limit, ORDER_RATE_MARGIN),
                        interval,
                    );
                }
                (RateLimitType::Orders, IntervalUnit::Day) => {
                    policies.order_daily = QuotaPolicy::new(
                        with_margin(descriptor.limit, ORDER_DAILY_MARGIN),
                        interval,
                    );
                }
                _ => {
                    debug!(descriptor = ?descriptor, "Ignoring unsupported quota descriptor");
                    continue;
                }
            }
            matched += 1;
        }

        if matched == 0 {
            warn!("No usable quota descriptors, using default limits");
        } else {
            debug!(
                request_weight = ?policies.request_weight,
                order_rate = ?policies.order_rate,
                order_daily = ?policies.order_daily,
                "Resolved quota policies"
            );
        }

        policies
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_request_weight() {
        let payload = json!([
            {"rateLimitType": "REQUEST_WEIGHT", "limit": 1200, "interval": "MINUTE", "intervalNum": 1}
        ]);
        let policies = LimitPolicies::resolve(&payload);
        assert_eq!(policies.request_weight, QuotaPolicy::new(1140, 60));
        // Untouched policies keep their defaults.
        assert_eq!(policies.order_rate, LimitPolicies::default().order_rate);
        assert_eq!(policies.order_daily, LimitPolicies::default().order_daily);
    }

    #[test]
    fn test_resolve_order_daily() {
        let payload = json!([
            {"rateLimitType": "ORDERS", "limit": 100, "interval": "DAY", "intervalNum": 1}
        ]);
        let policies = LimitPolicies::resolve(&payload);
        assert_eq!(policies.order_daily, QuotaPolicy::new(98, 86_400));
        assert_eq!(policies.order_daily.interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_resolve_full_exchange_payload() {
        let payload = json!([
            {"rateLimitType": "REQUEST_WEIGHT", "interval": "MINUTE", "intervalNum": 1, "limit": 6000},
            {"rateLimitType": "ORDERS", "interval": "SECOND", "intervalNum": 10, "limit": 100},
            {"rateLimitType": "ORDERS", "interval": "DAY", "intervalNum": 1, "limit": 200000},
            {"rateLimitType": "RAW_REQUESTS", "interval": "MINUTE", "intervalNum": 5, "limit": 61000}
        ]);
        let policies = LimitPolicies::resolve(&payload);
        assert_eq!(policies.request_weight, QuotaPolicy::new(5700, 60));
        assert_eq!(policies.order_rate, QuotaPolicy::new(90, 10));
        assert_eq!(policies.order_daily, QuotaPolicy::new(196_000, 86_400));
    }

    #[test]
    fn test_orders_per_minute_is_ignored() {
        let payload = json!([
            {"rateLimitType": "ORDERS", "limit": 50, "interval": "MINUTE", "intervalNum": 1}
        ]);
        assert_eq!(LimitPolicies::resolve(&payload), LimitPolicies::default());
    }

    #[test]
    fn test_unknown_unit_counts_as_minute() {
        let payload = json!([
            {"rateLimitType": "REQUEST_WEIGHT", "limit": 100, "interval": "HOUR", "intervalNum": 2}
        ]);
        let policies = LimitPolicies::resolve(&payload);
        assert_eq!(policies.request_weight, QuotaPolicy::new(95, 120));
    }

    #[test]
    fn test_missing_interval_counts_as_minute() {
        let payload = json!([
            {"rateLimitType": "REQUEST_WEIGHT", "limit": 1200, "intervalNum": 1},
            {"rateLimitType": "ORDERS", "limit": 100, "interval": null},
            {"rateLimitType": "RAW_REQUESTS", "limit": 5, "interval": 7}
        ]);
        let policies = LimitPolicies::resolve(&payload);
        assert_eq!(policies.request_weight, QuotaPolicy::new(1140, 60));
        // A unit-less ORDERS quota is neither per-second nor daily.
        assert_eq!(policies.order_rate, LimitPolicies::default().order_rate);
        assert_eq!(policies.order_daily, LimitPolicies::default().order_daily);

        let descriptor: QuotaDescriptor =
            serde_json::from_value(json!({"rateLimitType": "ORDERS", "limit": 1, "interval": 3}))
                .unwrap();
        assert_eq!(descriptor.interval, IntervalUnit::Other);
        assert_eq!(descriptor.interval_secs(), 60);
    }

    #[test]
    fn test_non_list_falls_back_to_defaults() {
        for payload in [json!(null), json!({"code": -1003}), json!("oops"), json!([])] {
            let policies = LimitPolicies::resolve(&payload);
            assert_eq!(policies, LimitPolicies::default());
        }
    }

    #[test]
    fn test_malformed_entries_are_skipped() {
        let payload = json!([
            {"rateLimitType": "REQUEST_WEIGHT", "limit": "lots"},
            42,
            {"rateLimitType": "ORDERS", "limit": 10, "interval": "SECOND", "intervalNum": 1}
        ]);
        let policies = LimitPolicies::resolve(&payload);
        assert_eq!(policies.request_weight, LimitPolicies::default().request_weight);
        assert_eq!(policies.order_rate, QuotaPolicy::new(9, 1));
    }

    #[test]
    fn test_defaults() {
        let policies = LimitPolicies::default();
        assert_eq!(policies.request_weight, QuotaPolicy::new(10, 60));
        assert_eq!(policies.order_rate, QuotaPolicy::new(10, 10));
        assert_eq!(policies.order_daily, QuotaPolicy::new(10, 10));
    }

    #[test]
    fn test_descriptors_from_yaml_and_json() {
        let yaml = r#"
- rateLimitType: REQUEST_WEIGHT
  limit: 1200
  interval: MINUTE
  intervalNum: 1
"#;
        let payload = QuotaDescriptors::parse(yaml).unwrap();
        assert_eq!(
            LimitPolicies::resolve(&payload).request_weight,
            QuotaPolicy::new(1140, 60)
        );

        let json_text = r#"[{"rateLimitType":"ORDERS","limit":100,"interval":"DAY","intervalNum":1}]"#;
        let payload = QuotaDescriptors::parse(json_text).unwrap();
        assert_eq!(
            LimitPolicies::resolve(&payload).order_daily,
            QuotaPolicy::new(98, 86_400)
        );
    }

    #[test]
    fn test_descriptors_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("limits.json");
        std::fs::write(
            &path,
            r#"[{"rateLimitType":"ORDERS","limit":50,"interval":"SECOND","intervalNum":10}]"#,
        )
        .unwrap();

        let payload = QuotaDescriptors::from_file(&path).unwrap();
        assert_eq!(
            LimitPolicies::resolve(&payload).order_rate,
            QuotaPolicy::new(45, 10)
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = QuotaDescriptors::from_file("/nonexistent/limits.yaml").unwrap_err();
        assert!(matches!(err, TollgateError::Io(_)));
    }
}
