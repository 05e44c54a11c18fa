//! The API client that the limiter wraps.

use async_trait::async_trait;
use serde_json::Value;

/// An exchange API client.
///
/// The limiter forwards every call through this trait unchanged. It only
/// needs to know an operation's name to price it; argument and result
/// shapes are entirely up to the implementation.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Error produced by the client. Returned to callers as-is.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the service's published quota descriptors.
    ///
    /// Expected to be a list of `{rateLimitType, limit, interval,
    /// intervalNum}` records, but any value is tolerated.
    async fn rate_limits(&self) -> Result<Value, Self::Error>;

    /// Perform a named operation.
    async fn call(&self, operation: &str, params: Value) -> Result<Value, Self::Error>;

    /// Read a named client setting (base URL, timeouts, credentials...).
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Change a named client setting.
    fn set_attribute(&self, name: &str, value: Value) -> Result<(), Self::Error>;
}
