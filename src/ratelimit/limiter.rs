//! Rate-limited client wrapper.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, trace, warn};

use crate::config::TollgateConfig;

use super::client::ApiClient;
use super::clock::{Clock, Sleeper, SystemClock, TokioSleeper};
use super::rules::LimitPolicies;
use super::weights::OperationTable;
use super::window::{AdmissionWindow, WindowKind};

/// Wraps an [`ApiClient`] and delays calls that would exceed its quotas.
///
/// Every call is priced by the [`OperationTable`] and admitted through
/// the request-weight window; order operations also pass the order-rate
/// and order-daily windows. Calls are then forwarded to the client with
/// their arguments and results untouched.
///
/// Quota state is local to this value. Share it behind an `Arc` to
/// throttle several tasks against the same budget.
pub struct RateLimitedClient<C: ApiClient> {
    client: Arc<C>,
    operations: OperationTable,
    policies: LimitPolicies,
    request_weight: AdmissionWindow,
    order_rate: AdmissionWindow,
    order_daily: AdmissionWindow,
}

impl<C: ApiClient> RateLimitedClient<C> {
    /// Wrap `client`, fetching its published quotas.
    ///
    /// A failed fetch is logged and the default policies are used instead.
    pub async fn new(client: Arc<C>) -> Self {
        let policies = Self::fetch_policies(&client).await;
        Self::from_policies(
            client,
            OperationTable::builtin(),
            policies,
            Arc::new(SystemClock::new()),
            Arc::new(TokioSleeper),
        )
    }

    /// Wrap `client` using caller-supplied quota descriptors instead of
    /// fetching them.
    pub fn with_limits(client: Arc<C>, limits: &Value) -> Self {
        Self::from_policies(
            client,
            OperationTable::builtin(),
            LimitPolicies::resolve(limits),
            Arc::new(SystemClock::new()),
            Arc::new(TokioSleeper),
        )
    }

    /// Wrap `client` using the limits and weight overrides in `config`.
    ///
    /// Configured limits take the place of the remote fetch; without them
    /// the client's published quotas are fetched as in [`Self::new`].
    pub async fn from_config(client: Arc<C>, config: &TollgateConfig) -> Self {
        let policies = match config.policies() {
            Some(policies) => policies,
            None => Self::fetch_policies(&client).await,
        };
        Self::from_policies(
            client,
            config.operation_table(),
            policies,
            Arc::new(SystemClock::new()),
            Arc::new(TokioSleeper),
        )
    }

    /// Wrap `client` with fully explicit parts.
    pub fn from_policies(
        client: Arc<C>,
        operations: OperationTable,
        policies: LimitPolicies,
        clock: Arc<dyn Clock>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let window = |kind, policy| {
            AdmissionWindow::new(kind, policy, Arc::clone(&clock), Arc::clone(&sleeper))
        };

        Self {
            request_weight: window(WindowKind::RequestWeight, policies.request_weight),
            order_rate: window(WindowKind::OrderRate, policies.order_rate),
            order_daily: window(WindowKind::OrderDaily, policies.order_daily),
            client,
            operations,
            policies,
        }
    }

    /// Resolve policies from the client's published quotas.
    pub async fn fetch_policies(client: &C) -> LimitPolicies {
        match client.rate_limits().await {
            Ok(payload) => LimitPolicies::resolve(&payload),
            Err(e) => {
                warn!(error = %e, "Failed to fetch quota descriptors, using default limits");
                LimitPolicies::default()
            }
        }
    }

    /// Perform `operation`, waiting first if its cost doesn't fit.
    ///
    /// Unlisted and zero-weight operations skip admission control.
    #[instrument(skip_all, fields(operation = %operation))]
    pub async fn invoke(&self, operation: &str, params: Value) -> Result<Value, C::Error> {
        match self.operations.get(operation) {
            Some(op) if op.is_tracked() => {
                let cost = u64::from(op.weight);
                trace!(weight = op.weight, order = op.order, "Admitting operation");

                self.request_weight.admit(cost).await;
                if op.order {
                    self.order_rate.admit(cost).await;
                    self.order_daily.admit(cost).await;
                }
            }
            Some(_) => trace!("Zero-weight operation, skipping admission"),
            // TODO: decide whether unlisted operations should get a default weight
            // instead of bypassing every quota.
            None => debug!("Unweighted operation bypasses quota accounting"),
        }

        self.client.call(operation, params).await
    }

    /// Read a setting of the wrapped client.
    pub fn attribute(&self, name: &str) -> Option<Value> {
        self.client.attribute(name)
    }

    /// Change a setting of the wrapped client.
    pub fn set_attribute(&self, name: &str, value: Value) -> Result<(), C::Error> {
        self.client.set_attribute(name, value)
    }

    /// The wrapped client.
    pub fn inner(&self) -> &Arc<C> {
        &self.client
    }

    /// The operation classification in use.
    pub fn operations(&self) -> &OperationTable {
        &self.operations
    }

    /// The policies being enforced.
    pub fn policies(&self) -> LimitPolicies {
        self.policies
    }

    /// The window enforcing `kind`.
    pub fn window(&self, kind: WindowKind) -> &AdmissionWindow {
        match kind {
            WindowKind::RequestWeight => &self.request_weight,
            WindowKind::OrderRate => &self.order_rate,
            WindowKind::OrderDaily => &self.order_daily,
        }
    }
}
