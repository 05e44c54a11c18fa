//! Operation weights.
//!
//! Every operation the wrapped client exposes costs some number of quota
//! units. Order operations additionally count against the order-rate and
//! order-daily budgets.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Cost and category of a named operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Quota units consumed per call. Zero means untracked.
    pub weight: u32,
    /// Whether the operation counts against the order budgets
    #[serde(default)]
    pub order: bool,
}

impl Operation {
    /// An operation that only consumes request weight.
    pub const fn general(weight: u32) -> Self {
        Self {
            weight,
            order: false,
        }
    }

    /// An operation that also counts against the order budgets.
    pub const fn order(weight: u32) -> Self {
        Self {
            weight,
            order: true,
        }
    }

    /// Whether calls to this operation go through admission control.
    pub fn is_tracked(&self) -> bool {
        self.weight > 0
    }
}

/// Built-in classification of the exchange client's operations.
const BUILTIN_OPERATIONS: &[(&str, Operation)] = &[
    // Connectivity and market data
    ("ping", Operation::general(1)),
    ("get_server_time", Operation::general(1)),
    ("get_system_status", Operation::general(1)),
    ("get_exchange_info", Operation::general(10)),
    ("get_symbol_info", Operation::general(10)),
    ("get_products", Operation::general(1)),
    ("get_all_tickers", Operation::general(2)),
    ("get_orderbook_tickers", Operation::general(2)),
    ("get_order_book", Operation::general(1)),
    ("get_recent_trades", Operation::general(1)),
    ("get_historical_trades", Operation::general(5)),
    ("get_aggregate_trades", Operation::general(1)),
    ("aggregate_trade_iter", Operation::general(1)),
    ("get_klines", Operation::general(1)),
    ("get_historical_klines", Operation::general(1)),
    ("get_historical_klines_generator", Operation::general(1)),
    ("get_avg_price", Operation::general(1)),
    ("get_ticker", Operation::general(1)),
    ("get_symbol_ticker", Operation::general(1)),
    ("get_orderbook_ticker", Operation::general(1)),
    // Order placement and cancellation
    ("create_order", Operation::order(1)),
    ("order_limit", Operation::order(1)),
    ("order_limit_buy", Operation::order(1)),
    ("order_limit_sell", Operation::order(1)),
    ("order_market", Operation::order(1)),
    ("order_market_buy", Operation::order(1)),
    ("order_market_sell", Operation::order(1)),
    ("create_oco_order", Operation::order(1)),
    ("order_oco_buy", Operation::order(1)),
    ("order_oco_sell", Operation::order(1)),
    ("cancel_order", Operation::order(1)),
    // Test orders are validated but never reach the matching engine.
    ("create_test_order", Operation::general(1)),
    // Order status and history
    ("get_order", Operation::order(2)),
    ("get_open_orders", Operation::order(3)),
    ("get_all_orders", Operation::order(10)),
    // Account
    ("get_account", Operation::general(10)),
    ("get_asset_balance", Operation::general(10)),
    ("get_my_trades", Operation::general(10)),
    ("get_account_status", Operation::general(1)),
    ("get_account_api_trading_status", Operation::general(1)),
    ("get_trade_fee", Operation::general(1)),
    ("get_asset_details", Operation::general(1)),
    ("get_dust_log", Operation::general(1)),
    ("transfer_dust", Operation::general(1)),
    // Wallet
    ("get_deposit_history", Operation::general(1)),
    ("get_withdraw_history", Operation::general(1)),
    ("get_deposit_address", Operation::general(1)),
    ("withdraw", Operation::general(1)),
    // User data stream
    ("stream_get_listen_key", Operation::general(1)),
    ("stream_keepalive", Operation::general(1)),
    ("stream_close", Operation::general(1)),
    // Local helpers that never hit the API
    ("close_connection", Operation::general(0)),
    ("get_symbol_precision", Operation::general(0)),
];

/// Lookup table from operation name to [`Operation`].
///
/// Names absent from the table resolve to `None` and bypass rate
/// accounting entirely, the same as an explicit zero weight.
#[derive(Debug, Clone)]
pub struct OperationTable {
    operations: HashMap<String, Operation>,
}

impl Default for OperationTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl OperationTable {
    /// The built-in classification table.
    pub fn builtin() -> Self {
        Self::from_operations(
            BUILTIN_OPERATIONS
                .iter()
                .map(|(name, op)| ((*name).to_string(), *op)),
        )
    }

    /// An empty table, under which every operation is untracked.
    pub fn empty() -> Self {
        Self {
            operations: HashMap::new(),
        }
    }

    /// Build a table from arbitrary entries.
    pub fn from_operations<I>(operations: I) -> Self
    where
        I: IntoIterator<Item = (String, Operation)>,
    {
        Self {
            operations: operations.into_iter().collect(),
        }
    }

    /// Merge `overrides` over this table, replacing existing entries.
    pub fn with_overrides<I>(mut self, overrides: I) -> Self
    where
        I: IntoIterator<Item = (String, Operation)>,
    {
        self.operations.extend(overrides);
        self
    }

    /// Look up an operation by name.
    pub fn get(&self, name: &str) -> Option<Operation> {
        self.operations.get(name).copied()
    }

    /// Weight of an operation, zero when unlisted.
    pub fn weight(&self, name: &str) -> u32 {
        self.get(name).map_or(0, |op| op.weight)
    }

    /// Whether an operation counts against the order budgets.
    pub fn is_order(&self, name: &str) -> bool {
        self.get(name).is_some_and(|op| op.order)
    }

    /// Number of classified operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
