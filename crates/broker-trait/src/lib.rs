use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Unified broker types (broker-agnostic)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerAccount {
    pub id: String,
    pub account_number: String,
    pub status: String,
    pub currency: String,
    pub equity: String,
    pub buying_power: String,
    pub cash: String,
    pub portfolio_value: String,
    pub trading_blocked: bool,
    pub account_blocked: bool,
}

impl BrokerAccount {
    pub fn buying_power_decimal(&self) -> Decimal {
        Decimal::from_str(&self.buying_power).unwrap_or_default()
    }

    /// Whether the broker will accept new orders on this account.
    pub fn can_trade(&self) -> bool {
        !self.trading_blocked && !self.account_blocked
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    pub symbol: String,
    pub qty: String,
    pub side: String,
    pub avg_entry_price: String,
    pub current_price: String,
    pub market_value: String,
    pub unrealized_pl: String,
    pub unrealized_plpc: String,
}

/// Status filter accepted by the order listing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatusFilter {
    Open,
    Closed,
    All,
}

impl OrderStatusFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatusFilter::Open => "open",
            OrderStatusFilter::Closed => "closed",
            OrderStatusFilter::All => "all",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerOrder {
    pub id: String,
    pub client_order_id: String,
    pub created_at: DateTime<Utc>,
    pub symbol: String,
    pub qty: Option<String>,
    pub side: String,
    pub order_type: String,
    pub order_class: String,
    pub status: String,
    pub stop_price: Option<String>,
    pub limit_price: Option<String>,
    /// Child exit orders of a bracket (stop-loss and take-profit legs).
    #[serde(default)]
    pub legs: Vec<BrokerOrder>,
}

impl BrokerOrder {
    pub fn is_bracket(&self) -> bool {
        self.order_class == "bracket"
    }

    /// Stop price carried by the stop-loss leg, if the broker returned legs.
    pub fn stop_loss_price(&self) -> Option<Decimal> {
        self.legs
            .iter()
            .filter_map(|leg| leg.stop_price.as_deref())
            .find_map(|p| Decimal::from_str(p).ok())
    }

    /// Limit price carried by the take-profit leg, if the broker returned legs.
    pub fn take_profit_price(&self) -> Option<Decimal> {
        self.legs
            .iter()
            .filter(|leg| leg.stop_price.is_none())
            .filter_map(|leg| leg.limit_price.as_deref())
            .find_map(|p| Decimal::from_str(p).ok())
    }
}

// ---------------------------------------------------------------------------
// Bracket pricing
// ---------------------------------------------------------------------------

/// Exit prices for a bracket entry, rounded to the cent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BracketPrices {
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub limit_price: Decimal,
}

impl BracketPrices {
    /// `stop = round(entry * (1 - stop_loss_pct), 2)`,
    /// `limit = round(entry * (1 + take_profit_pct), 2)`.
    ///
    /// Returns `None` when the rounded prices do not satisfy
    /// `stop < entry < limit` (non-positive entry, out-of-range percentages,
    /// or sub-cent prices where rounding collapses a leg onto the entry).
    pub fn compute(
        entry_price: Decimal,
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
    ) -> Option<Self> {
        if entry_price <= Decimal::ZERO
            || stop_loss_pct <= Decimal::ZERO
            || stop_loss_pct >= Decimal::ONE
            || take_profit_pct <= Decimal::ZERO
        {
            return None;
        }

        let stop_price = round_cents(entry_price * (Decimal::ONE - stop_loss_pct));
        let limit_price = round_cents(entry_price * (Decimal::ONE + take_profit_pct));

        if stop_price <= Decimal::ZERO || stop_price >= entry_price || limit_price <= entry_price {
            return None;
        }

        Some(Self {
            entry_price,
            stop_price,
            limit_price,
        })
    }
}

/// Round half away from zero to two decimal places.
pub fn round_cents(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

// ---------------------------------------------------------------------------
// Broker traits
// ---------------------------------------------------------------------------

/// Brokerage operations used by the execution engine.
///
/// Every call fails soft: connectivity errors, timeouts and non-2xx responses
/// are logged by the implementation and surface as `None`, an empty
/// collection, or `false`.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Get account information (balance, buying power, etc.)
    async fn get_account(&self) -> Option<BrokerAccount>;

    /// Open positions, or `None` when the broker could not be read.
    ///
    /// Callers that size new entries against the live book need to tell an
    /// empty book apart from a failed fetch.
    async fn fetch_positions(&self) -> Option<Vec<BrokerPosition>>;

    /// Get all open positions, empty on failure
    async fn get_positions(&self) -> Vec<BrokerPosition> {
        self.fetch_positions().await.unwrap_or_default()
    }

    /// Get orders matching a status filter
    async fn get_orders(&self, status: OrderStatusFilter, limit: Option<usize>)
        -> Vec<BrokerOrder>;

    /// Mid of the best bid/ask from the live quote feed
    async fn get_latest_price(&self, symbol: &str) -> Option<Decimal>;

    /// Submit a buy entry with stop-loss and take-profit legs in one atomic order.
    /// Resolves the latest price itself and derives the leg prices from it.
    async fn submit_bracket_order(
        &self,
        symbol: &str,
        qty: u32,
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
    ) -> Option<BrokerOrder>;

    /// Cancel an order by ID
    async fn cancel_order(&self, order_id: &str) -> bool;

    /// Close an entire position with a liquidating market order
    async fn close_position(&self, symbol: &str) -> bool;

    /// Whether this is a paper/simulated account
    fn is_paper(&self) -> bool;

    /// Broker name for logging
    fn broker_name(&self) -> &str;
}

/// Answers whether regular trading hours are active.
///
/// Fails closed: an unknown market status reads as closed.
#[async_trait]
pub trait MarketClock: Send + Sync {
    async fn is_open(&self) -> bool;
}
