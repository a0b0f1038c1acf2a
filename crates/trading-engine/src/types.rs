use chrono::{DateTime, Utc};
use risk_gate::Rejection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const REASON_INSUFFICIENT_BUYING_POWER: &str = "insufficient buying power";
pub const REASON_NO_PRICE: &str = "could not get price";
pub const REASON_PRICE_TOO_HIGH: &str = "price too high";
pub const REASON_INVALID_BRACKET: &str = "bracket prices invalid at this price";
pub const REASON_SUBMISSION_FAILED: &str = "order submission failed";

/// What started a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Manual,
    Scheduled,
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trigger::Manual => write!(f, "manual"),
            Trigger::Scheduled => write!(f, "scheduled"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Submitted,
    Skipped,
    Failed,
}

/// Sizing and exit prices for one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeDecision {
    pub symbol: String,
    pub qty: u32,
    pub entry_price: Decimal,
    pub estimated_cost: Decimal,
    pub stop_price: Decimal,
    pub limit_price: Decimal,
}

/// Outcome for a single admitted candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub symbol: String,
    pub score: f64,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<TradeDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss_pct: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit_pct: Option<Decimal>,
}

impl ExecutionResult {
    pub fn skipped(symbol: &str, score: f64, reason: &str) -> Self {
        Self::without_order(symbol, score, ExecutionStatus::Skipped, reason)
    }

    pub fn failed(symbol: &str, score: f64, reason: &str) -> Self {
        Self::without_order(symbol, score, ExecutionStatus::Failed, reason)
    }

    fn without_order(symbol: &str, score: f64, status: ExecutionStatus, reason: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            score,
            status,
            reason: Some(reason.to_string()),
            order_id: None,
            decision: None,
            stop_loss_pct: None,
            take_profit_pct: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Disabled,
    MarketClosed,
    TradingBlocked,
    MaxPositionsReached,
}

impl RunOutcome {
    pub fn message(&self) -> &'static str {
        match self {
            RunOutcome::Completed => "run completed",
            RunOutcome::Disabled => "auto-trading disabled",
            RunOutcome::MarketClosed => "market closed",
            RunOutcome::TradingBlocked => "account blocked from trading",
            RunOutcome::MaxPositionsReached => "maximum positions reached",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    pub message: String,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub candidates_scanned: usize,
    pub candidates_admitted: usize,
    pub open_positions: usize,
    pub results: Vec<ExecutionResult>,
    pub rejected: Vec<Rejection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buying_power_start: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buying_power_remaining: Option<Decimal>,
    pub notified: bool,
}

impl RunSummary {
    pub fn new(trigger: Trigger, started_at: DateTime<Utc>) -> Self {
        Self {
            outcome: RunOutcome::Completed,
            message: RunOutcome::Completed.message().to_string(),
            trigger,
            started_at,
            finished_at: started_at,
            submitted: 0,
            skipped: 0,
            failed: 0,
            candidates_scanned: 0,
            candidates_admitted: 0,
            open_positions: 0,
            results: Vec::new(),
            rejected: Vec::new(),
            buying_power_start: None,
            buying_power_remaining: None,
            notified: false,
        }
    }

    /// Stamp the outcome and finish time, recounting results by status.
    pub fn finish(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self.message = outcome.message().to_string();
        self.finished_at = Utc::now();
        self.submitted = self.count(ExecutionStatus::Submitted);
        self.skipped = self.count(ExecutionStatus::Skipped);
        self.failed = self.count(ExecutionStatus::Failed);
        self
    }

    fn count(&self, status: ExecutionStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn submitted_results(&self) -> impl Iterator<Item = &ExecutionResult> {
        self.results
            .iter()
            .filter(|r| r.status == ExecutionStatus::Submitted)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Order,
    Position,
}

/// One order or position the broker refused to cancel or close.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub kind: ItemKind,
    /// Order id or position symbol.
    pub id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationSummary {
    pub orders_cancelled: usize,
    pub orders_failed: usize,
    pub positions_closed: usize,
    pub positions_failed: usize,
    pub positions_pending: usize,
    pub market_open: bool,
    pub cancelled_order_ids: Vec<String>,
    pub closed_symbols: Vec<String>,
    pub pending_symbols: Vec<String>,
    pub failed_items: Vec<ItemFailure>,
}

impl LiquidationSummary {
    pub fn is_clean(&self) -> bool {
        self.failed_items.is_empty()
    }
}
