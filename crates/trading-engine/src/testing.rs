//! In-memory fakes of the engine's collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use broker_trait::{
    BracketPrices, BrokerAccount, BrokerClient, BrokerOrder, BrokerPosition, MarketClock,
    OrderStatusFilter,
};
use chrono::Utc;
use notification_service::AlertItem;
use risk_gate::CandidatePick;
use rust_decimal::Decimal;

use crate::notifier::Notifier;
use crate::signal_source::SignalSource;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub fn account(buying_power: Decimal) -> BrokerAccount {
    BrokerAccount {
        id: "fake-account".into(),
        account_number: "PA0000001".into(),
        status: "ACTIVE".into(),
        currency: "USD".into(),
        equity: buying_power.to_string(),
        buying_power: buying_power.to_string(),
        cash: buying_power.to_string(),
        portfolio_value: buying_power.to_string(),
        trading_blocked: false,
        account_blocked: false,
    }
}

pub fn position(symbol: &str, qty: u32) -> BrokerPosition {
    BrokerPosition {
        symbol: symbol.into(),
        qty: qty.to_string(),
        side: "long".into(),
        avg_entry_price: "100".into(),
        current_price: "100".into(),
        market_value: (qty * 100).to_string(),
        unrealized_pl: "0".into(),
        unrealized_plpc: "0".into(),
    }
}

pub fn open_order(id: &str, symbol: &str) -> BrokerOrder {
    BrokerOrder {
        id: id.into(),
        client_order_id: format!("client-{}", id),
        created_at: Utc::now(),
        symbol: symbol.into(),
        qty: Some("1".into()),
        side: "buy".into(),
        order_type: "limit".into(),
        order_class: "simple".into(),
        status: "new".into(),
        stop_price: None,
        limit_price: Some("100".into()),
        legs: Vec::new(),
    }
}

#[derive(Default)]
struct BrokerState {
    account: Option<BrokerAccount>,
    positions: Vec<BrokerPosition>,
    open_orders: Vec<BrokerOrder>,
    prices: HashMap<String, Decimal>,
    reject_orders_for: HashSet<String>,
    fail_cancel: HashSet<String>,
    fail_close: HashSet<String>,
    positions_unavailable: bool,
    submitted: Vec<(String, u32)>,
    next_order_id: usize,
}

/// Broker backed by in-memory state. Cancelling removes the order and
/// closing removes the position, so repeated liquidation is observable.
#[derive(Default)]
pub struct FakeBroker {
    state: Mutex<BrokerState>,
}

impl FakeBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(self, account: BrokerAccount) -> Self {
        lock(&self.state).account = Some(account);
        self
    }

    pub fn with_positions(self, positions: Vec<BrokerPosition>) -> Self {
        lock(&self.state).positions = positions;
        self
    }

    pub fn with_open_orders(self, orders: Vec<BrokerOrder>) -> Self {
        lock(&self.state).open_orders = orders;
        self
    }

    pub fn with_price(self, symbol: &str, price: Decimal) -> Self {
        lock(&self.state).prices.insert(symbol.to_string(), price);
        self
    }

    pub fn reject_orders_for(self, symbol: &str) -> Self {
        lock(&self.state).reject_orders_for.insert(symbol.to_string());
        self
    }

    pub fn fail_cancel(self, order_id: &str) -> Self {
        lock(&self.state).fail_cancel.insert(order_id.to_string());
        self
    }

    pub fn fail_close(self, symbol: &str) -> Self {
        lock(&self.state).fail_close.insert(symbol.to_string());
        self
    }

    /// Position reads fail as if the broker timed out.
    pub fn fail_positions(self) -> Self {
        lock(&self.state).positions_unavailable = true;
        self
    }

    /// `(symbol, qty)` of every accepted bracket submission, in order.
    pub fn submitted(&self) -> Vec<(String, u32)> {
        lock(&self.state).submitted.clone()
    }

    pub fn open_order_count(&self) -> usize {
        lock(&self.state).open_orders.len()
    }

    pub fn position_count(&self) -> usize {
        lock(&self.state).positions.len()
    }
}

#[async_trait]
impl BrokerClient for FakeBroker {
    async fn get_account(&self) -> Option<BrokerAccount> {
        lock(&self.state).account.clone()
    }

    async fn fetch_positions(&self) -> Option<Vec<BrokerPosition>> {
        let state = lock(&self.state);
        if state.positions_unavailable {
            return None;
        }
        Some(state.positions.clone())
    }

    async fn get_orders(&self, status: OrderStatusFilter, limit: Option<usize>) -> Vec<BrokerOrder> {
        let state = lock(&self.state);
        let orders = match status {
            OrderStatusFilter::Closed => Vec::new(),
            OrderStatusFilter::Open | OrderStatusFilter::All => state.open_orders.clone(),
        };
        orders.into_iter().take(limit.unwrap_or(usize::MAX)).collect()
    }

    async fn get_latest_price(&self, symbol: &str) -> Option<Decimal> {
        lock(&self.state).prices.get(symbol).copied()
    }

    async fn submit_bracket_order(
        &self,
        symbol: &str,
        qty: u32,
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
    ) -> Option<BrokerOrder> {
        let mut state = lock(&self.state);
        if qty == 0 || state.reject_orders_for.contains(symbol) {
            return None;
        }
        let price = *state.prices.get(symbol)?;
        let bracket = BracketPrices::compute(price, stop_loss_pct, take_profit_pct)?;

        state.next_order_id += 1;
        state.submitted.push((symbol.to_string(), qty));

        let id = format!("order-{}", state.next_order_id);
        let mut stop_leg = open_order(&format!("{}-sl", id), symbol);
        stop_leg.order_type = "stop".into();
        stop_leg.side = "sell".into();
        stop_leg.stop_price = Some(bracket.stop_price.to_string());
        stop_leg.limit_price = None;
        let mut profit_leg = open_order(&format!("{}-tp", id), symbol);
        profit_leg.side = "sell".into();
        profit_leg.limit_price = Some(bracket.limit_price.to_string());

        let mut order = open_order(&id, symbol);
        order.qty = Some(qty.to_string());
        order.order_type = "market".into();
        order.order_class = "bracket".into();
        order.status = "accepted".into();
        order.limit_price = None;
        order.legs = vec![profit_leg, stop_leg];
        Some(order)
    }

    async fn cancel_order(&self, order_id: &str) -> bool {
        let mut state = lock(&self.state);
        if state.fail_cancel.contains(order_id) {
            return false;
        }
        let before = state.open_orders.len();
        state.open_orders.retain(|o| o.id != order_id);
        state.open_orders.len() < before
    }

    async fn close_position(&self, symbol: &str) -> bool {
        let mut state = lock(&self.state);
        if state.fail_close.contains(symbol) {
            return false;
        }
        let before = state.positions.len();
        state.positions.retain(|p| p.symbol != symbol);
        state.positions.len() < before
    }

    fn is_paper(&self) -> bool {
        true
    }

    fn broker_name(&self) -> &str {
        "fake"
    }
}

pub struct FakeClock {
    open: bool,
}

impl FakeClock {
    pub fn open() -> Self {
        Self { open: true }
    }

    pub fn closed() -> Self {
        Self { open: false }
    }
}

#[async_trait]
impl MarketClock for FakeClock {
    async fn is_open(&self) -> bool {
        self.open
    }
}

pub struct FakeSignalSource {
    picks: Mutex<Vec<CandidatePick>>,
    failing: AtomicBool,
    delay: Option<Duration>,
    calls: Arc<AtomicUsize>,
}

impl FakeSignalSource {
    pub fn new(picks: Vec<CandidatePick>) -> Self {
        Self {
            picks: Mutex::new(picks),
            failing: AtomicBool::new(false),
            delay: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl SignalSource for FakeSignalSource {
    async fn scan(&self, _force_refresh: bool) -> Result<Vec<CandidatePick>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("scanner unavailable");
        }
        Ok(lock(&self.picks).clone())
    }
}

#[derive(Debug, Clone)]
pub struct SentAlert {
    pub subject: String,
    pub message: String,
    pub items: Vec<AlertItem>,
}

/// Records alerts; reports delivery as `deliver` says.
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentAlert>>,
    deliver: bool,
    hang: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            deliver: true,
            hang: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            deliver: false,
            ..Self::new()
        }
    }

    /// Records the alert, then never answers.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    pub fn sent(&self) -> Vec<SentAlert> {
        lock(&self.sent).clone()
    }
}

impl Default for RecordingNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_alert(&self, subject: &str, message: &str, items: &[AlertItem]) -> bool {
        lock(&self.sent).push(SentAlert {
            subject: subject.to_string(),
            message: message.to_string(),
            items: items.to_vec(),
        });
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.deliver
    }
}
