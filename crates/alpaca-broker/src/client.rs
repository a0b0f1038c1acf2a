use crate::models::*;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use broker_trait::{
    BracketPrices, BrokerAccount, BrokerClient, BrokerOrder, BrokerPosition, MarketClock,
    OrderStatusFilter,
};
use reqwest::{header, Client, Response};
use rust_decimal::Decimal;
use std::time::Duration;

pub const PAPER_BASE_URL: &str = "https://paper-api.alpaca.markets";
pub const DATA_BASE_URL: &str = "https://data.alpaca.markets";

/// Alpaca rejects order listings with a limit above this.
const MAX_ORDER_LIMIT: usize = 500;

pub struct AlpacaClient {
    client: Client,
    base_url: String,
    data_url: String,
}

impl AlpacaClient {
    /// Create a new Alpaca client. Every request is bounded by `timeout`.
    pub fn new(
        api_key: String,
        secret_key: String,
        base_url: String,
        data_url: String,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            "APCA-API-KEY-ID",
            header::HeaderValue::from_str(&api_key).context("invalid Alpaca API key")?,
        );
        headers.insert(
            "APCA-API-SECRET-KEY",
            header::HeaderValue::from_str(&secret_key).context("invalid Alpaca secret key")?,
        );

        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            data_url: data_url.trim_end_matches('/').to_string(),
        })
    }

    /// Create client from environment variables.
    /// Accepts both APCA_API_KEY_ID / APCA_API_SECRET_KEY (standard Alpaca names)
    /// and ALPACA_API_KEY / ALPACA_SECRET_KEY as fallbacks.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("APCA_API_KEY_ID")
            .or_else(|_| std::env::var("ALPACA_API_KEY"))
            .map_err(|_| anyhow!("APCA_API_KEY_ID (or ALPACA_API_KEY) not set"))?;
        let secret_key = std::env::var("APCA_API_SECRET_KEY")
            .or_else(|_| std::env::var("ALPACA_SECRET_KEY"))
            .map_err(|_| anyhow!("APCA_API_SECRET_KEY (or ALPACA_SECRET_KEY) not set"))?;
        let base_url =
            std::env::var("ALPACA_BASE_URL").unwrap_or_else(|_| PAPER_BASE_URL.to_string());
        let data_url =
            std::env::var("ALPACA_DATA_URL").unwrap_or_else(|_| DATA_BASE_URL.to_string());
        let timeout_secs = std::env::var("BROKER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15);

        Self::new(
            api_key,
            secret_key,
            base_url,
            data_url,
            Duration::from_secs(timeout_secs),
        )
    }

    /// Turn a non-2xx response into an error carrying the response body.
    async fn check(response: Response, what: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(anyhow!("{} failed ({}): {}", what, status, error_text))
    }

    /// Get account information
    pub async fn get_account(&self) -> Result<Account> {
        let url = format!("{}/v2/account", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = Self::check(response, "Get account").await?;
        Ok(response.json::<Account>().await?)
    }

    /// Get all positions
    pub async fn get_positions(&self) -> Result<Vec<Position>> {
        let url = format!("{}/v2/positions", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = Self::check(response, "Get positions").await?;
        Ok(response.json::<Vec<Position>>().await?)
    }

    /// Get orders filtered by status, newest first.
    pub async fn get_orders(
        &self,
        status: OrderStatusFilter,
        limit: Option<usize>,
    ) -> Result<Vec<Order>> {
        let url = format!("{}/v2/orders", self.base_url);
        let mut query = vec![
            ("status", status.as_str().to_string()),
            ("direction", "desc".to_string()),
            ("nested", "true".to_string()),
        ];
        if let Some(lim) = limit {
            query.push(("limit", lim.clamp(1, MAX_ORDER_LIMIT).to_string()));
        }

        let response = self.client.get(&url).query(&query).send().await?;
        let response = Self::check(response, "Get orders").await?;
        Ok(response.json::<Vec<Order>>().await?)
    }

    /// Submit an order
    pub async fn submit_order(&self, order: OrderRequest) -> Result<Order> {
        let url = format!("{}/v2/orders", self.base_url);

        tracing::info!("Submitting order to Alpaca: {:?}", order);

        let response = self.client.post(&url).json(&order).send().await?;
        let response = Self::check(response, "Order submission").await?;

        let order_response = response.json::<Order>().await?;
        tracing::info!("Order submitted successfully: {}", order_response.id);
        Ok(order_response)
    }

    /// Price the exits off the current quote and submit one bracket order.
    pub async fn submit_bracket_order(
        &self,
        symbol: &str,
        qty: u32,
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
    ) -> Result<Order> {
        if qty == 0 {
            return Err(anyhow!("Refusing bracket order for {} with qty 0", symbol));
        }

        let entry_price = self
            .get_latest_price(symbol)
            .await?
            .ok_or_else(|| anyhow!("No quote available for {}", symbol))?;

        let prices = BracketPrices::compute(entry_price, stop_loss_pct, take_profit_pct)
            .ok_or_else(|| {
                anyhow!(
                    "Invalid bracket for {} at {} (stop {}, take profit {})",
                    symbol,
                    entry_price,
                    stop_loss_pct,
                    take_profit_pct
                )
            })?;

        tracing::info!(
            "Bracket {} x{}: entry ~{} stop {} take profit {}",
            symbol,
            qty,
            prices.entry_price,
            prices.stop_price,
            prices.limit_price
        );

        let request = BracketOrderRequest {
            symbol: symbol.to_string(),
            qty,
            stop_price: prices.stop_price,
            limit_price: prices.limit_price,
        };
        self.submit_order(request.to_order_request()).await
    }

    /// Cancel an order
    pub async fn cancel_order(&self, order_id: &str) -> Result<()> {
        let url = format!("{}/v2/orders/{}", self.base_url, order_id);
        let response = self.client.delete(&url).send().await?;
        Self::check(response, "Cancel order").await?;

        tracing::info!("Order {} canceled successfully", order_id);
        Ok(())
    }

    /// Close a position (sell all shares)
    pub async fn close_position(&self, symbol: &str) -> Result<Order> {
        let url = format!("{}/v2/positions/{}", self.base_url, symbol);
        let response = self.client.delete(&url).send().await?;
        let response = Self::check(response, "Close position").await?;

        let order = response.json::<Order>().await?;
        tracing::info!("Position {} closed successfully", symbol);
        Ok(order)
    }

    /// Get the market clock
    pub async fn get_clock(&self) -> Result<Clock> {
        let url = format!("{}/v2/clock", self.base_url);
        let response = self.client.get(&url).send().await?;
        let response = Self::check(response, "Get clock").await?;
        Ok(response.json::<Clock>().await?)
    }

    /// Latest NBBO quote from the market-data API
    pub async fn get_latest_quote(&self, symbol: &str) -> Result<Option<Quote>> {
        let url = format!("{}/v2/stocks/{}/quotes/latest", self.data_url, symbol);
        let response = self.client.get(&url).send().await?;
        let response = Self::check(response, "Get latest quote").await?;
        Ok(response.json::<LatestQuoteResponse>().await?.quote)
    }

    /// Mid price of the latest quote, `None` if either side is missing
    pub async fn get_latest_price(&self, symbol: &str) -> Result<Option<Decimal>> {
        Ok(self
            .get_latest_quote(symbol)
            .await?
            .and_then(|quote| quote.mid_price()))
    }

    /// Check if this client is connected to the paper trading environment
    pub fn is_paper(&self) -> bool {
        self.base_url.contains("paper-api")
    }

    /// Get the base URL (for logging/diagnostics)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

// ---------------------------------------------------------------------------
// Conversion helpers: Alpaca types -> unified BrokerClient types
// ---------------------------------------------------------------------------

fn account_to_broker(a: Account) -> BrokerAccount {
    BrokerAccount {
        id: a.id,
        account_number: a.account_number,
        status: a.status,
        currency: a.currency,
        equity: a.equity,
        buying_power: a.buying_power,
        cash: a.cash,
        portfolio_value: a.portfolio_value,
        trading_blocked: a.trading_blocked,
        account_blocked: a.account_blocked,
    }
}

fn position_to_broker(p: Position) -> BrokerPosition {
    BrokerPosition {
        symbol: p.symbol,
        qty: p.qty,
        side: p.side,
        avg_entry_price: p.avg_entry_price,
        current_price: p.current_price,
        market_value: p.market_value,
        unrealized_pl: p.unrealized_pl,
        unrealized_plpc: p.unrealized_plpc,
    }
}

fn order_to_broker(o: Order) -> BrokerOrder {
    BrokerOrder {
        id: o.id,
        client_order_id: o.client_order_id,
        created_at: o.created_at,
        symbol: o.symbol,
        qty: o.quantity,
        side: o.side,
        order_type: o.order_type,
        order_class: o.order_class,
        status: o.status,
        stop_price: o.stop_price,
        limit_price: o.limit_price,
        legs: o
            .legs
            .unwrap_or_default()
            .into_iter()
            .map(order_to_broker)
            .collect(),
    }
}

#[async_trait]
impl BrokerClient for AlpacaClient {
    async fn get_account(&self) -> Option<BrokerAccount> {
        match self.get_account().await {
            Ok(account) => Some(account_to_broker(account)),
            Err(e) => {
                tracing::warn!("Failed to fetch account: {:#}", e);
                None
            }
        }
    }

    async fn fetch_positions(&self) -> Option<Vec<BrokerPosition>> {
        match self.get_positions().await {
            Ok(positions) => Some(positions.into_iter().map(position_to_broker).collect()),
            Err(e) => {
                tracing::warn!("Failed to fetch positions: {:#}", e);
                None
            }
        }
    }

    async fn get_orders(
        &self,
        status: OrderStatusFilter,
        limit: Option<usize>,
    ) -> Vec<BrokerOrder> {
        match self.get_orders(status, limit).await {
            Ok(orders) => orders.into_iter().map(order_to_broker).collect(),
            Err(e) => {
                tracing::warn!("Failed to fetch {} orders: {:#}", status.as_str(), e);
                Vec::new()
            }
        }
    }

    async fn get_latest_price(&self, symbol: &str) -> Option<Decimal> {
        match self.get_latest_price(symbol).await {
            Ok(Some(price)) => Some(price),
            Ok(None) => {
                tracing::warn!("No two-sided quote for {}", symbol);
                None
            }
            Err(e) => {
                tracing::warn!("Failed to fetch quote for {}: {:#}", symbol, e);
                None
            }
        }
    }

    async fn submit_bracket_order(
        &self,
        symbol: &str,
        qty: u32,
        stop_loss_pct: Decimal,
        take_profit_pct: Decimal,
    ) -> Option<BrokerOrder> {
        match self
            .submit_bracket_order(symbol, qty, stop_loss_pct, take_profit_pct)
            .await
        {
            Ok(order) => Some(order_to_broker(order)),
            Err(e) => {
                tracing::error!("Bracket order for {} failed: {:#}", symbol, e);
                None
            }
        }
    }

    async fn cancel_order(&self, order_id: &str) -> bool {
        match self.cancel_order(order_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Failed to cancel order {}: {:#}", order_id, e);
                false
            }
        }
    }

    async fn close_position(&self, symbol: &str) -> bool {
        match self.close_position(symbol).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Failed to close position {}: {:#}", symbol, e);
                false
            }
        }
    }

    fn is_paper(&self) -> bool {
        self.is_paper()
    }

    fn broker_name(&self) -> &str {
        "alpaca"
    }
}

#[async_trait]
impl MarketClock for AlpacaClient {
    async fn is_open(&self) -> bool {
        match self.get_clock().await {
            Ok(clock) => clock.is_open,
            Err(e) => {
                tracing::warn!("Market clock unavailable, treating market as closed: {:#}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn client(base_url: &str) -> AlpacaClient {
        AlpacaClient::new(
            "key".into(),
            "secret".into(),
            base_url.into(),
            DATA_BASE_URL.into(),
            Duration::from_millis(200),
        )
        .unwrap()
    }

    #[test]
    fn paper_detection() {
        assert!(client(PAPER_BASE_URL).is_paper());
        assert!(!client("https://api.alpaca.markets").is_paper());
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        assert_eq!(
            client("https://paper-api.alpaca.markets/").base_url(),
            PAPER_BASE_URL
        );
    }

    #[test]
    fn header_characters_are_validated() {
        let result = AlpacaClient::new(
            "bad\nkey".into(),
            "secret".into(),
            PAPER_BASE_URL.into(),
            DATA_BASE_URL.into(),
            Duration::from_secs(1),
        );
        assert!(result.is_err());
    }

    #[test]
    fn legs_are_carried_into_broker_orders() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": "parent", "client_order_id": "c", "created_at": "2024-03-04T15:30:00Z",
            "symbol": "MSFT", "qty": "2", "order_type": "market", "order_class": "bracket",
            "side": "buy", "time_in_force": "gtc", "status": "new",
            "legs": [
                { "id": "sl", "client_order_id": "c2", "created_at": "2024-03-04T15:30:00Z",
                  "symbol": "MSFT", "qty": "2", "order_type": "stop", "order_class": "bracket",
                  "side": "sell", "time_in_force": "gtc", "status": "held", "stop_price": "380.00" },
                { "id": "tp", "client_order_id": "c3", "created_at": "2024-03-04T15:30:00Z",
                  "symbol": "MSFT", "qty": "2", "order_type": "limit", "order_class": "bracket",
                  "side": "sell", "time_in_force": "gtc", "status": "held", "limit_price": "440.00" }
            ]
        }))
        .unwrap();

        let broker = order_to_broker(order);
        assert!(broker.is_bracket());
        assert_eq!(broker.stop_loss_price(), Some(dec!(380.00)));
        assert_eq!(broker.take_profit_price(), Some(dec!(440.00)));
    }

    #[tokio::test]
    async fn unreachable_clock_fails_closed() {
        // Nothing listens on the discard port; the request errors out quickly.
        let alpaca = client("http://127.0.0.1:9");
        assert!(!MarketClock::is_open(&alpaca).await);
    }

    #[tokio::test]
    async fn unreachable_broker_fails_soft() {
        let alpaca = client("http://127.0.0.1:9");
        assert!(BrokerClient::get_account(&alpaca).await.is_none());
        assert!(BrokerClient::fetch_positions(&alpaca).await.is_none());
        assert!(BrokerClient::get_positions(&alpaca).await.is_empty());
        assert!(!BrokerClient::cancel_order(&alpaca, "missing").await);
        assert!(!BrokerClient::close_position(&alpaca, "AAPL").await);
    }

    #[tokio::test]
    #[ignore] // Only run with valid credentials
    async fn test_get_account() {
        let client = AlpacaClient::from_env().unwrap();
        let account = client.get_account().await.unwrap();

        println!("Account ID: {}", account.id);
        println!("Buying Power: ${}", account.buying_power);
        println!("Portfolio Value: ${}", account.portfolio_value);

        assert!(!account.id.is_empty());
    }

    #[tokio::test]
    #[ignore] // Only run with valid credentials during market hours
    async fn test_submit_bracket_order() {
        let client = AlpacaClient::from_env().unwrap();

        let result = client
            .submit_bracket_order("AAPL", 1, dec!(0.05), dec!(0.10))
            .await
            .unwrap();

        println!("Order submitted: {}", result.id);
        println!("Status: {}", result.status);

        // Cancel the order immediately (for paper trading)
        client.cancel_order(&result.id).await.unwrap();
    }
}
