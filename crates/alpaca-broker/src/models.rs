use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub account_number: String,
    pub status: String,
    pub currency: String,
    pub equity: String,
    pub buying_power: String,
    pub cash: String,
    pub portfolio_value: String,
    #[serde(default)]
    pub pattern_day_trader: bool,
    #[serde(default)]
    pub trading_blocked: bool,
    #[serde(default)]
    pub transfers_blocked: bool,
    #[serde(default)]
    pub account_blocked: bool,
    #[serde(default)]
    pub daytrade_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    #[serde(rename = "stop_limit")]
    StopLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc, // Good til canceled
    Opg, // Market on open
    Cls, // Market on close
    Ioc, // Immediate or cancel
    Fok, // Fill or kill
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderClass {
    Simple,
    Bracket,
    Oco,
    Oto,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TakeProfitLeg {
    pub limit_price: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StopLossLeg {
    pub stop_price: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notional: Option<String>, // Dollar amount instead of quantity
    pub side: OrderSide,
    #[serde(rename = "type")]
    pub order_type: OrderType,
    pub time_in_force: TimeInForce,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_class: Option<OrderClass>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub take_profit: Option<TakeProfitLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_loss: Option<StopLossLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_order_id: Option<String>,
}

/// Market buy with attached stop-loss and take-profit exits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BracketOrderRequest {
    pub symbol: String,
    pub qty: u32,
    pub stop_price: Decimal,
    pub limit_price: Decimal,
}

impl BracketOrderRequest {
    pub fn to_order_request(self) -> OrderRequest {
        OrderRequest {
            symbol: self.symbol,
            qty: Some(self.qty.to_string()),
            notional: None,
            side: OrderSide::Buy,
            order_type: OrderType::Market,
            time_in_force: TimeInForce::Gtc,
            limit_price: None,
            stop_price: None,
            order_class: Some(OrderClass::Bracket),
            take_profit: Some(TakeProfitLeg {
                limit_price: self.limit_price.to_string(),
            }),
            stop_loss: Some(StopLossLeg {
                stop_price: self.stop_price.to_string(),
            }),
            client_order_id: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Order {
    pub id: String,
    pub client_order_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub symbol: String,
    #[serde(rename = "qty")]
    pub quantity: Option<String>,
    #[serde(rename = "filled_qty")]
    pub filled_quantity: Option<String>,
    pub filled_avg_price: Option<String>,
    pub order_type: String,
    #[serde(default)]
    pub order_class: String,
    pub side: String,
    pub time_in_force: String,
    pub limit_price: Option<String>,
    pub stop_price: Option<String>,
    pub status: String,
    #[serde(default)]
    pub extended_hours: bool,
    #[serde(default)]
    pub legs: Option<Vec<Order>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Position {
    #[serde(default)]
    pub asset_id: String,
    pub symbol: String,
    #[serde(default)]
    pub exchange: String,
    pub avg_entry_price: String,
    pub qty: String,
    pub side: String,
    pub market_value: String,
    #[serde(default)]
    pub cost_basis: String,
    pub unrealized_pl: String,
    pub unrealized_plpc: String,
    pub current_price: String,
    #[serde(default)]
    pub lastday_price: String,
    #[serde(default)]
    pub change_today: String,
}

/// Market clock as reported by `GET /v2/clock`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Clock {
    pub timestamp: DateTime<Utc>,
    pub is_open: bool,
    pub next_open: DateTime<Utc>,
    pub next_close: DateTime<Utc>,
}

/// Latest NBBO quote. Field names follow the market-data API's short keys.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Quote {
    #[serde(rename = "ap", default)]
    pub ask_price: Decimal,
    #[serde(rename = "bp", default)]
    pub bid_price: Decimal,
    #[serde(rename = "as", default)]
    pub ask_size: Decimal,
    #[serde(rename = "bs", default)]
    pub bid_size: Decimal,
    #[serde(rename = "t")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Quote {
    /// Mid of best bid and ask. `None` unless both sides are quoted.
    pub fn mid_price(&self) -> Option<Decimal> {
        if self.ask_price <= Decimal::ZERO || self.bid_price <= Decimal::ZERO {
            return None;
        }
        Some(((self.ask_price + self.bid_price) / Decimal::TWO).normalize())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LatestQuoteResponse {
    pub symbol: String,
    pub quote: Option<Quote>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bracket_request_wire_format() {
        let request = BracketOrderRequest {
            symbol: "AAPL".into(),
            qty: 5,
            stop_price: dec!(177.96),
            limit_price: dec!(206.06),
        }
        .to_order_request();

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["symbol"], "AAPL");
        assert_eq!(body["qty"], "5");
        assert_eq!(body["side"], "buy");
        assert_eq!(body["type"], "market");
        assert_eq!(body["time_in_force"], "gtc");
        assert_eq!(body["order_class"], "bracket");
        assert_eq!(body["stop_loss"]["stop_price"], "177.96");
        assert_eq!(body["take_profit"]["limit_price"], "206.06");
        assert!(body.get("limit_price").is_none());
        assert!(body.get("notional").is_none());
    }

    #[test]
    fn quote_mid_price() {
        let quote: Quote = serde_json::from_value(serde_json::json!({
            "ap": 101.0, "bp": 100.5, "as": 3, "bs": 2, "t": "2024-03-04T15:30:00Z"
        }))
        .unwrap();
        assert_eq!(quote.mid_price(), Some(dec!(100.75)));
    }

    #[test]
    fn one_sided_quote_has_no_mid() {
        let quote: Quote = serde_json::from_value(serde_json::json!({
            "ap": 0, "bp": 100.5
        }))
        .unwrap();
        assert_eq!(quote.mid_price(), None);
    }

    #[test]
    fn clock_deserializes() {
        let clock: Clock = serde_json::from_str(
            r#"{"timestamp":"2024-03-04T10:00:00-05:00","is_open":true,
                "next_open":"2024-03-05T09:30:00-05:00","next_close":"2024-03-04T16:00:00-05:00"}"#,
        )
        .unwrap();
        assert!(clock.is_open);
    }

    #[test]
    fn bracket_order_response_with_legs() {
        let order: Order = serde_json::from_value(serde_json::json!({
            "id": "parent-1",
            "client_order_id": "c-1",
            "created_at": "2024-03-04T15:30:00Z",
            "symbol": "AAPL",
            "qty": "5",
            "order_type": "market",
            "order_class": "bracket",
            "side": "buy",
            "time_in_force": "gtc",
            "status": "accepted",
            "legs": [
                {
                    "id": "tp-1", "client_order_id": "c-2", "created_at": "2024-03-04T15:30:00Z",
                    "symbol": "AAPL", "qty": "5", "order_type": "limit", "order_class": "bracket",
                    "side": "sell", "time_in_force": "gtc", "status": "held", "limit_price": "206.06"
                },
                {
                    "id": "sl-1", "client_order_id": "c-3", "created_at": "2024-03-04T15:30:00Z",
                    "symbol": "AAPL", "qty": "5", "order_type": "stop", "order_class": "bracket",
                    "side": "sell", "time_in_force": "gtc", "status": "held", "stop_price": "177.96"
                }
            ]
        }))
        .unwrap();

        assert_eq!(order.legs.as_ref().map(Vec::len), Some(2));
    }
}
