use std::sync::Arc;

use broker_trait::{BracketPrices, BrokerClient, MarketClock};
use chrono::Utc;
use notification_service::AlertItem;
use risk_gate::{CandidatePick, RiskGate};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::notifier::Notifier;
use crate::signal_source::SignalSource;
use crate::types::*;

/// Runs one scan-and-trade pass: preconditions, gate, then strictly
/// sequential sizing and bracket submission in ranked order.
pub struct ExecutionCoordinator {
    broker: Arc<dyn BrokerClient>,
    clock: Arc<dyn MarketClock>,
    signals: Arc<dyn SignalSource>,
    notifier: Arc<dyn Notifier>,
    gate: RiskGate,
    config: EngineConfig,
}

impl ExecutionCoordinator {
    pub fn new(
        config: EngineConfig,
        broker: Arc<dyn BrokerClient>,
        clock: Arc<dyn MarketClock>,
        signals: Arc<dyn SignalSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            gate: config.risk_gate(),
            broker,
            clock,
            signals,
            notifier,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn run(&self, trigger: Trigger, force_refresh: bool) -> Result<RunSummary, EngineError> {
        let mut summary = RunSummary::new(trigger, Utc::now());

        if !self.config.auto_trading_enabled {
            tracing::info!("Auto-trading disabled, skipping {} run", trigger);
            return Ok(summary.finish(RunOutcome::Disabled));
        }

        if !self.clock.is_open().await {
            tracing::info!("Market closed, skipping {} run", trigger);
            return Ok(summary.finish(RunOutcome::MarketClosed));
        }

        let account = self
            .broker
            .get_account()
            .await
            .ok_or(EngineError::AccountUnavailable)?;
        let positions = self
            .broker
            .fetch_positions()
            .await
            .ok_or(EngineError::PositionsUnavailable)?;

        let buying_power = account.buying_power_decimal();
        summary.buying_power_start = Some(buying_power);
        summary.open_positions = positions.len();

        if !account.can_trade() {
            tracing::warn!(
                "Account {} is blocked from trading, skipping {} run",
                account.account_number,
                trigger
            );
            summary.buying_power_remaining = Some(buying_power);
            return Ok(summary.finish(RunOutcome::TradingBlocked));
        }

        if positions.len() >= self.config.max_positions {
            tracing::info!(
                "{} open positions (max {}), nothing to do",
                positions.len(),
                self.config.max_positions
            );
            summary.buying_power_remaining = Some(buying_power);
            return Ok(summary.finish(RunOutcome::MaxPositionsReached));
        }

        let picks = self
            .signals
            .scan(force_refresh)
            .await
            .map_err(EngineError::SignalSource)?;

        let held: Vec<&str> = positions.iter().map(|p| p.symbol.as_str()).collect();
        let outcome = self.gate.filter(&picks, &held, positions.len());
        summary.candidates_scanned = picks.len();
        summary.candidates_admitted = outcome.admitted.len();
        summary.rejected = outcome.rejected;

        tracing::info!(
            "{} run: {} candidates scanned, {} admitted, buying power ${}",
            trigger,
            picks.len(),
            outcome.admitted.len(),
            buying_power
        );

        let mut remaining = buying_power;
        for pick in &outcome.admitted {
            let result = self.execute_candidate(pick, &mut remaining).await;
            summary.results.push(result);
        }
        summary.buying_power_remaining = Some(remaining);

        let mut summary = summary.finish(RunOutcome::Completed);
        if summary.submitted > 0 {
            summary.notified = self.notify(&summary).await;
        }

        tracing::info!(
            "{} run finished: {} submitted, {} skipped, {} failed",
            trigger,
            summary.submitted,
            summary.skipped,
            summary.failed
        );
        Ok(summary)
    }

    async fn execute_candidate(&self, pick: &CandidatePick, buying_power: &mut Decimal) -> ExecutionResult {
        let symbol = pick.symbol.as_str();
        let amount = self.config.trade_amount;

        if *buying_power < amount {
            tracing::info!("Skipping {}: buying power ${} below ${}", symbol, buying_power, amount);
            return ExecutionResult::skipped(symbol, pick.score, REASON_INSUFFICIENT_BUYING_POWER);
        }

        let price = match self.broker.get_latest_price(symbol).await {
            Some(price) if price > Decimal::ZERO => price,
            _ => {
                tracing::warn!("Skipping {}: no usable quote", symbol);
                return ExecutionResult::skipped(symbol, pick.score, REASON_NO_PRICE);
            }
        };

        let qty = (amount / price).floor().to_u32().unwrap_or(0);
        if qty == 0 {
            tracing::info!("Skipping {}: ${} buys no whole share at ${}", symbol, amount, price);
            return ExecutionResult::skipped(symbol, pick.score, REASON_PRICE_TOO_HIGH);
        }

        let sl = self.config.stop_loss_pct;
        let tp = self.config.take_profit_pct;
        let Some(bracket) = BracketPrices::compute(price, sl, tp) else {
            tracing::warn!("Skipping {}: bracket legs collapse at ${}", symbol, price);
            return ExecutionResult::skipped(symbol, pick.score, REASON_INVALID_BRACKET);
        };

        let Some(order) = self.broker.submit_bracket_order(symbol, qty, sl, tp).await else {
            tracing::error!("Bracket order for {} x{} was not accepted", symbol, qty);
            return ExecutionResult::failed(symbol, pick.score, REASON_SUBMISSION_FAILED);
        };

        let estimated_cost = Decimal::from(qty) * price;
        if self.config.track_buying_power {
            *buying_power -= estimated_cost;
        }

        let decision = TradeDecision {
            symbol: symbol.to_string(),
            qty,
            entry_price: price,
            estimated_cost,
            stop_price: order.stop_loss_price().unwrap_or(bracket.stop_price),
            limit_price: order.take_profit_price().unwrap_or(bracket.limit_price),
        };

        tracing::info!(
            "Submitted bracket {} for {} x{} @ ~${} (stop ${}, target ${})",
            order.id,
            symbol,
            qty,
            price,
            decision.stop_price,
            decision.limit_price
        );

        ExecutionResult {
            symbol: symbol.to_string(),
            score: pick.score,
            status: ExecutionStatus::Submitted,
            reason: None,
            order_id: Some(order.id),
            decision: Some(decision),
            stop_loss_pct: Some(sl),
            take_profit_pct: Some(tp),
        }
    }

    async fn notify(&self, summary: &RunSummary) -> bool {
        let submitted: Vec<&ExecutionResult> = summary.submitted_results().collect();
        let items: Vec<AlertItem> = submitted
            .iter()
            .map(|r| AlertItem {
                symbol: r.symbol.clone(),
                signal: "BUY".to_string(),
                strength: r.score,
            })
            .collect();

        let subject = format!("{} bracket order(s) submitted", submitted.len());
        let message = submitted
            .iter()
            .filter_map(|r| r.decision.as_ref())
            .map(|d| {
                format!(
                    "{} x{} @ ~${} (stop ${}, target ${})",
                    d.symbol, d.qty, d.entry_price, d.stop_price, d.limit_price
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        let limit = self.config.notify_timeout;
        let send = self.notifier.send_alert(&subject, &message, &items);
        match tokio::time::timeout(limit, send).await {
            Ok(true) => true,
            Ok(false) => {
                tracing::warn!("Trade notification was not delivered");
                false
            }
            Err(_) => {
                tracing::warn!("Trade notification timed out after {:?}", limit);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;
    use risk_gate::Trend;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn bullish(symbol: &str, score: f64) -> CandidatePick {
        CandidatePick::new(symbol, score, Trend::Bullish)
    }

    fn enabled_config() -> EngineConfig {
        EngineConfig {
            auto_trading_enabled: true,
            max_positions: 5,
            trade_amount: dec!(1000),
            min_score: 0.0,
            ..EngineConfig::default()
        }
    }

    struct Harness {
        broker: Arc<FakeBroker>,
        signals: Arc<FakeSignalSource>,
        notifier: Arc<RecordingNotifier>,
        coordinator: ExecutionCoordinator,
    }

    fn harness(config: EngineConfig, broker: FakeBroker, clock: FakeClock, picks: Vec<CandidatePick>) -> Harness {
        let broker = Arc::new(broker);
        let signals = Arc::new(FakeSignalSource::new(picks));
        let notifier = Arc::new(RecordingNotifier::new());
        let coordinator = ExecutionCoordinator::new(
            config,
            broker.clone(),
            Arc::new(clock),
            signals.clone(),
            notifier.clone(),
        );
        Harness {
            broker,
            signals,
            notifier,
            coordinator,
        }
    }

    #[tokio::test]
    async fn disabled_does_nothing() {
        let config = EngineConfig {
            auto_trading_enabled: false,
            ..enabled_config()
        };
        let h = harness(config, FakeBroker::new(), FakeClock::open(), vec![bullish("AAPL", 80.0)]);

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Disabled);
        assert_eq!(h.signals.call_counter().load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(h.broker.submitted().is_empty());
    }

    #[tokio::test]
    async fn market_closed_short_circuits() {
        let broker = FakeBroker::new().with_account(account(dec!(10000)));
        let h = harness(enabled_config(), broker, FakeClock::closed(), vec![bullish("AAPL", 80.0)]);

        let summary = h.coordinator.run(Trigger::Scheduled, false).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::MarketClosed);
        assert_eq!(summary.message, "market closed");
        assert!(summary.results.is_empty());
    }

    #[tokio::test]
    async fn missing_account_is_fatal() {
        let h = harness(enabled_config(), FakeBroker::new(), FakeClock::open(), vec![bullish("AAPL", 80.0)]);

        let err = h.coordinator.run(Trigger::Manual, false).await.unwrap_err();

        assert!(matches!(err, EngineError::AccountUnavailable));
        assert!(h.broker.submitted().is_empty());
    }

    #[tokio::test]
    async fn full_book_skips_scan() {
        let positions = (0..5).map(|i| position(&format!("HELD{}", i), 1)).collect();
        let broker = FakeBroker::new()
            .with_account(account(dec!(10000)))
            .with_positions(positions);
        let h = harness(enabled_config(), broker, FakeClock::open(), vec![bullish("AAPL", 80.0)]);

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::MaxPositionsReached);
        assert_eq!(summary.message, "maximum positions reached");
        assert_eq!(h.signals.call_counter().load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn insufficient_buying_power_skips_everything() {
        let config = EngineConfig {
            trade_amount: dec!(250),
            ..enabled_config()
        };
        let broker = FakeBroker::new()
            .with_account(account(dec!(200)))
            .with_price("AAPL", dec!(10))
            .with_price("MSFT", dec!(10));
        let h = harness(
            config,
            broker,
            FakeClock::open(),
            vec![bullish("AAPL", 80.0), bullish("MSFT", 70.0)],
        );

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();

        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.submitted, 0);
        for result in &summary.results {
            assert_eq!(result.status, ExecutionStatus::Skipped);
            assert_eq!(result.reason.as_deref(), Some("insufficient buying power"));
        }
        assert!(h.broker.submitted().is_empty());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_price_skips_only_that_candidate() {
        let broker = FakeBroker::new()
            .with_account(account(dec!(10000)))
            .with_price("AAPL", dec!(187.33))
            .with_price("NVDA", dec!(120));
        let h = harness(
            enabled_config(),
            broker,
            FakeClock::open(),
            vec![bullish("AAPL", 90.0), bullish("GHOST", 85.0), bullish("NVDA", 80.0)],
        );

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();

        let statuses: Vec<(&str, ExecutionStatus)> = summary
            .results
            .iter()
            .map(|r| (r.symbol.as_str(), r.status))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("AAPL", ExecutionStatus::Submitted),
                ("GHOST", ExecutionStatus::Skipped),
                ("NVDA", ExecutionStatus::Submitted),
            ]
        );
        assert_eq!(summary.results[1].reason.as_deref(), Some("could not get price"));
        assert_eq!(h.broker.submitted(), vec![("AAPL".to_string(), 5), ("NVDA".to_string(), 8)]);
    }

    #[tokio::test]
    async fn submitted_result_carries_bracket_prices() {
        let broker = FakeBroker::new()
            .with_account(account(dec!(10000)))
            .with_price("AAPL", dec!(187.33));
        let h = harness(enabled_config(), broker, FakeClock::open(), vec![bullish("AAPL", 90.0)]);

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();
        let result = &summary.results[0];
        let decision = result.decision.as_ref().unwrap();

        assert_eq!(result.order_id.as_deref(), Some("order-1"));
        assert_eq!(decision.qty, 5);
        assert_eq!(decision.estimated_cost, dec!(936.65));
        assert_eq!(decision.stop_price, dec!(177.96));
        assert_eq!(decision.limit_price, dec!(206.06));
        assert!(decision.stop_price < decision.entry_price);
        assert!(decision.entry_price < decision.limit_price);
        assert_eq!(result.stop_loss_pct, Some(dec!(0.05)));
        assert_eq!(result.take_profit_pct, Some(dec!(0.10)));
    }

    #[tokio::test]
    async fn price_above_trade_amount_is_too_high() {
        let broker = FakeBroker::new()
            .with_account(account(dec!(10000)))
            .with_price("BRK.A", dec!(600000));
        let h = harness(enabled_config(), broker, FakeClock::open(), vec![bullish("BRK.A", 90.0)]);

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();

        assert_eq!(summary.results[0].reason.as_deref(), Some("price too high"));
        assert!(h.broker.submitted().is_empty());
    }

    #[tokio::test]
    async fn rejected_submission_is_failed_and_run_continues() {
        let broker = FakeBroker::new()
            .with_account(account(dec!(10000)))
            .with_price("AAPL", dec!(100))
            .with_price("MSFT", dec!(100))
            .reject_orders_for("AAPL");
        let h = harness(
            enabled_config(),
            broker,
            FakeClock::open(),
            vec![bullish("AAPL", 90.0), bullish("MSFT", 80.0)],
        );

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.submitted, 1);
        assert_eq!(summary.results[0].reason.as_deref(), Some("order submission failed"));
        assert_eq!(summary.results[1].status, ExecutionStatus::Submitted);
    }

    #[tokio::test]
    async fn running_counter_stops_at_depleted_buying_power() {
        let broker = FakeBroker::new()
            .with_account(account(dec!(2500)))
            .with_price("AAA", dec!(100))
            .with_price("BBB", dec!(100))
            .with_price("CCC", dec!(100));
        let h = harness(
            enabled_config(),
            broker,
            FakeClock::open(),
            vec![bullish("AAA", 90.0), bullish("BBB", 80.0), bullish("CCC", 70.0)],
        );

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();

        assert_eq!(summary.submitted, 2);
        assert_eq!(summary.results[2].reason.as_deref(), Some("insufficient buying power"));
        assert_eq!(summary.buying_power_start, Some(dec!(2500)));
        assert_eq!(summary.buying_power_remaining, Some(dec!(500)));
    }

    #[tokio::test]
    async fn snapshot_mode_checks_initial_buying_power_only() {
        let config = EngineConfig {
            track_buying_power: false,
            ..enabled_config()
        };
        let broker = FakeBroker::new()
            .with_account(account(dec!(2500)))
            .with_price("AAA", dec!(100))
            .with_price("BBB", dec!(100))
            .with_price("CCC", dec!(100));
        let h = harness(
            config,
            broker,
            FakeClock::open(),
            vec![bullish("AAA", 90.0), bullish("BBB", 80.0), bullish("CCC", 70.0)],
        );

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();

        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.buying_power_remaining, Some(dec!(2500)));
    }

    #[tokio::test]
    async fn admitted_count_respects_capacity_and_holdings() {
        let broker = FakeBroker::new()
            .with_account(account(dec!(100000)))
            .with_positions(vec![position("AAPL", 3), position("MSFT", 2), position("AMZN", 1)])
            .with_price("NVDA", dec!(100))
            .with_price("META", dec!(100))
            .with_price("AMD", dec!(100));
        let h = harness(
            enabled_config(),
            broker,
            FakeClock::open(),
            vec![
                bullish("AAPL", 99.0),
                bullish("SPY", 98.0),
                bullish("NVDA", 90.0),
                bullish("META", 85.0),
                bullish("AMD", 80.0),
            ],
        );

        let summary = h.coordinator.run(Trigger::Scheduled, false).await.unwrap();

        let symbols: Vec<&str> = summary.results.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["NVDA", "META"]);
        assert_eq!(summary.open_positions + summary.submitted, 5);
        assert_eq!(summary.candidates_scanned, 5);
        assert_eq!(summary.candidates_admitted, 2);
    }

    #[tokio::test]
    async fn signal_failure_aborts_run() {
        let broker = FakeBroker::new()
            .with_account(account(dec!(10000)))
            .with_price("AAPL", dec!(100));
        let h = harness(enabled_config(), broker, FakeClock::open(), vec![bullish("AAPL", 90.0)]);
        h.signals.set_failing(true);

        let err = h.coordinator.run(Trigger::Manual, true).await.unwrap_err();

        assert!(matches!(err, EngineError::SignalSource(_)));
        assert!(h.broker.submitted().is_empty());
    }

    #[tokio::test]
    async fn notifies_submitted_trades() {
        let broker = FakeBroker::new()
            .with_account(account(dec!(10000)))
            .with_price("AAPL", dec!(100));
        let h = harness(enabled_config(), broker, FakeClock::open(), vec![bullish("AAPL", 90.0)]);

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();

        assert!(summary.notified);
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "1 bracket order(s) submitted");
        assert_eq!(sent[0].items[0].symbol, "AAPL");
        assert_eq!(sent[0].items[0].signal, "BUY");
    }

    #[tokio::test]
    async fn notification_failure_is_not_fatal() {
        let broker = Arc::new(
            FakeBroker::new()
                .with_account(account(dec!(10000)))
                .with_price("AAPL", dec!(100)),
        );
        let coordinator = ExecutionCoordinator::new(
            enabled_config(),
            broker.clone(),
            Arc::new(FakeClock::open()),
            Arc::new(FakeSignalSource::new(vec![bullish("AAPL", 90.0)])),
            Arc::new(RecordingNotifier::failing()),
        );

        let summary = coordinator.run(Trigger::Manual, false).await.unwrap();

        assert_eq!(summary.submitted, 1);
        assert!(!summary.notified);
    }

    #[tokio::test]
    async fn stalled_notification_does_not_hold_the_run() {
        let broker = Arc::new(
            FakeBroker::new()
                .with_account(account(dec!(10000)))
                .with_price("AAPL", dec!(100)),
        );
        let notifier = Arc::new(RecordingNotifier::hanging());
        let config = EngineConfig {
            notify_timeout: Duration::from_millis(50),
            ..enabled_config()
        };
        let coordinator = ExecutionCoordinator::new(
            config,
            broker.clone(),
            Arc::new(FakeClock::open()),
            Arc::new(FakeSignalSource::new(vec![bullish("AAPL", 90.0)])),
            notifier.clone(),
        );

        let run = coordinator.run(Trigger::Manual, false);
        let summary = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run should finish once the alert times out")
            .unwrap();

        assert_eq!(broker.submitted(), vec![("AAPL".to_string(), 10)]);
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert!(!summary.notified);
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn unreadable_positions_are_fatal() {
        let broker = FakeBroker::new()
            .with_account(account(dec!(10000)))
            .with_positions(vec![position("AAPL", 3)])
            .with_price("AAPL", dec!(100))
            .with_price("MSFT", dec!(100))
            .fail_positions();
        let h = harness(
            enabled_config(),
            broker,
            FakeClock::open(),
            vec![bullish("AAPL", 90.0), bullish("MSFT", 80.0)],
        );

        let err = h.coordinator.run(Trigger::Scheduled, false).await.unwrap_err();

        assert!(matches!(err, EngineError::PositionsUnavailable));
        assert!(h.broker.submitted().is_empty());
        assert_eq!(h.signals.call_counter().load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn blocked_account_submits_nothing() {
        let mut blocked = account(dec!(10000));
        blocked.trading_blocked = true;
        let broker = FakeBroker::new()
            .with_account(blocked)
            .with_price("AAPL", dec!(100));
        let h = harness(enabled_config(), broker, FakeClock::open(), vec![bullish("AAPL", 90.0)]);

        let summary = h.coordinator.run(Trigger::Manual, false).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::TradingBlocked);
        assert_eq!(summary.message, "account blocked from trading");
        assert!(h.broker.submitted().is_empty());
        assert_eq!(h.signals.call_counter().load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
