use std::sync::Arc;

use alpaca_broker::AlpacaClient;
use anyhow::{Context, Result};
use broker_trait::{BrokerAccount, BrokerClient, BrokerOrder, BrokerPosition, MarketClock, OrderStatusFilter};
use notification_service::{NotificationConfig, NotificationService};
use serde::Serialize;

use crate::config::EngineConfig;
use crate::coordinator::ExecutionCoordinator;
use crate::error::EngineError;
use crate::lease::RunLeases;
use crate::liquidation::LiquidationController;
use crate::notifier::Notifier;
use crate::signal_source::{CachedSignalSource, HttpSignalSource, SignalSource};
use crate::types::{LiquidationSummary, RunSummary, Trigger};

/// Point-in-time view of the trading account.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub broker: String,
    pub paper: bool,
    pub auto_trading_enabled: bool,
    pub market_open: bool,
    pub run_in_progress: bool,
    pub account: Option<BrokerAccount>,
    pub positions: Vec<BrokerPosition>,
    pub recent_orders: Vec<BrokerOrder>,
}

/// Entry point for every trigger. Each execute or liquidate call holds the
/// account's run lease for its whole duration.
pub struct TradingEngine {
    broker: Arc<dyn BrokerClient>,
    clock: Arc<dyn MarketClock>,
    coordinator: ExecutionCoordinator,
    liquidation: LiquidationController,
    leases: RunLeases,
    lease_key: String,
}

impl TradingEngine {
    pub fn new(
        config: EngineConfig,
        broker: Arc<dyn BrokerClient>,
        clock: Arc<dyn MarketClock>,
        signals: Arc<dyn SignalSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let lease_key = config.account_key();
        Self {
            coordinator: ExecutionCoordinator::new(
                config,
                broker.clone(),
                clock.clone(),
                signals,
                notifier,
            ),
            liquidation: LiquidationController::new(broker.clone(), clock.clone()),
            broker,
            clock,
            leases: RunLeases::new(),
            lease_key,
        }
    }

    /// Wire the Alpaca client, the cached HTTP scanner and the configured
    /// notification channels.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let alpaca = Arc::new(AlpacaClient::new(
            config.alpaca_api_key.clone(),
            config.alpaca_secret_key.clone(),
            config.alpaca_base_url.clone(),
            config.alpaca_data_url.clone(),
            config.broker_timeout,
        )?);

        let url = config
            .signal_source_url
            .clone()
            .context("SIGNAL_SOURCE_URL not set")?;
        let signals = CachedSignalSource::new(
            HttpSignalSource::new(url, config.broker_timeout)?,
            config.scan_cache_ttl,
        );

        let notifier = NotificationService::new(&NotificationConfig::from_env());

        tracing::info!(
            "Trading engine ready ({} mode, max {} positions, ${} per trade)",
            if alpaca.is_paper() { "paper" } else { "LIVE" },
            config.max_positions,
            config.trade_amount
        );

        Ok(Self::new(
            config,
            alpaca.clone(),
            alpaca,
            Arc::new(signals),
            Arc::new(notifier),
        ))
    }

    pub fn config(&self) -> &EngineConfig {
        self.coordinator.config()
    }

    pub fn leases(&self) -> &RunLeases {
        &self.leases
    }

    pub fn lease_key(&self) -> &str {
        &self.lease_key
    }

    pub async fn execute(&self, trigger: Trigger, force_refresh: bool) -> Result<RunSummary, EngineError> {
        let _lease = self.leases.try_acquire(&self.lease_key)?;
        self.coordinator.run(trigger, force_refresh).await
    }

    pub async fn liquidate(&self) -> Result<LiquidationSummary, EngineError> {
        let _lease = self.leases.try_acquire(&self.lease_key)?;
        tracing::warn!("Portfolio reset requested for {}", self.lease_key);
        Ok(self.liquidation.liquidate().await)
    }

    pub async fn status(&self, order_limit: usize) -> StatusSnapshot {
        let (account, positions, recent_orders, market_open) = tokio::join!(
            self.broker.get_account(),
            self.broker.get_positions(),
            self.broker.get_orders(OrderStatusFilter::All, Some(order_limit)),
            self.clock.is_open(),
        );

        StatusSnapshot {
            broker: self.broker.broker_name().to_string(),
            paper: self.broker.is_paper(),
            auto_trading_enabled: self.config().auto_trading_enabled,
            market_open,
            run_in_progress: self.leases.is_held(&self.lease_key),
            account,
            positions,
            recent_orders,
        }
    }
}
