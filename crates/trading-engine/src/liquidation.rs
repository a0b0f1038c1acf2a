use std::sync::Arc;

use broker_trait::{BrokerClient, MarketClock, OrderStatusFilter};
use futures_util::future::join_all;

use crate::types::{ItemFailure, ItemKind, LiquidationSummary};

/// Upper bound the broker accepts for one order listing.
const MAX_OPEN_ORDERS: usize = 500;

/// Two-phase portfolio reset: cancel every open order, then close every
/// position if the market is open. Each cancel and close is isolated, so one
/// refusal never hides the outcome of the others.
pub struct LiquidationController {
    broker: Arc<dyn BrokerClient>,
    clock: Arc<dyn MarketClock>,
}

impl LiquidationController {
    pub fn new(broker: Arc<dyn BrokerClient>, clock: Arc<dyn MarketClock>) -> Self {
        Self { broker, clock }
    }

    pub async fn liquidate(&self) -> LiquidationSummary {
        let mut summary = LiquidationSummary::default();

        self.cancel_open_orders(&mut summary).await;

        summary.market_open = self.clock.is_open().await;
        let positions = self.broker.get_positions().await;

        if summary.market_open {
            let broker = &self.broker;
            let closes = positions.iter().map(|p| async move {
                let closed = broker.close_position(&p.symbol).await;
                (p.symbol.clone(), closed)
            });

            for (symbol, closed) in join_all(closes).await {
                if closed {
                    summary.positions_closed += 1;
                    summary.closed_symbols.push(symbol);
                } else {
                    summary.positions_failed += 1;
                    summary.failed_items.push(ItemFailure {
                        kind: ItemKind::Position,
                        id: symbol,
                    });
                }
            }
        } else if !positions.is_empty() {
            tracing::info!(
                "Market closed, leaving {} positions open until the next session",
                positions.len()
            );
            summary.positions_pending = positions.len();
            summary.pending_symbols = positions.into_iter().map(|p| p.symbol).collect();
        }

        tracing::info!(
            "Liquidation: {} orders cancelled ({} failed), {} positions closed ({} failed, {} pending)",
            summary.orders_cancelled,
            summary.orders_failed,
            summary.positions_closed,
            summary.positions_failed,
            summary.positions_pending
        );
        summary
    }

    async fn cancel_open_orders(&self, summary: &mut LiquidationSummary) {
        let orders = self
            .broker
            .get_orders(OrderStatusFilter::Open, Some(MAX_OPEN_ORDERS))
            .await;
        if orders.is_empty() {
            return;
        }

        let broker = &self.broker;
        let cancels = orders.iter().map(|o| async move {
            let cancelled = broker.cancel_order(&o.id).await;
            (o.id.clone(), cancelled)
        });

        for (id, cancelled) in join_all(cancels).await {
            if cancelled {
                summary.orders_cancelled += 1;
                summary.cancelled_order_ids.push(id);
            } else {
                tracing::warn!("Order {} could not be cancelled", id);
                summary.orders_failed += 1;
                summary.failed_items.push(ItemFailure {
                    kind: ItemKind::Order,
                    id,
                });
            }
        }
    }
}
