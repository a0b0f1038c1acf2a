//! Automated bracket-order execution engine.
//!
//! Takes ranked candidates from a [`SignalSource`], filters them through the
//! risk gate, and submits one bracket order per admitted candidate through a
//! [`broker_trait::BrokerClient`]. Also provides the two-phase portfolio reset.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod lease;
pub mod liquidation;
pub mod notifier;
pub mod signal_source;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cache::TtlCache;
pub use config::EngineConfig;
pub use coordinator::ExecutionCoordinator;
pub use engine::{StatusSnapshot, TradingEngine};
pub use error::EngineError;
pub use lease::{RunLease, RunLeases};
pub use liquidation::LiquidationController;
pub use notifier::Notifier;
pub use signal_source::{CachedSignalSource, HttpSignalSource, SignalSource};
pub use types::*;
