pub mod client;
pub mod models;

pub use broker_trait::{BrokerClient, MarketClock};
pub use client::AlpacaClient;
pub use models::*;
