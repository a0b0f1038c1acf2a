pub mod gate;
pub mod models;

pub use gate::{default_exclusions, RiskGate};
pub use models::*;
