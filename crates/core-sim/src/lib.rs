mod config;
mod generators;

pub use config::{SimConfig, SimConfigError};
pub use generators::{TradeGenerator, TradeIntervalGenerator, TradeOutcome};
