use std::time::Duration;

use rand::Rng;

use crate::config::SimConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeOutcome {
    pub is_win: bool,
    pub profit_loss: f64,
}

/// Draws synthetic win/loss outcomes. Holds only the distribution
/// parameters, so one instance can serve any number of sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeGenerator {
    config: SimConfig,
}

impl TradeGenerator {
    pub fn new(config: SimConfig) -> Self {
        Self { config }
    }

    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> TradeOutcome {
        let is_win = rng.gen_bool(self.config.win_probability);
        let profit_loss = if is_win {
            truncate_to_cents(rng.gen_range(self.config.win_profit.clone()))
        } else {
            -truncate_to_cents(rng.gen_range(self.config.loss_magnitude.clone()))
        };

        TradeOutcome {
            is_win,
            profit_loss,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeIntervalGenerator {
    initial_delay_ms: u64,
    min_interval_ms: u64,
    max_interval_ms: u64,
}

impl TradeIntervalGenerator {
    pub fn new(config: &SimConfig) -> Self {
        Self {
            initial_delay_ms: config.initial_delay_ms,
            min_interval_ms: config.min_interval_ms,
            max_interval_ms: config.max_interval_ms,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        Duration::from_millis(rng.gen_range(self.min_interval_ms..self.max_interval_ms))
    }
}

// Truncation keeps the amount inside the half-open draw range.
fn truncate_to_cents(value: f64) -> f64 {
    (value * 100.0).trunc() / 100.0
}
