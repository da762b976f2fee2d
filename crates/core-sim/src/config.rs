use std::ops::Range;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq)]
pub struct SimConfig {
    pub win_probability: f64,
    pub win_profit: Range<f64>,
    pub loss_magnitude: Range<f64>,
    pub initial_delay_ms: u64,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            win_probability: 0.6,
            win_profit: 10.0..60.0,
            loss_magnitude: 5.0..35.0,
            initial_delay_ms: 1_000,
            min_interval_ms: 500,
            max_interval_ms: 1_200,
        }
    }
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum SimConfigError {
    #[error("win probability must be a finite value between 0 and 1")]
    InvalidWinProbability,
    #[error("win profit range must be finite, non-negative and non-empty")]
    InvalidWinProfit,
    #[error("loss magnitude range must be finite, non-negative and non-empty")]
    InvalidLossMagnitude,
    #[error("trade interval must satisfy 0 < min < max")]
    InvalidInterval,
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimConfigError> {
        if !self.win_probability.is_finite() || !(0.0..=1.0).contains(&self.win_probability) {
            return Err(SimConfigError::InvalidWinProbability);
        }
        if !is_valid_amount_range(&self.win_profit) {
            return Err(SimConfigError::InvalidWinProfit);
        }
        if !is_valid_amount_range(&self.loss_magnitude) {
            return Err(SimConfigError::InvalidLossMagnitude);
        }
        if self.min_interval_ms == 0 || self.min_interval_ms >= self.max_interval_ms {
            return Err(SimConfigError::InvalidInterval);
        }

        Ok(())
    }
}

fn is_valid_amount_range(range: &Range<f64>) -> bool {
    range.start.is_finite() && range.end.is_finite() && range.start >= 0.0 && range.start < range.end
}
