use serde::Serialize;

use crate::events::TradeEvent;

#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeStats {
    pub trades: u64,
    pub wins: u64,
    pub losses: u64,
    pub net_profit_loss: f64,
}

impl TradeStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, trade: &TradeEvent) {
        self.trades += 1;
        if trade.is_win {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.net_profit_loss += trade.profit_loss;
    }

    pub fn win_rate(&self) -> Option<f64> {
        if self.trades == 0 {
            return None;
        }

        Some(self.wins as f64 / self.trades as f64)
    }
}
