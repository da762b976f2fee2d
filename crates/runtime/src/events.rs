use core_sim::TradeOutcome;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeEvent {
    pub investment_id: String,
    pub is_win: bool,
    pub profit_loss: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl TradeEvent {
    pub fn new(investment_id: impl Into<String>, outcome: TradeOutcome, timestamp: OffsetDateTime) -> Self {
        Self {
            investment_id: investment_id.into(),
            is_win: outcome.is_win,
            profit_loss: outcome.profit_loss,
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInvestment {
    #[serde(default)]
    pub investment_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopInvestment {
    #[serde(default)]
    pub investment_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ControlMessage {
    StartInvestment(StartInvestment),
    StopInvestment(StopInvestment),
}

impl ControlMessage {
    pub fn investment_id(&self) -> &str {
        match self {
            Self::StartInvestment(start) => &start.investment_id,
            Self::StopInvestment(stop) => &stop.investment_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("malformed control message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("control message is missing investmentId")]
    MissingInvestmentId,
}

pub fn parse_control_message(text: &str) -> Result<ControlMessage, ControlError> {
    let message: ControlMessage = serde_json::from_str(text)?;
    if message.investment_id().trim().is_empty() {
        return Err(ControlError::MissingInvestmentId);
    }

    Ok(message)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DashboardKind {
    Start,
    Stop,
    Trade,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DashboardPayload {
    Trade(TradeEvent),
    Start(StartInvestment),
    Stop(StopInvestment),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardEvent {
    #[serde(rename = "type")]
    pub kind: DashboardKind,
    pub payload: DashboardPayload,
    pub active_count: usize,
}

impl DashboardEvent {
    pub fn start(request: StartInvestment, active_count: usize) -> Self {
        Self {
            kind: DashboardKind::Start,
            payload: DashboardPayload::Start(request),
            active_count,
        }
    }

    pub fn stop(request: StopInvestment, active_count: usize) -> Self {
        Self {
            kind: DashboardKind::Stop,
            payload: DashboardPayload::Stop(request),
            active_count,
        }
    }

    pub fn trade(trade: TradeEvent, active_count: usize) -> Self {
        Self {
            kind: DashboardKind::Trade,
            payload: DashboardPayload::Trade(trade),
            active_count,
        }
    }

    pub fn investment_id(&self) -> &str {
        match &self.payload {
            DashboardPayload::Trade(trade) => &trade.investment_id,
            DashboardPayload::Start(start) => &start.investment_id,
            DashboardPayload::Stop(stop) => &stop.investment_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    TradeUpdate(TradeEvent),
    DashboardUpdate(DashboardEvent),
}
