use std::collections::HashMap;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use crate::events::{DashboardEvent, StartInvestment, StopInvestment, TradeEvent};
use crate::registry::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub direct: bool,
    pub observers: usize,
}

#[derive(Debug)]
pub struct BroadcastRouter {
    outboxes: HashMap<ConnectionId, mpsc::Sender<TradeEvent>>,
    dashboard: broadcast::Sender<DashboardEvent>,
}

impl BroadcastRouter {
    pub fn new(dashboard: broadcast::Sender<DashboardEvent>) -> Self {
        Self {
            outboxes: HashMap::new(),
            dashboard,
        }
    }

    pub fn attach(&mut self, connection: ConnectionId, outbox: mpsc::Sender<TradeEvent>) {
        self.outboxes.insert(connection, outbox);
    }

    pub fn detach(&mut self, connection: ConnectionId) -> bool {
        self.outboxes.remove(&connection).is_some()
    }

    pub fn connections(&self) -> usize {
        self.outboxes.len()
    }

    pub fn deliver(&self, trade: TradeEvent, owner: ConnectionId, active_count: usize) -> Delivery {
        let direct = self.send_direct(&trade, owner);
        let observers = self.publish(DashboardEvent::trade(trade, active_count));

        Delivery { direct, observers }
    }

    pub fn announce_start(&self, request: StartInvestment, active_count: usize) -> usize {
        self.publish(DashboardEvent::start(request, active_count))
    }

    pub fn announce_stop(&self, request: StopInvestment, active_count: usize) -> usize {
        self.publish(DashboardEvent::stop(request, active_count))
    }

    fn send_direct(&self, trade: &TradeEvent, owner: ConnectionId) -> bool {
        let Some(outbox) = self.outboxes.get(&owner) else {
            debug!(connection = owner.0, investment_id = %trade.investment_id, "owner not attached, trade not delivered directly");
            return false;
        };

        match outbox.try_send(trade.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection = owner.0, investment_id = %trade.investment_id, "owner outbox full, trade dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection = owner.0, investment_id = %trade.investment_id, "owner outbox closed, trade dropped");
                false
            }
        }
    }

    // With no subscribed observer the event is simply dropped.
    fn publish(&self, event: DashboardEvent) -> usize {
        self.dashboard.send(event).unwrap_or(0)
    }
}
