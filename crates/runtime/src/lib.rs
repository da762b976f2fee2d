pub mod engine;
pub mod events;
pub mod metrics;
pub mod registry;
pub mod router;
pub mod scheduler;

pub use engine::{spawn, Connection, EngineError, EngineHandle, EngineOptions, EngineSnapshot};
pub use events::{
    parse_control_message, ControlError, ControlMessage, DashboardEvent, DashboardKind,
    ServerEvent, StartInvestment, StopInvestment, TradeEvent,
};
pub use registry::ConnectionId;
