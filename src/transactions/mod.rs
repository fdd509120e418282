//! Services settling items on chain.

pub mod fees;
mod handler;
pub use handler::SettlementHandler;
mod heartbeat;
pub use heartbeat::{HeartBeat, HeartBeatHandler};
mod metrics;
pub use metrics::{HeartBeatMetrics, RelayMetrics, SettlementMetrics};
mod monitor;
pub use monitor::{ConfirmationResult, ResendFn, TransactionConfirmationMonitor};
mod relayer;
pub use relayer::{RelayServer, RelayStats, TransactionRelayer};
mod worker;
pub use worker::{SettlementWorker, Settler};
