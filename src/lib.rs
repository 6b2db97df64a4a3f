//! Clock Sync Gateway
//!
//! Holds many long-lived WebSocket clients and, once a configured number of
//! them are connected at the same time, periodically sends every client the
//! current Unix time in milliseconds so they can agree on a shared "now".
//!
//! - `registry`: sharded set of live connections
//! - `scheduler`: threshold check and timestamp fan-out
//! - `lifecycle`: register on accept, unregister on close
//! - `server`: WebSocket acceptor, health endpoints, shutdown

pub mod config;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod metrics;
pub mod registry;
pub mod scheduler;
pub mod server;

pub use config::SyncConfig;
pub use error::SyncError;
pub use registry::{Connection, ConnectionId, MessageSink, Registry, ShardAssignment};
pub use scheduler::{BroadcastScheduler, SchedulerSettings, TickOutcome};
pub use server::SyncServer;
