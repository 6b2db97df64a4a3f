//! Connection registry
//!
//! A fixed set of independently locked shards holding the live client
//! connections, plus the policy that spreads new connections over them.

mod connection;
mod pool;

pub use connection::{Connection, ConnectionId, MessageSink, SinkError};
pub use pool::{Registry, ShardAssignment};
