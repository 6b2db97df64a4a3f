//! Sharded connection pool
//!
//! Each shard is an ordered `Vec` behind its own lock. No operation ever holds
//! two shard locks at once, and no lock is held across an `.await`.

use crate::registry::connection::Connection;

use parking_lot::Mutex;
use rand::Rng;
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Policy for picking the shard of a new connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardAssignment {
    /// Uniformly random shard per connection
    #[default]
    Random,
    /// Next shard in turn
    RoundRobin,
}

type Shard = Mutex<Vec<Arc<Connection>>>;

/// Registry of live connections, partitioned into a fixed number of shards
pub struct Registry {
    shards: Box<[Shard]>,
    assignment: ShardAssignment,
    cursor: AtomicUsize,
}

impl Registry {
    /// Create a registry with `shard_count` empty shards
    ///
    /// # Panics
    ///
    /// Panics if `shard_count` is zero.
    pub fn new(shard_count: usize, assignment: ShardAssignment) -> Self {
        assert!(shard_count > 0, "Registry requires at least one shard");

        let shards = (0..shard_count)
            .map(|_| Mutex::new(Vec::new()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        info!(shard_count, ?assignment, "Connection registry created");

        Self {
            shards,
            assignment,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Number of shards
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn pick_shard(&self) -> usize {
        match self.assignment {
            ShardAssignment::Random => rand::thread_rng().gen_range(0..self.shards.len()),
            ShardAssignment::RoundRobin => {
                self.cursor.fetch_add(1, Ordering::Relaxed) % self.shards.len()
            }
        }
    }

    /// Add a connection to a shard and return that shard's index.
    ///
    /// The caller keeps the index and passes it back to [`Registry::unregister`].
    pub fn register(&self, conn: Arc<Connection>) -> usize {
        let index = self.pick_shard();
        let id = conn.id();
        let size = {
            let mut shard = self.shards[index].lock();
            shard.push(conn);
            shard.len()
        };
        debug!(connection_id = %id, shard = index, shard_size = size, "Connection registered");
        index
    }

    /// Remove the first entry equal to `conn` from shard `index`.
    ///
    /// Only that shard is searched. Returns false if nothing was removed,
    /// so repeated calls are harmless.
    pub fn unregister(&self, conn: &Connection, index: usize) -> bool {
        let Some(shard) = self.shards.get(index) else {
            return false;
        };

        let removed = {
            let mut shard = shard.lock();
            match shard.iter().position(|c| c.id() == conn.id()) {
                Some(pos) => {
                    shard.remove(pos);
                    true
                }
                None => false,
            }
        };

        if removed {
            debug!(connection_id = %conn.id(), shard = index, "Connection unregistered");
        }
        removed
    }

    /// Sum of all shard sizes, taking each shard lock in turn.
    ///
    /// Not an atomic view: concurrent connects/disconnects may land between
    /// two shards being read.
    pub fn total_count(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Per-shard sizes, in shard order
    pub fn shard_sizes(&self) -> Vec<usize> {
        self.shards.iter().map(|s| s.lock().len()).collect()
    }

    /// Copy of one shard's active members, taken under its lock
    pub fn shard_snapshot(&self, index: usize) -> Vec<Arc<Connection>> {
        self.shards
            .get(index)
            .map(|shard| {
                shard
                    .lock()
                    .iter()
                    .filter(|c| !c.is_closed())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Active members of every shard, one snapshot per shard
    pub fn snapshot(&self) -> Vec<Vec<Arc<Connection>>> {
        (0..self.shards.len())
            .map(|index| self.shard_snapshot(index))
            .collect()
    }

    /// Call `f` on every active connection.
    ///
    /// Each shard is snapshotted under its lock and `f` runs after the lock
    /// is released, so `f` may freely register or unregister.
    pub fn for_each_connection<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Connection>),
    {
        for index in 0..self.shards.len() {
            for conn in self.shard_snapshot(index) {
                f(&conn);
            }
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("shard_count", &self.shards.len())
            .field("assignment", &self.assignment)
            .finish()
    }
}
