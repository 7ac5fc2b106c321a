//! Sharded per-role lock table.
//!
//! Rotations and role mutations serialize per role name. A fixed shard
//! count keeps the table allocation-free at runtime; distinct roles hashing
//! to the same shard merely contend, they never deadlock.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tokio::sync::Mutex;

/// Number of lock shards.
pub const LOCK_SHARDS: usize = 256;

/// Fixed-size table of async mutexes keyed by hashed role name.
pub struct LockTable {
    shards: Vec<Mutex<()>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    /// The lock guarding the given key.
    pub fn lock_for(&self, key: &str) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let shard = (hasher.finish() as usize) % LOCK_SHARDS;
        &self.shards[shard]
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
