//! Ports provided by the plugin host.
//!
//! The engine never talks to the host directly: storage, password policies,
//! replication state and lifecycle events all arrive through these traits.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::core::error::{EngineError, Result};

/// Host-provided persistent storage.
///
/// Keys are hierarchical strings (`static-role/team/app`); values are opaque
/// bytes (the engine stores JSON). Per-key puts and deletes are assumed
/// linearizable, but there are no multi-key transactions; the engine's WAL
/// covers the gap.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Read a value. `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, overwriting any existing one.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a key. Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List the immediate children of a prefix, lexicographically sorted.
    /// Children that are themselves prefixes are reported with a trailing
    /// slash (`team/`).
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Read and JSON-decode a stored record.
pub async fn get_json<T: DeserializeOwned>(
    storage: &dyn StorageBackend,
    key: &str,
) -> Result<Option<T>> {
    match storage.get(key).await? {
        Some(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .map_err(|e| EngineError::storage("decode", format!("{key}: {e}")))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// JSON-encode and write a record.
pub async fn put_json<T: Serialize>(
    storage: &dyn StorageBackend,
    key: &str,
    value: &T,
) -> Result<()> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| EngineError::storage("encode", format!("{key}: {e}")))?;
    storage.put(key, bytes).await
}

/// Host capabilities beyond storage.
#[async_trait]
pub trait SystemView: Send + Sync {
    /// Render a password from a named host policy.
    async fn generate_password_from_policy(&self, policy_name: &str) -> Result<String>;

    /// True when this instance is allowed to drive rotations: the active
    /// primary or a local mount. Perf/DR standbys and performance-replication
    /// secondaries return false. This is a capability, not cluster state:
    /// the engine treats a `false` as "never start the ticker".
    fn active_rotator(&self) -> bool;

    /// Default lease TTL applied when a record does not configure one.
    fn default_lease_ttl(&self) -> Duration;

    /// Maximum lease TTL.
    fn max_lease_ttl(&self) -> Duration;
}

/// Sink for engine lifecycle events (`rotate`, `rotate-fail`,
/// `dual-account-grace-period-end`).
pub trait EventSink: Send + Sync {
    fn emit(&self, event_type: &str, role_name: &str, success: bool);
}

/// Event sink that drops everything.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event_type: &str, _role_name: &str, _success: bool) {}
}
