//! Write-ahead log for password rotations.
//!
//! A WAL entry is written before any externally observable side effect (the
//! directory write) and deleted only after the role record has been
//! persisted with the new password. Recovery after a crash re-drives the
//! same password instead of generating a new one, so a password that
//! reached the directory is never lost.

use chrono::{DateTime, Utc};
use dirvault_directory::SecureString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::{EngineError, Result};
use crate::host::{StorageBackend, get_json, put_json};

/// Storage prefix for WAL entries.
pub const WAL_PREFIX: &str = "wal/";

/// WAL kind used for static account rotations. Other kinds belong to other
/// engine features and are ignored on load.
pub const STATIC_ROTATION_WAL: &str = "static-rotation-key";

/// The host-owned WAL envelope stored at `wal/<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEnvelope {
    pub kind: String,
    pub data: serde_json::Value,
    /// Unix seconds at which the WAL was created.
    pub created_at: i64,
}

/// Payload of a static-rotation WAL entry.
///
/// Every field defaults on decode so entries written by older versions
/// (without the policy or dual-account fields) still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotationWal {
    #[serde(default)]
    pub role_name: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub dn: String,

    #[serde(default)]
    pub new_password: SecureString,

    /// Policy that generated `new_password`; a mismatch with the current
    /// configuration invalidates the entry.
    #[serde(default)]
    pub password_policy: String,

    /// The role's `last_vault_rotation` when this WAL was written. `None`
    /// can only come from a role that was never successfully created.
    #[serde(default)]
    pub last_vault_rotation: Option<DateTime<Utc>>,

    // Dual-account initial-setup fields.
    #[serde(default, skip_serializing_if = "SecureString::is_empty")]
    pub new_password_b: SecureString,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username_b: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dn_b: String,
}

/// A WAL entry loaded from storage together with its envelope metadata.
#[derive(Debug, Clone)]
pub struct LoadedWal {
    pub id: String,
    pub created_at: i64,
    pub entry: RotationWal,
}

/// Persist a new static-rotation WAL entry, returning its id.
pub async fn put_rotation_wal(
    storage: &dyn StorageBackend,
    entry: &RotationWal,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let envelope = WalEnvelope {
        kind: STATIC_ROTATION_WAL.to_string(),
        data: serde_json::to_value(entry)?,
        created_at: Utc::now().timestamp(),
    };
    put_json(storage, &format!("{WAL_PREFIX}{id}"), &envelope).await?;
    Ok(id)
}

/// List all WAL ids, regardless of kind.
pub async fn list_wal_ids(storage: &dyn StorageBackend) -> Result<Vec<String>> {
    let children = storage.list(WAL_PREFIX).await?;
    Ok(children
        .into_iter()
        .filter(|child| !child.ends_with('/'))
        .collect())
}

/// Delete a WAL entry by id. Deleting a missing entry succeeds.
pub async fn delete_wal(storage: &dyn StorageBackend, id: &str) -> Result<()> {
    storage.delete(&format!("{WAL_PREFIX}{id}")).await
}

/// Load a WAL entry by id if it exists and is a static-rotation entry.
pub async fn find_rotation_wal(
    storage: &dyn StorageBackend,
    id: &str,
) -> Result<Option<LoadedWal>> {
    let Some(envelope) = get_json::<WalEnvelope>(storage, &format!("{WAL_PREFIX}{id}")).await?
    else {
        return Ok(None);
    };
    if envelope.kind != STATIC_ROTATION_WAL {
        return Ok(None);
    }

    let entry: RotationWal = serde_json::from_value(envelope.data)
        .map_err(|e| EngineError::wal_corrupt(id, e.to_string()))?;
    Ok(Some(LoadedWal {
        id: id.to_string(),
        created_at: envelope.created_at,
        entry,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    fn wal_for(role: &str) -> RotationWal {
        RotationWal {
            role_name: role.to_string(),
            username: "bob".to_string(),
            dn: "uid=bob,dc=example,dc=com".to_string(),
            new_password: SecureString::new("next-password"),
            last_vault_rotation: Some(Utc::now()),
            ..RotationWal::default()
        }
    }

    #[tokio::test]
    async fn test_put_list_find_delete() {
        let storage = MemoryStorage::new();

        let id = put_rotation_wal(storage.as_ref(), &wal_for("hashicorp"))
            .await
            .unwrap();
        assert_eq!(list_wal_ids(storage.as_ref()).await.unwrap(), vec![id.clone()]);

        let loaded = find_rotation_wal(storage.as_ref(), &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.entry.role_name, "hashicorp");
        assert_eq!(loaded.entry.new_password.expose(), "next-password");
        assert!(loaded.created_at > 0);

        delete_wal(storage.as_ref(), &id).await.unwrap();
        assert!(find_rotation_wal(storage.as_ref(), &id)
            .await
            .unwrap()
            .is_none());
        assert!(list_wal_ids(storage.as_ref()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_kinds_are_ignored() {
        let storage = MemoryStorage::new();
        let envelope = WalEnvelope {
            kind: "lease-revocation".to_string(),
            data: serde_json::json!({"anything": true}),
            created_at: Utc::now().timestamp(),
        };
        put_json(storage.as_ref(), "wal/other", &envelope)
            .await
            .unwrap();

        assert!(find_rotation_wal(storage.as_ref(), "other")
            .await
            .unwrap()
            .is_none());
        // But the id still lists; the engine filters by kind.
        assert_eq!(list_wal_ids(storage.as_ref()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forward_compatible_decode() {
        let storage = MemoryStorage::new();
        // A minimal entry written by an old version: no policy, no dual
        // fields, no rotation time.
        let envelope = WalEnvelope {
            kind: STATIC_ROTATION_WAL.to_string(),
            data: serde_json::json!({
                "role_name": "legacy",
                "username": "bob",
                "new_password": "pw",
            }),
            created_at: 42,
        };
        put_json(storage.as_ref(), "wal/legacy-id", &envelope)
            .await
            .unwrap();

        let loaded = find_rotation_wal(storage.as_ref(), "legacy-id")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.entry.password_policy, "");
        assert_eq!(loaded.entry.last_vault_rotation, None);
        assert!(loaded.entry.new_password_b.is_empty());
    }
}
