//! Typed access to persisted records at their storage prefixes.

use crate::core::config::EngineConfig;
use crate::core::error::Result;
use crate::core::library::{CheckOut, LibrarySet};
use crate::core::role::StaticRole;
use crate::host::{StorageBackend, get_json, put_json};
use crate::paths::dynamic_roles::DynamicRole;

/// Storage prefix for static roles.
pub const STATIC_ROLE_PREFIX: &str = "static-role/";

/// Storage prefix for library sets.
pub const LIBRARY_PREFIX: &str = "library/";

/// Storage prefix for per-account check-out state.
pub const CHECKOUT_PREFIX: &str = "library-checkout/";

/// Storage prefix for dynamic roles.
pub const DYNAMIC_ROLE_PREFIX: &str = "role/";

/// Storage key for the engine configuration.
pub const CONFIG_KEY: &str = "config";

pub async fn load_static_role(
    storage: &dyn StorageBackend,
    name: &str,
) -> Result<Option<StaticRole>> {
    get_json(storage, &format!("{STATIC_ROLE_PREFIX}{name}")).await
}

pub async fn store_static_role(
    storage: &dyn StorageBackend,
    name: &str,
    role: &StaticRole,
) -> Result<()> {
    put_json(storage, &format!("{STATIC_ROLE_PREFIX}{name}"), role).await
}

pub async fn delete_static_role(storage: &dyn StorageBackend, name: &str) -> Result<()> {
    storage.delete(&format!("{STATIC_ROLE_PREFIX}{name}")).await
}

/// Recursively collect the full names of every static role.
pub async fn static_role_names(storage: &dyn StorageBackend) -> Result<Vec<String>> {
    collect_names(storage, STATIC_ROLE_PREFIX, "").await
}

pub async fn load_library_set(
    storage: &dyn StorageBackend,
    name: &str,
) -> Result<Option<LibrarySet>> {
    get_json(storage, &format!("{LIBRARY_PREFIX}{name}")).await
}

pub async fn store_library_set(
    storage: &dyn StorageBackend,
    name: &str,
    set: &LibrarySet,
) -> Result<()> {
    put_json(storage, &format!("{LIBRARY_PREFIX}{name}"), set).await
}

pub async fn delete_library_set(storage: &dyn StorageBackend, name: &str) -> Result<()> {
    storage.delete(&format!("{LIBRARY_PREFIX}{name}")).await
}

/// Recursively collect the full names of every library set.
pub async fn library_set_names(storage: &dyn StorageBackend) -> Result<Vec<String>> {
    collect_names(storage, LIBRARY_PREFIX, "").await
}

pub async fn load_check_out(
    storage: &dyn StorageBackend,
    set_name: &str,
    account: &str,
) -> Result<Option<CheckOut>> {
    get_json(storage, &format!("{CHECKOUT_PREFIX}{set_name}/{account}")).await
}

pub async fn store_check_out(
    storage: &dyn StorageBackend,
    set_name: &str,
    account: &str,
    check_out: &CheckOut,
) -> Result<()> {
    put_json(
        storage,
        &format!("{CHECKOUT_PREFIX}{set_name}/{account}"),
        check_out,
    )
    .await
}

pub async fn delete_check_out(
    storage: &dyn StorageBackend,
    set_name: &str,
    account: &str,
) -> Result<()> {
    storage
        .delete(&format!("{CHECKOUT_PREFIX}{set_name}/{account}"))
        .await
}

pub async fn load_dynamic_role(
    storage: &dyn StorageBackend,
    name: &str,
) -> Result<Option<DynamicRole>> {
    get_json(storage, &format!("{DYNAMIC_ROLE_PREFIX}{name}")).await
}

pub async fn store_dynamic_role(
    storage: &dyn StorageBackend,
    name: &str,
    role: &DynamicRole,
) -> Result<()> {
    put_json(storage, &format!("{DYNAMIC_ROLE_PREFIX}{name}"), role).await
}

pub async fn delete_dynamic_role(storage: &dyn StorageBackend, name: &str) -> Result<()> {
    storage
        .delete(&format!("{DYNAMIC_ROLE_PREFIX}{name}"))
        .await
}

pub async fn read_config(storage: &dyn StorageBackend) -> Result<Option<EngineConfig>> {
    get_json(storage, CONFIG_KEY).await
}

pub async fn write_config(storage: &dyn StorageBackend, config: &EngineConfig) -> Result<()> {
    put_json(storage, CONFIG_KEY, config).await
}

pub async fn delete_config(storage: &dyn StorageBackend) -> Result<()> {
    storage.delete(CONFIG_KEY).await
}

/// Walk a hierarchical prefix depth-first, returning full record names.
async fn collect_names(
    storage: &dyn StorageBackend,
    prefix: &str,
    sub_path: &str,
) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut pending = vec![sub_path.to_string()];

    while let Some(current) = pending.pop() {
        for child in storage.list(&format!("{prefix}{current}")).await? {
            if let Some(dir) = child.strip_suffix('/') {
                pending.push(format!("{current}{dir}/"));
            } else {
                names.push(format!("{current}{child}"));
            }
        }
    }

    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use std::time::Duration;

    #[tokio::test]
    async fn test_static_role_round_trip() {
        let storage = MemoryStorage::new();
        let role = StaticRole {
            username: "bob".to_string(),
            rotation_period: Duration::from_secs(60),
            ..StaticRole::default()
        };

        store_static_role(storage.as_ref(), "hashicorp", &role)
            .await
            .unwrap();
        let loaded = load_static_role(storage.as_ref(), "hashicorp")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.username, "bob");
        assert_eq!(loaded.rotation_period, Duration::from_secs(60));

        delete_static_role(storage.as_ref(), "hashicorp")
            .await
            .unwrap();
        assert!(load_static_role(storage.as_ref(), "hashicorp")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_collect_names_walks_hierarchy() {
        let storage = MemoryStorage::new();
        let role = StaticRole::default();
        for name in ["app", "team/app1", "team/nested/app2"] {
            store_static_role(storage.as_ref(), name, &role)
                .await
                .unwrap();
        }

        let names = static_role_names(storage.as_ref()).await.unwrap();
        assert_eq!(names, vec!["app", "team/app1", "team/nested/app2"]);
    }
}
