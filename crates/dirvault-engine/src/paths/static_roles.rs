//! `static-role/<name>` paths: CRUD for rotation roles.

use chrono::Utc;
use serde_json::{Map, json};

use crate::backend::Backend;
use crate::core::error::{EngineError, Result};
use crate::core::role::StaticRole;
use crate::queue::QueueItem;
use crate::paths::{Operation, Request, Response, get_bool, get_duration, get_string};
use crate::storage::records::{self, STATIC_ROLE_PREFIX};
use crate::storage::wal;

impl Backend {
    pub(crate) async fn handle_static_role(&self, req: Request, name: &str) -> Result<Response> {
        match req.operation {
            Operation::List => {
                let keys = self
                    .storage
                    .list(&format!("{STATIC_ROLE_PREFIX}{name}"))
                    .await?;
                Ok(Response::list(keys))
            }
            Operation::Read => self.static_role_read(name).await,
            Operation::Create | Operation::Update => {
                self.static_role_create_update(req.clone(), name).await
            }
            Operation::Delete => self.static_role_delete(name).await,
        }
    }

    async fn static_role_read(&self, name: &str) -> Result<Response> {
        let Some(role) = self.static_role(name).await? else {
            return Err(EngineError::not_found("static role", name));
        };

        let mut data = Map::new();
        data.insert("username".to_string(), json!(role.username));
        data.insert("dn".to_string(), json!(role.dn));
        data.insert(
            "rotation_period".to_string(),
            json!(role.rotation_period.as_secs()),
        );
        if let Some(rotated) = role.last_vault_rotation {
            data.insert(
                "last_vault_rotation".to_string(),
                json!(rotated.to_rfc3339()),
            );
        }
        if let Some(next) = role.next_vault_rotation {
            data.insert("next_vault_rotation".to_string(), json!(next.to_rfc3339()));
        }
        if role.skip_import_rotation {
            data.insert("skip_import_rotation".to_string(), json!(true));
        }

        if role.dual_account_mode {
            data.insert("dual_account_mode".to_string(), json!(true));
            data.insert("username_b".to_string(), json!(role.username_b));
            data.insert("dn_b".to_string(), json!(role.dn_b));
            data.insert(
                "grace_period".to_string(),
                json!(role.grace_period.unwrap_or_default().as_secs()),
            );
            data.insert(
                "active_account".to_string(),
                json!(role.active_account.as_str()),
            );
            data.insert(
                "rotation_state".to_string(),
                json!(role.rotation_state.as_str()),
            );
            if let Some(end) = role.grace_period_end {
                data.insert("grace_period_end".to_string(), json!(end.to_rfc3339()));
            }
        }

        Ok(Response::with_data(data))
    }

    async fn static_role_create_update(&self, req: Request, name: &str) -> Result<Response> {
        if name.is_empty() {
            return Err(EngineError::validation("empty role name attribute given"));
        }
        let data = &req.data;

        let lock = self.role_locks.lock_for(name);
        let _guard = lock.lock().await;

        match self.static_role(name).await? {
            Some(existing) => self.static_role_update(name, existing, data).await,
            None => self.static_role_create(name, data).await,
        }
    }

    async fn static_role_create(
        &self,
        name: &str,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Response> {
        let username = get_string(data, "username")?
            .filter(|u| !u.is_empty())
            .ok_or_else(|| EngineError::validation("username is required"))?;
        let rotation_period = get_duration(data, "rotation_period")?
            .ok_or_else(|| EngineError::validation("rotation_period is required"))?;

        let mut role = StaticRole {
            username,
            dn: get_string(data, "dn")?.unwrap_or_default(),
            rotation_period,
            skip_import_rotation: get_bool(data, "skip_import_rotation")?.unwrap_or(false),
            dual_account_mode: get_bool(data, "dual_account_mode")?.unwrap_or(false),
            username_b: get_string(data, "username_b")?.unwrap_or_default(),
            dn_b: get_string(data, "dn_b")?.unwrap_or_default(),
            grace_period: get_duration(data, "grace_period")?,
            ..StaticRole::default()
        };
        role.validate()?;

        // Every username this role wants must be unowned: not another
        // role's, not a library set's.
        for username in role.usernames() {
            if self.managed_users.is_managed(username) {
                return Err(EngineError::conflict(format!(
                    "{username} is already managed by the secrets engine"
                )));
            }
        }

        if role.skip_import_rotation {
            // No import rotation: the directory password stays unknown
            // until the first tick. The schedule still starts now.
            role.set_next_vault_rotation(Utc::now());
            records::store_static_role(self.storage.as_ref(), name, &role).await?;
        } else {
            // Import rotation: take ownership of the password immediately.
            // A failure here aborts the create; a leftover WAL carries a
            // zero rotation time and is pruned at the next initialization.
            self.set_static_account_password(name, &mut role, None)
                .await
                .map_err(|failure| failure.error)?;
        }

        // Ownership registers only after the role has been persisted.
        self.managed_users
            .add_all(role.usernames().into_iter().map(String::from));

        let priority = role
            .next_vault_rotation
            .map(|t| t.timestamp())
            .unwrap_or_else(|| Utc::now().timestamp());
        self.push_item(QueueItem::new(name, priority));

        Ok(Response::empty())
    }

    async fn static_role_update(
        &self,
        name: &str,
        mut role: StaticRole,
        data: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Response> {
        if data.contains_key("skip_import_rotation") {
            return Err(EngineError::validation(
                "skip_import_rotation cannot be changed after role creation",
            ));
        }
        // Identity fields are immutable; empty strings count as absent.
        check_immutable_string(data, "username", &role.username)?;
        check_immutable_string(data, "dn", &role.dn)?;
        check_immutable_string(data, "username_b", &role.username_b)?;
        check_immutable_string(data, "dn_b", &role.dn_b)?;
        if let Some(dual) = get_bool(data, "dual_account_mode")? {
            if dual != role.dual_account_mode {
                return Err(EngineError::validation(
                    "cannot update dual_account_mode after role creation",
                ));
            }
        }

        if let Some(rotation_period) = get_duration(data, "rotation_period")? {
            role.rotation_period = rotation_period;
        }
        if let Some(grace_period) = get_duration(data, "grace_period")? {
            if !role.dual_account_mode {
                return Err(EngineError::validation(
                    "grace_period is only valid for dual-account roles",
                ));
            }
            role.grace_period = Some(grace_period);
        }
        role.validate()?;

        // Reschedule against the updated period.
        match role.last_vault_rotation {
            Some(last) => role.set_next_vault_rotation(last),
            None => role.set_next_vault_rotation(Utc::now()),
        }
        records::store_static_role(self.storage.as_ref(), name, &role).await?;

        let mut item = self
            .pop_item_by_key(name)
            .unwrap_or_else(|| QueueItem::new(name, 0));
        item.priority = if role.in_grace_period() {
            role.grace_period_end
                .map(|t| t.timestamp())
                .unwrap_or_else(|| Utc::now().timestamp())
        } else {
            role.next_vault_rotation
                .map(|t| t.timestamp())
                .unwrap_or_else(|| Utc::now().timestamp())
        };
        self.push_item(item);

        Ok(Response::empty())
    }

    async fn static_role_delete(&self, name: &str) -> Result<Response> {
        let lock = self.role_locks.lock_for(name);
        let _guard = lock.lock().await;

        let Some(role) = self.static_role(name).await? else {
            return Ok(Response::empty());
        };

        self.pop_item_by_key(name);

        // Remove any WAL still pointing at this role.
        if let Ok(ids) = wal::list_wal_ids(self.storage.as_ref()).await {
            for id in ids {
                if let Ok(Some(loaded)) = wal::find_rotation_wal(self.storage.as_ref(), &id).await
                {
                    if loaded.entry.role_name == name {
                        self.delete_wal_logged(&id).await;
                    }
                }
            }
        }

        records::delete_static_role(self.storage.as_ref(), name).await?;
        self.managed_users.remove_all(role.usernames());

        Ok(Response::empty())
    }
}

fn check_immutable_string(
    data: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    current: &str,
) -> Result<()> {
    if let Some(provided) = get_string(data, key)? {
        if !provided.is_empty() && provided != current {
            return Err(EngineError::validation(format!(
                "cannot update {key} after role creation"
            )));
        }
    }
    Ok(())
}
