//! Setting static account passwords, single and dual.
//!
//! Both paths share the same WAL discipline:
//!
//! 1. A WAL entry holding the intended password is written *before* the
//!    directory sees it.
//! 2. The role record is updated only after the directory accepted the
//!    password.
//! 3. The WAL is deleted only after the role record persisted.
//!
//! A crash at any point leaves either a password the role still serves, or
//! a WAL from which the exact same new password is re-driven.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;

use dirvault_directory::SecureString;

use crate::backend::Backend;
use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use crate::core::role::{ActiveAccount, RotationPhase, StaticRole};
use crate::password::generate_password;
use crate::storage::records;
use crate::storage::wal::{self, RotationWal};

/// Fallback bound on a single rotation when the host supplies no deadline.
pub const DEFAULT_ROTATION_TIMEOUT: Duration = Duration::from_secs(60);

/// A failed rotation attempt. When `wal_id` is set, the WAL survived and
/// the retry will re-drive the same password.
#[derive(Debug)]
pub(crate) struct RotateFailure {
    pub error: EngineError,
    pub wal_id: Option<String>,
}

impl RotateFailure {
    fn new(error: impl Into<EngineError>, wal_id: Option<String>) -> Self {
        Self {
            error: error.into(),
            wal_id,
        }
    }
}

/// Bound a directory write with the rotation timeout.
async fn bounded<T, F>(operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, dirvault_directory::DirectoryError>>,
{
    match tokio::time::timeout(DEFAULT_ROTATION_TIMEOUT, fut).await {
        Ok(result) => result.map_err(EngineError::from),
        Err(_) => Err(EngineError::DirectoryTransport {
            reason: format!("{operation} timed out"),
        }),
    }
}

impl Backend {
    /// Set a new password for the static account associated with a role.
    ///
    /// Verifies configuration, reuses or writes a WAL entry, drives the
    /// directory, and persists the updated role. Queue bookkeeping is the
    /// caller's job. The role is mutated in place so callers can read the
    /// post-rotation state (grace deadlines in particular).
    pub(crate) async fn set_static_account_password(
        &self,
        role_name: &str,
        role: &mut StaticRole,
        wal_id: Option<String>,
    ) -> std::result::Result<Option<DateTime<Utc>>, RotateFailure> {
        if role_name.is_empty() {
            return Err(RotateFailure::new(
                EngineError::validation(
                    "input was empty when attempting to set credentials for static account",
                ),
                wal_id,
            ));
        }

        let config = match records::read_config(self.storage.as_ref()).await {
            Ok(Some(config)) => config,
            Ok(None) => {
                return Err(RotateFailure::new(
                    EngineError::validation("the config is currently unset"),
                    wal_id,
                ));
            }
            Err(error) => return Err(RotateFailure::new(error, wal_id)),
        };

        if role.dual_account_mode {
            return self
                .set_dual_account_password(role_name, role, wal_id, &config)
                .await;
        }

        let configured_policy = config.password_policy.clone().unwrap_or_default();
        let mut current_wal = wal_id;
        let mut new_password = SecureString::default();
        let mut reused_from_previous_rotation = false;

        if let Some(id) = current_wal.clone() {
            match wal::find_rotation_wal(self.storage.as_ref(), &id).await {
                Err(error) => return Err(RotateFailure::new(error, Some(id))),
                Ok(None) => {
                    tracing::error!(role = %role_name, wal_id = %id, "expected role to have WAL, but WAL not found in storage");
                    current_wal = None;
                }
                Ok(Some(loaded))
                    if !loaded.entry.new_password.is_empty()
                        && loaded.entry.password_policy != configured_policy =>
                {
                    // The policy changed since this WAL was written; its
                    // password no longer conforms. Discard and start over.
                    tracing::debug!(role = %role_name, wal_id = %id, "password policy changed, generating new password");
                    self.delete_wal_logged(&id).await;
                    current_wal = None;
                }
                Ok(Some(loaded)) => {
                    new_password = loaded.entry.new_password.clone();
                    reused_from_previous_rotation = true;
                }
            }
        }

        if current_wal.is_none() {
            new_password = match generate_password(&config, self.system.as_ref()).await {
                Ok(password) => SecureString::new(password),
                Err(error) => return Err(RotateFailure::new(error, None)),
            };
            let entry = RotationWal {
                role_name: role_name.to_string(),
                username: role.username.clone(),
                dn: role.dn.clone(),
                new_password: new_password.clone(),
                last_vault_rotation: role.last_vault_rotation,
                password_policy: configured_policy.clone(),
                ..RotationWal::default()
            };
            match wal::put_rotation_wal(self.storage.as_ref(), &entry).await {
                Ok(id) => {
                    tracing::debug!(role = %role_name, wal_id = %id, "wrote WAL");
                    current_wal = Some(id);
                }
                Err(error) => return Err(RotateFailure::new(error, None)),
            }
        }

        if new_password.is_empty() {
            // A WAL with an empty password should not exist; regenerate
            // rather than pushing an empty credential to the directory.
            tracing::error!(role = %role_name, "new password was empty, re-generating based on the password policy");
            new_password = match generate_password(&config, self.system.as_ref()).await {
                Ok(password) => SecureString::new(password),
                Err(error) => return Err(RotateFailure::new(error, current_wal)),
            };
        }

        // DN-based update targets the object directly; otherwise search the
        // subtree under userdn for the username.
        let update = if !role.dn.is_empty() {
            bounded(
                "update_dn_password",
                self.client
                    .update_dn_password(&config.directory, &role.dn, new_password.expose()),
            )
            .await
        } else {
            bounded(
                "update_user_password",
                self.client.update_user_password(
                    &config.directory,
                    &role.username,
                    new_password.expose(),
                ),
            )
            .await
        };

        if let Err(error) = update {
            if reused_from_previous_rotation {
                // The directory rejected a password we already tried once.
                // The WAL is poison: delete it so the next retry generates
                // a fresh credential.
                if let Some(id) = &current_wal {
                    tracing::debug!(role = %role_name, wal_id = %id, "password stored in WAL failed, deleting WAL");
                    self.delete_wal_logged(id).await;
                }
                current_wal = None;
            }
            return Err(RotateFailure::new(error, current_wal));
        }

        // The new password is live in the directory; move it into the role.
        let rotation_time = Utc::now();
        role.last_password = std::mem::take(&mut role.password);
        role.password = new_password;
        role.last_vault_rotation = Some(rotation_time);
        role.set_next_vault_rotation(rotation_time);

        if let Err(error) =
            records::store_static_role(self.storage.as_ref(), role_name, role).await
        {
            return Err(RotateFailure::new(error, current_wal));
        }

        if let Some(id) = &current_wal {
            if let Err(error) = wal::delete_wal(self.storage.as_ref(), id).await {
                tracing::warn!(wal_id = %id, error = %error, "error deleting WAL");
                return Err(RotateFailure::new(error, current_wal));
            }
            tracing::debug!(wal_id = %id, "deleted WAL");
        }

        Ok(Some(rotation_time))
    }

    /// Dual-account rotation.
    ///
    /// In the `Active` state one account serves credentials while its
    /// sibling stands by. A rotation sets a fresh password on the standby
    /// and flips it to active, opening a grace window during which both
    /// accounts' credentials are served. The ticker closes the window.
    async fn set_dual_account_password(
        &self,
        role_name: &str,
        role: &mut StaticRole,
        wal_id: Option<String>,
        config: &EngineConfig,
    ) -> std::result::Result<Option<DateTime<Utc>>, RotateFailure> {
        // Until both accounts hold a password this role has never finished
        // its initial setup.
        if role.password.is_empty() || role.password_b.is_empty() {
            return self
                .dual_account_initial_setup(role_name, role, wal_id, config)
                .await;
        }

        let configured_policy = config.password_policy.clone().unwrap_or_default();
        let (standby_dn, standby_username) = {
            let (dn, username) = role.standby_identity();
            (dn.to_string(), username.to_string())
        };

        let mut current_wal = wal_id;
        let mut new_password = SecureString::default();

        if let Some(id) = current_wal.clone() {
            match wal::find_rotation_wal(self.storage.as_ref(), &id).await {
                Err(error) => return Err(RotateFailure::new(error, Some(id))),
                Ok(None) => {
                    tracing::error!(role = %role_name, wal_id = %id, "expected role to have WAL, but WAL not found in storage");
                    current_wal = None;
                }
                Ok(Some(loaded))
                    if !loaded.entry.new_password.is_empty()
                        && loaded.entry.password_policy != configured_policy =>
                {
                    tracing::debug!(role = %role_name, wal_id = %id, "password policy changed, generating new password for dual-account rotation");
                    self.delete_wal_logged(&id).await;
                    current_wal = None;
                }
                Ok(Some(loaded)) => {
                    new_password = loaded.entry.new_password.clone();
                }
            }
        }

        if new_password.is_empty() {
            new_password = match generate_password(config, self.system.as_ref()).await {
                Ok(password) => SecureString::new(password),
                Err(error) => return Err(RotateFailure::new(error, current_wal)),
            };
        }

        if current_wal.is_none() {
            let entry = RotationWal {
                role_name: role_name.to_string(),
                username: standby_username.clone(),
                dn: standby_dn.clone(),
                new_password: new_password.clone(),
                last_vault_rotation: role.last_vault_rotation,
                password_policy: configured_policy.clone(),
                ..RotationWal::default()
            };
            match wal::put_rotation_wal(self.storage.as_ref(), &entry).await {
                Ok(id) => {
                    tracing::debug!(
                        role = %role_name,
                        wal_id = %id,
                        standby_account = %standby_username,
                        "wrote WAL for dual-account rotation"
                    );
                    current_wal = Some(id);
                }
                Err(error) => return Err(RotateFailure::new(error, None)),
            }
        }

        // Rotate the standby account's password in the directory.
        let update = if !standby_dn.is_empty() {
            bounded(
                "update_dn_password",
                self.client.update_dn_password(
                    &config.directory,
                    &standby_dn,
                    new_password.expose(),
                ),
            )
            .await
        } else {
            bounded(
                "update_user_password",
                self.client.update_user_password(
                    &config.directory,
                    &standby_username,
                    new_password.expose(),
                ),
            )
            .await
        };
        if let Err(error) = update {
            return Err(RotateFailure::new(error, current_wal));
        }

        // Flip: the freshly rotated standby becomes the active account and
        // the grace window opens.
        let rotation_time = Utc::now();
        match role.active_account {
            ActiveAccount::A => {
                role.last_password_b = std::mem::take(&mut role.password_b);
                role.password_b = new_password;
                role.active_account = ActiveAccount::B;
            }
            ActiveAccount::B => {
                role.last_password = std::mem::take(&mut role.password);
                role.password = new_password;
                role.active_account = ActiveAccount::A;
            }
        }
        role.last_rotation_b = Some(rotation_time);
        role.last_vault_rotation = Some(rotation_time);
        role.set_next_vault_rotation(rotation_time);
        role.rotation_state = RotationPhase::GracePeriod;
        role.grace_period_end = Some(
            rotation_time
                + chrono::Duration::from_std(role.grace_period.unwrap_or_default())
                    .unwrap_or_else(|_| chrono::Duration::zero()),
        );

        if let Err(error) =
            records::store_static_role(self.storage.as_ref(), role_name, role).await
        {
            return Err(RotateFailure::new(error, current_wal));
        }

        if let Some(id) = &current_wal {
            if let Err(error) = wal::delete_wal(self.storage.as_ref(), id).await {
                tracing::warn!(wal_id = %id, error = %error, "error deleting WAL for dual-account rotation");
                return Err(RotateFailure::new(error, current_wal));
            }
            tracing::debug!(wal_id = %id, "deleted WAL for dual-account rotation");
        }

        Ok(Some(rotation_time))
    }

    /// First rotation of a dual-account role: both accounts get fresh
    /// passwords under a single WAL entry recording both, so recovery can
    /// re-apply the pair (directory password writes are idempotent).
    async fn dual_account_initial_setup(
        &self,
        role_name: &str,
        role: &mut StaticRole,
        wal_id: Option<String>,
        config: &EngineConfig,
    ) -> std::result::Result<Option<DateTime<Utc>>, RotateFailure> {
        let configured_policy = config.password_policy.clone().unwrap_or_default();
        let mut current_wal = wal_id;
        let mut password_a = SecureString::default();
        let mut password_b = SecureString::default();

        // An interrupted initial setup may have already pushed one of these
        // passwords to the directory; reuse the recorded pair.
        if let Some(id) = current_wal.clone() {
            match wal::find_rotation_wal(self.storage.as_ref(), &id).await {
                Err(error) => return Err(RotateFailure::new(error, Some(id))),
                Ok(Some(loaded))
                    if !loaded.entry.new_password.is_empty()
                        && !loaded.entry.new_password_b.is_empty()
                        && loaded.entry.password_policy == configured_policy =>
                {
                    password_a = loaded.entry.new_password.clone();
                    password_b = loaded.entry.new_password_b.clone();
                }
                Ok(_) => {
                    self.delete_wal_logged(&id).await;
                    current_wal = None;
                }
            }
        }

        if password_a.is_empty() || password_b.is_empty() {
            password_a = match generate_password(config, self.system.as_ref()).await {
                Ok(password) => SecureString::new(password),
                Err(error) => return Err(RotateFailure::new(error, current_wal)),
            };
            password_b = match generate_password(config, self.system.as_ref()).await {
                Ok(password) => SecureString::new(password),
                Err(error) => return Err(RotateFailure::new(error, current_wal)),
            };
        }

        if current_wal.is_none() {
            let entry = RotationWal {
                role_name: role_name.to_string(),
                username: role.username.clone(),
                dn: role.dn.clone(),
                new_password: password_a.clone(),
                username_b: role.username_b.clone(),
                dn_b: role.dn_b.clone(),
                new_password_b: password_b.clone(),
                last_vault_rotation: role.last_vault_rotation,
                password_policy: configured_policy.clone(),
            };
            match wal::put_rotation_wal(self.storage.as_ref(), &entry).await {
                Ok(id) => current_wal = Some(id),
                Err(error) => return Err(RotateFailure::new(error, None)),
            }
        }

        // Account A, then account B. A failure between the two leaves the
        // WAL in place; recovery re-applies both.
        let update_a = if !role.dn.is_empty() {
            bounded(
                "update_dn_password",
                self.client
                    .update_dn_password(&config.directory, &role.dn, password_a.expose()),
            )
            .await
        } else {
            bounded(
                "update_user_password",
                self.client.update_user_password(
                    &config.directory,
                    &role.username,
                    password_a.expose(),
                ),
            )
            .await
        };
        if let Err(error) = update_a {
            return Err(RotateFailure::new(error, current_wal));
        }

        let update_b = if !role.dn_b.is_empty() {
            bounded(
                "update_dn_password",
                self.client
                    .update_dn_password(&config.directory, &role.dn_b, password_b.expose()),
            )
            .await
        } else {
            bounded(
                "update_user_password",
                self.client.update_user_password(
                    &config.directory,
                    &role.username_b,
                    password_b.expose(),
                ),
            )
            .await
        };
        if let Err(error) = update_b {
            return Err(RotateFailure::new(error, current_wal));
        }

        let rotation_time = Utc::now();
        role.password = password_a;
        role.password_b = password_b;
        role.last_vault_rotation = Some(rotation_time);
        role.last_rotation_b = Some(rotation_time);
        role.set_next_vault_rotation(rotation_time);
        role.active_account = ActiveAccount::A;
        role.rotation_state = RotationPhase::Active;
        role.grace_period_end = None;

        if let Err(error) =
            records::store_static_role(self.storage.as_ref(), role_name, role).await
        {
            return Err(RotateFailure::new(error, current_wal));
        }

        if let Some(id) = &current_wal {
            if let Err(error) = wal::delete_wal(self.storage.as_ref(), id).await {
                tracing::warn!(wal_id = %id, error = %error, "error deleting WAL for dual-account initial setup");
                return Err(RotateFailure::new(error, current_wal));
            }
        }

        Ok(Some(rotation_time))
    }
}
