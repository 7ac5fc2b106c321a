//! `static-cred/<name>` path: serve a static role's credentials.

use chrono::Utc;
use serde_json::{Map, json};

use crate::backend::Backend;
use crate::core::error::{EngineError, Result};
use crate::core::role::ActiveAccount;
use crate::paths::{Operation, Response};

impl Backend {
    /// Read the credentials for a static role.
    ///
    /// Single-account roles return the account's current and previous
    /// password. Dual-account roles return the *active* account's
    /// credentials in the primary fields; during a grace window the standby
    /// account's credentials ride along under `standby_*` so callers can
    /// migrate without downtime.
    pub(crate) async fn handle_static_cred(
        &self,
        operation: Operation,
        name: &str,
    ) -> Result<Response> {
        if operation != Operation::Read {
            return Err(EngineError::validation(
                "static credentials only support read",
            ));
        }
        let Some(role) = self.static_role(name).await? else {
            return Err(EngineError::validation(format!("unknown role: {name}")));
        };

        let mut data = Map::new();
        data.insert("dn".to_string(), json!(role.dn));
        data.insert("username".to_string(), json!(role.username));
        data.insert("password".to_string(), json!(role.password.expose()));
        data.insert(
            "last_password".to_string(),
            json!(role.last_password.expose()),
        );
        data.insert(
            "ttl".to_string(),
            json!(role.password_ttl(Utc::now()).as_secs()),
        );
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

        if role.dual_account_mode {
            data.insert("dual_account_mode".to_string(), json!(true));
            data.insert(
                "active_account".to_string(),
                json!(role.active_account.as_str()),
            );
            data.insert(
                "rotation_state".to_string(),
                json!(role.rotation_state.as_str()),
            );

            // The active account's credentials are the primary credentials.
            if role.active_account == ActiveAccount::B {
                data.insert("username".to_string(), json!(role.username_b));
                data.insert("dn".to_string(), json!(role.dn_b));
                data.insert("password".to_string(), json!(role.password_b.expose()));
                data.insert(
                    "last_password".to_string(),
                    json!(role.last_password_b.expose()),
                );
            }

            if role.in_grace_period() {
                let (standby_username, standby_dn, standby_password, standby_last) =
                    match role.active_account {
                        ActiveAccount::B => (
                            &role.username,
                            &role.dn,
                            role.password.expose(),
                            role.last_password.expose(),
                        ),
                        ActiveAccount::A => (
                            &role.username_b,
                            &role.dn_b,
                            role.password_b.expose(),
                            role.last_password_b.expose(),
                        ),
                    };
                data.insert("standby_username".to_string(), json!(standby_username));
                data.insert("standby_dn".to_string(), json!(standby_dn));
                data.insert("standby_password".to_string(), json!(standby_password));
                data.insert("standby_last_password".to_string(), json!(standby_last));
                if let Some(end) = role.grace_period_end {
                    data.insert("grace_period_end".to_string(), json!(end.to_rfc3339()));
                }
            }
        }

        Ok(Response::with_data(data))
    }
}
