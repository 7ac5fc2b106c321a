//! Check-out, check-in and status paths for library sets.
//!
//! Check-out lends the first available account to the caller, taking over
//! its password on first loan. Check-in rotates the password before the
//! account returns to the shelf, so a past borrower keeps no access.
//! Enforcement binds check-in to the borrowing entity unless the set
//! disables it or the privileged `library/manage/<name>/check-in` path is
//! used.

use chrono::Utc;
use serde_json::{Map, json};

use crate::backend::Backend;
use crate::core::error::{EngineError, Result};
use crate::password::generate_password;
use crate::paths::{Operation, Request, Response, get_duration, get_string_list};
use crate::storage::records;

impl Backend {
    pub(crate) async fn handle_check_out(&self, req: Request, name: &str) -> Result<Response> {
        if !matches!(req.operation, Operation::Create | Operation::Update) {
            return Err(EngineError::validation(
                "check-out only supports create and update",
            ));
        }

        let Some(set) = records::load_library_set(self.storage.as_ref(), name).await? else {
            return Err(EngineError::not_found("library set", name));
        };

        let requested_ttl = get_duration(&req.data, "ttl")?
            .map(|ttl| ttl.min(set.max_ttl))
            .unwrap_or(set.ttl);

        for account in &set.service_account_names {
            let mut check_out = records::load_check_out(self.storage.as_ref(), name, account)
                .await?
                .unwrap_or_else(crate::core::library::CheckOut::available);
            if !check_out.available {
                continue;
            }

            // First loan of this account: the engine does not know its
            // password yet, so it takes one over now.
            if check_out.password.is_empty() {
                self.rotate_library_account_password(account, &mut check_out)
                    .await?;
            }

            check_out.available = false;
            check_out.borrower_entity_id = req.entity_id.clone();
            check_out.due = Some(
                Utc::now() + chrono::Duration::from_std(requested_ttl).unwrap_or_else(|_| chrono::Duration::zero()),
            );
            records::store_check_out(self.storage.as_ref(), name, account, &check_out).await?;

            let mut data = Map::new();
            data.insert("service_account_name".to_string(), json!(account));
            data.insert(
                "password".to_string(),
                json!(check_out.password.expose()),
            );
            data.insert("ttl".to_string(), json!(requested_ttl.as_secs()));
            return Ok(Response::with_data(data));
        }

        Err(EngineError::validation(format!(
            "no service accounts available for check-out in set {name}"
        )))
    }

    pub(crate) async fn handle_check_in(
        &self,
        req: Request,
        name: &str,
        managed: bool,
    ) -> Result<Response> {
        if !matches!(
            req.operation,
            Operation::Create | Operation::Update | Operation::Read
        ) {
            return Err(EngineError::validation("check-in cannot be deleted"));
        }

        let Some(set) = records::load_library_set(self.storage.as_ref(), name).await? else {
            return Err(EngineError::not_found("library set", name));
        };

        // An explicit list narrows the check-in; otherwise everything this
        // caller may return comes back.
        let requested = get_string_list(&req.data, "service_account_names")?.unwrap_or_default();

        let mut checked_in: Vec<String> = Vec::new();
        for account in &set.service_account_names {
            if !requested.is_empty() && !requested.contains(account) {
                continue;
            }
            let Some(mut check_out) =
                records::load_check_out(self.storage.as_ref(), name, account).await?
            else {
                continue;
            };
            if check_out.available {
                continue;
            }

            let permitted = managed
                || set.disable_check_in_enforcement
                || check_out.borrower_entity_id == req.entity_id;
            if !permitted {
                if requested.is_empty() {
                    continue;
                }
                return Err(EngineError::validation(format!(
                    "{account} can only be checked in by the caller that checked it out"
                )));
            }

            // Rotate before returning to the shelf.
            self.rotate_library_account_password(account, &mut check_out)
                .await?;
            check_out.available = true;
            check_out.borrower_entity_id = String::new();
            check_out.due = None;
            records::store_check_out(self.storage.as_ref(), name, account, &check_out).await?;
            checked_in.push(account.clone());
        }

        let mut data = Map::new();
        data.insert("check_ins".to_string(), json!(checked_in));
        Ok(Response::with_data(data))
    }

    pub(crate) async fn handle_set_status(
        &self,
        operation: Operation,
        name: &str,
    ) -> Result<Response> {
        if operation != Operation::Read {
            return Err(EngineError::validation("status only supports read"));
        }
        let Some(set) = records::load_library_set(self.storage.as_ref(), name).await? else {
            return Err(EngineError::not_found("library set", name));
        };

        let mut data = Map::new();
        for account in &set.service_account_names {
            let check_out = records::load_check_out(self.storage.as_ref(), name, account)
                .await?
                .unwrap_or_else(crate::core::library::CheckOut::available);

            let mut status = Map::new();
            status.insert("available".to_string(), json!(check_out.available));
            if !check_out.available {
                if !check_out.borrower_entity_id.is_empty() {
                    status.insert(
                        "borrower_entity_id".to_string(),
                        json!(check_out.borrower_entity_id),
                    );
                }
                if let Some(due) = check_out.due {
                    status.insert("due".to_string(), json!(due.to_rfc3339()));
                }
            }
            data.insert(account.clone(), json!(status));
        }
        Ok(Response::with_data(data))
    }

    /// Set a fresh generated password on a library account, both in the
    /// directory and in its check-out record.
    async fn rotate_library_account_password(
        &self,
        account: &str,
        check_out: &mut crate::core::library::CheckOut,
    ) -> Result<()> {
        let config = records::read_config(self.storage.as_ref())
            .await?
            .ok_or_else(|| EngineError::validation("the config is currently unset"))?;

        let new_password = generate_password(&config, self.system.as_ref()).await?;
        self.client
            .update_user_password(&config.directory, account, &new_password)
            .await?;
        check_out.password = dirvault_directory::SecureString::new(new_password);
        Ok(())
    }
}
