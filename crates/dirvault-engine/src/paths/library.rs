//! `library/<name>` paths: CRUD for check-out sets.

use serde_json::{Map, json};

use crate::backend::Backend;
use crate::core::error::{EngineError, Result};
use crate::core::library::{CheckOut, DEFAULT_CHECKOUT_TTL, LibrarySet};
use crate::paths::{Operation, Request, Response, get_bool, get_duration, get_string_list};
use crate::storage::records::{self, LIBRARY_PREFIX};

impl Backend {
    pub(crate) async fn handle_library_set(&self, req: Request, name: &str) -> Result<Response> {
        match req.operation {
            Operation::List => {
                let keys = self
                    .storage
                    .list(&format!("{LIBRARY_PREFIX}{name}"))
                    .await?;
                Ok(Response::list(keys))
            }
            Operation::Read => self.library_set_read(name).await,
            Operation::Create | Operation::Update => {
                self.library_set_create_update(req.clone(), name).await
            }
            Operation::Delete => self.library_set_delete(name).await,
        }
    }

    async fn library_set_read(&self, name: &str) -> Result<Response> {
        let Some(set) = records::load_library_set(self.storage.as_ref(), name).await? else {
            return Err(EngineError::not_found("library set", name));
        };

        let mut data = Map::new();
        data.insert(
            "service_account_names".to_string(),
            json!(set.service_account_names),
        );
        data.insert("ttl".to_string(), json!(set.ttl.as_secs()));
        data.insert("max_ttl".to_string(), json!(set.max_ttl.as_secs()));
        data.insert(
            "disable_check_in_enforcement".to_string(),
            json!(set.disable_check_in_enforcement),
        );
        Ok(Response::with_data(data))
    }

    async fn library_set_create_update(&self, req: Request, name: &str) -> Result<Response> {
        if name.is_empty() {
            return Err(EngineError::validation("empty set name attribute given"));
        }
        let data = &req.data;
        let existing = records::load_library_set(self.storage.as_ref(), name).await?;

        let mut set = existing.clone().unwrap_or_else(|| LibrarySet {
            ttl: DEFAULT_CHECKOUT_TTL,
            max_ttl: DEFAULT_CHECKOUT_TTL,
            ..LibrarySet::default()
        });

        if let Some(names) = get_string_list(data, "service_account_names")? {
            set.service_account_names = names;
        }
        if let Some(ttl) = get_duration(data, "ttl")? {
            set.ttl = ttl;
        }
        if let Some(max_ttl) = get_duration(data, "max_ttl")? {
            set.max_ttl = max_ttl;
        }
        if let Some(disable) = get_bool(data, "disable_check_in_enforcement")? {
            set.disable_check_in_enforcement = disable;
        }
        set.validate()?;

        let previous_names: Vec<String> = existing
            .map(|s| s.service_account_names)
            .unwrap_or_default();

        let added: Vec<String> = set
            .service_account_names
            .iter()
            .filter(|n| !previous_names.contains(n))
            .cloned()
            .collect();
        let removed: Vec<String> = previous_names
            .iter()
            .filter(|n| !set.service_account_names.contains(n))
            .cloned()
            .collect();

        // New accounts must be unowned anywhere: rotation roles and other
        // sets both count.
        for account in &added {
            if self.managed_users.is_managed(account) {
                return Err(EngineError::conflict(format!(
                    "{account} is already managed by the secrets engine"
                )));
            }
        }

        // An account can only leave the set once it is back on the shelf.
        for account in &removed {
            if let Some(check_out) =
                records::load_check_out(self.storage.as_ref(), name, account).await?
            {
                if !check_out.available {
                    return Err(EngineError::validation(format!(
                        "cannot remove {account} from the set because it is currently checked out"
                    )));
                }
            }
        }

        records::store_library_set(self.storage.as_ref(), name, &set).await?;

        for account in &added {
            records::store_check_out(self.storage.as_ref(), name, account, &CheckOut::available())
                .await?;
        }
        for account in &removed {
            records::delete_check_out(self.storage.as_ref(), name, account).await?;
        }

        self.managed_users.add_all(added);
        self.managed_users
            .remove_all(removed.iter().map(String::as_str));

        Ok(Response::empty())
    }

    async fn library_set_delete(&self, name: &str) -> Result<Response> {
        let Some(set) = records::load_library_set(self.storage.as_ref(), name).await? else {
            return Ok(Response::empty());
        };

        for account in &set.service_account_names {
            if let Some(check_out) =
                records::load_check_out(self.storage.as_ref(), name, account).await?
            {
                if !check_out.available {
                    return Err(EngineError::validation(format!(
                        "cannot delete the set because {account} is currently checked out"
                    )));
                }
            }
        }

        for account in &set.service_account_names {
            records::delete_check_out(self.storage.as_ref(), name, account).await?;
        }
        records::delete_library_set(self.storage.as_ref(), name).await?;
        self.managed_users
            .remove_all(set.service_account_names.iter().map(String::as_str));

        Ok(Response::empty())
    }
}
