//! `cred/<name>` path: issue dynamic credentials from an LDIF template.

use chrono::Utc;
use serde_json::{Map, json};

use dirvault_directory::ldif;

use crate::backend::Backend;
use crate::core::error::{EngineError, Result};
use crate::password::{generate_password, random_base62};
use crate::paths::dynamic_roles::{DynamicRole, TemplateData, render_template};
use crate::paths::{Operation, Request, Response};
use crate::storage::records;

impl Backend {
    pub(crate) async fn handle_dynamic_cred(&self, req: Request, name: &str) -> Result<Response> {
        if req.operation != Operation::Read {
            return Err(EngineError::validation(
                "dynamic credentials only support read",
            ));
        }

        let Some(role) = records::load_dynamic_role(self.storage.as_ref(), name).await? else {
            return Err(EngineError::not_found("dynamic role", name));
        };
        let config = records::read_config(self.storage.as_ref())
            .await?
            .ok_or_else(|| EngineError::validation("the config is currently unset"))?;

        let username = generate_username(&req, name, &role)?;
        let password = generate_password(&config, self.system.as_ref()).await?;

        let now = Utc::now();
        let expiry = now + chrono::Duration::from_std(role.default_ttl).unwrap_or_else(|_| chrono::Duration::zero());
        let template_data = TemplateData {
            username: username.clone(),
            password: password.clone(),
            display_name: req.display_name.clone(),
            role_name: name.to_string(),
            issue_time: now.to_rfc3339(),
            issue_time_seconds: now.timestamp(),
            expiration_time: expiry.to_rfc3339(),
            expiration_time_seconds: expiry.timestamp(),
        };

        let rendered = render_template(&role.creation_ldif, &template_data)
            .map_err(|e| EngineError::validation(format!("failed to apply creation_ldif template: {e}")))?;
        let entries = ldif::parse(&rendered)
            .map_err(|e| EngineError::validation(format!("failed to parse generated LDIF: {e}")))?;

        self.client
            .execute(&config.directory, &entries, false)
            .await
            .map_err(EngineError::from)?;

        let dn = entries
            .first()
            .map(|entry| entry.dn.clone())
            .unwrap_or_default();

        let mut data = Map::new();
        data.insert("username".to_string(), json!(username));
        data.insert("password".to_string(), json!(password));
        data.insert("dn".to_string(), json!(dn));
        data.insert("ttl".to_string(), json!(role.default_ttl.as_secs()));
        data.insert("max_ttl".to_string(), json!(role.max_ttl.as_secs()));
        Ok(Response::with_data(data))
    }
}

/// Derive the account name for a freshly issued credential.
fn generate_username(req: &Request, role_name: &str, role: &DynamicRole) -> Result<String> {
    if role.username_template.is_empty() {
        return Ok(format!(
            "v_{}_{}_{}_{}",
            req.display_name,
            role_name,
            random_base62(20),
            Utc::now().timestamp(),
        ));
    }

    let data = TemplateData {
        display_name: req.display_name.clone(),
        role_name: role_name.to_string(),
        ..TemplateData::default()
    };
    render_template(&role.username_template, &data)
        .map_err(|e| EngineError::validation(format!("failed to generate username: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_username_shape() {
        let req = Request::new(Operation::Read, "cred/app").with_display_name("token");
        let role = DynamicRole::default();

        let username = generate_username(&req, "app", &role).unwrap();
        assert!(username.starts_with("v_token_app_"));
        // display name, role, 20 random chars, unix seconds
        assert_eq!(username.split('_').count(), 5);
    }

    #[test]
    fn test_templated_username() {
        let req = Request::new(Operation::Read, "cred/app").with_display_name("token");
        let role = DynamicRole {
            username_template: "svc-{{.RoleName}}-{{.DisplayName}}".to_string(),
            ..DynamicRole::default()
        };

        let username = generate_username(&req, "app", &role).unwrap();
        assert_eq!(username, "svc-app-token");
    }
}
