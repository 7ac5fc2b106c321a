//! `config` path: connection and password settings.

use serde_json::{Map, json};

use dirvault_directory::{CredentialType, DirectoryConfig, Schema, SecureString};

use crate::backend::Backend;
use crate::core::config::EngineConfig;
use crate::core::error::{EngineError, Result};
use crate::paths::{Operation, Request, Response, get_bool, get_duration, get_string, get_usize};
use crate::storage::records;

impl Backend {
    pub(crate) async fn handle_config(&self, req: Request) -> Result<Response> {
        match req.operation {
            Operation::Create | Operation::Update => self.config_update(req).await,
            Operation::Read => self.config_read().await,
            Operation::Delete => self.config_delete().await,
            Operation::List => Err(EngineError::validation("config cannot be listed")),
        }
    }

    async fn config_update(&self, req: Request) -> Result<Response> {
        let data = &req.data;

        let mut directory = DirectoryConfig {
            url: get_string(data, "url")?.unwrap_or_default(),
            binddn: get_string(data, "binddn")?.unwrap_or_default(),
            bindpass: SecureString::new(get_string(data, "bindpass")?.unwrap_or_default()),
            userdn: get_string(data, "userdn")?.unwrap_or_default(),
            userattr: get_string(data, "userattr")?.unwrap_or_default(),
            upndomain: get_string(data, "upndomain")?.unwrap_or_default(),
            insecure_tls: get_bool(data, "insecure_tls")?.unwrap_or(false),
            starttls: get_bool(data, "starttls")?.unwrap_or(false),
            certificate: get_string(data, "certificate")?.unwrap_or_default(),
            tls_min_version: get_string(data, "tls_min_version")?.unwrap_or_default(),
            tls_max_version: get_string(data, "tls_max_version")?.unwrap_or_default(),
            ..DirectoryConfig::default()
        };

        if let Some(schema) = get_string(data, "schema")? {
            directory.schema = Schema::parse(&schema)
                .ok_or_else(|| EngineError::validation(format!("invalid schema {schema:?}")))?;
        }
        if let Some(credential_type) = get_string(data, "credential_type")? {
            directory.credential_type =
                CredentialType::parse(&credential_type).ok_or_else(|| {
                    EngineError::validation(format!("invalid credential_type {credential_type:?}"))
                })?;
        }

        directory
            .validate()
            .map_err(|e| EngineError::validation(e.to_string()))?;

        let mut config = EngineConfig::new(directory);

        let password_policy = get_string(data, "password_policy")?;
        let length = get_usize(data, "length")?;
        let formatter = get_string(data, "formatter")?;

        if password_policy.is_some() && (length.is_some() || !formatter.clone().unwrap_or_default().is_empty())
        {
            return Err(EngineError::validation(
                "password_policy is mutually exclusive with length and formatter",
            ));
        }
        config.password_policy = password_policy;
        if let Some(length) = length {
            config.length = length;
        }
        config.formatter = formatter.unwrap_or_default();

        config.ttl = get_duration(data, "ttl")?.unwrap_or_else(|| self.system.default_lease_ttl());
        config.max_ttl =
            get_duration(data, "max_ttl")?.unwrap_or_else(|| self.system.max_lease_ttl());
        if config.ttl.is_zero() {
            return Err(EngineError::validation("ttl must be positive"));
        }
        if config.max_ttl.is_zero() {
            return Err(EngineError::validation("max_ttl must be positive"));
        }
        if config.ttl > config.max_ttl {
            return Err(EngineError::validation(
                "ttl must be smaller than or equal to max_ttl",
            ));
        }

        config.validate()?;

        records::write_config(self.storage.as_ref(), &config).await?;
        Ok(Response::empty())
    }

    async fn config_read(&self) -> Result<Response> {
        let Some(config) = records::read_config(self.storage.as_ref()).await? else {
            return Err(EngineError::not_found("config", "config"));
        };

        // The bind password is deliberately absent: nothing the host serves
        // should echo the credential back.
        let mut data = Map::new();
        data.insert("url".to_string(), json!(config.directory.url));
        data.insert("binddn".to_string(), json!(config.directory.binddn));
        data.insert("userdn".to_string(), json!(config.directory.userdn));
        data.insert("userattr".to_string(), json!(config.directory.userattr));
        data.insert("schema".to_string(), json!(config.directory.schema.as_str()));
        data.insert("upndomain".to_string(), json!(config.directory.upndomain));
        data.insert("starttls".to_string(), json!(config.directory.starttls));
        data.insert(
            "insecure_tls".to_string(),
            json!(config.directory.insecure_tls),
        );
        data.insert(
            "certificate".to_string(),
            json!(config.directory.certificate),
        );
        data.insert(
            "tls_min_version".to_string(),
            json!(config.directory.tls_min_version),
        );
        data.insert(
            "tls_max_version".to_string(),
            json!(config.directory.tls_max_version),
        );
        data.insert(
            "credential_type".to_string(),
            json!(config.directory.credential_type.as_str()),
        );
        data.insert("ttl".to_string(), json!(config.ttl.as_secs()));
        data.insert("max_ttl".to_string(), json!(config.max_ttl.as_secs()));

        match &config.password_policy {
            Some(policy) => {
                data.insert("password_policy".to_string(), json!(policy));
            }
            None => {
                data.insert("length".to_string(), json!(config.length));
                data.insert("formatter".to_string(), json!(config.formatter));
            }
        }
        if let Some(rotated) = config.last_bind_password_rotation {
            data.insert(
                "last_bind_password_rotation".to_string(),
                json!(rotated.to_rfc3339()),
            );
        }

        Ok(Response::with_data(data))
    }

    async fn config_delete(&self) -> Result<Response> {
        records::delete_config(self.storage.as_ref()).await?;
        Ok(Response::empty())
    }
}
