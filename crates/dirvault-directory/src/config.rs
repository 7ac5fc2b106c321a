//! Directory connection configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credential_type::CredentialType;
use crate::schema::Schema;
use crate::secure::SecureString;

const TLS_VERSIONS: &[&str] = &["tls10", "tls11", "tls12", "tls13"];

/// Default TLS version bound when none is configured.
pub const DEFAULT_TLS_VERSION: &str = "tls12";

/// Configuration error for a directory connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("url is required")]
    MissingUrl,

    #[error("binddn is required")]
    MissingBindDn,

    #[error("bindpass is required")]
    MissingBindPassword,

    #[error("certificate is not valid PEM data")]
    InvalidCertificate,

    #[error("invalid TLS version {version:?}")]
    InvalidTlsVersion { version: String },

    #[error("tls_min_version must not be greater than tls_max_version")]
    TlsVersionOrder,
}

/// Connection settings for the managed directory.
///
/// Persisted as part of the engine configuration; every field that is
/// absent in stored JSON decodes to its zero value so configurations
/// written by older versions keep loading.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Directory server URL, e.g. `ldaps://ldap.example.com`.
    #[serde(default)]
    pub url: String,

    /// DN the engine binds as.
    #[serde(default)]
    pub binddn: String,

    /// Password for the bind DN.
    #[serde(default)]
    pub bindpass: SecureString,

    /// Base DN under which user objects are searched.
    #[serde(default)]
    pub userdn: String,

    /// Attribute used to match usernames; empty selects the schema default.
    #[serde(default)]
    pub userattr: String,

    /// Directory schema dialect.
    #[serde(default)]
    pub schema: Schema,

    /// Active Directory userPrincipalName domain; switches DN-based updates
    /// to a whole-subtree UPN search when set.
    #[serde(default)]
    pub upndomain: String,

    /// Skip server certificate verification.
    #[serde(default)]
    pub insecure_tls: bool,

    /// Issue StartTLS after connecting.
    #[serde(default)]
    pub starttls: bool,

    /// CA certificate (PEM) used to verify the server.
    #[serde(default)]
    pub certificate: String,

    #[serde(default)]
    pub tls_min_version: String,

    #[serde(default)]
    pub tls_max_version: String,

    /// Whether the managed secret is a password or a RACF pass phrase.
    #[serde(default)]
    pub credential_type: CredentialType,
}

impl DirectoryConfig {
    /// Validate the configuration, filling defaulted TLS bounds.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        if self.binddn.is_empty() {
            return Err(ConfigError::MissingBindDn);
        }
        if self.bindpass.is_empty() {
            return Err(ConfigError::MissingBindPassword);
        }

        if !self.certificate.is_empty() && !self.certificate.contains("BEGIN CERTIFICATE") {
            return Err(ConfigError::InvalidCertificate);
        }

        if self.tls_min_version.is_empty() {
            self.tls_min_version = DEFAULT_TLS_VERSION.to_string();
        }
        if self.tls_max_version.is_empty() {
            self.tls_max_version = DEFAULT_TLS_VERSION.to_string();
        }
        for version in [&self.tls_min_version, &self.tls_max_version] {
            if !TLS_VERSIONS.contains(&version.as_str()) {
                return Err(ConfigError::InvalidTlsVersion {
                    version: version.clone(),
                });
            }
        }

        let min = TLS_VERSIONS
            .iter()
            .position(|v| *v == self.tls_min_version)
            .unwrap_or(0);
        let max = TLS_VERSIONS
            .iter()
            .position(|v| *v == self.tls_max_version)
            .unwrap_or(0);
        if min > max {
            return Err(ConfigError::TlsVersionOrder);
        }

        Ok(())
    }

    /// The effective user attribute: configured value or schema default.
    pub fn user_attribute(&self) -> &str {
        if self.userattr.is_empty() {
            self.schema.default_user_attribute().attribute_name()
        } else {
            &self.userattr
        }
    }

    /// A minimal valid configuration, for tests and documentation.
    pub fn example() -> Self {
        Self {
            url: "ldap://127.0.0.1".to_string(),
            binddn: "cn=admin,dc=example,dc=com".to_string(),
            bindpass: SecureString::new("admin-password"),
            userdn: "ou=users,dc=example,dc=com".to_string(),
            tls_min_version: DEFAULT_TLS_VERSION.to_string(),
            tls_max_version: DEFAULT_TLS_VERSION.to_string(),
            ..Self::default()
        }
    }
}
