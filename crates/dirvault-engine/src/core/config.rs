//! Engine configuration: directory connection plus password settings.

use chrono::{DateTime, Utc};
use dirvault_directory::{DirectoryConfig, SecureString};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::error::{EngineError, Result};
use crate::core::time::duration_seconds;
use crate::password::{DEFAULT_PASSWORD_LENGTH, validate_password_settings};

/// The engine's persisted configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Directory connection settings.
    pub directory: DirectoryConfig,

    /// Named host password policy. Mutually exclusive with
    /// `length`/`formatter`.
    #[serde(default)]
    pub password_policy: Option<String>,

    /// Generated password length for the default and legacy paths.
    #[serde(default = "default_password_length")]
    pub length: usize,

    /// Legacy formatter template with a `{{PASSWORD}}` token.
    #[serde(default)]
    pub formatter: String,

    /// Default credential time-to-live reported to the host.
    #[serde(default, with = "duration_seconds")]
    pub ttl: Duration,

    /// Maximum credential time-to-live.
    #[serde(default, with = "duration_seconds")]
    pub max_ttl: Duration,

    /// The previous bind password, kept after a root rotation until the
    /// directory has fully converged.
    #[serde(default)]
    pub last_bind_password: Option<SecureString>,

    /// When the bind password was last rotated.
    #[serde(default)]
    pub last_bind_password_rotation: Option<DateTime<Utc>>,
}

fn default_password_length() -> usize {
    DEFAULT_PASSWORD_LENGTH
}

impl EngineConfig {
    /// Build a configuration around validated directory settings.
    pub fn new(directory: DirectoryConfig) -> Self {
        Self {
            directory,
            password_policy: None,
            length: DEFAULT_PASSWORD_LENGTH,
            formatter: String::new(),
            ttl: Duration::ZERO,
            max_ttl: Duration::ZERO,
            last_bind_password: None,
            last_bind_password_rotation: None,
        }
    }

    /// Validate the password-generation settings.
    pub fn validate(&self) -> Result<()> {
        if self.password_policy.is_some() {
            if !self.formatter.is_empty() {
                return Err(EngineError::validation(
                    "password_policy is mutually exclusive with formatter",
                ));
            }
            return Ok(());
        }
        validate_password_settings(&self.formatter, self.length)?;

        if self.ttl > self.max_ttl && !self.max_ttl.is_zero() {
            return Err(EngineError::validation(
                "ttl must be smaller than or equal to max_ttl",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EngineConfig {
        EngineConfig::new(DirectoryConfig::example())
    }

    #[test]
    fn test_defaults_validate() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_policy_excludes_formatter() {
        let mut c = config();
        c.password_policy = Some("strong-policy".to_string());
        assert!(c.validate().is_ok());

        c.formatter = "pre{{PASSWORD}}".to_string();
        let err = c.validate().unwrap_err();
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn test_short_length_rejected() {
        let mut c = config();
        c.length = 8;
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_ttl_bounds() {
        let mut c = config();
        c.ttl = Duration::from_secs(7200);
        c.max_ttl = Duration::from_secs(3600);
        assert!(c.validate().is_err());

        c.max_ttl = Duration::from_secs(7200);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_decode_defaults_length() {
        let json = r#"{"directory":{"url":"ldap://h","binddn":"cn=x","bindpass":"y"}}"#;
        let c: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.length, DEFAULT_PASSWORD_LENGTH);
        assert!(c.password_policy.is_none());
        assert!(c.last_bind_password.is_none());
    }
}
