//! Library sets: pools of service accounts lent out via check-out.

use chrono::{DateTime, Utc};
use dirvault_directory::SecureString;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::core::error::{EngineError, Result};
use crate::core::time::duration_seconds;

/// Default lending period when a set does not configure one.
pub const DEFAULT_CHECKOUT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// An ordered set of service accounts available for exclusive check-out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibrarySet {
    #[serde(default)]
    pub service_account_names: Vec<String>,

    #[serde(default, with = "duration_seconds")]
    pub ttl: Duration,

    #[serde(default, with = "duration_seconds")]
    pub max_ttl: Duration,

    /// When set, anyone may check an account back in, not just the
    /// borrower.
    #[serde(default)]
    pub disable_check_in_enforcement: bool,
}

impl LibrarySet {
    /// Validate the set's configuration invariants.
    pub fn validate(&self) -> Result<()> {
        if self.service_account_names.is_empty() {
            return Err(EngineError::validation(
                "service_account_names must not be empty",
            ));
        }
        let mut seen = HashSet::new();
        for name in &self.service_account_names {
            if name.is_empty() {
                return Err(EngineError::validation(
                    "service account names must not be empty",
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(EngineError::validation(format!(
                    "duplicate service account name {name:?}"
                )));
            }
        }
        if self.max_ttl < self.ttl {
            return Err(EngineError::validation(
                "max_ttl cannot be less than ttl",
            ));
        }
        Ok(())
    }
}

/// Lending state for one service account in a library set.
///
/// The engine takes over the account's password on first check-out and
/// rotates it on every check-in, so returned borrowers lose access.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckOut {
    #[serde(default)]
    pub available: bool,

    /// Entity that holds the account while checked out.
    #[serde(default)]
    pub borrower_entity_id: String,

    /// When the loan expires.
    #[serde(default)]
    pub due: Option<DateTime<Utc>>,

    /// The account's current password, once the engine has set one.
    #[serde(default)]
    pub password: SecureString,
}

impl CheckOut {
    /// A fresh, never-borrowed record.
    pub fn available() -> Self {
        Self {
            available: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> LibrarySet {
        LibrarySet {
            service_account_names: vec!["tester1@example.com".into(), "tester2@example.com".into()],
            ttl: Duration::from_secs(10 * 3600),
            max_ttl: Duration::from_secs(11 * 3600),
            disable_check_in_enforcement: false,
        }
    }

    #[test]
    fn test_valid_set() {
        assert!(set().validate().is_ok());
    }

    #[test]
    fn test_empty_accounts_rejected() {
        let mut s = set();
        s.service_account_names.clear();
        assert!(s.validate().is_err());

        let mut s = set();
        s.service_account_names.push(String::new());
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_duplicate_accounts_rejected() {
        let mut s = set();
        s.service_account_names.push("tester1@example.com".into());
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_max_ttl_bound() {
        let mut s = set();
        s.max_ttl = Duration::from_secs(3600);
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("max_ttl"));

        // Equal is allowed.
        s.max_ttl = s.ttl;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_checkout_defaults() {
        let checkout = CheckOut::available();
        assert!(checkout.available);
        assert!(checkout.borrower_entity_id.is_empty());
        assert!(checkout.due.is_none());
        assert!(checkout.password.is_empty());
    }
}
