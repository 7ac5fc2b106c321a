//! Credential types for directory password management.

use serde::{Deserialize, Serialize};

/// The kind of credential managed on the directory side.
///
/// Password and password-phrase management are mutually exclusive
/// operations on RACF: when the engine manages one, it never modifies the
/// other. The other schemas only use [`CredentialType::Password`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    #[default]
    Password,
    Phrase,
}

impl CredentialType {
    /// Parse the configuration form of the credential type.
    pub fn parse(value: &str) -> Option<CredentialType> {
        match value {
            "password" => Some(CredentialType::Password),
            "phrase" => Some(CredentialType::Phrase),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Password => "password",
            CredentialType::Phrase => "phrase",
        }
    }
}

impl std::fmt::Display for CredentialType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(CredentialType::parse("password"), Some(CredentialType::Password));
        assert_eq!(CredentialType::parse("phrase"), Some(CredentialType::Phrase));
        assert_eq!(CredentialType::parse("token"), None);
    }

    #[test]
    fn test_default_is_password() {
        assert_eq!(CredentialType::default(), CredentialType::Password);
    }
}
