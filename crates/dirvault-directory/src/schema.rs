//! Directory schemas and their password wire forms.
//!
//! Each supported schema stores passwords in a different attribute with its
//! own encoding rules. [`Schema::password_attributes`] produces the exact
//! replace-modification payload for a new password.

use serde::{Deserialize, Serialize};

use crate::config::DirectoryConfig;
use crate::credential_type::CredentialType;
use crate::fields::Field;

/// A directory schema the engine can manage passwords in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Schema {
    /// Generic OpenLDAP-style directory: passwords in `userPassword`.
    #[default]
    #[serde(rename = "openldap")]
    OpenLdap,

    /// Active Directory: passwords in `unicodePwd`, UTF-16LE and quoted.
    #[serde(rename = "ad")]
    ActiveDirectory,

    /// IBM RACF via its LDAP bridge: `racfPassword` or `racfPassphrase`.
    #[serde(rename = "racf")]
    Racf,
}

/// One value of a directory attribute modification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Binary(Vec<u8>),
}

/// The replace-modifications applied to set a password.
pub type PasswordAttributes = Vec<(Field, Vec<AttributeValue>)>;

impl Schema {
    /// All schemas the engine supports.
    pub fn supported() -> &'static [Schema] {
        &[Schema::OpenLdap, Schema::ActiveDirectory, Schema::Racf]
    }

    /// Parse the configuration form of a schema name.
    pub fn parse(value: &str) -> Option<Schema> {
        match value {
            "openldap" => Some(Schema::OpenLdap),
            "ad" => Some(Schema::ActiveDirectory),
            "racf" => Some(Schema::Racf),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Schema::OpenLdap => "openldap",
            Schema::ActiveDirectory => "ad",
            Schema::Racf => "racf",
        }
    }

    /// The attribute searched for when no `userattr` is configured.
    pub fn default_user_attribute(&self) -> Field {
        match self {
            Schema::OpenLdap => Field::Cn,
            Schema::ActiveDirectory => Field::UserPrincipalName,
            Schema::Racf => Field::RacfId,
        }
    }

    /// Build the modify payload that sets `new_password` under this schema.
    ///
    /// RACF additionally clears the expired flag so the fresh password is
    /// immediately usable.
    pub fn password_attributes(
        &self,
        config: &DirectoryConfig,
        new_password: &str,
    ) -> PasswordAttributes {
        match self {
            Schema::OpenLdap => vec![(
                Field::UserPassword,
                vec![AttributeValue::Text(new_password.to_string())],
            )],

            Schema::ActiveDirectory => vec![(
                Field::UnicodePwd,
                vec![AttributeValue::Binary(encode_ad_password(new_password))],
            )],

            Schema::Racf => {
                let password_field = if config.credential_type == CredentialType::Phrase {
                    Field::RacfPassphrase
                } else {
                    Field::RacfPassword
                };
                vec![
                    (
                        password_field,
                        vec![AttributeValue::Text(new_password.to_string())],
                    ),
                    (
                        Field::RacfAttributes,
                        vec![AttributeValue::Text("noexpired".to_string())],
                    ),
                ]
            }
        }
    }
}

impl std::fmt::Display for Schema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode a password the way Active Directory expects `unicodePwd`:
/// surrounded by double quotes and encoded as UTF-16LE.
pub fn encode_ad_password(password: &str) -> Vec<u8> {
    let quoted = format!("\"{password}\"");
    let mut encoded = Vec::with_capacity(quoted.len() * 2);
    for unit in quoted.encode_utf16() {
        encoded.extend_from_slice(&unit.to_le_bytes());
    }
    encoded
}
