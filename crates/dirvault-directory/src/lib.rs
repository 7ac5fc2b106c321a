//! Directory client port for the dirvault secrets engine.
//!
//! Everything the engine knows about LDAP lives here: the connection
//! configuration, the supported directory schemas and their password
//! wire forms, a minimal LDIF model, and the [`DirectoryClient`] port the
//! rotation engine drives. The on-wire protocol itself sits behind the
//! [`LdapTransport`] trait so the engine never touches a socket.

pub mod client;
pub mod config;
pub mod credential_type;
pub mod fields;
pub mod ldif;
pub mod schema;
pub mod secure;

pub use client::{
    Client, DirectoryClient, DirectoryError, LdapTransport, SearchFilter, SearchScope,
};
pub use config::DirectoryConfig;
pub use credential_type::CredentialType;
pub use fields::Field;
pub use ldif::{LdifAttribute, LdifChange, LdifEntry, LdifError, LdifMod, ModOp};
pub use schema::{AttributeValue, PasswordAttributes, Schema, encode_ad_password};
pub use secure::SecureString;
