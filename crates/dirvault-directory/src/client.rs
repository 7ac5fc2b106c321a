//! The directory client port.
//!
//! [`Client`] owns every decision about *what* to send (search base, scope,
//! filters, schema-specific password attributes) while the wire itself
//! stays behind [`LdapTransport`]. The rotation engine only sees the
//! [`DirectoryClient`] trait.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::DirectoryConfig;
use crate::fields::Field;
use crate::ldif::LdifEntry;
use crate::schema::PasswordAttributes;
use crate::secure::SecureString;

/// Directory operation failure.
///
/// Transport failures are connection-level (unreachable host, TLS,
/// timeouts); protocol failures are rejections from the server (bad filter,
/// constraint violation, insufficient access). Neither has partial
/// semantics: an operation either fully applied or did not.
#[derive(Error, Debug, Clone)]
pub enum DirectoryError {
    #[error("directory transport error: {0}")]
    Transport(String),

    #[error("directory protocol error: {0}")]
    Protocol(String),

    #[error("invalid directory request: {0}")]
    InvalidRequest(String),
}

/// Search scope for locating the entry to modify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    BaseObject,
    WholeSubtree,
}

/// Conjunction of attribute equality assertions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilter {
    clauses: Vec<(Field, String)>,
}

impl SearchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, value: impl Into<String>) -> Self {
        self.clauses.push((field, value.into()));
        self
    }

    pub fn clauses(&self) -> &[(Field, String)] {
        &self.clauses
    }

    /// Render as an RFC 4515 filter string.
    pub fn render(&self) -> String {
        let rendered: Vec<String> = self
            .clauses
            .iter()
            .map(|(field, value)| format!("({}={})", field.attribute_name(), value))
            .collect();
        match rendered.len() {
            0 => "(objectClass=*)".to_string(),
            1 => rendered.into_iter().next().unwrap_or_default(),
            _ => format!("(&{})", rendered.concat()),
        }
    }
}

/// Escape a value for embedding in a search filter (RFC 4515).
pub fn escape_filter_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\5c"),
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\0' => escaped.push_str("\\00"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// The abstract wire. Implementations own connections, binds and retries;
/// they must be cancel-safe and must not retain passwords after returning.
#[async_trait]
pub trait LdapTransport: Send + Sync {
    /// Search `base_dn` with `scope`/`filter` for exactly one entry and
    /// replace the given attributes on it.
    async fn update_password(
        &self,
        config: &DirectoryConfig,
        base_dn: &str,
        scope: SearchScope,
        values: &PasswordAttributes,
        filter: &SearchFilter,
    ) -> Result<(), DirectoryError>;

    /// Like `update_password`, but the bind identity is the target entry
    /// itself (the config carries the rebind DN and current password).
    async fn update_self_managed_password(
        &self,
        config: &DirectoryConfig,
        scope: SearchScope,
        values: &PasswordAttributes,
        filter: &SearchFilter,
    ) -> Result<(), DirectoryError>;

    /// Apply LDIF changes in order. With `continue_on_error`, failures are
    /// collected and returned after all entries were attempted.
    async fn execute(
        &self,
        config: &DirectoryConfig,
        entries: &[LdifEntry],
        continue_on_error: bool,
    ) -> Result<(), DirectoryError>;
}

/// The port the rotation engine and the request surface drive.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Set a new password on the entry with the given DN.
    async fn update_dn_password(
        &self,
        config: &DirectoryConfig,
        dn: &str,
        new_password: &str,
    ) -> Result<(), DirectoryError>;

    /// Set a new password on the entry found by username search.
    async fn update_user_password(
        &self,
        config: &DirectoryConfig,
        username: &str,
        new_password: &str,
    ) -> Result<(), DirectoryError>;

    /// Change a password by binding as the target entry itself.
    async fn update_self_managed_password(
        &self,
        config: &DirectoryConfig,
        dn: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), DirectoryError>;

    /// Apply LDIF changes (dynamic role creation and revocation).
    async fn execute(
        &self,
        config: &DirectoryConfig,
        entries: &[LdifEntry],
        continue_on_error: bool,
    ) -> Result<(), DirectoryError>;
}

/// Directory client over an [`LdapTransport`].
pub struct Client<T> {
    transport: T,
}

impl<T> Client<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }
}

impl<T> Client<T> {
    fn user_attribute_field(config: &DirectoryConfig) -> Result<Field, DirectoryError> {
        let userattr = config.user_attribute();
        Field::parse(userattr).ok_or_else(|| {
            DirectoryError::InvalidRequest(format!("unsupported userattr {userattr:?}"))
        })
    }
}

#[async_trait]
impl<T: LdapTransport> DirectoryClient for Client<T> {
    /// Update the password for the object with the given DN.
    ///
    /// The DN targets the object directly with a base-object search. Active
    /// Directory configured with a UPN domain is the exception: the update
    /// becomes a whole-subtree search under `userdn` matching
    /// `userPrincipalName = <dn>@<domain>`.
    async fn update_dn_password(
        &self,
        config: &DirectoryConfig,
        dn: &str,
        new_password: &str,
    ) -> Result<(), DirectoryError> {
        let mut scope = SearchScope::BaseObject;
        let mut base_dn = dn;
        let mut filter = SearchFilter::new().with(Field::ObjectClass, "*");

        let field = Self::user_attribute_field(config)?;
        if field == Field::UserPrincipalName && !config.upndomain.is_empty() {
            scope = SearchScope::WholeSubtree;
            let bind_user = format!("{}@{}", escape_filter_value(dn), config.upndomain);
            filter = SearchFilter::new().with(field, bind_user);
            base_dn = &config.userdn;
        }

        tracing::debug!(base_dn = %base_dn, filter = %filter.render(), "updating entry password");
        let values = config.schema.password_attributes(config, new_password);
        self.transport
            .update_password(config, base_dn, scope, &values, &filter)
            .await
    }

    /// Update the password for the object with the given username,
    /// searching the whole subtree rooted at `userdn`.
    async fn update_user_password(
        &self,
        config: &DirectoryConfig,
        username: &str,
        new_password: &str,
    ) -> Result<(), DirectoryError> {
        let field = Self::user_attribute_field(config)?;
        let filter = SearchFilter::new().with(field, escape_filter_value(username));

        tracing::debug!(userdn = %config.userdn, filter = %filter.render(), "updating user password");
        let values = config.schema.password_attributes(config, new_password);
        self.transport
            .update_password(
                config,
                &config.userdn,
                SearchScope::WholeSubtree,
                &values,
                &filter,
            )
            .await
    }

    async fn update_self_managed_password(
        &self,
        config: &DirectoryConfig,
        dn: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), DirectoryError> {
        if dn.is_empty() {
            return Err(DirectoryError::InvalidRequest(
                "a DN is required for self-managed password changes".to_string(),
            ));
        }
        if current_password.is_empty() || new_password.is_empty() {
            return Err(DirectoryError::InvalidRequest(format!(
                "both current and new password must be provided for self-managed password changes on dn: {dn}"
            )));
        }

        // Rebind as the target entry; the caller's bind identity is not
        // used for self-managed changes.
        let mut rebind = config.clone();
        rebind.binddn = dn.to_string();
        rebind.bindpass = SecureString::new(current_password);

        let filter = SearchFilter::new().with(Field::ObjectClass, "*");
        let values = rebind.schema.password_attributes(&rebind, new_password);
        self.transport
            .update_self_managed_password(&rebind, SearchScope::BaseObject, &values, &filter)
            .await
    }

    async fn execute(
        &self,
        config: &DirectoryConfig,
        entries: &[LdifEntry],
        continue_on_error: bool,
    ) -> Result<(), DirectoryError> {
        self.transport
            .execute(config, entries, continue_on_error)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeValue, Schema};
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct RecordedUpdate {
        base_dn: String,
        scope: SearchScope,
        filter: String,
        values: PasswordAttributes,
        bound_as: String,
    }

    #[derive(Default)]
    struct RecordingTransport {
        updates: Mutex<Vec<RecordedUpdate>>,
    }

    #[async_trait]
    impl LdapTransport for RecordingTransport {
        async fn update_password(
            &self,
            config: &DirectoryConfig,
            base_dn: &str,
            scope: SearchScope,
            values: &PasswordAttributes,
            filter: &SearchFilter,
        ) -> Result<(), DirectoryError> {
            self.updates.lock().unwrap().push(RecordedUpdate {
                base_dn: base_dn.to_string(),
                scope,
                filter: filter.render(),
                values: values.clone(),
                bound_as: config.binddn.clone(),
            });
            Ok(())
        }

        async fn update_self_managed_password(
            &self,
            config: &DirectoryConfig,
            scope: SearchScope,
            values: &PasswordAttributes,
            filter: &SearchFilter,
        ) -> Result<(), DirectoryError> {
            self.updates.lock().unwrap().push(RecordedUpdate {
                base_dn: config.binddn.clone(),
                scope,
                filter: filter.render(),
                values: values.clone(),
                bound_as: config.binddn.clone(),
            });
            Ok(())
        }

        async fn execute(
            &self,
            _config: &DirectoryConfig,
            _entries: &[LdifEntry],
            _continue_on_error: bool,
        ) -> Result<(), DirectoryError> {
            Ok(())
        }
    }

    fn recorded(client: &Client<RecordingTransport>) -> Vec<RecordedUpdate> {
        client.transport.updates.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_update_dn_password_targets_object_directly() {
        let client = Client::new(RecordingTransport::default());
        let config = DirectoryConfig::example();

        client
            .update_dn_password(&config, "uid=bob,ou=users,dc=example,dc=com", "new-pw")
            .await
            .unwrap();

        let updates = recorded(&client);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].base_dn, "uid=bob,ou=users,dc=example,dc=com");
        assert_eq!(updates[0].scope, SearchScope::BaseObject);
        assert_eq!(updates[0].filter, "(objectClass=*)");
        assert_eq!(updates[0].values[0].0, Field::UserPassword);
    }

    #[tokio::test]
    async fn test_update_dn_password_upn_domain_rewrites_search() {
        let client = Client::new(RecordingTransport::default());
        let mut config = DirectoryConfig::example();
        config.schema = Schema::ActiveDirectory;
        config.upndomain = "example.com".to_string();

        client
            .update_dn_password(&config, "bob", "new-pw")
            .await
            .unwrap();

        let updates = recorded(&client);
        assert_eq!(updates[0].scope, SearchScope::WholeSubtree);
        assert_eq!(updates[0].base_dn, config.userdn);
        assert_eq!(updates[0].filter, "(userPrincipalName=bob@example.com)");
        assert_eq!(updates[0].values[0].0, Field::UnicodePwd);
        assert!(matches!(
            updates[0].values[0].1[0],
            AttributeValue::Binary(_)
        ));
    }

    #[tokio::test]
    async fn test_update_user_password_searches_subtree() {
        let client = Client::new(RecordingTransport::default());
        let config = DirectoryConfig::example();

        client
            .update_user_password(&config, "bob", "new-pw")
            .await
            .unwrap();

        let updates = recorded(&client);
        assert_eq!(updates[0].base_dn, "ou=users,dc=example,dc=com");
        assert_eq!(updates[0].scope, SearchScope::WholeSubtree);
        assert_eq!(updates[0].filter, "(cn=bob)");
    }

    #[tokio::test]
    async fn test_unsupported_userattr_is_rejected() {
        let client = Client::new(RecordingTransport::default());
        let mut config = DirectoryConfig::example();
        config.userattr = "telephoneNumber".to_string();

        let err = client
            .update_user_password(&config, "bob", "new-pw")
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidRequest(_)));
        assert!(err.to_string().contains("telephoneNumber"));
    }

    #[tokio::test]
    async fn test_self_managed_rebinds_as_target() {
        let client = Client::new(RecordingTransport::default());
        let config = DirectoryConfig::example();

        client
            .update_self_managed_password(
                &config,
                "uid=bob,ou=users,dc=example,dc=com",
                "current",
                "next",
            )
            .await
            .unwrap();

        let updates = recorded(&client);
        assert_eq!(updates[0].bound_as, "uid=bob,ou=users,dc=example,dc=com");
        assert_eq!(updates[0].scope, SearchScope::BaseObject);
    }

    #[tokio::test]
    async fn test_self_managed_requires_both_passwords() {
        let client = Client::new(RecordingTransport::default());
        let config = DirectoryConfig::example();

        let err = client
            .update_self_managed_password(&config, "uid=bob,dc=example,dc=com", "", "next")
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidRequest(_)));

        let err = client
            .update_self_managed_password(&config, "", "current", "next")
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidRequest(_)));
    }

    #[test]
    fn test_filter_rendering() {
        assert_eq!(SearchFilter::new().render(), "(objectClass=*)");
        assert_eq!(
            SearchFilter::new().with(Field::Cn, "bob").render(),
            "(cn=bob)"
        );
        assert_eq!(
            SearchFilter::new()
                .with(Field::ObjectClass, "person")
                .with(Field::Cn, "bob")
                .render(),
            "(&(objectClass=person)(cn=bob))"
        );
    }

    #[test]
    fn test_escape_filter_value() {
        assert_eq!(escape_filter_value("plain"), "plain");
        assert_eq!(escape_filter_value("a*b"), "a\\2ab");
        assert_eq!(escape_filter_value("(x)"), "\\28x\\29");
        assert_eq!(escape_filter_value("a\\b"), "a\\5cb");
    }
}
