//! `role/<name>` paths: dynamic roles backed by LDIF templates.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::{Map, json};
use std::time::Duration;

use dirvault_directory::ldif;

use crate::backend::Backend;
use crate::core::error::{EngineError, Result};
use crate::core::time::duration_seconds;
use crate::paths::{Operation, Request, Response, get_duration, get_string};
use crate::storage::records::{self, DYNAMIC_ROLE_PREFIX};

/// A dynamic role: an LDIF template from which short-lived directory
/// entries are created on demand.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DynamicRole {
    #[serde(default)]
    pub creation_ldif: String,

    #[serde(default)]
    pub username_template: String,

    #[serde(default, with = "duration_seconds")]
    pub default_ttl: Duration,

    #[serde(default, with = "duration_seconds")]
    pub max_ttl: Duration,
}

/// Values a dynamic-role template may reference.
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub role_name: String,
    pub issue_time: String,
    pub issue_time_seconds: i64,
    pub expiration_time: String,
    pub expiration_time_seconds: i64,
}

impl Backend {
    pub(crate) async fn handle_dynamic_role(&self, req: Request, name: &str) -> Result<Response> {
        match req.operation {
            Operation::List => {
                let keys = self
                    .storage
                    .list(&format!("{DYNAMIC_ROLE_PREFIX}{name}"))
                    .await?;
                Ok(Response::list(keys))
            }
            Operation::Read => self.dynamic_role_read(name).await,
            Operation::Create | Operation::Update => {
                self.dynamic_role_create_update(req.clone(), name).await
            }
            Operation::Delete => {
                records::delete_dynamic_role(self.storage.as_ref(), name).await?;
                Ok(Response::empty())
            }
        }
    }

    async fn dynamic_role_read(&self, name: &str) -> Result<Response> {
        let Some(role) = records::load_dynamic_role(self.storage.as_ref(), name).await? else {
            return Err(EngineError::not_found("dynamic role", name));
        };

        let mut data = Map::new();
        data.insert("creation_ldif".to_string(), json!(role.creation_ldif));
        data.insert(
            "username_template".to_string(),
            json!(role.username_template),
        );
        data.insert("default_ttl".to_string(), json!(role.default_ttl.as_secs()));
        data.insert("max_ttl".to_string(), json!(role.max_ttl.as_secs()));
        Ok(Response::with_data(data))
    }

    async fn dynamic_role_create_update(&self, req: Request, name: &str) -> Result<Response> {
        if name.is_empty() {
            return Err(EngineError::validation("empty role name attribute given"));
        }
        let data = &req.data;

        let creation_ldif = get_string(data, "creation_ldif")?
            .filter(|l| !l.is_empty())
            .ok_or_else(|| EngineError::validation("missing creation_ldif"))?;
        let creation_ldif = decode_base64(&creation_ldif);

        assert_valid_ldif_template(&creation_ldif)?;

        let role = DynamicRole {
            creation_ldif,
            username_template: get_string(data, "username_template")?.unwrap_or_default(),
            default_ttl: get_duration(data, "default_ttl")?
                .unwrap_or_else(|| self.system.default_lease_ttl()),
            max_ttl: get_duration(data, "max_ttl")?
                .unwrap_or_else(|| self.system.max_lease_ttl()),
        };

        records::store_dynamic_role(self.storage.as_ref(), name, &role).await?;
        Ok(Response::empty())
    }
}

/// Base64 payloads are accepted for LDIF fields; anything that fails to
/// decode is treated as raw LDIF.
pub(crate) fn decode_base64(input: &str) -> String {
    match BASE64.decode(input.trim()) {
        Ok(decoded) => String::from_utf8(decoded).unwrap_or_else(|_| input.to_string()),
        Err(_) => input.to_string(),
    }
}

/// Validate a creation LDIF template: it must render with placeholder
/// data, parse as LDIF, and describe exactly one `add` record. Modify and
/// delete records cannot be rolled back safely on revocation, so they are
/// rejected at write time.
fn assert_valid_ldif_template(raw_template: &str) -> Result<()> {
    let test_data = TemplateData {
        username: "testuser".to_string(),
        password: "testpass".to_string(),
        display_name: "testdisplayname".to_string(),
        role_name: "testrolename".to_string(),
        issue_time: "2006-01-02T15:04:05Z".to_string(),
        issue_time_seconds: 1_136_214_245,
        expiration_time: "2006-01-02T16:04:05Z".to_string(),
        expiration_time_seconds: 1_136_217_845,
    };
    let rendered = render_template(raw_template, &test_data)
        .map_err(|e| EngineError::validation(format!("invalid creation_ldif template: {e}")))?;

    let entries = ldif::parse(&rendered)
        .map_err(|e| EngineError::validation(format!("creation_ldif is invalid: {e}")))?;

    if entries.len() > 1 {
        return Err(EngineError::validation(
            "cannot specify more than one LDIF record in creation_ldif",
        ));
    }
    if !entries[0].is_add() {
        return Err(EngineError::validation(
            "invalid creation_ldif: cannot specify modify or delete changetype",
        ));
    }
    Ok(())
}

/// Substitute `{{.Field}}` references. Unknown fields are template errors
/// so typos surface at role write time, not at credential issue time.
pub(crate) fn render_template(
    template: &str,
    data: &TemplateData,
) -> std::result::Result<String, String> {
    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            return Err("unterminated {{ in template".to_string());
        };
        let field = after[..end].trim();
        let value = match field {
            ".Username" => data.username.clone(),
            ".Password" => data.password.clone(),
            ".DisplayName" => data.display_name.clone(),
            ".RoleName" => data.role_name.clone(),
            ".IssueTime" => data.issue_time.clone(),
            ".IssueTimeSeconds" => data.issue_time_seconds.to_string(),
            ".ExpirationTime" => data.expiration_time.clone(),
            ".ExpirationTimeSeconds" => data.expiration_time_seconds.to_string(),
            other => return Err(format!("unknown template field {other:?}")),
        };
        rendered.push_str(&value);
        rest = &after[end + 2..];
    }
    rendered.push_str(rest);
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_TEMPLATE: &str = "dn: cn={{.Username}},ou=users,dc=example,dc=com\n\
objectClass: person\n\
objectClass: top\n\
cn: {{.Username}}\n\
sn: {{.Username}}\n\
userPassword: {{.Password}}\n";

    #[test]
    fn test_render_template() {
        let data = TemplateData {
            username: "alice".to_string(),
            password: "secret".to_string(),
            ..TemplateData::default()
        };
        let rendered = render_template(VALID_TEMPLATE, &data).unwrap();
        assert!(rendered.contains("dn: cn=alice,ou=users,dc=example,dc=com"));
        assert!(rendered.contains("userPassword: secret"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_render_rejects_unknown_fields() {
        let err = render_template("cn: {{.Nope}}", &TemplateData::default()).unwrap_err();
        assert!(err.contains(".Nope"));

        let err = render_template("cn: {{.Username", &TemplateData::default()).unwrap_err();
        assert!(err.contains("unterminated"));
    }

    #[test]
    fn test_template_validation_accepts_add() {
        assert!(assert_valid_ldif_template(VALID_TEMPLATE).is_ok());
    }

    #[test]
    fn test_template_validation_rejects_modify_and_delete() {
        let modify = "dn: cn={{.Username}},dc=example,dc=com\n\
changetype: modify\n\
replace: userPassword\n\
userPassword: {{.Password}}\n";
        let err = assert_valid_ldif_template(modify).unwrap_err();
        assert!(err.to_string().contains("modify or delete"));

        let delete = "dn: cn={{.Username}},dc=example,dc=com\nchangetype: delete\n";
        assert!(assert_valid_ldif_template(delete).is_err());
    }

    #[test]
    fn test_template_validation_rejects_multiple_records() {
        let two = "dn: cn=a,dc=example,dc=com\ncn: a\n\ndn: cn=b,dc=example,dc=com\ncn: b\n";
        let err = assert_valid_ldif_template(two).unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn test_decode_base64_passthrough() {
        assert_eq!(decode_base64("ZG46IGNuPXg="), "dn: cn=x");
        assert_eq!(decode_base64("dn: cn=x"), "dn: cn=x");
    }
}
