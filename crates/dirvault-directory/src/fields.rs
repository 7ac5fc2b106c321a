//! Known directory attribute names.
//!
//! The configurable `userattr` must resolve to one of these before it is
//! interpolated into a search filter, which keeps arbitrary strings out of
//! the wire protocol.

/// A directory attribute the engine knows how to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    ObjectClass,
    Cn,
    Uid,
    Mail,
    GivenName,
    Surname,
    SamAccountName,
    UserPrincipalName,
    UserPassword,
    UnicodePwd,
    RacfId,
    RacfPassword,
    RacfPassphrase,
    RacfAttributes,
}

impl Field {
    /// Resolve an attribute name, case-insensitively.
    ///
    /// Returns `None` for attributes the engine does not manage; callers
    /// surface that as an unsupported-userattr error.
    pub fn parse(name: &str) -> Option<Field> {
        let lowered = name.to_ascii_lowercase();
        let field = match lowered.as_str() {
            "objectclass" => Field::ObjectClass,
            "cn" => Field::Cn,
            "uid" => Field::Uid,
            "mail" => Field::Mail,
            "givenname" => Field::GivenName,
            "sn" => Field::Surname,
            "samaccountname" => Field::SamAccountName,
            "userprincipalname" => Field::UserPrincipalName,
            "userpassword" => Field::UserPassword,
            "unicodepwd" => Field::UnicodePwd,
            "racfid" => Field::RacfId,
            "racfpassword" => Field::RacfPassword,
            "racfpassphrase" => Field::RacfPassphrase,
            "racfattributes" => Field::RacfAttributes,
            _ => return None,
        };
        Some(field)
    }

    /// Canonical attribute name as sent on the wire.
    pub fn attribute_name(&self) -> &'static str {
        match self {
            Field::ObjectClass => "objectClass",
            Field::Cn => "cn",
            Field::Uid => "uid",
            Field::Mail => "mail",
            Field::GivenName => "givenName",
            Field::Surname => "sn",
            Field::SamAccountName => "sAMAccountName",
            Field::UserPrincipalName => "userPrincipalName",
            Field::UserPassword => "userPassword",
            Field::UnicodePwd => "unicodePwd",
            Field::RacfId => "racfid",
            Field::RacfPassword => "racfPassword",
            Field::RacfPassphrase => "racfPassphrase",
            Field::RacfAttributes => "racfAttributes",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.attribute_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Field::parse("userPrincipalName"), Some(Field::UserPrincipalName));
        assert_eq!(Field::parse("USERPRINCIPALNAME"), Some(Field::UserPrincipalName));
        assert_eq!(Field::parse("samaccountname"), Some(Field::SamAccountName));
        assert_eq!(Field::parse("cn"), Some(Field::Cn));
    }

    #[test]
    fn test_parse_rejects_unknown_attributes() {
        assert_eq!(Field::parse("telephoneNumber"), None);
        assert_eq!(Field::parse(""), None);
    }

    #[test]
    fn test_attribute_name_round_trips() {
        for field in [
            Field::ObjectClass,
            Field::UserPassword,
            Field::UnicodePwd,
            Field::RacfPassword,
            Field::RacfPassphrase,
            Field::RacfAttributes,
            Field::UserPrincipalName,
        ] {
            assert_eq!(Field::parse(field.attribute_name()), Some(field));
        }
    }
}
