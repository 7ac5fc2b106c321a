//! Secret string type with automatic zeroization.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A password or other secret held in memory.
///
/// Zeroizes its buffer on drop and redacts itself from `Debug`/`Display`
/// output so secrets never reach logs. Serializes as a plain string because
/// the storage barrier is the host's responsibility.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct SecureString(String);

impl SecureString {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the inner value. Call sites should be deliberate about this.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True when no secret has been set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert to a plain `String`, consuming self.
    #[must_use]
    pub fn into_string(mut self) -> String {
        std::mem::take(&mut self.0)
    }
}

impl From<String> for SecureString {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecureString {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Debug for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl std::fmt::Display for SecureString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl Serialize for SecureString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecureString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecureString::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_and_display_redact() {
        let secret = SecureString::new("hunter2");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(format!("{}", secret), "[REDACTED]");
    }

    #[test]
    fn test_expose_and_empty() {
        let secret = SecureString::new("pa$$w0rd");
        assert_eq!(secret.expose(), "pa$$w0rd");
        assert!(!secret.is_empty());
        assert!(SecureString::default().is_empty());
    }

    #[test]
    fn test_serde_round_trip() {
        let secret = SecureString::new("value");
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"value\"");

        let back: SecureString = serde_json::from_str(&json).unwrap();
        assert_eq!(back.expose(), "value");
    }
}
