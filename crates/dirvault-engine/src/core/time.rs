//! Serde adapters for durations persisted as whole seconds.

use std::time::Duration;

/// Serialize a `Duration` as integer seconds.
pub mod duration_seconds {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let seconds = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(seconds))
    }
}

/// Serialize an `Option<Duration>` as integer seconds or null.
pub mod option_duration_seconds {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        let seconds = Option::<u64>::deserialize(deserializer)?;
        Ok(seconds.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super::duration_seconds")]
        period: Duration,
        #[serde(default, with = "super::option_duration_seconds")]
        grace: Option<Duration>,
    }

    #[test]
    fn test_round_trip() {
        let wrapper = Wrapper {
            period: Duration::from_secs(3600),
            grace: Some(Duration::from_secs(30)),
        };
        let json = serde_json::to_string(&wrapper).unwrap();
        assert_eq!(json, r#"{"period":3600,"grace":30}"#);

        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.period, Duration::from_secs(3600));
        assert_eq!(back.grace, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_missing_option_decodes_to_none() {
        let back: Wrapper = serde_json::from_str(r#"{"period":5}"#).unwrap();
        assert_eq!(back.grace, None);
    }
}
