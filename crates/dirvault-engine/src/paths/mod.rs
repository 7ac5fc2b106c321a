//! The request surface: host operations on configured paths.
//!
//! The host routes reads and writes at mount-relative paths; this module
//! translates them into commands against the stores, the registry, the
//! queue and the rotation engine. Validation failures surface as user
//! errors, everything else as server errors (see
//! [`EngineError::is_user_error`]).

pub mod checkout;
pub mod config;
pub mod dynamic_creds;
pub mod dynamic_roles;
pub mod library;
pub mod rotate;
pub mod static_creds;
pub mod static_roles;

use serde_json::{Map, Value};
use std::time::Duration;

use crate::backend::Backend;
use crate::core::error::{EngineError, Result};
use crate::storage::records::{DYNAMIC_ROLE_PREFIX, LIBRARY_PREFIX, STATIC_ROLE_PREFIX};

/// Host operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Read,
    Delete,
    List,
}

/// One host request against the engine.
#[derive(Debug, Clone)]
pub struct Request {
    pub operation: Operation,
    pub path: String,
    pub data: Map<String, Value>,

    /// Display name of the requesting token; used in generated usernames.
    pub display_name: String,

    /// Identity of the requesting entity; used for check-in enforcement.
    pub entity_id: String,
}

impl Request {
    pub fn new(operation: Operation, path: impl Into<String>) -> Self {
        Self {
            operation,
            path: path.into(),
            data: Map::new(),
            display_name: String::new(),
            entity_id: String::new(),
        }
    }

    pub fn with_data(mut self, data: Map<String, Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = entity_id.into();
        self
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }
}

/// Response data returned to the host.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub data: Map<String, Value>,
}

impl Response {
    /// A 204-style empty response.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_data(data: Map<String, Value>) -> Self {
        Self { data }
    }

    /// A list response carrying sorted keys.
    pub fn list(keys: Vec<String>) -> Self {
        let mut data = Map::new();
        data.insert(
            "keys".to_string(),
            Value::Array(keys.into_iter().map(Value::String).collect()),
        );
        Self { data }
    }

    /// Fetch a response field; test helper.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Fetch a string response field; test helper.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

impl Backend {
    /// Route a host request to its handler.
    pub async fn handle_request(&self, req: Request) -> Result<Response> {
        let path = req.path.clone();

        if path == "config" {
            return self.handle_config(req).await;
        }
        if path == "rotate-root" {
            return self.handle_rotate_root(req).await;
        }
        if let Some(name) = path.strip_prefix("rotate-role/") {
            return self.handle_rotate_role(req.operation, name).await;
        }

        if path == "static-role" || path.starts_with(STATIC_ROLE_PREFIX) {
            let name = path.strip_prefix(STATIC_ROLE_PREFIX).unwrap_or("");
            return self.handle_static_role(req.clone(), name).await;
        }
        if let Some(name) = path.strip_prefix("static-cred/") {
            return self.handle_static_cred(req.operation, name).await;
        }

        if let Some(rest) = path.strip_prefix("library/manage/") {
            if let Some(name) = rest.strip_suffix("/check-in") {
                return self.handle_check_in(req.clone(), name, true).await;
            }
            return Err(EngineError::validation(format!(
                "unsupported path {path:?}"
            )));
        }
        if path == "library" || path.starts_with(LIBRARY_PREFIX) {
            let rest = path.strip_prefix(LIBRARY_PREFIX).unwrap_or("");
            if let Some(name) = rest.strip_suffix("/check-out") {
                return self.handle_check_out(req.clone(), name).await;
            }
            if let Some(name) = rest.strip_suffix("/check-in") {
                return self.handle_check_in(req.clone(), name, false).await;
            }
            if let Some(name) = rest.strip_suffix("/status") {
                return self.handle_set_status(req.operation, name).await;
            }
            return self.handle_library_set(req.clone(), rest).await;
        }

        if path == "role" || path.starts_with(DYNAMIC_ROLE_PREFIX) {
            let name = path.strip_prefix(DYNAMIC_ROLE_PREFIX).unwrap_or("");
            return self.handle_dynamic_role(req.clone(), name).await;
        }
        if let Some(name) = path.strip_prefix("cred/") {
            return self.handle_dynamic_cred(req.clone(), name).await;
        }

        Err(EngineError::validation(format!(
            "unsupported path {path:?}"
        )))
    }
}

// Field-data accessors shared by the handlers. The host hands fields over
// as loose JSON; durations in particular arrive as numbers of seconds or
// as strings like "10h".

pub(crate) fn get_string(data: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(other) => Err(EngineError::validation(format!(
            "field {key} must be a string, got {other}"
        ))),
    }
}

pub(crate) fn get_bool(data: &Map<String, Value>, key: &str) -> Result<Option<bool>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(value)) => Ok(Some(*value)),
        Some(other) => Err(EngineError::validation(format!(
            "field {key} must be a boolean, got {other}"
        ))),
    }
}

pub(crate) fn get_usize(data: &Map<String, Value>, key: &str) -> Result<Option<usize>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(value)) => value
            .as_u64()
            .map(|v| Some(v as usize))
            .ok_or_else(|| EngineError::validation(format!("field {key} must be a non-negative integer"))),
        Some(other) => Err(EngineError::validation(format!(
            "field {key} must be an integer, got {other}"
        ))),
    }
}

/// Accepts `60`, `"60"`, `"10h"`, `"1h30m"`, `"90s"`.
pub(crate) fn get_duration(data: &Map<String, Value>, key: &str) -> Result<Option<Duration>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(value)) => {
            let seconds = value.as_u64().ok_or_else(|| {
                EngineError::validation(format!("field {key} must be a non-negative duration"))
            })?;
            Ok(Some(Duration::from_secs(seconds)))
        }
        Some(Value::String(value)) => parse_duration(value)
            .map(Some)
            .map_err(|e| EngineError::validation(format!("failed to parse {key}: {e}"))),
        Some(other) => Err(EngineError::validation(format!(
            "field {key} cannot be coerced to a duration, got {other}"
        ))),
    }
}

/// Accepts an array of strings or a comma-separated string.
pub(crate) fn get_string_list(
    data: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(
            value
                .split(',')
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(String::from)
                .collect(),
        )),
        Some(Value::Array(values)) => {
            let mut list = Vec::with_capacity(values.len());
            for value in values {
                match value {
                    Value::String(item) => list.push(item.clone()),
                    other => {
                        return Err(EngineError::validation(format!(
                            "field {key} must be a list of strings, got {other}"
                        )));
                    }
                }
            }
            Ok(Some(list))
        }
        Some(other) => Err(EngineError::validation(format!(
            "field {key} must be a list of strings, got {other}"
        ))),
    }
}

/// Parse `"90"`, `"90s"`, `"15m"`, `"10h"` or compounds like `"1h30m"`.
fn parse_duration(input: &str) -> std::result::Result<Duration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("empty duration".to_string());
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        let seconds: u64 = trimmed.parse().map_err(|e| format!("{e}"))?;
        return Ok(Duration::from_secs(seconds));
    }

    let mut total = Duration::ZERO;
    let mut number = String::new();
    for c in trimmed.chars() {
        if c.is_ascii_digit() {
            number.push(c);
            continue;
        }
        let value: u64 = number
            .parse()
            .map_err(|_| format!("invalid duration {input:?}"))?;
        number.clear();
        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => return Err(format!("unknown duration unit {c:?} in {input:?}")),
        };
        total += Duration::from_secs(value * unit);
    }
    if !number.is_empty() {
        return Err(format!("missing unit in duration {input:?}"));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_get_duration_forms() {
        let d = data(json!({"a": 60, "b": "10h", "c": "1h30m", "d": "90s", "e": "45"}));
        assert_eq!(get_duration(&d, "a").unwrap(), Some(Duration::from_secs(60)));
        assert_eq!(
            get_duration(&d, "b").unwrap(),
            Some(Duration::from_secs(36_000))
        );
        assert_eq!(
            get_duration(&d, "c").unwrap(),
            Some(Duration::from_secs(5400))
        );
        assert_eq!(get_duration(&d, "d").unwrap(), Some(Duration::from_secs(90)));
        assert_eq!(get_duration(&d, "e").unwrap(), Some(Duration::from_secs(45)));
        assert_eq!(get_duration(&d, "missing").unwrap(), None);
    }

    #[test]
    fn test_get_duration_rejects_garbage() {
        let d = data(json!({"a": "10x", "b": true, "c": "h"}));
        assert!(get_duration(&d, "a").is_err());
        assert!(get_duration(&d, "b").is_err());
        assert!(get_duration(&d, "c").is_err());
    }

    #[test]
    fn test_get_string_list_forms() {
        let d = data(json!({
            "list": ["a@x.com", "b@x.com"],
            "csv": "a@x.com, b@x.com",
            "bad": [1, 2],
        }));
        assert_eq!(
            get_string_list(&d, "list").unwrap().unwrap(),
            vec!["a@x.com", "b@x.com"]
        );
        assert_eq!(
            get_string_list(&d, "csv").unwrap().unwrap(),
            vec!["a@x.com", "b@x.com"]
        );
        assert!(get_string_list(&d, "bad").is_err());
        assert_eq!(get_string_list(&d, "missing").unwrap(), None);
    }

    #[test]
    fn test_typed_accessors() {
        let d = data(json!({"s": "x", "b": true, "n": 5}));
        assert_eq!(get_string(&d, "s").unwrap(), Some("x".to_string()));
        assert_eq!(get_bool(&d, "b").unwrap(), Some(true));
        assert_eq!(get_usize(&d, "n").unwrap(), Some(5));
        assert!(get_string(&d, "b").is_err());
        assert!(get_bool(&d, "n").is_err());
    }
}
