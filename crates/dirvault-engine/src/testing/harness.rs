//! A fully wired backend over in-memory storage and mock ports.

use serde_json::{Map, Value, json};
use std::sync::Arc;

use crate::backend::Backend;
use crate::core::error::Result;
use crate::paths::{Operation, Request, Response};
use crate::storage::memory::MemoryStorage;
use crate::testing::mocks::{MockDirectoryClient, MockSystemView, RecordingEventSink};

/// Backend plus handles on all its test doubles.
pub struct TestHarness {
    pub backend: Arc<Backend>,
    pub storage: Arc<MemoryStorage>,
    pub directory: Arc<MockDirectoryClient>,
    pub system: Arc<MockSystemView>,
    pub events: Arc<RecordingEventSink>,
}

impl TestHarness {
    /// A backend that has not been initialized (no queue, no ticker).
    pub fn new() -> Self {
        let storage = MemoryStorage::new();
        let directory = MockDirectoryClient::new();
        let system = MockSystemView::new();
        let events = RecordingEventSink::new();

        let backend = Backend::new(
            storage.clone(),
            directory.clone(),
            system.clone(),
            events.clone(),
        );
        Self {
            backend,
            storage,
            directory,
            system,
            events,
        }
    }

    /// A backend that has been initialized as the active rotator.
    pub async fn initialized() -> Self {
        let harness = Self::new();
        harness
            .backend
            .initialize()
            .await
            .expect("initialize backend");
        harness
    }

    /// Write a minimal openldap configuration.
    pub async fn configure_openldap(&self) -> Response {
        self.write(
            "config",
            json!({
                "binddn": "cn=admin,dc=hashicorp,dc=com",
                "bindpass": "admin-password",
                "url": "ldap://138.91.247.105",
                "userdn": "ou=users,dc=hashicorp,dc=com",
            }),
        )
        .await
        .expect("configure mount")
    }

    /// Write a configuration that generates passwords from a named policy.
    pub async fn configure_with_policy(&self, policy: &str) -> Response {
        self.write(
            "config",
            json!({
                "binddn": "cn=admin,dc=hashicorp,dc=com",
                "bindpass": "admin-password",
                "url": "ldap://138.91.247.105",
                "userdn": "ou=users,dc=hashicorp,dc=com",
                "password_policy": policy,
            }),
        )
        .await
        .expect("configure mount with policy")
    }

    /// Issue a create/update write with JSON data.
    pub async fn write(&self, path: &str, data: Value) -> Result<Response> {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => panic!("request data must be an object, got {other}"),
        };
        self.backend
            .handle_request(Request::new(Operation::Update, path).with_data(data))
            .await
    }

    /// Issue a create with JSON data.
    pub async fn create(&self, path: &str, data: Value) -> Result<Response> {
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => panic!("request data must be an object, got {other}"),
        };
        self.backend
            .handle_request(Request::new(Operation::Create, path).with_data(data))
            .await
    }

    /// Issue a read.
    pub async fn read(&self, path: &str) -> Result<Response> {
        self.backend
            .handle_request(Request::new(Operation::Read, path))
            .await
    }

    /// Issue a delete.
    pub async fn delete(&self, path: &str) -> Result<Response> {
        self.backend
            .handle_request(Request::new(Operation::Delete, path))
            .await
    }

    /// Issue a list.
    pub async fn list(&self, path: &str) -> Result<Response> {
        self.backend
            .handle_request(Request::new(Operation::List, path))
            .await
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
