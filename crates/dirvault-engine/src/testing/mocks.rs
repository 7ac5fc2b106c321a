//! Hand-written mocks with call recording and failure injection.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use dirvault_directory::{DirectoryClient, DirectoryConfig, DirectoryError, LdifEntry};

use crate::core::error::Result;
use crate::host::{EventSink, SystemView};
use crate::password::random_base62;

/// One recorded directory call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryCall {
    pub operation: &'static str,
    /// DN or username the call targeted.
    pub target: String,
    pub password: String,
}

/// Mock directory server: remembers the password set per DN/username and
/// records every call. Failure injection makes all subsequent password
/// updates fail until cleared.
pub struct MockDirectoryClient {
    passwords: DashMap<String, String>,
    calls: Mutex<Vec<DirectoryCall>>,
    fail_with: Mutex<Option<DirectoryError>>,
    fail_after: AtomicU32,
    update_count: AtomicU32,
}

impl Default for MockDirectoryClient {
    fn default() -> Self {
        Self {
            passwords: DashMap::new(),
            calls: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            fail_after: AtomicU32::new(u32::MAX),
            update_count: AtomicU32::new(0),
        }
    }
}

impl MockDirectoryClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every password update fail with a transport error.
    pub fn fail_transport(&self, reason: &str) {
        self.fail_after.store(0, Ordering::SeqCst);
        *self.fail_with.lock() = Some(DirectoryError::Transport(reason.to_string()));
    }

    /// Make every password update fail with a protocol error.
    pub fn fail_protocol(&self, reason: &str) {
        self.fail_after.store(0, Ordering::SeqCst);
        *self.fail_with.lock() = Some(DirectoryError::Protocol(reason.to_string()));
    }

    /// Let the next `calls` password updates succeed, then fail every
    /// later one with a transport error.
    pub fn fail_transport_after(&self, calls: u32, reason: &str) {
        let already = self.update_count.load(Ordering::SeqCst);
        self.fail_after.store(already + calls, Ordering::SeqCst);
        *self.fail_with.lock() = Some(DirectoryError::Transport(reason.to_string()));
    }

    /// Stop injecting failures.
    pub fn clear_failure(&self) {
        *self.fail_with.lock() = None;
        self.fail_after.store(u32::MAX, Ordering::SeqCst);
    }

    /// The password currently set for a DN or username, if any. This is
    /// what "the password works against the directory" means in tests.
    pub fn password_for(&self, target: &str) -> Option<String> {
        self.passwords.get(target).map(|entry| entry.clone())
    }

    /// All recorded calls, in order.
    pub fn calls(&self) -> Vec<DirectoryCall> {
        self.calls.lock().clone()
    }

    /// Number of password updates attempted (including failed ones).
    pub fn update_count(&self) -> u32 {
        self.update_count.load(Ordering::SeqCst)
    }

    fn apply(&self, operation: &'static str, target: &str, password: &str) -> std::result::Result<(), DirectoryError> {
        let count_before = self.update_count.fetch_add(1, Ordering::SeqCst);
        if count_before >= self.fail_after.load(Ordering::SeqCst) {
            if let Some(error) = self.fail_with.lock().clone() {
                return Err(error);
            }
        }
        self.passwords
            .insert(target.to_string(), password.to_string());
        self.calls.lock().push(DirectoryCall {
            operation,
            target: target.to_string(),
            password: password.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl DirectoryClient for MockDirectoryClient {
    async fn update_dn_password(
        &self,
        _config: &DirectoryConfig,
        dn: &str,
        new_password: &str,
    ) -> std::result::Result<(), DirectoryError> {
        self.apply("update_dn_password", dn, new_password)
    }

    async fn update_user_password(
        &self,
        _config: &DirectoryConfig,
        username: &str,
        new_password: &str,
    ) -> std::result::Result<(), DirectoryError> {
        self.apply("update_user_password", username, new_password)
    }

    async fn update_self_managed_password(
        &self,
        _config: &DirectoryConfig,
        dn: &str,
        current_password: &str,
        new_password: &str,
    ) -> std::result::Result<(), DirectoryError> {
        if let Some(stored) = self.password_for(dn) {
            if stored != current_password {
                return Err(DirectoryError::Protocol(format!(
                    "invalid credentials for {dn}"
                )));
            }
        }
        self.apply("update_self_managed_password", dn, new_password)
    }

    async fn execute(
        &self,
        _config: &DirectoryConfig,
        entries: &[LdifEntry],
        _continue_on_error: bool,
    ) -> std::result::Result<(), DirectoryError> {
        if let Some(error) = self.fail_with.lock().clone() {
            return Err(error);
        }
        let mut calls = self.calls.lock();
        for entry in entries {
            calls.push(DirectoryCall {
                operation: "execute",
                target: entry.dn.clone(),
                password: String::new(),
            });
        }
        Ok(())
    }
}

/// Host system view with a toggleable rotator capability and deterministic
/// policy passwords (`<policy>-<random>`), so tests can tell which policy
/// generated a credential.
pub struct MockSystemView {
    rotator: AtomicBool,
    default_ttl: Duration,
    max_ttl: Duration,
}

impl MockSystemView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            rotator: AtomicBool::new(true),
            default_ttl: Duration::from_secs(24 * 3600),
            max_ttl: Duration::from_secs(48 * 3600),
        })
    }

    /// Flip the active-rotator capability.
    pub fn set_active_rotator(&self, active: bool) {
        self.rotator.store(active, Ordering::SeqCst);
    }
}

#[async_trait]
impl SystemView for MockSystemView {
    async fn generate_password_from_policy(&self, policy_name: &str) -> Result<String> {
        Ok(format!("{policy_name}-{}", random_base62(24)))
    }

    fn active_rotator(&self) -> bool {
        self.rotator.load(Ordering::SeqCst)
    }

    fn default_lease_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn max_lease_ttl(&self) -> Duration {
        self.max_ttl
    }
}

/// Event sink that records everything it sees.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(String, String, bool)>>,
}

impl RecordingEventSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All `(event_type, role_name, success)` triples, in order.
    pub fn events(&self) -> Vec<(String, String, bool)> {
        self.events.lock().clone()
    }

    /// Event types only, in order.
    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.0.clone()).collect()
    }
}

impl EventSink for RecordingEventSink {
    fn emit(&self, event_type: &str, role_name: &str, success: bool) {
        self.events
            .lock()
            .push((event_type.to_string(), role_name.to_string(), success));
    }
}
