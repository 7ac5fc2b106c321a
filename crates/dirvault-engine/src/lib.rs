//! dirvault engine: LDAP/Active-Directory secrets engine core.
//!
//! The engine owns the lifecycle of directory service-account passwords on
//! behalf of applications:
//!
//! - **Static roles** manage a pre-existing account's password on a periodic
//!   schedule, driven by a persistent priority queue and a background
//!   ticker.
//! - **Dual-account roles** manage two sibling accounts (A/B) with
//!   alternating active/standby duty and a grace window after each flip so
//!   callers can migrate without downtime.
//! - A **write-ahead log** records every password before it is sent to the
//!   directory, so a crash between the directory write and the role update
//!   rolls forward instead of losing the credential.
//! - The **managed-username registry** arbitrates exclusive ownership of
//!   accounts between rotation roles and check-out library sets.
//!
//! The host (request routing, lease handling, storage barrier, replication
//! state) is abstract: see [`host`] for the ports it provides.

pub mod backend;
pub mod core;
pub mod host;
pub mod locks;
pub mod password;
pub mod paths;
pub mod queue;
pub mod registry;
pub mod rotation;
pub mod storage;
pub mod testing;

pub use crate::backend::Backend;
pub use crate::core::config::EngineConfig;
pub use crate::core::error::{EngineError, Result};
pub use crate::core::library::LibrarySet;
pub use crate::core::role::{ActiveAccount, RotationState, StaticRole};
pub use crate::host::{EventSink, StorageBackend, SystemView};
pub use crate::paths::{Operation, Request, Response};
pub use crate::rotation::RollbackPolicy;
pub use dirvault_directory::SecureString;
