//! Core data model: errors, roles, library sets, configuration.

pub mod config;
pub mod error;
pub mod library;
pub mod role;
pub mod time;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use library::LibrarySet;
pub use role::{ActiveAccount, RotationState, StaticRole};
