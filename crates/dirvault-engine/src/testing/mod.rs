//! Test doubles and a backend harness shared by unit and integration
//! tests.

pub mod harness;
pub mod mocks;

pub use harness::TestHarness;
pub use mocks::{MockDirectoryClient, MockSystemView, RecordingEventSink};
