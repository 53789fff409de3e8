//! Common test utilities for edms-crawler integration tests

#[allow(dead_code)]
pub mod mock_dms;

pub use mock_dms::*;
