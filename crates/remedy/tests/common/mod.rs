//! Shared test utilities for remedy integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated test execution on an on-disk database
//! - Builders for scripted item processors and affected items

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::*;
