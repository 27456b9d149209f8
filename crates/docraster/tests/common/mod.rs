//! Shared utilities for docraster integration tests.
//!
//! - `TestHarness`: isolated data directory plus a running `TaskService`
//! - fake converter and rasterizer standing in for LibreOffice and pdftoppm

pub mod fakes;
pub mod harness;

pub use fakes::*;
pub use harness::{TestHarness, ALICE, BOB};
