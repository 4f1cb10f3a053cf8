//! Shared test utilities for proposal-review integration tests.
//!
//! This module provides:
//! - `TestHarness` for isolated sessions backed by a temp database
//! - Scripted gateways that answer each stage with a recognizable reply

pub mod harness;

pub use harness::{scripted_gateway, stage_reply, TestHarness, SAMPLE_PROPOSAL};
