//! Integration tests module
//!
//! End-to-end tests for the recrawl subsystem, including:
//! - Fetch → persist → reload → unchanged-content detection across crawls
//! - Checkpointing journals and diversion logs together
//! - Error handling and recovery scenarios

pub mod checkpoint_test;
pub mod error_scenarios;
pub mod fixtures;
pub mod recrawl_cycle;
