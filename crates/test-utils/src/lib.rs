//! Shared test utilities for Warden crates.
//!
//! - [`assert_eventually`] - Poll a condition until it's true or timeout
//! - [`test_acl_config`] - ACL configuration with a fast mode check interval
//! - [`server_member`], [`token`], [`policy`] - Synthetic records
//! - [`strategies`] - Proptest generators

#![deny(unsafe_code)]

mod assertions;
pub use assertions::assert_eventually;

mod config;
pub use config::{TEST_MODE_CHECK_INTERVAL, test_acl_config};

mod fixtures;
pub use fixtures::{TEST_SERVER_PORT, legacy_token, policy, server_member, token};

pub mod strategies;
