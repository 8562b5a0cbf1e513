//! Core types, configuration and errors for Warden.
//!
//! This crate provides the foundational types shared by the ACL subsystem:
//! - ACL records (tokens, policies) and the identity view of a token
//! - Gossip membership model and server metadata parsing
//! - Result records filtered by ACLs
//! - Server ACL configuration
//! - Error types using snafu

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod acl;
pub mod catalog;
pub mod config;
pub mod error;
pub mod membership;

// Re-export commonly used types at crate root
pub use acl::{
    AclIdentity, AclMode, AclPolicy, AclToken, AclTokenPolicyLink, LegacyAcl, LegacyTokenType,
    ReservedIds,
};
pub use error::{ErrorCode, GossipError, StoreError};
pub use membership::{Member, MemberStatus, ServerMetadata};
