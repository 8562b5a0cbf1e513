//! Error types for the ACL crate using snafu.
//!
//! Resolution, uniqueness checks and initialization all fail closed: any
//! collaborator error surfaces here instead of being treated as success.

// Snafu generates struct fields for context selectors that don't need documentation
#![allow(missing_docs)]

use snafu::Snafu;
use warden_types::{GossipError, StoreError};

/// Errors produced by the ACL subsystem.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum AclError {
    /// A state store query failed.
    #[snafu(display("ACL state store query failed: {source}"))]
    Store { source: StoreError },

    /// The token does not exist and this datacenter is authoritative.
    #[snafu(display("ACL not found"))]
    TokenNotFound,

    /// The token is unknown locally and must be resolved by the ACL datacenter.
    #[snafu(display("ACL token not found locally, forward resolution to datacenter {datacenter}"))]
    ForwardRequired { datacenter: String },

    /// A rules document could not be parsed.
    #[snafu(display("Invalid rules in {origin}: {source}"))]
    InvalidRules { origin: String, source: serde_json::Error },

    /// No available identifier was found within the attempt budget.
    #[snafu(display("Failed to generate a unique {kind} ID after {attempts} attempts"))]
    IdGenerationExhausted { kind: String, attempts: usize },

    /// A step of the one-time ACL initialization failed.
    #[snafu(display("ACL initialization failed while {step}: {source}"))]
    Bootstrap { step: String, source: StoreError },

    /// A gossip tag update failed.
    #[snafu(display("ACL mode advertisement failed: {source}"))]
    Advertise { source: GossipError },
}

impl AclError {
    /// Whether the error means the token is unknown, locally or remotely.
    pub fn is_token_not_found(&self) -> bool {
        matches!(self, AclError::TokenNotFound | AclError::ForwardRequired { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_not_found_display() {
        assert_eq!(AclError::TokenNotFound.to_string(), "ACL not found");
        assert!(AclError::TokenNotFound.is_token_not_found());
    }

    #[test]
    fn test_forward_required_names_datacenter() {
        let err = AclError::ForwardRequired { datacenter: "dc1".to_string() };
        assert!(err.to_string().contains("dc1"));
        assert!(err.is_token_not_found());
    }

    #[test]
    fn test_store_error_is_wrapped() {
        let err = AclError::Store { source: StoreError::unavailable("closed") };
        assert!(err.to_string().contains("closed"));
        assert!(!err.is_token_not_found());
    }
}
