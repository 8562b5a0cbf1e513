//! State store contract consumed by the ACL subsystem.
//!
//! The store is the source of truth for tokens and policies. The ACL layer
//! only reads from it, apart from the one-time initialization which uses the
//! insert-if-absent writes of [`AclBootstrapStore`].
//!
//! Every query distinguishes "no record" (`Ok(None)`) from a failed query
//! (`Err`). Callers treat errors as fatal for the current operation.

mod memory;

pub use memory::MemoryAclStore;
use warden_types::{AclPolicy, AclToken, StoreError};

/// Read queries against the replicated ACL tables.
pub trait AclStateStore: Send + Sync {
    /// Looks up a token by accessor ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query could not be served.
    fn token_by_accessor(&self, accessor_id: &str) -> Result<Option<AclToken>, StoreError>;

    /// Looks up a token by secret ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query could not be served.
    fn token_by_secret(&self, secret_id: &str) -> Result<Option<AclToken>, StoreError>;

    /// Looks up a policy by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query could not be served.
    fn policy_by_id(&self, policy_id: &str) -> Result<Option<AclPolicy>, StoreError>;
}

/// Insert-if-absent writes used by the one-time ACL initialization.
pub trait AclBootstrapStore: AclStateStore {
    /// Inserts `policy` unless a policy with the same ID exists.
    ///
    /// Returns whether the policy was inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write was rejected.
    fn ensure_policy(&self, policy: AclPolicy) -> Result<bool, StoreError>;

    /// Inserts `token` unless a token with the same accessor ID exists.
    ///
    /// Returns whether the token was inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write was rejected.
    fn ensure_token(&self, token: AclToken) -> Result<bool, StoreError>;
}
