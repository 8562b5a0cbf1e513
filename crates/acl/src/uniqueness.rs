//! Identifier availability checks and generation.
//!
//! An identifier is available when no token uses it as accessor or secret
//! (for token IDs), no policy uses it (for policy IDs), and it is not
//! reserved. Store failures fail closed.

use std::sync::Arc;

use snafu::ResultExt;
use tracing::debug;
use uuid::Uuid;
use warden_types::ReservedIds;

use crate::{
    error::{AclError, StoreSnafu},
    store::AclStateStore,
};

/// Number of random candidates drawn before ID generation gives up.
pub const MAX_ID_GENERATION_ATTEMPTS: usize = 10;

/// Read-only uniqueness checks against the state store.
pub struct IdChecker {
    store: Arc<dyn AclStateStore>,
    reserved: ReservedIds,
}

impl std::fmt::Debug for IdChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdChecker").field("reserved", &self.reserved).finish_non_exhaustive()
    }
}

impl IdChecker {
    /// Creates a checker over `store` excluding `reserved`.
    pub fn new(store: Arc<dyn AclStateStore>, reserved: ReservedIds) -> Self {
        Self { store, reserved }
    }

    /// Whether `id` can be used as a token accessor or secret.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if either lookup failed.
    pub fn is_token_id_available(&self, id: &str) -> Result<bool, AclError> {
        if self.store.token_by_accessor(id).context(StoreSnafu)?.is_some() {
            return Ok(false);
        }
        if self.store.token_by_secret(id).context(StoreSnafu)?.is_some() {
            return Ok(false);
        }
        Ok(!self.reserved.is_reserved(id))
    }

    /// Whether `id` can be used as a policy ID.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if the lookup failed.
    pub fn is_policy_id_available(&self, id: &str) -> Result<bool, AclError> {
        if self.store.policy_by_id(id).context(StoreSnafu)?.is_some() {
            return Ok(false);
        }
        Ok(!self.reserved.is_reserved(id))
    }

    /// Draws a random token ID that is currently available.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::IdGenerationExhausted`] if no candidate was
    /// available, or [`AclError::Store`] if a lookup failed.
    pub fn generate_token_id(&self) -> Result<String, AclError> {
        self.generate("token", |id| self.is_token_id_available(id))
    }

    /// Draws a random policy ID that is currently available.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::IdGenerationExhausted`] if no candidate was
    /// available, or [`AclError::Store`] if a lookup failed.
    pub fn generate_policy_id(&self) -> Result<String, AclError> {
        self.generate("policy", |id| self.is_policy_id_available(id))
    }

    fn generate(
        &self,
        kind: &str,
        available: impl Fn(&str) -> Result<bool, AclError>,
    ) -> Result<String, AclError> {
        for attempt in 1..=MAX_ID_GENERATION_ATTEMPTS {
            let candidate = Uuid::new_v4().to_string();
            if available(&candidate)? {
                return Ok(candidate);
            }
            debug!(kind, attempt, "Generated ID is taken, retrying");
        }
        Err(AclError::IdGenerationExhausted {
            kind: kind.to_string(),
            attempts: MAX_ID_GENERATION_ATTEMPTS,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use warden_types::{AclPolicy, AclToken, acl::GLOBAL_MANAGEMENT_POLICY_ID};

    use super::*;
    use crate::store::MemoryAclStore;

    fn checker(store: Arc<MemoryAclStore>) -> IdChecker {
        IdChecker::new(store, ReservedIds::default())
    }

    #[test]
    fn test_fresh_ids_are_available() {
        let checker = checker(Arc::new(MemoryAclStore::new()));
        assert!(checker.is_token_id_available("6a1253f8-3f49-4bd4-a6b3-9f2c7e0b6d11").unwrap());
        assert!(checker.is_policy_id_available("6a1253f8-3f49-4bd4-a6b3-9f2c7e0b6d11").unwrap());
    }

    #[test]
    fn test_token_id_taken_by_either_index() {
        let store = Arc::new(MemoryAclStore::new());
        store.upsert_token(AclToken::builder().accessor_id("acc").secret_id("sec").build()).unwrap();
        let checker = checker(store);

        assert!(!checker.is_token_id_available("acc").unwrap());
        assert!(!checker.is_token_id_available("sec").unwrap());
        assert!(checker.is_token_id_available("other").unwrap());
    }

    #[test]
    fn test_policy_id_taken() {
        let store = Arc::new(MemoryAclStore::new());
        store.upsert_policy(AclPolicy::builder().id("p1").name("one").build());
        let checker = checker(store);
        assert!(!checker.is_policy_id_available("p1").unwrap());
        // Token and policy namespaces are independent.
        assert!(checker.is_token_id_available("p1").unwrap());
    }

    #[test]
    fn test_reserved_ids_are_never_available() {
        let checker = checker(Arc::new(MemoryAclStore::new()));
        assert!(!checker.is_token_id_available(GLOBAL_MANAGEMENT_POLICY_ID).unwrap());
        assert!(!checker.is_policy_id_available(GLOBAL_MANAGEMENT_POLICY_ID).unwrap());
    }

    #[test]
    fn test_generated_ids_are_available() {
        let checker = checker(Arc::new(MemoryAclStore::new()));
        let token_id = checker.generate_token_id().unwrap();
        assert!(checker.is_token_id_available(&token_id).unwrap());
        assert!(Uuid::parse_str(&token_id).is_ok());

        let policy_id = checker.generate_policy_id().unwrap();
        assert!(checker.is_policy_id_available(&policy_id).unwrap());
    }

    #[test]
    fn test_generation_gives_up_when_everything_is_reserved() {
        let reserved = ReservedIds::none().with_prefix("");
        let checker = IdChecker::new(Arc::new(MemoryAclStore::new()), reserved);
        let err = checker.generate_policy_id().unwrap_err();
        assert!(matches!(
            err,
            AclError::IdGenerationExhausted { attempts: MAX_ID_GENERATION_ATTEMPTS, .. }
        ));
    }
}
