//! One-time initialization of the new ACL system.
//!
//! Runs on the leader while the capability flag is transitioning. Inside the
//! ACL datacenter it makes sure the builtin records exist; elsewhere the
//! records arrive through replication and nothing is written.

use std::sync::Arc;

use snafu::ResultExt;
use tracing::{info, warn};
use uuid::Uuid;
use warden_types::{
    AclPolicy, AclToken, AclTokenPolicyLink,
    acl::{
        ANONYMOUS_TOKEN_ACCESSOR_ID, ANONYMOUS_TOKEN_SECRET, GLOBAL_MANAGEMENT_POLICY_ID,
        GLOBAL_MANAGEMENT_POLICY_NAME,
    },
};

use crate::{
    error::{AclError, BootstrapSnafu},
    policy::GLOBAL_MANAGEMENT_RULES,
    store::AclBootstrapStore,
};

/// One-time setup performed before the new ACL system becomes visible.
pub trait AclSystemInitializer: Send + Sync {
    /// Prepares the state store for the new ACL system.
    ///
    /// Must be idempotent; it may run again after a failed attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AclError`] if the store rejected a write. The transition is
    /// aborted and retried on a later check.
    fn initialize(&self) -> Result<(), AclError>;
}

/// Creates the builtin policy and tokens.
///
/// - the `global-management` policy granting write on everything
/// - the anonymous token used for requests without a secret
/// - the master management token, when one is configured
pub struct BuiltinAclInitializer {
    store: Arc<dyn AclBootstrapStore>,
    in_acl_datacenter: bool,
    master_token: Option<String>,
}

impl std::fmt::Debug for BuiltinAclInitializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinAclInitializer")
            .field("in_acl_datacenter", &self.in_acl_datacenter)
            .field("master_token", &self.master_token.as_ref().map(|_| "<hidden>"))
            .finish_non_exhaustive()
    }
}

impl BuiltinAclInitializer {
    /// Creates an initializer.
    pub fn new(
        store: Arc<dyn AclBootstrapStore>,
        in_acl_datacenter: bool,
        master_token: Option<String>,
    ) -> Self {
        Self { store, in_acl_datacenter, master_token }
    }

    fn global_management_link() -> AclTokenPolicyLink {
        AclTokenPolicyLink {
            id: GLOBAL_MANAGEMENT_POLICY_ID.to_string(),
            name: GLOBAL_MANAGEMENT_POLICY_NAME.to_string(),
        }
    }
}

impl AclSystemInitializer for BuiltinAclInitializer {
    fn initialize(&self) -> Result<(), AclError> {
        if !self.in_acl_datacenter {
            info!("Outside the ACL datacenter, builtin ACL records arrive by replication");
            return Ok(());
        }

        let policy = AclPolicy::builder()
            .id(GLOBAL_MANAGEMENT_POLICY_ID)
            .name(GLOBAL_MANAGEMENT_POLICY_NAME)
            .description("Builtin policy granting unlimited privileges")
            .rules(GLOBAL_MANAGEMENT_RULES)
            .build();
        let created = self
            .store
            .ensure_policy(policy)
            .context(BootstrapSnafu { step: "creating the global-management policy" })?;
        if created {
            info!(policy_id = GLOBAL_MANAGEMENT_POLICY_ID, "Created global-management policy");
        }

        let anonymous = AclToken::builder()
            .accessor_id(ANONYMOUS_TOKEN_ACCESSOR_ID)
            .secret_id(ANONYMOUS_TOKEN_SECRET)
            .description("Anonymous token")
            .build();
        let created = self
            .store
            .ensure_token(anonymous)
            .context(BootstrapSnafu { step: "creating the anonymous token" })?;
        if created {
            info!(accessor_id = ANONYMOUS_TOKEN_ACCESSOR_ID, "Created anonymous token");
        }

        if let Some(secret) = &self.master_token {
            // A legacy management token may already hold the secret.
            let existing = self
                .store
                .token_by_secret(secret)
                .context(BootstrapSnafu { step: "looking up the master token" })?;
            if let Some(existing) = existing {
                warn!(
                    accessor_id = existing.accessor_id.as_str(),
                    "Master token secret already in use, not creating master token"
                );
            } else {
                let accessor_id = Uuid::new_v4().to_string();
                let master = AclToken::builder()
                    .accessor_id(accessor_id.as_str())
                    .secret_id(secret.as_str())
                    .description("Master Token")
                    .policies(vec![Self::global_management_link()])
                    .build();
                self.store
                    .ensure_token(master)
                    .context(BootstrapSnafu { step: "creating the master token" })?;
                info!(accessor_id = accessor_id.as_str(), "Created master token");
            }
        }

        Ok(())
    }
}
