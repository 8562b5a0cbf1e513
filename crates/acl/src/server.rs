//! Server-side ACL facade.
//!
//! [`AclServer`] owns the capability flag, caches and collaborators of one
//! server and exposes the ACL operations request handlers call. The upgrade
//! coordinator runs against it through [`AclServer::start_mode_monitor`].

use std::sync::Arc;

use snafu::ResultExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use warden_types::{AclIdentity, AclPolicy, config::AclConfig};

use crate::{
    advertise::AclModePublisher,
    authorizer::Authorizer,
    bootstrap::{AclSystemInitializer, BuiltinAclInitializer},
    cache::AclCaches,
    capability::AclCapability,
    cluster::{ClusterMembership, LeadershipStatus},
    error::{AclError, StoreSnafu},
    filter::AclFilterable,
    mode_monitor::{AclModeMonitor, MonitorOutcome},
    resolver::{AclResolver, AclResolverDelegate, Resolution},
    store::{AclBootstrapStore, AclStateStore},
    uniqueness::IdChecker,
};

/// Resolver delegate backed by the local state store.
struct StoreDelegate {
    store: Arc<dyn AclStateStore>,
    capability: AclCapability,
    datacenter: String,
    acl_datacenter: String,
}

impl AclResolverDelegate for StoreDelegate {
    fn acls_enabled(&self) -> bool {
        !self.acl_datacenter.is_empty()
    }

    fn use_legacy_acls(&self) -> bool {
        !self.capability.use_new_acls()
    }

    fn datacenter(&self) -> &str {
        &self.datacenter
    }

    fn acl_datacenter(&self) -> &str {
        &self.acl_datacenter
    }

    fn resolve_identity_from_token(
        &self,
        secret_id: &str,
    ) -> Result<Resolution<Arc<dyn AclIdentity>>, AclError> {
        match self.store.token_by_secret(secret_id).context(StoreSnafu)? {
            Some(token) => Ok(Resolution::authoritative(Some(Arc::new(token)))),
            None if self.datacenter == self.acl_datacenter => Ok(Resolution::authoritative(None)),
            None => Ok(Resolution::non_authoritative()),
        }
    }

    fn resolve_policy_from_id(&self, policy_id: &str) -> Result<Resolution<Arc<AclPolicy>>, AclError> {
        // Every policy is replicated locally, so a miss is final.
        let policy = self.store.policy_by_id(policy_id).context(StoreSnafu)?;
        Ok(Resolution::authoritative(policy.map(Arc::new)))
    }
}

/// ACL subsystem of one server.
pub struct AclServer {
    config: AclConfig,
    capability: AclCapability,
    membership: Arc<dyn ClusterMembership>,
    leadership: Arc<dyn LeadershipStatus>,
    initializer: Arc<dyn AclSystemInitializer>,
    ids: IdChecker,
    publisher: AclModePublisher,
    resolver: AclResolver<StoreDelegate>,
}

impl std::fmt::Debug for AclServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AclServer")
            .field("datacenter", &self.config.datacenter)
            .field("acl_datacenter", &self.config.acl_datacenter)
            .field("phase", &self.capability.phase())
            .finish_non_exhaustive()
    }
}

#[bon::bon]
impl AclServer {
    /// Creates the ACL subsystem of a server.
    ///
    /// `capability` defaults to a fresh legacy flag; pass a shared one when
    /// other components read it too. `initializer` defaults to
    /// [`BuiltinAclInitializer`] over `store`.
    #[builder]
    pub fn new(
        config: AclConfig,
        store: Arc<dyn AclBootstrapStore>,
        membership: Arc<dyn ClusterMembership>,
        leadership: Arc<dyn LeadershipStatus>,
        #[builder(default)] capability: AclCapability,
        initializer: Option<Arc<dyn AclSystemInitializer>>,
    ) -> Self {
        let in_acl_datacenter = config.in_acl_datacenter();
        let initializer: Arc<dyn AclSystemInitializer> = match initializer {
            Some(initializer) => initializer,
            None => Arc::new(BuiltinAclInitializer::new(
                store.clone(),
                in_acl_datacenter,
                config.master_token.clone(),
            )),
        };
        let state: Arc<dyn AclStateStore> = store;

        let caches = Arc::new(AclCaches::new(&config.caches));
        let delegate = StoreDelegate {
            store: state.clone(),
            capability: capability.clone(),
            datacenter: config.datacenter.clone(),
            acl_datacenter: config.acl_datacenter.clone(),
        };

        Self {
            ids: IdChecker::new(state, config.reserved_ids.clone()),
            publisher: AclModePublisher::new(membership.clone(), in_acl_datacenter),
            resolver: AclResolver::new(delegate, caches, config.default_policy),
            config,
            capability,
            membership,
            leadership,
            initializer,
        }
    }
}

impl AclServer {
    /// Returns the configuration.
    pub fn config(&self) -> &AclConfig {
        &self.config
    }

    /// Returns the capability flag.
    pub fn capability(&self) -> &AclCapability {
        &self.capability
    }

    /// Returns the ACL caches.
    pub fn caches(&self) -> &Arc<AclCaches> {
        self.resolver.caches()
    }

    pub(crate) fn membership(&self) -> &Arc<dyn ClusterMembership> {
        &self.membership
    }

    pub(crate) fn leadership(&self) -> &Arc<dyn LeadershipStatus> {
        &self.leadership
    }

    // =========================================================================
    // Capability queries
    // =========================================================================

    /// Whether ACLs are enabled at all.
    pub fn acls_enabled(&self) -> bool {
        self.config.acls_enabled()
    }

    /// Whether the legacy ACL system is in force.
    pub fn use_legacy_acls(&self) -> bool {
        !self.capability.use_new_acls()
    }

    /// Whether this server sits in the ACL-authoritative datacenter.
    pub fn in_acl_datacenter(&self) -> bool {
        self.config.in_acl_datacenter()
    }

    /// The ACL-authoritative datacenter, the only resolution target for
    /// servers.
    pub fn acl_datacenter(&self) -> &str {
        &self.config.acl_datacenter
    }

    // =========================================================================
    // Uniqueness
    // =========================================================================

    /// Whether `id` can be used as a token accessor or secret.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if a lookup failed.
    pub fn is_token_id_available(&self, id: &str) -> Result<bool, AclError> {
        self.ids.is_token_id_available(id)
    }

    /// Whether `id` can be used as a policy ID.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if the lookup failed.
    pub fn is_policy_id_available(&self, id: &str) -> Result<bool, AclError> {
        self.ids.is_policy_id_available(id)
    }

    /// Draws an available token ID.
    ///
    /// # Errors
    ///
    /// See [`IdChecker::generate_token_id`].
    pub fn generate_token_id(&self) -> Result<String, AclError> {
        self.ids.generate_token_id()
    }

    /// Draws an available policy ID.
    ///
    /// # Errors
    ///
    /// See [`IdChecker::generate_policy_id`].
    pub fn generate_policy_id(&self) -> Result<String, AclError> {
        self.ids.generate_policy_id()
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Looks up the identity behind a secret in the local store.
    ///
    /// A miss is authoritative only inside the ACL datacenter.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if the store query failed.
    pub fn resolve_identity_from_token(
        &self,
        secret_id: &str,
    ) -> Result<Resolution<Arc<dyn AclIdentity>>, AclError> {
        self.resolver.delegate().resolve_identity_from_token(secret_id)
    }

    /// Looks up a policy in the local store. Always authoritative.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if the store query failed.
    pub fn resolve_policy_from_id(
        &self,
        policy_id: &str,
    ) -> Result<Resolution<Arc<AclPolicy>>, AclError> {
        self.resolver.delegate().resolve_policy_from_id(policy_id)
    }

    /// Resolves a secret into an authorizer.
    ///
    /// # Errors
    ///
    /// See [`AclResolver::resolve_token`].
    pub fn resolve_token(&self, secret_id: &str) -> Result<Arc<dyn Authorizer>, AclError> {
        self.resolver.resolve_token(secret_id)
    }

    /// Filters `subject` down to what `secret_id` may read.
    ///
    /// # Errors
    ///
    /// Returns the error of resolving `secret_id`.
    pub fn filter_acl<S: AclFilterable + ?Sized>(
        &self,
        secret_id: &str,
        subject: &mut S,
    ) -> Result<(), AclError> {
        self.resolver.filter_acl(secret_id, subject)
    }

    /// Filters `subject` with an already resolved authorizer.
    pub fn filter_acl_with_authorizer<S: AclFilterable + ?Sized>(
        &self,
        authorizer: &dyn Authorizer,
        subject: &mut S,
    ) {
        if self.acls_enabled() {
            subject.filter_acl(authorizer);
        }
    }

    // =========================================================================
    // Mode upgrade
    // =========================================================================

    /// Advertises `acls=enabled` through gossip.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Advertise`] if a tag update failed.
    pub fn publish_acl_mode(&self) -> Result<(), AclError> {
        self.publisher.publish_acl_mode()
    }

    /// Switches this server to the new ACL system.
    ///
    /// With `initialize` set, the one-time initialization runs first and a
    /// failure leaves the server on legacy ACLs. Caches are purged once the
    /// new system is visible. Returns whether this call made the switch.
    pub(crate) fn enable_new_acls(&self, initialize: bool) -> Result<bool, AclError> {
        let switched = self.capability.transition(|| {
            if initialize {
                self.initializer.initialize()?;
            }
            Ok::<(), AclError>(())
        })?;
        if switched {
            self.caches().purge();
        }
        Ok(switched)
    }

    /// Spawns the upgrade coordinator.
    ///
    /// Returns `None` when ACLs are disabled or the new system is already in
    /// force, since there is nothing to upgrade.
    pub fn start_mode_monitor(
        self: &Arc<Self>,
        shutdown: CancellationToken,
    ) -> Option<JoinHandle<MonitorOutcome>> {
        if !self.acls_enabled() {
            info!("ACLs disabled, not starting ACL mode monitor");
            return None;
        }
        if self.capability.use_new_acls() {
            info!("New ACLs already in force, not starting ACL mode monitor");
            return None;
        }
        Some(AclModeMonitor::new(self.clone()).start(shutdown))
    }
}
