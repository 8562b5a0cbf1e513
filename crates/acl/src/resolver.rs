//! Token resolution.
//!
//! Resolution turns a secret into an [`Authorizer`] in four cached stages:
//! identity, policies, parsed policies and the compiled authorizer. The
//! [`AclResolverDelegate`] supplies the datacenter topology, the capability
//! flag and the uncached lookups.

use std::{sync::Arc, time::Instant};

use tracing::debug;
use warden_types::{
    AclIdentity, AclPolicy, LegacyAcl, LegacyTokenType,
    acl::ANONYMOUS_TOKEN_SECRET,
    config::AclDefaultPolicy,
};

use crate::{
    authorizer::{Authorizer, PolicyAuthorizer, StaticAuthorizer},
    cache::{AclCaches, AuthorizerKey},
    error::AclError,
    filter::AclFilterable,
    metrics,
    policy::ParsedPolicy,
};

/// Lookup result paired with whether a negative answer is final.
///
/// `authoritative == false` with no value means the record may exist in the
/// ACL datacenter and the lookup must be forwarded there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution<T> {
    /// Whether the answer is final.
    pub authoritative: bool,
    /// The record, if found.
    pub value: Option<T>,
}

impl<T> Resolution<T> {
    /// An authoritative answer.
    pub fn authoritative(value: Option<T>) -> Self {
        Self { authoritative: true, value }
    }

    /// A miss that must be confirmed elsewhere.
    pub fn non_authoritative() -> Self {
        Self { authoritative: false, value: None }
    }
}

/// Server-side collaborator of the [`AclResolver`].
pub trait AclResolverDelegate: Send + Sync {
    /// Whether ACLs are enabled at all.
    fn acls_enabled(&self) -> bool;

    /// Whether the legacy ACL system is in force.
    fn use_legacy_acls(&self) -> bool;

    /// Datacenter of this server.
    fn datacenter(&self) -> &str;

    /// ACL-authoritative datacenter.
    fn acl_datacenter(&self) -> &str;

    /// Looks up the identity behind a secret.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if the store query failed.
    fn resolve_identity_from_token(
        &self,
        secret_id: &str,
    ) -> Result<Resolution<Arc<dyn AclIdentity>>, AclError>;

    /// Looks up a policy by ID.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] if the store query failed.
    fn resolve_policy_from_id(&self, policy_id: &str) -> Result<Resolution<Arc<AclPolicy>>, AclError>;
}

/// Resolves secrets into authorizers through the ACL caches.
#[derive(Debug)]
pub struct AclResolver<D> {
    delegate: D,
    caches: Arc<AclCaches>,
    default_policy: AclDefaultPolicy,
}

impl<D: AclResolverDelegate> AclResolver<D> {
    /// Creates a resolver.
    pub fn new(delegate: D, caches: Arc<AclCaches>, default_policy: AclDefaultPolicy) -> Self {
        Self { delegate, caches, default_policy }
    }

    /// Returns the delegate.
    pub fn delegate(&self) -> &D {
        &self.delegate
    }

    /// Returns the caches.
    pub fn caches(&self) -> &Arc<AclCaches> {
        &self.caches
    }

    /// Resolves a secret into an authorizer.
    ///
    /// An empty secret resolves the anonymous token. With ACLs disabled every
    /// secret resolves to the management authorizer. Tokens created under
    /// legacy ACLs keep their embedded rules after the switch to new ACLs.
    ///
    /// # Errors
    ///
    /// - [`AclError::TokenNotFound`] if the token is unknown and this
    ///   datacenter is authoritative
    /// - [`AclError::ForwardRequired`] if the token is unknown locally
    /// - [`AclError::Store`] or [`AclError::InvalidRules`] on lookup failures
    pub fn resolve_token(&self, secret_id: &str) -> Result<Arc<dyn Authorizer>, AclError> {
        let start = Instant::now();
        let result = self.resolve_token_uncounted(secret_id);
        let outcome = match &result {
            Ok(_) => "resolved",
            Err(AclError::TokenNotFound) => "not_found",
            Err(AclError::ForwardRequired { .. }) => "forward",
            Err(_) => "error",
        };
        metrics::record_token_resolution(outcome, start.elapsed().as_secs_f64());
        result
    }

    fn resolve_token_uncounted(&self, secret_id: &str) -> Result<Arc<dyn Authorizer>, AclError> {
        if !self.delegate.acls_enabled() {
            return Ok(StaticAuthorizer::ManageAll.shared());
        }

        let secret_id = if secret_id.is_empty() { ANONYMOUS_TOKEN_SECRET } else { secret_id };
        let identity = self.resolve_identity(secret_id)?;

        // A legacy payload is the token's embedded policy in both modes.
        match identity.legacy() {
            Some(legacy) => self.embedded_authorizer(identity.as_ref(), legacy),
            None if self.delegate.use_legacy_acls() => Ok(self.parent()),
            None => self.policy_authorizer(identity.as_ref()),
        }
    }

    /// Resolves the identity behind a secret, consulting the identity cache.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::TokenNotFound`] or [`AclError::ForwardRequired`]
    /// for unknown secrets, [`AclError::Store`] on store failures.
    pub fn resolve_identity(&self, secret_id: &str) -> Result<Arc<dyn AclIdentity>, AclError> {
        if let Some(identity) = self.caches.identities().get(secret_id) {
            return Ok(identity);
        }

        let resolution = self.delegate.resolve_identity_from_token(secret_id)?;
        match resolution.value {
            Some(identity) => {
                self.caches.identities().insert(secret_id.to_string(), identity.clone());
                Ok(identity)
            },
            None if resolution.authoritative => Err(AclError::TokenNotFound),
            None => Err(AclError::ForwardRequired {
                datacenter: self.delegate.acl_datacenter().to_string(),
            }),
        }
    }

    /// Resolves a policy by ID, consulting the policy cache.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Store`] on store failures.
    pub fn resolve_policy(&self, policy_id: &str) -> Result<Option<Arc<AclPolicy>>, AclError> {
        if let Some(policy) = self.caches.policies().get(policy_id) {
            return Ok(Some(policy));
        }

        let resolution = self.delegate.resolve_policy_from_id(policy_id)?;
        if let Some(policy) = &resolution.value {
            self.caches.policies().insert(policy_id.to_string(), policy.clone());
        }
        Ok(resolution.value)
    }

    /// Filters `subject` down to what `secret_id` may see.
    ///
    /// # Errors
    ///
    /// Returns the error of resolving `secret_id`.
    pub fn filter_acl<S: AclFilterable + ?Sized>(
        &self,
        secret_id: &str,
        subject: &mut S,
    ) -> Result<(), AclError> {
        if !self.delegate.acls_enabled() {
            return Ok(());
        }
        let authorizer = self.resolve_token(secret_id)?;
        subject.filter_acl(authorizer.as_ref());
        Ok(())
    }

    fn parent(&self) -> Arc<dyn Authorizer> {
        StaticAuthorizer::for_default_policy(self.default_policy).shared()
    }

    fn embedded_authorizer(
        &self,
        identity: &dyn AclIdentity,
        legacy: &LegacyAcl,
    ) -> Result<Arc<dyn Authorizer>, AclError> {
        if legacy.token_type == LegacyTokenType::Management {
            return Ok(StaticAuthorizer::ManageAll.shared());
        }

        let key = AuthorizerKey::Legacy {
            secret: identity.secret_id().to_string(),
            modify_index: identity.modify_index(),
        };
        if let Some(authorizer) = self.caches.authorizers().get(&key) {
            return Ok(authorizer);
        }

        let parsed = ParsedPolicy::parse(identity.accessor_id(), identity.modify_index(), &legacy.rules)?;
        let authorizer: Arc<dyn Authorizer> =
            Arc::new(PolicyAuthorizer::compile(&[Arc::new(parsed)], self.parent()));
        self.caches.authorizers().insert(key, authorizer.clone());
        Ok(authorizer)
    }

    fn policy_authorizer(&self, identity: &dyn AclIdentity) -> Result<Arc<dyn Authorizer>, AclError> {
        let datacenter = self.delegate.datacenter();
        let mut policies = Vec::new();
        for policy_id in identity.policy_ids() {
            let Some(policy) = self.resolve_policy(&policy_id)? else {
                debug!(
                    accessor_id = identity.accessor_id(),
                    policy_id = policy_id.as_str(),
                    "Skipping missing policy"
                );
                continue;
            };
            if !policy.applies_in(datacenter) {
                debug!(
                    accessor_id = identity.accessor_id(),
                    policy_id = policy_id.as_str(),
                    datacenter,
                    "Skipping policy restricted to other datacenters"
                );
                continue;
            }
            policies.push(policy);
        }

        let key = AuthorizerKey::policies(
            policies.iter().map(|policy| (policy.id.clone(), policy.modify_index)).collect(),
        );
        if let Some(authorizer) = self.caches.authorizers().get(&key) {
            return Ok(authorizer);
        }

        let parsed = policies
            .iter()
            .map(|policy| self.parsed_policy(policy))
            .collect::<Result<Vec<_>, _>>()?;
        let authorizer: Arc<dyn Authorizer> =
            Arc::new(PolicyAuthorizer::compile(&parsed, self.parent()));
        self.caches.authorizers().insert(key, authorizer.clone());
        Ok(authorizer)
    }

    fn parsed_policy(&self, policy: &AclPolicy) -> Result<Arc<ParsedPolicy>, AclError> {
        let key = (policy.id.clone(), policy.modify_index);
        if let Some(parsed) = self.caches.parsed_policies().get(&key) {
            return Ok(parsed);
        }
        let parsed = Arc::new(ParsedPolicy::from_policy(policy)?);
        self.caches.parsed_policies().insert(key, parsed.clone());
        Ok(parsed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use snafu::ResultExt;
    use warden_types::{
        AclToken, AclTokenPolicyLink, LegacyAcl, StoreError, config::AclCachesConfig,
    };

    use super::*;
    use crate::{
        error::StoreSnafu,
        store::{AclStateStore, MemoryAclStore},
    };

    struct TestDelegate {
        store: MemoryAclStore,
        datacenter: String,
        acl_datacenter: String,
        legacy: AtomicBool,
        failing: AtomicBool,
        identity_lookups: AtomicUsize,
    }

    impl TestDelegate {
        fn new(datacenter: &str, acl_datacenter: &str) -> Self {
            Self {
                store: MemoryAclStore::new(),
                datacenter: datacenter.to_string(),
                acl_datacenter: acl_datacenter.to_string(),
                legacy: AtomicBool::new(false),
                failing: AtomicBool::new(false),
                identity_lookups: AtomicUsize::new(0),
            }
        }

        fn check_failing(&self) -> Result<(), AclError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::unavailable("store closed")).context(StoreSnafu);
            }
            Ok(())
        }
    }

    impl AclResolverDelegate for TestDelegate {
        fn acls_enabled(&self) -> bool {
            !self.acl_datacenter.is_empty()
        }

        fn use_legacy_acls(&self) -> bool {
            self.legacy.load(Ordering::SeqCst)
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
            self.identity_lookups.fetch_add(1, Ordering::SeqCst);
            self.check_failing()?;
            match self.store.token_by_secret(secret_id).context(StoreSnafu)? {
                Some(token) => Ok(Resolution::authoritative(Some(Arc::new(token)))),
                None if self.datacenter == self.acl_datacenter => Ok(Resolution::authoritative(None)),
                None => Ok(Resolution::non_authoritative()),
            }
        }

        fn resolve_policy_from_id(
            &self,
            policy_id: &str,
        ) -> Result<Resolution<Arc<AclPolicy>>, AclError> {
            self.check_failing()?;
            let policy = self.store.policy_by_id(policy_id).context(StoreSnafu)?;
            Ok(Resolution::authoritative(policy.map(Arc::new)))
        }
    }

    fn resolver(delegate: TestDelegate, default_policy: AclDefaultPolicy) -> AclResolver<TestDelegate> {
        AclResolver::new(delegate, Arc::new(AclCaches::new(&AclCachesConfig::default())), default_policy)
    }

    fn link(id: &str) -> AclTokenPolicyLink {
        AclTokenPolicyLink { id: id.to_string(), name: String::new() }
    }

    #[test]
    fn test_disabled_acls_manage_everything() {
        let resolver = resolver(TestDelegate::new("dc1", ""), AclDefaultPolicy::Deny);
        let authz = resolver.resolve_token("whatever").unwrap();
        assert!(authz.acl_write());
        assert_eq!(resolver.delegate().identity_lookups.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_token_in_acl_datacenter_is_not_found() {
        let resolver = resolver(TestDelegate::new("dc1", "dc1"), AclDefaultPolicy::Deny);
        let err = resolver.resolve_token("missing").unwrap_err();
        assert!(matches!(err, AclError::TokenNotFound));
    }

    #[test]
    fn test_unknown_token_elsewhere_is_forwarded() {
        let resolver = resolver(TestDelegate::new("dc2", "dc1"), AclDefaultPolicy::Deny);
        let err = resolver.resolve_token("missing").unwrap_err();
        match err {
            AclError::ForwardRequired { datacenter } => assert_eq!(datacenter, "dc1"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_secret_resolves_anonymous() {
        let delegate = TestDelegate::new("dc1", "dc1");
        delegate.store.upsert_policy(
            AclPolicy::builder()
                .id("p-read")
                .name("read-all")
                .rules(r#"{"key_prefix": {"": {"policy": "read"}}}"#)
                .build(),
        );
        delegate
            .store
            .upsert_token(
                AclToken::builder()
                    .accessor_id("anon")
                    .secret_id(ANONYMOUS_TOKEN_SECRET)
                    .policies(vec![link("p-read")])
                    .build(),
            )
            .unwrap();

        let resolver = resolver(delegate, AclDefaultPolicy::Deny);
        let authz = resolver.resolve_token("").unwrap();
        assert!(authz.key_read("any"));
        assert!(!authz.key_write("any"));
    }

    #[test]
    fn test_policies_compile_over_default() {
        let delegate = TestDelegate::new("dc1", "dc1");
        delegate.store.upsert_policy(
            AclPolicy::builder()
                .id("p1")
                .name("web")
                .rules(r#"{"service": {"web": {"policy": "write"}}}"#)
                .build(),
        );
        delegate.store.upsert_policy(
            AclPolicy::builder()
                .id("p2")
                .name("dc2-only")
                .rules(r#"{"service": {"db": {"policy": "write"}}}"#)
                .datacenters(vec!["dc2".to_string()])
                .build(),
        );
        delegate
            .store
            .upsert_token(
                AclToken::builder()
                    .accessor_id("a1")
                    .secret_id("s1")
                    .policies(vec![link("p1"), link("p2"), link("gone")])
                    .build(),
            )
            .unwrap();

        let resolver = resolver(delegate, AclDefaultPolicy::Deny);
        let authz = resolver.resolve_token("s1").unwrap();
        assert!(authz.check(crate::policy::Resource::Service, "web", crate::policy::Access::Write));
        // Restricted to another datacenter, so the default policy applies.
        assert!(!authz.service_read("db"));
        assert_eq!(resolver.caches().parsed_policies().len(), 1);
        assert_eq!(resolver.caches().authorizers().len(), 1);
    }

    #[test]
    fn test_identity_cache_avoids_store_lookups() {
        let delegate = TestDelegate::new("dc1", "dc1");
        delegate
            .store
            .upsert_token(AclToken::builder().accessor_id("a1").secret_id("s1").build())
            .unwrap();
        let resolver = resolver(delegate, AclDefaultPolicy::Allow);

        resolver.resolve_token("s1").unwrap();
        resolver.resolve_token("s1").unwrap();
        assert_eq!(resolver.delegate().identity_lookups.load(Ordering::SeqCst), 1);

        resolver.caches().remove_identity("s1");
        resolver.resolve_token("s1").unwrap();
        assert_eq!(resolver.delegate().identity_lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_store_errors_propagate() {
        let delegate = TestDelegate::new("dc1", "dc1");
        delegate.failing.store(true, Ordering::SeqCst);
        let resolver = resolver(delegate, AclDefaultPolicy::Allow);
        let err = resolver.resolve_token("s1").unwrap_err();
        assert!(matches!(err, AclError::Store { .. }));
    }

    #[test]
    fn test_legacy_tokens() {
        let delegate = TestDelegate::new("dc1", "dc1");
        delegate.legacy.store(true, Ordering::SeqCst);
        delegate
            .store
            .upsert_token(
                AclToken::builder()
                    .accessor_id("m")
                    .secret_id("management")
                    .legacy(LegacyAcl { token_type: LegacyTokenType::Management, rules: String::new() })
                    .build(),
            )
            .unwrap();
        delegate
            .store
            .upsert_token(
                AclToken::builder()
                    .accessor_id("c")
                    .secret_id("client")
                    .legacy(LegacyAcl {
                        token_type: LegacyTokenType::Client,
                        rules: r#"{"key_prefix": {"foo/": {"policy": "write"}}}"#.to_string(),
                    })
                    .build(),
            )
            .unwrap();
        let resolver = resolver(delegate, AclDefaultPolicy::Deny);

        assert!(resolver.resolve_token("management").unwrap().acl_write());

        let client = resolver.resolve_token("client").unwrap();
        assert!(client.key_write("foo/bar"));
        assert!(!client.key_read("bar"));
        assert!(!client.acl_read());

        // Embedded rules still apply once the new system is in force.
        resolver.delegate().legacy.store(false, Ordering::SeqCst);
        resolver.caches().purge();
        assert!(resolver.resolve_token("management").unwrap().acl_write());
        let client = resolver.resolve_token("client").unwrap();
        assert!(client.key_write("foo/bar"));
        assert!(!client.key_read("bar"));
    }

    #[test]
    fn test_invalid_policy_rules_surface() {
        let delegate = TestDelegate::new("dc1", "dc1");
        delegate.store.upsert_policy(
            AclPolicy::builder().id("bad").name("bad").rules("not json").build(),
        );
        delegate
            .store
            .upsert_token(
                AclToken::builder().accessor_id("a1").secret_id("s1").policies(vec![link("bad")]).build(),
            )
            .unwrap();
        let resolver = resolver(delegate, AclDefaultPolicy::Allow);
        assert!(matches!(resolver.resolve_token("s1"), Err(AclError::InvalidRules { .. })));
    }
}
