//! Compiled authorization decisions.
//!
//! An [`Authorizer`] answers whether an access to a resource segment is
//! allowed. [`PolicyAuthorizer`] layers one or more parsed policies over a
//! parent, which is one of the [`StaticAuthorizer`]s chosen by the default
//! policy.

use std::{collections::BTreeMap, fmt, sync::Arc};

use warden_types::config::AclDefaultPolicy;

use crate::policy::{Access, ParsedPolicy, PolicyLevel, Resource, SegmentRules};

/// Permission checks against a compiled set of rules.
pub trait Authorizer: fmt::Debug + Send + Sync {
    /// Checks `access` to `segment` of `resource`.
    ///
    /// `segment` is ignored for scalar resources.
    fn check(&self, resource: Resource, segment: &str, access: Access) -> bool;

    /// Whether the key may be read.
    fn key_read(&self, key: &str) -> bool {
        self.check(Resource::Key, key, Access::Read)
    }

    /// Whether the key may be written.
    fn key_write(&self, key: &str) -> bool {
        self.check(Resource::Key, key, Access::Write)
    }

    /// Whether the node may be read.
    fn node_read(&self, node: &str) -> bool {
        self.check(Resource::Node, node, Access::Read)
    }

    /// Whether the service may be read.
    fn service_read(&self, service: &str) -> bool {
        self.check(Resource::Service, service, Access::Read)
    }

    /// Whether ACLs may be read.
    fn acl_read(&self) -> bool {
        self.check(Resource::Acl, "", Access::Read)
    }

    /// Whether ACLs may be managed.
    fn acl_write(&self) -> bool {
        self.check(Resource::Acl, "", Access::Write)
    }

    /// Whether operator endpoints may be read.
    fn operator_read(&self) -> bool {
        self.check(Resource::Operator, "", Access::Read)
    }
}

/// Fixed authorizers that do not depend on rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticAuthorizer {
    /// Allows everything except ACL management.
    AllowAll,
    /// Denies everything.
    DenyAll,
    /// Allows everything.
    ManageAll,
}

impl StaticAuthorizer {
    /// Returns the parent authorizer for a default policy.
    pub fn for_default_policy(policy: AclDefaultPolicy) -> Self {
        match policy {
            AclDefaultPolicy::Allow => StaticAuthorizer::AllowAll,
            AclDefaultPolicy::Deny => StaticAuthorizer::DenyAll,
        }
    }

    /// Returns the shared instance of this authorizer.
    pub fn shared(self) -> Arc<dyn Authorizer> {
        Arc::new(self)
    }
}

impl Authorizer for StaticAuthorizer {
    fn check(&self, resource: Resource, _segment: &str, _access: Access) -> bool {
        match self {
            StaticAuthorizer::AllowAll => resource != Resource::Acl,
            StaticAuthorizer::DenyAll => false,
            StaticAuthorizer::ManageAll => true,
        }
    }
}

/// Authorizer compiled from parsed policies over a parent.
///
/// Lookups match the exact rule first, then the longest matching prefix.
/// Unmatched requests fall through to the parent. When several policies
/// address the same target, `deny` beats `write` beats `read`.
#[derive(Debug)]
pub struct PolicyAuthorizer {
    segments: BTreeMap<Resource, SegmentRules>,
    scalars: BTreeMap<Resource, PolicyLevel>,
    parent: Arc<dyn Authorizer>,
}

impl PolicyAuthorizer {
    /// Compiles `policies` over `parent`.
    pub fn compile(policies: &[Arc<ParsedPolicy>], parent: Arc<dyn Authorizer>) -> Self {
        let mut segments: BTreeMap<Resource, SegmentRules> = BTreeMap::new();
        let mut scalars: BTreeMap<Resource, PolicyLevel> = BTreeMap::new();

        for policy in policies {
            for (resource, rules) in policy.segments() {
                segments.entry(resource).or_default().merge(rules);
            }
            for (resource, level) in policy.scalars() {
                scalars
                    .entry(resource)
                    .and_modify(|existing| *existing = existing.merge(level))
                    .or_insert(level);
            }
        }

        Self { segments, scalars, parent }
    }
}

impl Authorizer for PolicyAuthorizer {
    fn check(&self, resource: Resource, segment: &str, access: Access) -> bool {
        let level = if resource.is_scalar() {
            self.scalars.get(&resource).copied()
        } else {
            self.segments.get(&resource).and_then(|rules| rules.lookup(segment))
        };

        match level {
            Some(level) => level.allows(access),
            None => self.parent.check(resource, segment, access),
        }
    }
}
