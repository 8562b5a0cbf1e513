//! ACL records owned by the state store.
//!
//! Tokens and policies are stored records; identities are the view the
//! resolver takes of a token. The resolver only reads and caches these.

use std::{collections::BTreeSet, fmt};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Prefix shared by every builtin ACL identifier.
pub const ACL_RESERVED_PREFIX: &str = "00000000-0000-0000-0000-0000000000";

/// Policy ID of the builtin global-management policy.
pub const GLOBAL_MANAGEMENT_POLICY_ID: &str = "00000000-0000-0000-0000-000000000001";

/// Name of the builtin global-management policy.
pub const GLOBAL_MANAGEMENT_POLICY_NAME: &str = "global-management";

/// Accessor ID of the builtin anonymous token.
pub const ANONYMOUS_TOKEN_ACCESSOR_ID: &str = "00000000-0000-0000-0000-000000000002";

/// Secret of the builtin anonymous token, used for requests without a token.
pub const ANONYMOUS_TOKEN_SECRET: &str = "anonymous";

/// Gossip tag key carrying a member's ACL mode.
pub const ACL_MODE_TAG: &str = "acls";

/// ACL mode a member advertises through gossip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AclMode {
    /// ACLs are not enabled on the member.
    Disabled,
    /// The member enforces the legacy ACL system.
    Legacy,
    /// The member enforces the new ACL system.
    Enabled,
}

impl AclMode {
    /// Returns the tag value for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            AclMode::Disabled => "disabled",
            AclMode::Legacy => "legacy",
            AclMode::Enabled => "enabled",
        }
    }

    /// Parses a tag value. Unknown values yield `None`.
    pub fn from_tag(value: &str) -> Option<Self> {
        match value {
            "disabled" => Some(AclMode::Disabled),
            "legacy" => Some(AclMode::Legacy),
            "enabled" => Some(AclMode::Enabled),
            _ => None,
        }
    }
}

impl fmt::Display for AclMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifiers excluded from generation and availability checks.
///
/// An ID is reserved if it equals one of `ids` or starts with one of
/// `prefixes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReservedIds {
    /// Exact reserved identifiers.
    #[serde(default)]
    pub ids: BTreeSet<String>,
    /// Reserved identifier prefixes.
    #[serde(default = "default_reserved_prefixes")]
    pub prefixes: Vec<String>,
}

fn default_reserved_prefixes() -> Vec<String> {
    vec![ACL_RESERVED_PREFIX.to_string()]
}

impl Default for ReservedIds {
    fn default() -> Self {
        Self { ids: BTreeSet::new(), prefixes: default_reserved_prefixes() }
    }
}

impl ReservedIds {
    /// Creates an empty set that reserves nothing.
    pub fn none() -> Self {
        Self { ids: BTreeSet::new(), prefixes: Vec::new() }
    }

    /// Adds an exact reserved identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.ids.insert(id.into());
        self
    }

    /// Adds a reserved prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    /// Checks whether `id` is reserved.
    pub fn is_reserved(&self, id: &str) -> bool {
        self.ids.contains(id) || self.prefixes.iter().any(|prefix| id.starts_with(prefix.as_str()))
    }
}

/// Token type of the legacy ACL system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum LegacyTokenType {
    /// Rules come from the token itself, layered over the default policy.
    Client,
    /// Unrestricted access.
    Management,
}

/// Legacy payload carried by tokens created under the legacy ACL system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LegacyAcl {
    /// Legacy token type.
    pub token_type: LegacyTokenType,
    /// Embedded rules document.
    #[serde(default)]
    pub rules: String,
}

/// Link from a token to a policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct AclTokenPolicyLink {
    /// Linked policy ID.
    pub id: String,
    /// Policy name at link time (informational).
    #[serde(default)]
    pub name: String,
}

/// ACL token as stored in the state store.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize, JsonSchema)]
pub struct AclToken {
    /// Public identifier of the token.
    #[builder(into)]
    pub accessor_id: String,
    /// Secret presented by clients.
    #[builder(into)]
    pub secret_id: String,
    /// Human-readable description.
    #[serde(default)]
    #[builder(into, default)]
    pub description: String,
    /// Linked policies.
    #[serde(default)]
    #[builder(default)]
    pub policies: Vec<AclTokenPolicyLink>,
    /// Whether the token is local to its datacenter rather than replicated.
    #[serde(default)]
    #[builder(default)]
    pub local: bool,
    /// Legacy payload for tokens created under the legacy system.
    #[serde(default)]
    pub legacy: Option<LegacyAcl>,
    /// Raft index that created the token.
    #[serde(default)]
    #[builder(default)]
    pub create_index: u64,
    /// Raft index of the last modification.
    #[serde(default)]
    #[builder(default)]
    pub modify_index: u64,
}

/// ACL policy as stored in the state store.
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder, Serialize, Deserialize, JsonSchema)]
pub struct AclPolicy {
    /// Unique policy ID.
    #[builder(into)]
    pub id: String,
    /// Unique policy name.
    #[builder(into)]
    pub name: String,
    /// Human-readable description.
    #[serde(default)]
    #[builder(into, default)]
    pub description: String,
    /// Rules document.
    #[serde(default)]
    #[builder(into, default)]
    pub rules: String,
    /// Datacenters the policy applies in. Empty means all.
    #[serde(default)]
    #[builder(default)]
    pub datacenters: Vec<String>,
    /// Raft index that created the policy.
    #[serde(default)]
    #[builder(default)]
    pub create_index: u64,
    /// Raft index of the last modification.
    #[serde(default)]
    #[builder(default)]
    pub modify_index: u64,
}

impl AclPolicy {
    /// Checks whether the policy applies in `datacenter`.
    pub fn applies_in(&self, datacenter: &str) -> bool {
        self.datacenters.is_empty() || self.datacenters.iter().any(|dc| dc == datacenter)
    }
}

/// Resolved principal behind a secret token.
pub trait AclIdentity: fmt::Debug + Send + Sync {
    /// Public identifier of the principal.
    fn accessor_id(&self) -> &str;

    /// Secret the principal was resolved from.
    fn secret_id(&self) -> &str;

    /// IDs of the policies granted to the principal.
    fn policy_ids(&self) -> Vec<String>;

    /// Whether the principal is local to its datacenter.
    fn is_local(&self) -> bool;

    /// Legacy payload, when the principal predates the new ACL system.
    fn legacy(&self) -> Option<&LegacyAcl>;

    /// Index of the last modification of the underlying record.
    fn modify_index(&self) -> u64;
}

impl AclIdentity for AclToken {
    fn accessor_id(&self) -> &str {
        &self.accessor_id
    }

    fn secret_id(&self) -> &str {
        &self.secret_id
    }

    fn policy_ids(&self) -> Vec<String> {
        self.policies.iter().map(|link| link.id.clone()).collect()
    }

    fn is_local(&self) -> bool {
        self.local
    }

    fn legacy(&self) -> Option<&LegacyAcl> {
        self.legacy.as_ref()
    }

    fn modify_index(&self) -> u64 {
        self.modify_index
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_mode_tag_values() {
        for mode in [AclMode::Disabled, AclMode::Legacy, AclMode::Enabled] {
            assert_eq!(AclMode::from_tag(mode.as_str()), Some(mode));
        }
        assert_eq!(AclMode::from_tag("ENABLED"), None);
        assert_eq!(AclMode::from_tag(""), None);
    }

    #[test]
    fn test_default_reserved_ids_cover_builtins() {
        let reserved = ReservedIds::default();
        assert!(reserved.is_reserved(GLOBAL_MANAGEMENT_POLICY_ID));
        assert!(reserved.is_reserved(ANONYMOUS_TOKEN_ACCESSOR_ID));
        assert!(!reserved.is_reserved("6a1253f8-3f49-4bd4-a6b3-9f2c7e0b6d11"));
    }

    #[test]
    fn test_reserved_ids_exact_and_prefix() {
        let reserved = ReservedIds::none().with_id("root").with_prefix("sys-");
        assert!(reserved.is_reserved("root"));
        assert!(!reserved.is_reserved("root2"));
        assert!(reserved.is_reserved("sys-anything"));
        assert!(!reserved.is_reserved(GLOBAL_MANAGEMENT_POLICY_ID));
    }

    #[test]
    fn test_token_identity_view() {
        let token = AclToken::builder()
            .accessor_id("acc")
            .secret_id("sec")
            .policies(vec![
                AclTokenPolicyLink { id: "p1".to_string(), name: "one".to_string() },
                AclTokenPolicyLink { id: "p2".to_string(), name: "two".to_string() },
            ])
            .local(true)
            .modify_index(7)
            .build();

        let identity: &dyn AclIdentity = &token;
        assert_eq!(identity.accessor_id(), "acc");
        assert_eq!(identity.secret_id(), "sec");
        assert_eq!(identity.policy_ids(), vec!["p1".to_string(), "p2".to_string()]);
        assert!(identity.is_local());
        assert!(identity.legacy().is_none());
        assert_eq!(identity.modify_index(), 7);
    }

    #[test]
    fn test_policy_datacenter_scope() {
        let global = AclPolicy::builder().id("p").name("p").build();
        assert!(global.applies_in("dc1"));

        let scoped = AclPolicy::builder().id("p").name("p").datacenters(vec!["dc2".into()]).build();
        assert!(!scoped.applies_in("dc1"));
        assert!(scoped.applies_in("dc2"));
    }

    #[test]
    fn test_token_deserializes_with_defaults() {
        let json = r#"{"accessor_id":"a","secret_id":"s"}"#;
        let token: AclToken = serde_json::from_str(json).unwrap();
        assert!(token.policies.is_empty());
        assert!(!token.local);
        assert_eq!(token.modify_index, 0);
    }
}
