//! Rules language and parsed policies.
//!
//! Rules documents are JSON objects. Segmented resources take an exact form
//! and a `_prefix` form, each mapping a segment to `{"policy": <level>}`.
//! Scalar resources take a level directly:
//!
//! ```json
//! {
//!   "key_prefix": { "app/": { "policy": "write" } },
//!   "key": { "app/secret": { "policy": "deny" } },
//!   "service_prefix": { "": { "policy": "read" } },
//!   "acl": "read"
//! }
//! ```
//!
//! Unknown fields are rejected. An empty or blank document grants nothing.

use std::{collections::BTreeMap, fmt};

use serde::Deserialize;
use snafu::ResultExt;
use warden_types::AclPolicy;

use crate::error::{AclError, InvalidRulesSnafu};

/// Rules document of the builtin global-management policy.
pub const GLOBAL_MANAGEMENT_RULES: &str = r#"{
  "acl": "write",
  "keyring": "write",
  "operator": "write",
  "agent_prefix": { "": { "policy": "write" } },
  "event_prefix": { "": { "policy": "write" } },
  "key_prefix": { "": { "policy": "write" } },
  "node_prefix": { "": { "policy": "write" } },
  "query_prefix": { "": { "policy": "write" } },
  "service_prefix": { "": { "policy": "write" } },
  "session_prefix": { "": { "policy": "write" } }
}"#;

/// Resource kinds addressed by rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Resource {
    /// ACL management.
    Acl,
    /// Agent endpoints, by node name.
    Agent,
    /// User events, by event name.
    Event,
    /// Key/value entries, by key.
    Key,
    /// Gossip encryption keyring.
    Keyring,
    /// Catalog nodes, by node name.
    Node,
    /// Cluster operator endpoints.
    Operator,
    /// Prepared queries, by query name.
    Query,
    /// Catalog services, by service name.
    Service,
    /// Sessions, by node name.
    Session,
}

impl Resource {
    /// Whether rules for this resource carry no segment.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Resource::Acl | Resource::Keyring | Resource::Operator)
    }

    /// Returns the rules document field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Acl => "acl",
            Resource::Agent => "agent",
            Resource::Event => "event",
            Resource::Key => "key",
            Resource::Keyring => "keyring",
            Resource::Node => "node",
            Resource::Operator => "operator",
            Resource::Query => "query",
            Resource::Service => "service",
            Resource::Session => "session",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access requested by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Access {
    /// Observe the resource.
    Read,
    /// Modify the resource.
    Write,
}

/// Level granted by a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyLevel {
    /// Nothing is allowed.
    Deny,
    /// Read access.
    Read,
    /// Read and write access.
    Write,
}

impl PolicyLevel {
    /// Whether the level grants `access`.
    pub fn allows(&self, access: Access) -> bool {
        match (self, access) {
            (PolicyLevel::Deny, _) => false,
            (PolicyLevel::Read, Access::Read) => true,
            (PolicyLevel::Read, Access::Write) => false,
            (PolicyLevel::Write, _) => true,
        }
    }

    /// Combines two rules for the same target. `Deny` beats `Write` beats
    /// `Read`.
    pub fn merge(self, other: PolicyLevel) -> PolicyLevel {
        match (self, other) {
            (PolicyLevel::Deny, _) | (_, PolicyLevel::Deny) => PolicyLevel::Deny,
            (PolicyLevel::Write, _) | (_, PolicyLevel::Write) => PolicyLevel::Write,
            _ => PolicyLevel::Read,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRule {
    policy: PolicyLevel,
}

type RawSegments = BTreeMap<String, RawRule>;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRules {
    #[serde(default)]
    agent: RawSegments,
    #[serde(default)]
    agent_prefix: RawSegments,
    #[serde(default)]
    event: RawSegments,
    #[serde(default)]
    event_prefix: RawSegments,
    #[serde(default)]
    key: RawSegments,
    #[serde(default)]
    key_prefix: RawSegments,
    #[serde(default)]
    node: RawSegments,
    #[serde(default)]
    node_prefix: RawSegments,
    #[serde(default)]
    query: RawSegments,
    #[serde(default)]
    query_prefix: RawSegments,
    #[serde(default)]
    service: RawSegments,
    #[serde(default)]
    service_prefix: RawSegments,
    #[serde(default)]
    session: RawSegments,
    #[serde(default)]
    session_prefix: RawSegments,
    #[serde(default)]
    acl: Option<PolicyLevel>,
    #[serde(default)]
    keyring: Option<PolicyLevel>,
    #[serde(default)]
    operator: Option<PolicyLevel>,
}

/// Exact and prefix rules of one segmented resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentRules {
    /// Rules matching a segment exactly.
    pub exact: BTreeMap<String, PolicyLevel>,
    /// Rules matching segments starting with the prefix.
    pub prefix: BTreeMap<String, PolicyLevel>,
}

impl SegmentRules {
    fn from_raw(exact: RawSegments, prefix: RawSegments) -> Self {
        Self {
            exact: exact.into_iter().map(|(segment, rule)| (segment, rule.policy)).collect(),
            prefix: prefix.into_iter().map(|(segment, rule)| (segment, rule.policy)).collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.prefix.is_empty()
    }

    /// Folds `other` into these rules, merging conflicting levels.
    pub fn merge(&mut self, other: &SegmentRules) {
        for (segment, level) in &other.exact {
            self.exact
                .entry(segment.clone())
                .and_modify(|existing| *existing = existing.merge(*level))
                .or_insert(*level);
        }
        for (segment, level) in &other.prefix {
            self.prefix
                .entry(segment.clone())
                .and_modify(|existing| *existing = existing.merge(*level))
                .or_insert(*level);
        }
    }

    /// Returns the level of the exact rule, else of the longest matching
    /// prefix rule.
    pub fn lookup(&self, segment: &str) -> Option<PolicyLevel> {
        if let Some(level) = self.exact.get(segment) {
            return Some(*level);
        }
        self.prefix
            .iter()
            .filter(|(prefix, _)| segment.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, level)| *level)
    }
}

/// Rules document compiled into typed resource rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPolicy {
    /// ID of the policy the rules came from.
    pub id: String,
    /// Modify index of the source record.
    pub modify_index: u64,
    segments: BTreeMap<Resource, SegmentRules>,
    scalars: BTreeMap<Resource, PolicyLevel>,
}

impl ParsedPolicy {
    /// Parses a rules document.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::InvalidRules`] if the document is not a valid
    /// rules object.
    pub fn parse(id: impl Into<String>, modify_index: u64, rules: &str) -> Result<Self, AclError> {
        let id = id.into();
        let raw: RawRules = if rules.trim().is_empty() {
            RawRules::default()
        } else {
            serde_json::from_str(rules).context(InvalidRulesSnafu { origin: id.clone() })?
        };

        let segments = [
            (Resource::Agent, SegmentRules::from_raw(raw.agent, raw.agent_prefix)),
            (Resource::Event, SegmentRules::from_raw(raw.event, raw.event_prefix)),
            (Resource::Key, SegmentRules::from_raw(raw.key, raw.key_prefix)),
            (Resource::Node, SegmentRules::from_raw(raw.node, raw.node_prefix)),
            (Resource::Query, SegmentRules::from_raw(raw.query, raw.query_prefix)),
            (Resource::Service, SegmentRules::from_raw(raw.service, raw.service_prefix)),
            (Resource::Session, SegmentRules::from_raw(raw.session, raw.session_prefix)),
        ]
        .into_iter()
        .filter(|(_, rules)| !rules.is_empty())
        .collect();

        let scalars = [
            (Resource::Acl, raw.acl),
            (Resource::Keyring, raw.keyring),
            (Resource::Operator, raw.operator),
        ]
        .into_iter()
        .filter_map(|(resource, level)| level.map(|level| (resource, level)))
        .collect();

        Ok(Self { id, modify_index, segments, scalars })
    }

    /// Parses the rules of a stored policy.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::InvalidRules`] if the policy rules are invalid.
    pub fn from_policy(policy: &AclPolicy) -> Result<Self, AclError> {
        Self::parse(policy.id.clone(), policy.modify_index, &policy.rules)
    }

    /// Returns the rules for a segmented resource.
    pub fn segment_rules(&self, resource: Resource) -> Option<&SegmentRules> {
        self.segments.get(&resource)
    }

    /// Returns the level for a scalar resource.
    pub fn scalar(&self, resource: Resource) -> Option<PolicyLevel> {
        self.scalars.get(&resource).copied()
    }

    /// Iterates over all segmented resource rules.
    pub fn segments(&self) -> impl Iterator<Item = (Resource, &SegmentRules)> {
        self.segments.iter().map(|(resource, rules)| (*resource, rules))
    }

    /// Iterates over all scalar resource levels.
    pub fn scalars(&self) -> impl Iterator<Item = (Resource, PolicyLevel)> + '_ {
        self.scalars.iter().map(|(resource, level)| (*resource, *level))
    }

    /// Whether the document grants or denies nothing.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty() && self.scalars.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_segments_and_scalars() {
        let rules = r#"{
            "key_prefix": { "app/": { "policy": "write" } },
            "key": { "app/secret": { "policy": "deny" } },
            "operator": "read"
        }"#;
        let parsed = ParsedPolicy::parse("p1", 3, rules).unwrap();

        let key = parsed.segment_rules(Resource::Key).unwrap();
        assert_eq!(key.exact.get("app/secret"), Some(&PolicyLevel::Deny));
        assert_eq!(key.prefix.get("app/"), Some(&PolicyLevel::Write));
        assert_eq!(parsed.scalar(Resource::Operator), Some(PolicyLevel::Read));
        assert_eq!(parsed.scalar(Resource::Acl), None);
        assert!(parsed.segment_rules(Resource::Node).is_none());
        assert_eq!(parsed.modify_index, 3);
    }

    #[test]
    fn test_blank_rules_are_empty() {
        assert!(ParsedPolicy::parse("p", 0, "").unwrap().is_empty());
        assert!(ParsedPolicy::parse("p", 0, "  \n").unwrap().is_empty());
        assert!(ParsedPolicy::parse("p", 0, "{}").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = ParsedPolicy::parse("p1", 0, r#"{"keys": {}}"#).unwrap_err();
        assert!(matches!(err, AclError::InvalidRules { .. }));
        assert!(err.to_string().contains("p1"));

        let err = ParsedPolicy::parse("p1", 0, r#"{"key": {"a": {"policy": "admin"}}}"#);
        assert!(err.is_err());
    }

    #[test]
    fn test_lookup_exact_then_longest_prefix() {
        let rules = r#"{
            "key_prefix": {
                "": { "policy": "read" },
                "app/": { "policy": "write" },
                "app/locked/": { "policy": "deny" }
            },
            "key": { "app/locked/open": { "policy": "read" } }
        }"#;
        let parsed = ParsedPolicy::parse("p", 0, rules).unwrap();
        let key = parsed.segment_rules(Resource::Key).unwrap();

        assert_eq!(key.lookup("other"), Some(PolicyLevel::Read));
        assert_eq!(key.lookup("app/config"), Some(PolicyLevel::Write));
        assert_eq!(key.lookup("app/locked/x"), Some(PolicyLevel::Deny));
        assert_eq!(key.lookup("app/locked/open"), Some(PolicyLevel::Read));
    }

    #[test]
    fn test_level_merge_precedence() {
        use PolicyLevel::*;
        assert_eq!(Read.merge(Write), Write);
        assert_eq!(Write.merge(Read), Write);
        assert_eq!(Write.merge(Deny), Deny);
        assert_eq!(Deny.merge(Read), Deny);
        assert_eq!(Read.merge(Read), Read);
    }

    #[test]
    fn test_level_allows() {
        assert!(PolicyLevel::Write.allows(Access::Read));
        assert!(PolicyLevel::Read.allows(Access::Read));
        assert!(!PolicyLevel::Read.allows(Access::Write));
        assert!(!PolicyLevel::Deny.allows(Access::Read));
    }

    #[test]
    fn test_global_management_rules_parse() {
        let parsed = ParsedPolicy::parse("gm", 0, GLOBAL_MANAGEMENT_RULES).unwrap();
        assert_eq!(parsed.scalar(Resource::Acl), Some(PolicyLevel::Write));
        for (_, rules) in parsed.segments() {
            assert_eq!(rules.lookup("anything"), Some(PolicyLevel::Write));
        }
        assert_eq!(parsed.segments().count(), 7);
    }
}
