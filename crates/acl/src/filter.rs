//! ACL filtering of read results.
//!
//! Read endpoints return everything matching a query and then drop what the
//! caller's authorizer does not allow. Filtering never fails; records the
//! caller may not see are removed.

use tracing::debug;
use warden_types::{
    AclPolicy, AclToken, Member,
    catalog::{CatalogNode, KvEntry, ServiceIndex, ServiceInstance},
};

use crate::authorizer::Authorizer;

/// Secret shown in place of token secrets the caller may not manage.
pub const REDACTED_SECRET: &str = "<hidden>";

/// Result sets that can be filtered by an authorizer.
pub trait AclFilterable {
    /// Removes everything `authorizer` does not allow reading.
    fn filter_acl(&mut self, authorizer: &dyn Authorizer);
}

fn retain_logged<T>(items: &mut Vec<T>, kind: &'static str, mut keep: impl FnMut(&T) -> bool) {
    let before = items.len();
    items.retain(|item| keep(item));
    let dropped = before - items.len();
    if dropped > 0 {
        debug!(kind, dropped, "Filtered results due to ACLs");
    }
}

impl AclFilterable for Vec<KvEntry> {
    fn filter_acl(&mut self, authorizer: &dyn Authorizer) {
        retain_logged(self, "kv", |entry| authorizer.key_read(&entry.key));
    }
}

impl AclFilterable for Vec<CatalogNode> {
    fn filter_acl(&mut self, authorizer: &dyn Authorizer) {
        retain_logged(self, "node", |node| authorizer.node_read(&node.node));
    }
}

impl AclFilterable for Vec<ServiceInstance> {
    fn filter_acl(&mut self, authorizer: &dyn Authorizer) {
        retain_logged(self, "service_instance", |instance| {
            authorizer.service_read(&instance.service_name) && authorizer.node_read(&instance.node)
        });
    }
}

impl AclFilterable for ServiceIndex {
    fn filter_acl(&mut self, authorizer: &dyn Authorizer) {
        let before = self.len();
        self.retain(|service, _| authorizer.service_read(service));
        let dropped = before - self.len();
        if dropped > 0 {
            debug!(kind = "service", dropped, "Filtered results due to ACLs");
        }
    }
}

impl AclFilterable for Vec<Member> {
    fn filter_acl(&mut self, authorizer: &dyn Authorizer) {
        retain_logged(self, "member", |member| authorizer.node_read(&member.name));
    }
}

impl AclFilterable for Vec<AclToken> {
    fn filter_acl(&mut self, authorizer: &dyn Authorizer) {
        if !authorizer.acl_read() {
            retain_logged(self, "token", |_| false);
            return;
        }
        if !authorizer.acl_write() {
            for token in self.iter_mut() {
                token.secret_id = REDACTED_SECRET.to_string();
            }
        }
    }
}

impl AclFilterable for Vec<AclPolicy> {
    fn filter_acl(&mut self, authorizer: &dyn Authorizer) {
        if !authorizer.acl_read() {
            retain_logged(self, "policy", |_| false);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        net::{IpAddr, Ipv4Addr},
        sync::Arc,
    };

    use super::*;
    use crate::{
        authorizer::{PolicyAuthorizer, StaticAuthorizer},
        policy::ParsedPolicy,
    };

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    fn authorizer(rules: &str) -> PolicyAuthorizer {
        let parsed = Arc::new(ParsedPolicy::parse("p", 1, rules).unwrap());
        PolicyAuthorizer::compile(&[parsed], StaticAuthorizer::DenyAll.shared())
    }

    fn instance(node: &str, service: &str) -> ServiceInstance {
        ServiceInstance {
            node: node.to_string(),
            service_id: format!("{service}-1"),
            service_name: service.to_string(),
            address: LOCALHOST,
            port: 8080,
            tags: Vec::new(),
        }
    }

    #[test]
    fn test_filter_kv_entries() {
        let authz = authorizer(r#"{"key_prefix": {"public/": {"policy": "read"}}}"#);
        let mut entries = vec![KvEntry::new("public/a"), KvEntry::new("private/b")];
        entries.filter_acl(&authz);
        assert_eq!(entries, vec![KvEntry::new("public/a")]);
    }

    #[test]
    fn test_filter_service_instances_needs_node_and_service() {
        let authz = authorizer(
            r#"{"service": {"web": {"policy": "read"}}, "node": {"n1": {"policy": "read"}}}"#,
        );
        let mut instances = vec![instance("n1", "web"), instance("n2", "web"), instance("n1", "db")];
        instances.filter_acl(&authz);
        assert_eq!(instances, vec![instance("n1", "web")]);
    }

    #[test]
    fn test_filter_service_index_and_nodes() {
        let authz = authorizer(
            r#"{"service_prefix": {"web": {"policy": "read"}}, "node": {"n1": {"policy": "read"}}}"#,
        );
        let mut index = ServiceIndex::new();
        index.insert("web-api".to_string(), vec!["v1".to_string()]);
        index.insert("db".to_string(), Vec::new());
        index.filter_acl(&authz);
        assert_eq!(index.keys().collect::<Vec<_>>(), vec!["web-api"]);

        let mut nodes = vec![
            CatalogNode { node: "n1".to_string(), address: LOCALHOST, datacenter: "dc1".to_string() },
            CatalogNode { node: "n2".to_string(), address: LOCALHOST, datacenter: "dc1".to_string() },
        ];
        nodes.filter_acl(&authz);
        assert_eq!(nodes.len(), 1);

        let mut members = vec![Member::new("n1", LOCALHOST), Member::new("n3", LOCALHOST)];
        members.filter_acl(&authz);
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, "n1");
    }

    #[test]
    fn test_token_secrets_redacted_without_acl_write() {
        let tokens = || vec![AclToken::builder().accessor_id("a").secret_id("s").build()];

        let mut hidden = tokens();
        hidden.filter_acl(&authorizer(r#"{"acl": "read"}"#));
        assert_eq!(hidden[0].secret_id, REDACTED_SECRET);
        assert_eq!(hidden[0].accessor_id, "a");

        let mut visible = tokens();
        visible.filter_acl(&StaticAuthorizer::ManageAll);
        assert_eq!(visible[0].secret_id, "s");

        let mut none = tokens();
        none.filter_acl(&StaticAuthorizer::AllowAll);
        assert!(none.is_empty());
    }

    #[test]
    fn test_policies_need_acl_read() {
        let policies = || vec![AclPolicy::builder().id("p").name("p").build()];

        let mut denied = policies();
        denied.filter_acl(&StaticAuthorizer::AllowAll);
        assert!(denied.is_empty());

        let mut allowed = policies();
        allowed.filter_acl(&authorizer(r#"{"acl": "read"}"#));
        assert_eq!(allowed.len(), 1);
    }
}
