//! Synthetic members, tokens and policies.

use std::net::{IpAddr, Ipv4Addr};

use warden_types::{
    AclMode, AclPolicy, AclToken, AclTokenPolicyLink, LegacyAcl, LegacyTokenType, Member,
    MemberStatus,
    acl::ACL_MODE_TAG,
    membership::{BUILD_TAG, DATACENTER_TAG, PORT_TAG, ROLE_TAG, SERVER_ROLE},
};

/// Default RPC port of fixture servers.
pub const TEST_SERVER_PORT: u16 = 8300;

/// Builds a server member carrying the tags servers advertise.
///
/// ```no_run
/// use warden_types::AclMode;
/// use warden_test_utils::server_member;
///
/// let member = server_member().name("s1").datacenter("dc1").acl_mode(AclMode::Enabled).call();
/// assert!(member.server().is_some());
/// ```
#[bon::builder]
pub fn server_member(
    #[builder(into)] name: String,
    #[builder(into, default = "dc1".to_string())] datacenter: String,
    #[builder(default = IpAddr::V4(Ipv4Addr::LOCALHOST))] addr: IpAddr,
    #[builder(default = TEST_SERVER_PORT)] port: u16,
    #[builder(into, default = "1.4.0".to_string())] version: String,
    acl_mode: Option<AclMode>,
    #[builder(default = MemberStatus::Alive)] status: MemberStatus,
) -> Member {
    let mut member = Member::new(name, addr);
    member.status = status;
    member.tags.insert(ROLE_TAG.to_string(), SERVER_ROLE.to_string());
    member.tags.insert(DATACENTER_TAG.to_string(), datacenter);
    member.tags.insert(PORT_TAG.to_string(), port.to_string());
    member.tags.insert(BUILD_TAG.to_string(), version);
    if let Some(mode) = acl_mode {
        member.tags.insert(ACL_MODE_TAG.to_string(), mode.as_str().to_string());
    }
    member
}

/// Returns a token linked to `policy_ids`.
#[must_use]
pub fn token(accessor_id: &str, secret_id: &str, policy_ids: &[&str]) -> AclToken {
    AclToken::builder()
        .accessor_id(accessor_id)
        .secret_id(secret_id)
        .policies(
            policy_ids
                .iter()
                .map(|id| AclTokenPolicyLink { id: (*id).to_string(), name: String::new() })
                .collect(),
        )
        .build()
}

/// Returns a legacy token of the given type.
#[must_use]
pub fn legacy_token(secret_id: &str, token_type: LegacyTokenType, rules: &str) -> AclToken {
    AclToken::builder()
        .accessor_id(format!("legacy-{secret_id}"))
        .secret_id(secret_id)
        .legacy(LegacyAcl { token_type, rules: rules.to_string() })
        .build()
}

/// Returns a policy with `rules` that applies in every datacenter.
#[must_use]
pub fn policy(id: &str, rules: &str) -> AclPolicy {
    AclPolicy::builder().id(id).name(format!("policy-{id}")).rules(rules).build()
}
