//! Gossip membership and consensus status contracts.
//!
//! The upgrade coordinator pulls a fresh membership snapshot from
//! [`ClusterMembership`] on every iteration and never caches it.
//! [`LeadershipStatus`] reports this server's consensus role.

mod memory;

use std::net::SocketAddr;

pub use memory::MemoryCluster;
use semver::Version;
use warden_types::{GossipError, Member};

/// Gossip pool a member list or tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GossipPool {
    /// Datacenter-local pool.
    Lan,
    /// Cross-datacenter pool of servers.
    Wan,
}

impl GossipPool {
    /// Returns the pool name used in logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            GossipPool::Lan => "lan",
            GossipPool::Wan => "wan",
        }
    }
}

/// Membership view and local tag updates.
pub trait ClusterMembership: Send + Sync {
    /// Returns the members of the datacenter-local pool.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError`] if the member list could not be read.
    fn lan_members(&self) -> Result<Vec<Member>, GossipError>;

    /// Returns the members of the cross-datacenter pool.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError`] if the member list could not be read.
    fn wan_members(&self) -> Result<Vec<Member>, GossipError>;

    /// Sets a tag on the local LAN member.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError`] if the tag update was rejected.
    fn set_lan_tag(&self, key: &str, value: &str) -> Result<(), GossipError>;

    /// Sets a tag on the local WAN member.
    ///
    /// # Errors
    ///
    /// Returns [`GossipError`] if the tag update was rejected.
    fn set_wan_tag(&self, key: &str, value: &str) -> Result<(), GossipError>;
}

/// Consensus role of the local server.
pub trait LeadershipStatus: Send + Sync {
    /// Whether this server is the current leader.
    fn is_leader(&self) -> bool;

    /// RPC address of the current leader, if known.
    fn leader_addr(&self) -> Option<SocketAddr>;

    /// Whether reads are guaranteed to reflect the latest committed state.
    fn ready_for_consistent_reads(&self) -> bool;
}

/// Checks that every alive server in `members` runs at least `minimum`.
///
/// Non-server members and members that are not alive are ignored.
pub fn servers_meet_minimum_version(members: &[Member], minimum: &Version) -> bool {
    members
        .iter()
        .filter_map(Member::server)
        .filter(|server| server.is_alive())
        .all(|server| server.build >= *minimum)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use warden_types::{
        MemberStatus,
        membership::{BUILD_TAG, DATACENTER_TAG, PORT_TAG, ROLE_TAG, SERVER_ROLE},
    };

    use super::*;

    fn server(name: &str, build: &str, status: MemberStatus) -> Member {
        let mut member = Member::new(name, IpAddr::V4(Ipv4Addr::LOCALHOST));
        member.tags.insert(ROLE_TAG.to_string(), SERVER_ROLE.to_string());
        member.tags.insert(DATACENTER_TAG.to_string(), "dc1".to_string());
        member.tags.insert(PORT_TAG.to_string(), "8300".to_string());
        member.tags.insert(BUILD_TAG.to_string(), build.to_string());
        member.status = status;
        member
    }

    #[test]
    fn test_all_servers_at_minimum() {
        let members = vec![
            server("s1", "1.4.0", MemberStatus::Alive),
            server("s2", "1.5.2:abc", MemberStatus::Alive),
        ];
        assert!(servers_meet_minimum_version(&members, &Version::new(1, 4, 0)));
    }

    #[test]
    fn test_old_alive_server_blocks() {
        let members = vec![
            server("s1", "1.4.0", MemberStatus::Alive),
            server("s2", "1.3.9", MemberStatus::Alive),
        ];
        assert!(!servers_meet_minimum_version(&members, &Version::new(1, 4, 0)));
    }

    #[test]
    fn test_old_failed_server_is_ignored() {
        let members = vec![
            server("s1", "1.4.0", MemberStatus::Alive),
            server("s2", "1.3.9", MemberStatus::Failed),
        ];
        assert!(servers_meet_minimum_version(&members, &Version::new(1, 4, 0)));
    }

    #[test]
    fn test_dev_build_below_minimum_blocks() {
        let members = vec![
            server("s1", "1.4.0", MemberStatus::Alive),
            server("s2", "1.3.0dev:abc123", MemberStatus::Alive),
        ];
        assert!(!servers_meet_minimum_version(&members, &Version::new(1, 4, 0)));
    }

    #[test]
    fn test_release_candidate_of_minimum_passes() {
        let members = vec![
            server("s1", "1.4.0", MemberStatus::Alive),
            server("s2", "1.4.0-rc1:abc123", MemberStatus::Alive),
        ];
        assert!(servers_meet_minimum_version(&members, &Version::new(1, 4, 0)));
    }

    #[test]
    fn test_clients_are_ignored() {
        let client = Member::new("c1", IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(servers_meet_minimum_version(&[client], &Version::new(1, 4, 0)));
    }
}
