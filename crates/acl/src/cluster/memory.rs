//! In-memory membership and leadership for single-process servers and tests.

use std::{
    net::SocketAddr,
    sync::atomic::{AtomicBool, Ordering},
};

use parking_lot::RwLock;
use warden_types::{GossipError, Member};

use super::{ClusterMembership, GossipPool, LeadershipStatus};

/// Membership and consensus status backed by plain in-memory state.
///
/// The local server appears in both pools under its own names. Tag updates
/// rewrite the local member's tags in place, so the next snapshot reflects
/// them. Availability can be toggled per pool to exercise error paths.
#[derive(Debug)]
pub struct MemoryCluster {
    lan_name: String,
    wan_name: String,
    lan: RwLock<Vec<Member>>,
    wan: RwLock<Vec<Member>>,
    lan_available: AtomicBool,
    wan_available: AtomicBool,
    leader: AtomicBool,
    consistent_reads: AtomicBool,
    leader_addr: RwLock<Option<SocketAddr>>,
}

impl MemoryCluster {
    /// Creates a cluster view for the local server.
    ///
    /// `local_lan` and `local_wan` are the local server's own members; their
    /// names identify the members tag updates apply to.
    pub fn new(local_lan: Member, local_wan: Member) -> Self {
        Self {
            lan_name: local_lan.name.clone(),
            wan_name: local_wan.name.clone(),
            lan: RwLock::new(vec![local_lan]),
            wan: RwLock::new(vec![local_wan]),
            lan_available: AtomicBool::new(true),
            wan_available: AtomicBool::new(true),
            leader: AtomicBool::new(false),
            consistent_reads: AtomicBool::new(false),
            leader_addr: RwLock::new(None),
        }
    }

    /// Adds or replaces a member of the given pool.
    pub fn upsert_member(&self, pool: GossipPool, member: Member) {
        let mut members = self.pool(pool).write();
        match members.iter_mut().find(|existing| existing.name == member.name) {
            Some(existing) => *existing = member,
            None => members.push(member),
        }
    }

    /// Removes a member from the given pool.
    pub fn remove_member(&self, pool: GossipPool, name: &str) {
        self.pool(pool).write().retain(|member| member.name != name);
    }

    /// Returns a member of the given pool by name.
    pub fn member(&self, pool: GossipPool, name: &str) -> Option<Member> {
        self.pool(pool).read().iter().find(|member| member.name == name).cloned()
    }

    /// Returns the local member of the given pool.
    pub fn local_member(&self, pool: GossipPool) -> Option<Member> {
        let name = match pool {
            GossipPool::Lan => &self.lan_name,
            GossipPool::Wan => &self.wan_name,
        };
        self.member(pool, name)
    }

    /// Makes member list reads of a pool fail or succeed.
    pub fn set_available(&self, pool: GossipPool, available: bool) {
        match pool {
            GossipPool::Lan => self.lan_available.store(available, Ordering::SeqCst),
            GossipPool::Wan => self.wan_available.store(available, Ordering::SeqCst),
        }
    }

    /// Sets whether the local server is the leader.
    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }

    /// Sets the leader RPC address.
    pub fn set_leader_addr(&self, addr: Option<SocketAddr>) {
        *self.leader_addr.write() = addr;
    }

    /// Sets whether consistent reads are available.
    pub fn set_consistent_reads(&self, ready: bool) {
        self.consistent_reads.store(ready, Ordering::SeqCst);
    }

    fn pool(&self, pool: GossipPool) -> &RwLock<Vec<Member>> {
        match pool {
            GossipPool::Lan => &self.lan,
            GossipPool::Wan => &self.wan,
        }
    }

    fn is_available(&self, pool: GossipPool) -> bool {
        match pool {
            GossipPool::Lan => self.lan_available.load(Ordering::SeqCst),
            GossipPool::Wan => self.wan_available.load(Ordering::SeqCst),
        }
    }

    fn members(&self, pool: GossipPool) -> Result<Vec<Member>, GossipError> {
        if !self.is_available(pool) {
            return Err(GossipError::MembersUnavailable {
                pool: pool.as_str().to_string(),
                message: "gossip pool is not running".to_string(),
            });
        }
        Ok(self.pool(pool).read().clone())
    }

    fn set_tag(&self, pool: GossipPool, key: &str, value: &str) -> Result<(), GossipError> {
        let tag_error = |message: &str| GossipError::TagUpdate {
            pool: pool.as_str().to_string(),
            key: key.to_string(),
            value: value.to_string(),
            message: message.to_string(),
        };
        if !self.is_available(pool) {
            return Err(tag_error("gossip pool is not running"));
        }

        let name = match pool {
            GossipPool::Lan => &self.lan_name,
            GossipPool::Wan => &self.wan_name,
        };
        let mut members = self.pool(pool).write();
        let local = members
            .iter_mut()
            .find(|member| &member.name == name)
            .ok_or_else(|| tag_error("local member is not in the pool"))?;
        local.tags.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl ClusterMembership for MemoryCluster {
    fn lan_members(&self) -> Result<Vec<Member>, GossipError> {
        self.members(GossipPool::Lan)
    }

    fn wan_members(&self) -> Result<Vec<Member>, GossipError> {
        self.members(GossipPool::Wan)
    }

    fn set_lan_tag(&self, key: &str, value: &str) -> Result<(), GossipError> {
        self.set_tag(GossipPool::Lan, key, value)
    }

    fn set_wan_tag(&self, key: &str, value: &str) -> Result<(), GossipError> {
        self.set_tag(GossipPool::Wan, key, value)
    }
}

impl LeadershipStatus for MemoryCluster {
    fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    fn leader_addr(&self) -> Option<SocketAddr> {
        *self.leader_addr.read()
    }

    fn ready_for_consistent_reads(&self) -> bool {
        self.consistent_reads.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn cluster() -> MemoryCluster {
        let addr = IpAddr::V4(Ipv4Addr::LOCALHOST);
        MemoryCluster::new(Member::new("s1", addr), Member::new("s1.dc1", addr))
    }

    #[test]
    fn test_tag_updates_apply_to_local_member() {
        let cluster = cluster();
        cluster.set_lan_tag("acls", "enabled").unwrap();

        let lan = cluster.local_member(GossipPool::Lan).unwrap();
        assert_eq!(lan.tag("acls"), Some("enabled"));
        let wan = cluster.local_member(GossipPool::Wan).unwrap();
        assert_eq!(wan.tag("acls"), None);
    }

    #[test]
    fn test_unavailable_pool_errors() {
        let cluster = cluster();
        cluster.set_available(GossipPool::Wan, false);
        assert!(cluster.wan_members().is_err());
        assert!(cluster.set_wan_tag("acls", "enabled").is_err());
        assert!(cluster.lan_members().is_ok());
    }

    #[test]
    fn test_upsert_replaces_by_name() {
        let cluster = cluster();
        let addr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        cluster.upsert_member(GossipPool::Lan, Member::new("s2", addr));
        let mut updated = Member::new("s2", addr);
        updated.tags.insert("k".to_string(), "v".to_string());
        cluster.upsert_member(GossipPool::Lan, updated);

        let members = cluster.lan_members().unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(cluster.member(GossipPool::Lan, "s2").unwrap().tag("k"), Some("v"));

        cluster.remove_member(GossipPool::Lan, "s2");
        assert_eq!(cluster.lan_members().unwrap().len(), 1);
    }

    #[test]
    fn test_leadership_flags() {
        let cluster = cluster();
        assert!(!cluster.is_leader());
        assert!(cluster.leader_addr().is_none());

        cluster.set_leader(true);
        cluster.set_consistent_reads(true);
        cluster.set_leader_addr(Some("127.0.0.1:8300".parse().unwrap()));
        assert!(cluster.is_leader());
        assert!(cluster.ready_for_consistent_reads());
        assert_eq!(cluster.leader_addr(), Some("127.0.0.1:8300".parse().unwrap()));
    }
}
