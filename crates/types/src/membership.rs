//! Gossip membership model.
//!
//! Members are snapshots pulled from the LAN or WAN gossip pool. Server
//! members advertise their role, datacenter, RPC port, build version and ACL
//! mode through tags; [`ServerMetadata::parse`] extracts them.

use std::{
    collections::BTreeMap,
    fmt,
    net::{IpAddr, SocketAddr},
};

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::acl::{ACL_MODE_TAG, AclMode};

/// Tag carrying the member role.
pub const ROLE_TAG: &str = "role";
/// Role tag value for servers.
pub const SERVER_ROLE: &str = "server";
/// Tag carrying the member datacenter.
pub const DATACENTER_TAG: &str = "dc";
/// Tag carrying the server RPC port.
pub const PORT_TAG: &str = "port";
/// Tag carrying the build version (`1.4.0`, `1.4.0:commit`, `1.3.0dev:commit`).
pub const BUILD_TAG: &str = "build";

/// Liveness status reported by gossip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    /// No status known.
    None,
    /// Member is alive.
    Alive,
    /// Member is leaving gracefully.
    Leaving,
    /// Member has left.
    Left,
    /// Member failed health checks.
    Failed,
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemberStatus::None => "none",
            MemberStatus::Alive => "alive",
            MemberStatus::Leaving => "leaving",
            MemberStatus::Left => "left",
            MemberStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Gossip pool member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Member name (node name on the LAN, `node.dc` on the WAN).
    pub name: String,
    /// Gossip address.
    pub addr: IpAddr,
    /// Advertised tags.
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Liveness status.
    pub status: MemberStatus,
}

impl Member {
    /// Creates an alive member without tags.
    pub fn new(name: impl Into<String>, addr: IpAddr) -> Self {
        Self { name: name.into(), addr, tags: BTreeMap::new(), status: MemberStatus::Alive }
    }

    /// Returns a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Whether gossip reports the member alive.
    pub fn is_alive(&self) -> bool {
        self.status == MemberStatus::Alive
    }

    /// Parses server metadata, returning `None` for non-server members.
    pub fn server(&self) -> Option<ServerMetadata> {
        ServerMetadata::parse(self)
    }
}

/// Server attributes parsed from a member's tags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMetadata {
    /// Node name.
    pub name: String,
    /// Datacenter the server belongs to.
    pub datacenter: String,
    /// RPC port.
    pub port: u16,
    /// Build version.
    pub build: Version,
    /// RPC address (`addr:port`).
    pub addr: SocketAddr,
    /// Advertised ACL mode. `None` when the tag is absent or unknown.
    pub acl_mode: Option<AclMode>,
    /// Liveness status.
    pub status: MemberStatus,
}

impl ServerMetadata {
    /// Parses server metadata from a member's tags.
    ///
    /// Returns `None` unless the member carries the server role, a datacenter,
    /// a valid port and a parseable build version.
    pub fn parse(member: &Member) -> Option<Self> {
        if member.tag(ROLE_TAG)? != SERVER_ROLE {
            return None;
        }
        let datacenter = member.tag(DATACENTER_TAG)?.to_string();
        let port: u16 = member.tag(PORT_TAG)?.parse().ok()?;
        let build = parse_build(member.tag(BUILD_TAG)?)?;
        let acl_mode = member.tag(ACL_MODE_TAG).and_then(AclMode::from_tag);

        Some(Self {
            name: member.name.clone(),
            datacenter,
            port,
            build,
            addr: SocketAddr::new(member.addr, port),
            acl_mode,
            status: member.status,
        })
    }

    /// Whether the server advertises the new ACL mode.
    pub fn acls_enabled(&self) -> bool {
        self.acl_mode == Some(AclMode::Enabled)
    }

    /// Whether gossip reports the server alive.
    pub fn is_alive(&self) -> bool {
        self.status == MemberStatus::Alive
    }
}

/// Extracts the first `major.minor.patch` run from a build tag.
///
/// Anything around it (`dev`, `-rc1`, `:commit`) is dropped, so
/// `1.4.0-rc1:abc` compares as `1.4.0`.
fn parse_build(tag: &str) -> Option<Version> {
    let bytes = tag.as_bytes();
    (0..bytes.len())
        .filter(|&i| bytes[i].is_ascii_digit() && (i == 0 || !bytes[i - 1].is_ascii_digit()))
        .find_map(|i| leading_version(&tag[i..]))
}

fn leading_version(s: &str) -> Option<Version> {
    let mut parts = s.splitn(3, '.');
    let major = digits(parts.next()?)?;
    let minor = digits(parts.next()?)?;
    let rest = parts.next()?;
    let end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    let patch = digits(&rest[..end])?;
    Some(Version::new(major, minor, patch))
}

fn digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
