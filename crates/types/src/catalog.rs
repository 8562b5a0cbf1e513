//! Result records returned by read endpoints and filtered by ACLs.

use std::{collections::BTreeMap, net::IpAddr};

use serde::{Deserialize, Serialize};

/// Key/value store entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    /// Entry key.
    pub key: String,
    /// Opaque value.
    #[serde(default)]
    pub value: Vec<u8>,
    /// Client flags.
    #[serde(default)]
    pub flags: u64,
    /// Raft index of the last modification.
    #[serde(default)]
    pub modify_index: u64,
}

impl KvEntry {
    /// Creates an entry with an empty value.
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into(), value: Vec::new(), flags: 0, modify_index: 0 }
    }
}

/// Catalog node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogNode {
    /// Node name.
    pub node: String,
    /// Node address.
    pub address: IpAddr,
    /// Datacenter the node is registered in.
    pub datacenter: String,
}

/// Service instance registered on a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Node hosting the instance.
    pub node: String,
    /// Instance ID.
    pub service_id: String,
    /// Service name.
    pub service_name: String,
    /// Service address.
    pub address: IpAddr,
    /// Service port.
    pub port: u16,
    /// Service tags.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Service names mapped to the union of their tags.
pub type ServiceIndex = BTreeMap<String, Vec<String>>;
