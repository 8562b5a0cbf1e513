//! Cluster-wide ACL subsystem for Warden servers.
//!
//! This crate sits between the replicated ACL state store and the request
//! handlers of a server, providing:
//!
//! - Identifier uniqueness checks and random ID generation
//! - Token resolution into authorizers with local LRU caches
//! - ACL filtering of result sets
//! - ACL mode advertisement through gossip tags
//! - The legacy-to-new ACL upgrade coordinator
//!
//! [`AclServer`] wires these together for one server. Collaborators (state
//! store, gossip pools, consensus status) are traits with in-memory
//! implementations for tests and embedding.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod advertise;
pub mod authorizer;
pub mod bootstrap;
pub mod cache;
pub mod capability;
pub mod cluster;
pub mod error;
pub mod filter;
pub mod metrics;
pub mod mode_monitor;
pub mod policy;
pub mod resolver;
pub mod server;
pub mod store;
pub mod uniqueness;

pub use advertise::AclModePublisher;
pub use authorizer::{Authorizer, PolicyAuthorizer, StaticAuthorizer};
pub use bootstrap::{AclSystemInitializer, BuiltinAclInitializer};
pub use cache::{AclCaches, AuthorizerKey, LruCache};
pub use capability::{AclCapability, AclPhase};
pub use cluster::{ClusterMembership, GossipPool, LeadershipStatus, MemoryCluster};
pub use error::AclError;
pub use filter::AclFilterable;
pub use mode_monitor::{AclModeMonitor, HoldReason, ModeDecision, MonitorOutcome, Role};
pub use policy::{Access, ParsedPolicy, PolicyLevel, Resource};
pub use resolver::{AclResolver, AclResolverDelegate, Resolution};
pub use server::AclServer;
pub use store::{AclBootstrapStore, AclStateStore, MemoryAclStore};
pub use uniqueness::{IdChecker, MAX_ID_GENERATION_ATTEMPTS};
