//! Bounded ACL caches.
//!
//! Four independent caches sit in front of the state store: identities,
//! policies, parsed policies and authorizers. Each one is an exact LRU with
//! its own capacity and hit/miss/eviction counters.

use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashMap},
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use warden_types::{AclIdentity, AclPolicy, config::AclCachesConfig};

use crate::{authorizer::Authorizer, metrics, policy::ParsedPolicy};

#[derive(Debug)]
struct LruInner<K, V> {
    /// Value and last-use tick per key.
    entries: HashMap<K, (V, u64)>,
    /// Last-use tick → key, oldest first.
    order: BTreeMap<u64, K>,
    tick: u64,
}

impl<K, V> LruInner<K, V> {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}

/// Thread-safe least-recently-used cache.
///
/// A capacity of zero disables the cache: inserts are dropped and every
/// lookup misses.
#[derive(Debug)]
pub struct LruCache<K, V> {
    name: &'static str,
    capacity: usize,
    inner: Mutex<LruInner<K, V>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> LruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// `name` labels the cache in metrics.
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            capacity,
            inner: Mutex::new(LruInner {
                entries: HashMap::with_capacity(capacity.min(1024)),
                order: BTreeMap::new(),
                tick: 0,
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns a clone of the cached value and marks it most recently used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        let LruInner { entries, order, .. } = &mut *inner;

        match entries.get_mut(key) {
            Some((value, last_used)) => {
                if let Some(owned) = order.remove(&*last_used) {
                    order.insert(tick, owned);
                }
                *last_used = tick;
                self.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_hit(self.name);
                Some(value.clone())
            },
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_miss(self.name);
                None
            },
        }
    }

    /// Inserts a value, evicting the least recently used entry when full.
    pub fn insert(&self, key: K, value: V) {
        if self.capacity == 0 {
            return;
        }

        let mut inner = self.inner.lock();
        let tick = inner.next_tick();

        if let Some((_, last_used)) = inner.entries.remove(&key) {
            inner.order.remove(&last_used);
        } else if inner.entries.len() >= self.capacity
            && let Some((_, oldest)) = inner.order.pop_first()
        {
            inner.entries.remove(&oldest);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            metrics::record_cache_eviction(self.name);
        }

        inner.order.insert(tick, key.clone());
        inner.entries.insert(key, (value, tick));
    }

    /// Removes an entry, returning its value.
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        let (value, last_used) = inner.entries.remove(key)?;
        inner.order.remove(&last_used);
        Some(value)
    }

    /// Keeps only the entries for which `keep` returns true.
    pub fn retain(&self, mut keep: impl FnMut(&K, &V) -> bool) {
        let mut inner = self.inner.lock();
        let LruInner { entries, order, .. } = &mut *inner;
        entries.retain(|key, (value, last_used)| {
            let keep = keep(key, value);
            if !keep {
                order.remove(&*last_used);
            }
            keep
        });
    }

    /// Removes every entry.
    pub fn purge(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Returns the number of cached entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total hits since creation.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Total misses since creation.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Total evictions since creation.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// Cache key of a compiled authorizer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthorizerKey {
    /// Policy ID and modify index of every policy compiled in, sorted.
    Policies(Vec<(String, u64)>),
    /// Legacy client token, by secret and modify index.
    Legacy {
        /// Token secret.
        secret: String,
        /// Token modify index.
        modify_index: u64,
    },
}

impl AuthorizerKey {
    /// Builds a key from policy ID and modify index pairs in any order.
    pub fn policies(mut policies: Vec<(String, u64)>) -> Self {
        policies.sort();
        policies.dedup();
        AuthorizerKey::Policies(policies)
    }

    fn references_policy(&self, policy_id: &str) -> bool {
        match self {
            AuthorizerKey::Policies(policies) => policies.iter().any(|(id, _)| id == policy_id),
            AuthorizerKey::Legacy { .. } => false,
        }
    }
}

/// The four server-side ACL caches.
#[derive(Debug)]
pub struct AclCaches {
    identities: LruCache<String, Arc<dyn AclIdentity>>,
    policies: LruCache<String, Arc<AclPolicy>>,
    parsed_policies: LruCache<(String, u64), Arc<ParsedPolicy>>,
    authorizers: LruCache<AuthorizerKey, Arc<dyn Authorizer>>,
}

impl AclCaches {
    /// Creates the caches with the configured capacities.
    pub fn new(config: &AclCachesConfig) -> Self {
        Self {
            identities: LruCache::new("identities", config.identities),
            policies: LruCache::new("policies", config.policies),
            parsed_policies: LruCache::new("parsed_policies", config.parsed_policies),
            authorizers: LruCache::new("authorizers", config.authorizers),
        }
    }

    /// Identities keyed by secret.
    pub fn identities(&self) -> &LruCache<String, Arc<dyn AclIdentity>> {
        &self.identities
    }

    /// Policies keyed by ID.
    pub fn policies(&self) -> &LruCache<String, Arc<AclPolicy>> {
        &self.policies
    }

    /// Parsed policies keyed by policy ID and modify index.
    pub fn parsed_policies(&self) -> &LruCache<(String, u64), Arc<ParsedPolicy>> {
        &self.parsed_policies
    }

    /// Authorizers keyed by policy combination.
    pub fn authorizers(&self) -> &LruCache<AuthorizerKey, Arc<dyn Authorizer>> {
        &self.authorizers
    }

    /// Drops a cached identity after its token changed.
    pub fn remove_identity(&self, secret_id: &str) {
        self.identities.remove(secret_id);
    }

    /// Drops a cached policy and everything compiled from it.
    pub fn remove_policy(&self, policy_id: &str) {
        self.policies.remove(policy_id);
        self.parsed_policies.retain(|(id, _), _| id != policy_id);
        self.authorizers.retain(|key, _| !key.references_policy(policy_id));
    }

    /// Empties all caches.
    pub fn purge(&self) {
        self.identities.purge();
        self.policies.purge();
        self.parsed_policies.purge();
        self.authorizers.purge();
    }
}
