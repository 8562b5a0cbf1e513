//! In-memory ACL state store.

use std::collections::HashMap;

use parking_lot::RwLock;
use warden_types::{AclPolicy, AclToken, StoreError};

use super::{AclBootstrapStore, AclStateStore};

const TOKENS_TABLE: &str = "acl-tokens";

#[derive(Debug, Default)]
struct Tables {
    /// Tokens indexed by accessor ID.
    tokens: HashMap<String, AclToken>,
    /// Secret ID → accessor ID.
    secrets: HashMap<String, String>,
    /// Policies indexed by ID.
    policies: HashMap<String, AclPolicy>,
    /// Index of the latest write.
    index: u64,
}

/// In-memory ACL tables for single-process servers and tests.
///
/// Every write bumps a monotonically increasing index which is stamped into
/// the record's `create_index`/`modify_index`, the way a replicated store
/// stamps log indices.
#[derive(Debug, Default)]
pub struct MemoryAclStore {
    tables: RwLock<Tables>,
}

impl MemoryAclStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the index of the latest write.
    pub fn latest_index(&self) -> u64 {
        self.tables.read().index
    }

    /// Inserts or replaces a token, returning the write index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WriteRejected`] if the secret is already used by
    /// another accessor.
    pub fn upsert_token(&self, mut token: AclToken) -> Result<u64, StoreError> {
        let mut tables = self.tables.write();

        if let Some(owner) = tables.secrets.get(&token.secret_id)
            && owner != &token.accessor_id
        {
            return Err(StoreError::WriteRejected {
                table: TOKENS_TABLE.to_string(),
                reason: format!("secret already in use by accessor {owner}"),
            });
        }

        tables.index += 1;
        let index = tables.index;
        token.create_index = match tables.tokens.get(&token.accessor_id) {
            Some(existing) => existing.create_index,
            None => index,
        };
        token.modify_index = index;

        if let Some(previous) = tables.tokens.get(&token.accessor_id) {
            let previous_secret = previous.secret_id.clone();
            tables.secrets.remove(&previous_secret);
        }
        tables.secrets.insert(token.secret_id.clone(), token.accessor_id.clone());
        tables.tokens.insert(token.accessor_id.clone(), token);
        Ok(index)
    }

    /// Deletes a token by accessor ID, returning the removed token.
    pub fn delete_token(&self, accessor_id: &str) -> Option<AclToken> {
        let mut tables = self.tables.write();
        let token = tables.tokens.remove(accessor_id)?;
        tables.secrets.remove(&token.secret_id);
        tables.index += 1;
        Some(token)
    }

    /// Inserts or replaces a policy, returning the write index.
    pub fn upsert_policy(&self, mut policy: AclPolicy) -> u64 {
        let mut tables = self.tables.write();
        tables.index += 1;
        let index = tables.index;
        policy.create_index = match tables.policies.get(&policy.id) {
            Some(existing) => existing.create_index,
            None => index,
        };
        policy.modify_index = index;
        tables.policies.insert(policy.id.clone(), policy);
        index
    }

    /// Deletes a policy by ID, returning the removed policy.
    pub fn delete_policy(&self, policy_id: &str) -> Option<AclPolicy> {
        let mut tables = self.tables.write();
        let policy = tables.policies.remove(policy_id)?;
        tables.index += 1;
        Some(policy)
    }

    /// Returns the number of stored tokens.
    pub fn token_count(&self) -> usize {
        self.tables.read().tokens.len()
    }

    /// Returns the number of stored policies.
    pub fn policy_count(&self) -> usize {
        self.tables.read().policies.len()
    }
}

impl AclStateStore for MemoryAclStore {
    fn token_by_accessor(&self, accessor_id: &str) -> Result<Option<AclToken>, StoreError> {
        Ok(self.tables.read().tokens.get(accessor_id).cloned())
    }

    fn token_by_secret(&self, secret_id: &str) -> Result<Option<AclToken>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.secrets.get(secret_id).and_then(|accessor| tables.tokens.get(accessor)).cloned())
    }

    fn policy_by_id(&self, policy_id: &str) -> Result<Option<AclPolicy>, StoreError> {
        Ok(self.tables.read().policies.get(policy_id).cloned())
    }
}

impl AclBootstrapStore for MemoryAclStore {
    fn ensure_policy(&self, policy: AclPolicy) -> Result<bool, StoreError> {
        if self.tables.read().policies.contains_key(&policy.id) {
            return Ok(false);
        }
        self.upsert_policy(policy);
        Ok(true)
    }

    fn ensure_token(&self, token: AclToken) -> Result<bool, StoreError> {
        if self.tables.read().tokens.contains_key(&token.accessor_id) {
            return Ok(false);
        }
        self.upsert_token(token)?;
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn token(accessor: &str, secret: &str) -> AclToken {
        AclToken::builder().accessor_id(accessor).secret_id(secret).build()
    }

    #[test]
    fn test_token_lookup_by_both_indexes() {
        let store = MemoryAclStore::new();
        store.upsert_token(token("acc-1", "sec-1")).unwrap();

        assert_eq!(store.token_by_accessor("acc-1").unwrap().unwrap().secret_id, "sec-1");
        assert_eq!(store.token_by_secret("sec-1").unwrap().unwrap().accessor_id, "acc-1");
        assert!(store.token_by_accessor("sec-1").unwrap().is_none());
        assert!(store.token_by_secret("acc-1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_stamps_indices() {
        let store = MemoryAclStore::new();
        let first = store.upsert_token(token("acc-1", "sec-1")).unwrap();
        let second = store.upsert_token(token("acc-1", "sec-2")).unwrap();
        assert!(second > first);

        let stored = store.token_by_accessor("acc-1").unwrap().unwrap();
        assert_eq!(stored.create_index, first);
        assert_eq!(stored.modify_index, second);
        // Rotated secret replaces the old one in the secret index.
        assert!(store.token_by_secret("sec-1").unwrap().is_none());
        assert!(store.token_by_secret("sec-2").unwrap().is_some());
    }

    #[test]
    fn test_duplicate_secret_is_rejected() {
        let store = MemoryAclStore::new();
        store.upsert_token(token("acc-1", "shared")).unwrap();
        let err = store.upsert_token(token("acc-2", "shared")).unwrap_err();
        assert!(err.to_string().contains("acc-1"));
        assert_eq!(store.token_count(), 1);
    }

    #[test]
    fn test_delete_token_clears_secret_index() {
        let store = MemoryAclStore::new();
        store.upsert_token(token("acc-1", "sec-1")).unwrap();
        assert!(store.delete_token("acc-1").is_some());
        assert!(store.token_by_secret("sec-1").unwrap().is_none());
        assert!(store.delete_token("acc-1").is_none());
    }

    #[test]
    fn test_ensure_is_insert_if_absent() {
        let store = MemoryAclStore::new();
        let policy = AclPolicy::builder().id("p1").name("first").build();
        assert!(store.ensure_policy(policy.clone()).unwrap());

        let renamed = AclPolicy::builder().id("p1").name("second").build();
        assert!(!store.ensure_policy(renamed).unwrap());
        assert_eq!(store.policy_by_id("p1").unwrap().unwrap().name, "first");

        assert!(store.ensure_token(token("acc-1", "sec-1")).unwrap());
        assert!(!store.ensure_token(token("acc-1", "other")).unwrap());
        assert_eq!(store.token_by_accessor("acc-1").unwrap().unwrap().secret_id, "sec-1");
    }

    #[test]
    fn test_policy_delete() {
        let store = MemoryAclStore::new();
        store.upsert_policy(AclPolicy::builder().id("p1").name("p").build());
        assert_eq!(store.policy_count(), 1);
        assert!(store.delete_policy("p1").is_some());
        assert!(store.policy_by_id("p1").unwrap().is_none());
    }
}
