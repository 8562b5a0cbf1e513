use std::time::Duration;

use schemars::JsonSchema;
use semver::Version;
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::acl::{ANONYMOUS_TOKEN_SECRET, ReservedIds};

/// Minimum allowed ACL mode check interval.
const MIN_MODE_CHECK_INTERVAL: Duration = Duration::from_millis(10);

const fn default_mode_check_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_min_server_version() -> Version {
    Version::new(1, 4, 0)
}

const fn default_identities_capacity() -> usize {
    10 * 1024
}

const fn default_policies_capacity() -> usize {
    0
}

const fn default_parsed_policies_capacity() -> usize {
    512
}

const fn default_authorizers_capacity() -> usize {
    1024
}

/// Authorizer used when no rule matches a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AclDefaultPolicy {
    /// Allow everything except ACL management.
    #[default]
    Allow,
    /// Deny everything.
    Deny,
}

/// Capacities of the server-side ACL caches.
///
/// Each cache is bounded independently and evicts least-recently-used
/// entries. A capacity of zero disables the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AclCachesConfig {
    /// Resolved identities, keyed by secret.
    ///
    /// A datacenter with 30k agents each holding a distinct token only
    /// caches a third of them at the default.
    #[serde(default = "default_identities_capacity")]
    pub identities: usize,
    /// Raw policies. Zero by default since every policy is resolvable from
    /// the local state store.
    #[serde(default = "default_policies_capacity")]
    pub policies: usize,
    /// Parsed policies, keyed by policy ID and modify index.
    #[serde(default = "default_parsed_policies_capacity")]
    pub parsed_policies: usize,
    /// Compiled authorizers, keyed by policy combination. Identities sharing
    /// the same policies share an authorizer.
    #[serde(default = "default_authorizers_capacity")]
    pub authorizers: usize,
}

impl Default for AclCachesConfig {
    fn default() -> Self {
        Self {
            identities: default_identities_capacity(),
            policies: default_policies_capacity(),
            parsed_policies: default_parsed_policies_capacity(),
            authorizers: default_authorizers_capacity(),
        }
    }
}

/// Server ACL configuration.
///
/// # Validation Rules
///
/// - `datacenter` must not be empty
/// - `mode_check_interval` must be >= 10ms
/// - `master_token`, when set, must not be empty or reserved
///
/// # Example
///
/// ```no_run
/// # use std::time::Duration;
/// # use warden_types::config::AclConfig;
/// let config = AclConfig::builder()
///     .datacenter("dc2")
///     .acl_datacenter("dc1")
///     .mode_check_interval(Duration::from_secs(5))
///     .build()
///     .expect("valid acl config");
/// assert!(!config.in_acl_datacenter());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AclConfig {
    /// Datacenter this server belongs to.
    pub datacenter: String,
    /// Datacenter authoritative for ACL data. Empty disables ACLs.
    #[serde(default)]
    pub acl_datacenter: String,
    /// Authorizer used when no rule matches.
    #[serde(default)]
    pub default_policy: AclDefaultPolicy,
    /// Interval between ACL mode upgrade checks.
    #[serde(default = "default_mode_check_interval")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub mode_check_interval: Duration,
    /// Lowest server build able to enforce the new ACL system.
    #[serde(default = "default_min_server_version")]
    #[schemars(with = "String")]
    pub min_server_version: Version,
    /// Cache capacities.
    #[serde(default)]
    pub caches: AclCachesConfig,
    /// Identifiers that are never generated nor reported available.
    #[serde(default)]
    pub reserved_ids: ReservedIds,
    /// Secret of the bootstrap management token created on initialization.
    #[serde(default)]
    pub master_token: Option<String>,
}

#[bon::bon]
impl AclConfig {
    /// Creates a new ACL configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - `datacenter` is empty
    /// - `mode_check_interval` < 10ms
    /// - `master_token` is empty, reserved or the anonymous secret
    #[builder]
    pub fn new(
        #[builder(into)] datacenter: String,
        #[builder(into, default)] acl_datacenter: String,
        #[builder(default)] default_policy: AclDefaultPolicy,
        #[builder(default = default_mode_check_interval())] mode_check_interval: Duration,
        #[builder(default = default_min_server_version())] min_server_version: Version,
        #[builder(default)] caches: AclCachesConfig,
        #[builder(default)] reserved_ids: ReservedIds,
        #[builder(into)] master_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            datacenter,
            acl_datacenter,
            default_policy,
            mode_check_interval,
            min_server_version,
            caches,
            reserved_ids,
            master_token,
        };
        config.validate()?;
        Ok(config)
    }
}

impl AclConfig {
    /// Validates the configuration values.
    ///
    /// Call after deserialization to ensure values are within valid ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.datacenter.is_empty() {
            return Err(ConfigError::Validation {
                message: "datacenter must not be empty".to_string(),
            });
        }
        if self.mode_check_interval < MIN_MODE_CHECK_INTERVAL {
            return Err(ConfigError::Validation {
                message: format!(
                    "mode_check_interval must be >= {:?}, got {:?}",
                    MIN_MODE_CHECK_INTERVAL, self.mode_check_interval
                ),
            });
        }
        if let Some(master) = &self.master_token {
            if master.is_empty() {
                return Err(ConfigError::Validation {
                    message: "master_token must not be empty when set".to_string(),
                });
            }
            if master == ANONYMOUS_TOKEN_SECRET {
                return Err(ConfigError::Validation {
                    message: "master_token must not be the anonymous token secret".to_string(),
                });
            }
            if self.reserved_ids.is_reserved(master) {
                return Err(ConfigError::Validation {
                    message: "master_token must not use a reserved identifier".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Whether ACLs are enabled at all.
    pub fn acls_enabled(&self) -> bool {
        !self.acl_datacenter.is_empty()
    }

    /// Whether this server sits in the ACL-authoritative datacenter.
    pub fn in_acl_datacenter(&self) -> bool {
        self.datacenter == self.acl_datacenter
    }
}
