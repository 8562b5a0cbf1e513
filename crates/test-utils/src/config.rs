//! Test configuration helpers.

use std::time::Duration;

use semver::Version;
use warden_types::{
    ReservedIds,
    config::{AclCachesConfig, AclConfig, AclDefaultPolicy},
};

/// Mode check interval used by test configurations.
pub const TEST_MODE_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Returns an ACL configuration suitable for tests.
///
/// Uses a 10ms mode check interval so upgrade tests finish quickly, and the
/// default policy `deny` so tests observe rule effects. Pass an empty
/// `acl_datacenter` to disable ACLs.
#[must_use]
pub fn test_acl_config(datacenter: &str, acl_datacenter: &str) -> AclConfig {
    AclConfig {
        datacenter: datacenter.to_string(),
        acl_datacenter: acl_datacenter.to_string(),
        default_policy: AclDefaultPolicy::Deny,
        mode_check_interval: TEST_MODE_CHECK_INTERVAL,
        min_server_version: Version::new(1, 4, 0),
        caches: AclCachesConfig::default(),
        reserved_ids: ReservedIds::default(),
        master_token: None,
    }
}
