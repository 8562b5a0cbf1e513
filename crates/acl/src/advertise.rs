//! ACL mode advertisement through gossip tags.

use std::sync::Arc;

use snafu::ResultExt;
use tracing::info;
use warden_types::{AclMode, acl::ACL_MODE_TAG};

use crate::{
    cluster::ClusterMembership,
    error::{AclError, AdvertiseSnafu},
};

/// Publishes this server's ACL mode into its gossip tags.
///
/// The LAN tag is always set. The WAN tag is only set inside the ACL
/// datacenter, since other datacenters only gate on servers of the ACL
/// datacenter.
pub struct AclModePublisher {
    membership: Arc<dyn ClusterMembership>,
    in_acl_datacenter: bool,
}

impl std::fmt::Debug for AclModePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AclModePublisher")
            .field("in_acl_datacenter", &self.in_acl_datacenter)
            .finish_non_exhaustive()
    }
}

impl AclModePublisher {
    /// Creates a publisher.
    pub fn new(membership: Arc<dyn ClusterMembership>, in_acl_datacenter: bool) -> Self {
        Self { membership, in_acl_datacenter }
    }

    /// Advertises `acls=enabled`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Advertise`] if a tag update failed.
    pub fn publish_acl_mode(&self) -> Result<(), AclError> {
        let mode = AclMode::Enabled.as_str();
        self.membership.set_lan_tag(ACL_MODE_TAG, mode).context(AdvertiseSnafu)?;
        if self.in_acl_datacenter {
            self.membership.set_wan_tag(ACL_MODE_TAG, mode).context(AdvertiseSnafu)?;
        }
        info!(mode, wan = self.in_acl_datacenter, "Advertised ACL mode");
        Ok(())
    }
}
