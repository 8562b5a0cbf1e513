//! Proptest strategies for Warden ACL types.
//!
//! # Usage
//!
//! ```no_run
//! use proptest::prelude::*;
//! use warden_test_utils::strategies;
//!
//! proptest! {
//!     #[test]
//!     fn reserved_ids_are_reserved(id in strategies::arb_reserved_id()) {
//!         prop_assert!(warden_types::ReservedIds::default().is_reserved(&id));
//!     }
//! }
//! ```

use proptest::prelude::*;
use semver::Version;
use warden_types::{AclMode, MemberStatus, acl::ACL_RESERVED_PREFIX};

/// Generates an ID under the builtin reserved prefix.
pub fn arb_reserved_id() -> impl Strategy<Value = String> {
    "[0-9a-f]{2}".prop_map(|suffix| format!("{ACL_RESERVED_PREFIX}{suffix}"))
}

/// Generates a random version-4 UUID string.
///
/// The version nibble keeps these clear of the reserved prefix.
pub fn arb_token_id() -> impl Strategy<Value = String> {
    "[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}"
}

/// Generates a build version between `0.0.0` and `2.9.9`.
pub fn arb_build_version() -> impl Strategy<Value = Version> {
    (0u64..3, 0u64..10, 0u64..10).prop_map(|(major, minor, patch)| Version::new(major, minor, patch))
}

/// Generates an advertised ACL mode, or none for members without the tag.
pub fn arb_acl_mode() -> impl Strategy<Value = Option<AclMode>> {
    prop::option::of(prop::sample::select(vec![
        AclMode::Disabled,
        AclMode::Legacy,
        AclMode::Enabled,
    ]))
}

/// Generates a gossip member status.
pub fn arb_member_status() -> impl Strategy<Value = MemberStatus> {
    prop::sample::select(vec![
        MemberStatus::None,
        MemberStatus::Alive,
        MemberStatus::Leaving,
        MemberStatus::Left,
        MemberStatus::Failed,
    ])
}
