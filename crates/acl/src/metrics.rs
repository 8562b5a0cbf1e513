//! ACL metrics exposed via the `metrics` crate.
//!
//! ## Metric Naming Conventions
//!
//! All metrics follow the pattern: `warden_acl_{name}_{unit}`
//!
//! - Counters: `_total` suffix
//! - Histograms: `_seconds` suffix
//! - Gauges: no suffix

use metrics::{counter, gauge, histogram};

// =============================================================================
// Metric Names
// =============================================================================

// Cache metrics
const CACHE_HITS: &str = "warden_acl_cache_hits_total";
const CACHE_MISSES: &str = "warden_acl_cache_misses_total";
const CACHE_EVICTIONS: &str = "warden_acl_cache_evictions_total";

// Resolution metrics
const TOKEN_RESOLUTIONS: &str = "warden_acl_token_resolutions_total";
const TOKEN_RESOLUTION_LATENCY: &str = "warden_acl_token_resolution_latency_seconds";

// Mode upgrade metrics
const MODE_CHECKS: &str = "warden_acl_mode_checks_total";
const MODE_TRANSITIONS: &str = "warden_acl_mode_transitions_total";
const NEW_ACLS_ENABLED: &str = "warden_acl_new_acls_enabled";

// =============================================================================
// Cache Metrics
// =============================================================================

/// Records a cache hit.
#[inline]
pub fn record_cache_hit(cache: &'static str) {
    counter!(CACHE_HITS, "cache" => cache).increment(1);
}

/// Records a cache miss.
#[inline]
pub fn record_cache_miss(cache: &'static str) {
    counter!(CACHE_MISSES, "cache" => cache).increment(1);
}

/// Records a least-recently-used eviction.
#[inline]
pub fn record_cache_eviction(cache: &'static str) {
    counter!(CACHE_EVICTIONS, "cache" => cache).increment(1);
}

// =============================================================================
// Resolution Metrics
// =============================================================================

/// Records a token resolution.
///
/// `outcome` is one of `resolved`, `not_found`, `forward` or `error`.
#[inline]
pub fn record_token_resolution(outcome: &'static str, latency_secs: f64) {
    counter!(TOKEN_RESOLUTIONS, "outcome" => outcome).increment(1);
    histogram!(TOKEN_RESOLUTION_LATENCY, "outcome" => outcome).record(latency_secs);
}

// =============================================================================
// Mode Upgrade Metrics
// =============================================================================

/// Records the outcome of one upgrade coordinator iteration.
#[inline]
pub fn record_mode_check(outcome: &'static str) {
    counter!(MODE_CHECKS, "outcome" => outcome).increment(1);
}

/// Records the switch to the new ACL system.
#[inline]
pub fn record_mode_transition(role: &'static str) {
    counter!(MODE_TRANSITIONS, "role" => role).increment(1);
    gauge!(NEW_ACLS_ENABLED).set(1.0);
}
