//! Process-wide ACL capability flag.
//!
//! Records whether this server enforces the legacy or the new ACL system.
//! The flag is owned by the server runtime and cloned into every component
//! that needs it; clones share the same atomic.
//!
//! # Phases
//!
//! `Legacy` → `Transitioning` → `New`.
//!
//! `Transitioning` is held while the one-time ACL initialization runs. It
//! reads as legacy, so no caller observes the new system before
//! initialization completed. If initialization fails the phase falls back to
//! `Legacy`; once `New` is reached it is never left.

use std::sync::{
    Arc,
    atomic::{AtomicU8, Ordering},
};

/// ACL system phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AclPhase {
    /// Legacy ACLs are enforced.
    Legacy = 0,
    /// The switch to new ACLs is in flight.
    Transitioning = 1,
    /// New ACLs are enforced.
    New = 2,
}

impl AclPhase {
    fn from_u8(val: u8) -> Self {
        match val {
            1 => Self::Transitioning,
            2 => Self::New,
            _ => Self::Legacy,
        }
    }
}

/// Shared, lock-free ACL capability flag.
#[derive(Debug, Clone)]
pub struct AclCapability {
    phase: Arc<AtomicU8>,
}

impl Default for AclCapability {
    fn default() -> Self {
        Self::new()
    }
}

impl AclCapability {
    /// Creates a flag in the `Legacy` phase.
    pub fn new() -> Self {
        Self { phase: Arc::new(AtomicU8::new(AclPhase::Legacy as u8)) }
    }

    /// Creates a flag already in the `New` phase.
    pub fn new_acls() -> Self {
        Self { phase: Arc::new(AtomicU8::new(AclPhase::New as u8)) }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> AclPhase {
        AclPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Whether the new ACL system is in force.
    pub fn use_new_acls(&self) -> bool {
        self.phase() == AclPhase::New
    }

    /// Switches to the new ACL system after `initialize` succeeds.
    ///
    /// Returns `Ok(true)` if this call performed the switch, `Ok(false)` if
    /// the flag was already `New` or another switch is in flight. On error
    /// the flag returns to `Legacy` and the error is passed through.
    pub fn transition<E>(&self, initialize: impl FnOnce() -> Result<(), E>) -> Result<bool, E> {
        if self
            .phase
            .compare_exchange(
                AclPhase::Legacy as u8,
                AclPhase::Transitioning as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(false);
        }

        if let Err(err) = initialize() {
            self.phase.store(AclPhase::Legacy as u8, Ordering::Release);
            return Err(err);
        }

        self.phase.store(AclPhase::New as u8, Ordering::Release);
        Ok(true)
    }
}
