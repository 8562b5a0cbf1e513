//! Error types shared by the Warden crates, using snafu.
//!
//! These cover the failures reported by the external collaborators the ACL
//! subsystem consumes:
//! - [`StoreError`] for state store queries and bootstrap writes
//! - [`GossipError`] for membership reads and tag updates
//!
//! Each variant maps to an [`ErrorCode`] so callers can classify failures
//! without matching on display strings.

use snafu::Snafu;

/// Machine-readable error codes for collaborator failures.
///
/// | Range     | Domain |
/// |-----------|--------|
/// | 1000–1099 | Store  |
/// | 2000–2099 | Gossip |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// The state store could not serve the query.
    StoreUnavailable = 1000,
    /// A stored record could not be decoded.
    StoreCorrupted = 1001,
    /// A bootstrap write was rejected by the store.
    StoreWriteRejected = 1002,
    /// The gossip layer could not return a member list.
    GossipUnavailable = 2000,
    /// A gossip tag update was rejected.
    GossipTagUpdate = 2001,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns whether the failure is expected to clear on its own.
    ///
    /// Retries happen on the caller's next attempt, never inside a single
    /// resolution or coordinator iteration.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::StoreUnavailable | Self::GossipUnavailable | Self::GossipTagUpdate)
    }
}

/// Errors returned by state store queries and bootstrap writes.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The store could not serve the query.
    #[snafu(display("State store unavailable: {message}"))]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// A record matched but could not be decoded.
    #[snafu(display("Corrupted {table} record {key}: {message}"))]
    Corrupted {
        /// Table the record lives in.
        table: String,
        /// Lookup key of the record.
        key: String,
        /// Description of the decode failure.
        message: String,
    },

    /// A write was rejected.
    #[snafu(display("Store write to {table} rejected: {reason}"))]
    WriteRejected {
        /// Table the write targeted.
        table: String,
        /// Rejection reason.
        reason: String,
    },
}

impl StoreError {
    /// Returns the error code for this failure.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Unavailable { .. } => ErrorCode::StoreUnavailable,
            Self::Corrupted { .. } => ErrorCode::StoreCorrupted,
            Self::WriteRejected { .. } => ErrorCode::StoreWriteRejected,
        }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable { message: message.into() }
    }
}

/// Errors returned by the gossip layer.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GossipError {
    /// The member list for a pool could not be read.
    #[snafu(display("{pool} member list unavailable: {message}"))]
    MembersUnavailable {
        /// Gossip pool (`lan` or `wan`).
        pool: String,
        /// Description of the failure.
        message: String,
    },

    /// A local tag update was rejected.
    #[snafu(display("Failed to set {pool} tag {key}={value}: {message}"))]
    TagUpdate {
        /// Gossip pool (`lan` or `wan`).
        pool: String,
        /// Tag key.
        key: String,
        /// Tag value.
        value: String,
        /// Description of the failure.
        message: String,
    },
}

impl GossipError {
    /// Returns the error code for this failure.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MembersUnavailable { .. } => ErrorCode::GossipUnavailable,
            Self::TagUpdate { .. } => ErrorCode::GossipTagUpdate,
        }
    }
}
