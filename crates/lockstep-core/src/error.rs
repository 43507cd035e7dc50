//! Error types for the lock state machine.
//!
//! The command surface itself is total: spurious unlocks, queries against a
//! free lock, and duplicate releases are all defined outcomes, not errors.
//! What remains is snapshot decode/encode faults and the one internal
//! inconsistency a timer fire is allowed to detect. All of these are fatal to
//! the replica; the host must abort or re-fetch, never continue.

use thiserror::Error;

use crate::holder::LogIndex;

/// The result type for lock state machine operations.
pub type Result<T> = std::result::Result<T, LockError>;

/// Faults that terminate a restore or reveal replica corruption.
#[derive(Debug, Error)]
pub enum LockError {
    /// Snapshot bytes did not parse as a lock snapshot.
    #[error("snapshot could not be decoded: {0}")]
    SnapshotDecode(#[source] serde_json::Error),

    /// Snapshot state could not be written to the sink.
    #[error("snapshot could not be encoded: {0}")]
    SnapshotEncode(#[source] serde_json::Error),

    /// Snapshot was produced by an incompatible layout.
    #[error("unsupported snapshot version {version}")]
    UnsupportedSnapshotVersion {
        /// Version field found in the snapshot.
        version: u32,
    },

    /// Snapshot carries two waiters with the same log index.
    #[error("snapshot contains duplicate waiter index {index}")]
    SnapshotDuplicateIndex {
        /// The repeated index.
        index: LogIndex,
    },

    /// A timer fired for a waiter the queue and timer table disagree about.
    ///
    /// A fire after a lost cancellation race is expected and handled; the
    /// tables contradicting each other is not.
    #[error("timer fired for index {index} but queue and timer table disagree")]
    TimerDesync {
        /// Index the fired timer was keyed by.
        index: LogIndex,
    },
}
