//! Request and response value types for the lock command surface.
//!
//! Field semantics are fixed; the wire encoding is whatever the host
//! runtime's transport uses. Every type derives `serde` so hosts can reuse a
//! self-describing encoding without writing codecs by hand.

use serde::{Deserialize, Serialize};

use crate::holder::LogIndex;

/// Ask for the lock.
///
/// `timeout` is in milliseconds of replicated time: `0` never waits
/// (tryLock), a negative value waits forever, a positive value waits at most
/// that long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    /// Client-chosen correlation id echoed back in the grant/denial event.
    pub id: i32,
    /// Wait budget in milliseconds; `0` = try, negative = forever.
    pub timeout: i64,
}

impl LockRequest {
    /// A request that never waits.
    #[must_use]
    pub const fn try_lock(id: i32) -> Self {
        Self { id, timeout: 0 }
    }

    /// A request that waits until granted or the session dies.
    #[must_use]
    pub const fn wait_forever(id: i32) -> Self {
        Self { id, timeout: -1 }
    }

    /// A request that waits at most `timeout_ms` milliseconds.
    #[must_use]
    pub const fn wait_for(id: i32, timeout_ms: i64) -> Self {
        Self {
            id,
            timeout: timeout_ms,
        }
    }
}

/// Outcome of an acquisition attempt, delivered as a session event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockResponse {
    /// For immediate outcomes: the index of the `lock` command itself.
    /// For promotions: the index of the command or event that freed the lock.
    pub index: LogIndex,
    /// Correlation id from the originating request.
    pub id: i32,
    /// Whether the lock is now held by the addressed session.
    pub acquired: bool,
}

/// Release the lock, or rescind a pending wait.
///
/// `index == 0` means "release whatever I hold"; a non-zero index must match
/// the current holder's acquisition index for the release to take effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequest {
    /// Acquisition index to release, or `0` for the caller's current hold.
    pub index: LogIndex,
    /// Correlation id of the acquisition being released.
    pub id: i32,
}

/// Acknowledgement of an `unlock` command. Always returned, even for no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockResponse {
    /// Index of the `unlock` command.
    pub index: LogIndex,
}

/// Query the lock state.
///
/// `index == 0` asks "is anything locked?"; a non-zero index asks "is that
/// specific acquisition still in force?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsLockedRequest {
    /// Acquisition index to test, or `0` for any.
    pub index: LogIndex,
}

/// Answer to an [`IsLockedRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsLockedResponse {
    /// Index of the `isLocked` command.
    pub index: LogIndex,
    /// Result of the query.
    pub locked: bool,
}
