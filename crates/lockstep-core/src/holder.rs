//! Waiter records and the core identifier types they are built from.
//!
//! A [`LockHolder`] is one acquisition attempt: either the current owner of
//! the lock or one entry in the FIFO wait queue. Everything in it is plain
//! replicated data; nothing here may touch the host OS clock.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of a committed command in the replicated log.
///
/// Strictly increasing per partition. Doubles as the identity of a waiter:
/// no two acquisition attempts ever commit at the same index.
pub type LogIndex = i64;

/// Milliseconds on the replicated wall clock.
///
/// Readings are identical on every replica at a given log position, which is
/// what makes deadline arithmetic safe inside the state machine.
pub type ClockMs = i64;

/// Identifier of a client session, allocated by the host runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// One active acquisition or pending wait.
///
/// `expire == 0` means no deadline: the waiter blocks forever, and for the
/// current owner the field is unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
    /// Client-chosen correlation id for this acquisition attempt.
    pub id: i32,
    /// Log index at which the `lock` request committed. Unique per waiter.
    pub index: LogIndex,
    /// Session that issued the request.
    pub session: SessionId,
    /// Absolute deadline on the replicated clock, or `0` for none.
    pub expire: ClockMs,
}

impl LockHolder {
    /// Create a new record for a committed `lock` request.
    #[must_use]
    pub const fn new(id: i32, index: LogIndex, session: SessionId, expire: ClockMs) -> Self {
        Self {
            id,
            index,
            session,
            expire,
        }
    }

    /// True when a bounded wait was requested and a deadline is in force.
    #[must_use]
    pub const fn has_deadline(&self) -> bool {
        self.expire > 0
    }
}

/// Terminal fate of a queued waiter.
///
/// Surfaced in log fields so transition streams from two replicas can be
/// diffed line by line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterDisposition {
    /// Became the holder during an unlock or session release.
    Promoted,
    /// Bounded wait ran out before the lock was offered.
    Expired,
    /// Removed by a rescinding unlock or by its session going away.
    Cancelled,
}

impl fmt::Display for WaiterDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Promoted => write!(f, "promoted"),
            Self::Expired => write!(f, "expired"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
