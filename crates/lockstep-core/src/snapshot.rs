//! Snapshot record types for log compaction.
//!
//! A snapshot captures the holder and the wait queue, in FIFO order, and
//! nothing else. Timers are derived state: restore reschedules them from the
//! surviving deadlines against the replicated clock.

use serde::{Deserialize, Serialize};

use crate::holder::{ClockMs, LockHolder, LogIndex, SessionId};

/// Layout version written by [`backup`] and required by [`restore`].
///
/// [`backup`]: crate::service::LockService::backup
/// [`restore`]: crate::service::LockService::restore
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized form of one acquisition record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockCall {
    /// Client correlation id.
    pub id: i32,
    /// Commit index of the acquisition.
    pub index: LogIndex,
    /// Owning session.
    pub session_id: SessionId,
    /// Absolute replicated-clock deadline, or `0` for none.
    pub expire: ClockMs,
}

impl From<LockHolder> for LockCall {
    fn from(holder: LockHolder) -> Self {
        Self {
            id: holder.id,
            index: holder.index,
            session_id: holder.session,
            expire: holder.expire,
        }
    }
}

impl LockCall {
    /// Rebuild the in-memory record.
    #[must_use]
    pub const fn into_holder(self) -> LockHolder {
        LockHolder::new(self.id, self.index, self.session_id, self.expire)
    }
}

/// Complete compactable state of one lock partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSnapshot {
    /// Layout version guard.
    pub version: u32,
    /// Current holder, if the lock is held.
    pub lock: Option<LockCall>,
    /// Wait queue in FIFO (= commit index) order.
    pub queue: Vec<LockCall>,
}
