//! The replicated lock state machine.
//!
//! [`LockService`] is a deterministic command processor: driven with the same
//! committed commands, session events, and timer fires, every replica of a
//! partition walks through bit-identical states. All mutable state lives in
//! the service instance; there are no process-wide singletons, so one process
//! can host any number of independent partitions.
//!
//! # Invariants
//!
//! 1. At most one holder, and the holder is never also queued.
//! 2. The queue is FIFO by commit index; iteration order is insertion order.
//! 3. A timer entry exists iff its waiter is queued with a deadline.
//! 4. Handlers never read the OS clock; only [`HostRuntime::now`].

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;
use std::io;

use crate::error::{LockError, Result};
use crate::holder::{LockHolder, LogIndex, SessionId, WaiterDisposition};
use crate::host::{CommandContext, HostRuntime};
use crate::messages::{
    IsLockedRequest, IsLockedResponse, LockRequest, LockResponse, UnlockRequest, UnlockResponse,
};
use crate::snapshot::{LockCall, LockSnapshot, SNAPSHOT_VERSION};

/// Fair, session-scoped, exclusive lock for one partition.
pub struct LockService<H: HostRuntime> {
    /// Current owner, if the lock is held.
    holder: Option<LockHolder>,
    /// Waiters in commit-index order.
    queue: VecDeque<LockHolder>,
    /// Expiration timers keyed by waiter index.
    timers: BTreeMap<LogIndex, H::TimerHandle>,
}

impl<H: HostRuntime> LockService<H> {
    /// Create a partition with the lock free and no waiters.
    #[must_use]
    pub fn new() -> Self {
        Self {
            holder: None,
            queue: VecDeque::new(),
            timers: BTreeMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Command handlers
    // ------------------------------------------------------------------

    /// Apply a committed `lock` command.
    ///
    /// The command has no direct return value: the outcome, immediate or
    /// eventual, is delivered as an `onLock` session event through the host.
    pub fn lock(&mut self, host: &mut H, ctx: CommandContext, request: LockRequest) {
        if self.holder.is_none() {
            let granted = LockHolder::new(request.id, ctx.index, ctx.session, 0);
            self.holder = Some(granted);
            tracing::debug!(index = ctx.index, session = %ctx.session, id = request.id, "lock granted");
            host.emit_lock_event(
                ctx.session,
                LockResponse {
                    index: ctx.index,
                    id: request.id,
                    acquired: true,
                },
            );
            return;
        }

        if request.timeout == 0 {
            // tryLock against a held lock is decided immediately.
            tracing::debug!(index = ctx.index, session = %ctx.session, id = request.id, "lock busy, try denied");
            host.emit_lock_event(
                ctx.session,
                LockResponse {
                    index: ctx.index,
                    id: request.id,
                    acquired: false,
                },
            );
            return;
        }

        if request.timeout > 0 {
            let expire = host.now() + request.timeout;
            self.queue
                .push_back(LockHolder::new(request.id, ctx.index, ctx.session, expire));
            let handle = host.schedule(request.timeout, ctx.index);
            self.timers.insert(ctx.index, handle);
            tracing::debug!(index = ctx.index, session = %ctx.session, expire, "waiter queued with deadline");
            return;
        }

        // Negative timeout: wait until granted or the session dies.
        self.queue
            .push_back(LockHolder::new(request.id, ctx.index, ctx.session, 0));
        tracing::debug!(index = ctx.index, session = %ctx.session, "waiter queued without deadline");
    }

    /// Apply a committed `unlock` command.
    ///
    /// Releases the lock when the caller is the holder and names the right
    /// acquisition; otherwise rescinds any matching pending wait of the
    /// caller and leaves the holder untouched.
    pub fn unlock(
        &mut self,
        host: &mut H,
        ctx: CommandContext,
        request: UnlockRequest,
    ) -> UnlockResponse {
        let response = UnlockResponse { index: ctx.index };

        let Some(held) = self.holder else {
            tracing::trace!(index = ctx.index, "unlock with lock free, ignored");
            return response;
        };

        if request.index != 0 && request.index != held.index {
            tracing::trace!(index = ctx.index, requested = request.index, "unlock names a stale acquisition, ignored");
            return response;
        }

        if held.session != ctx.session || held.id != request.id {
            self.rescind(host, ctx.session, request.id);
            return response;
        }

        tracing::debug!(index = ctx.index, session = %ctx.session, "lock released");
        self.holder = None;
        self.promote(host, ctx.index);
        response
    }

    /// Apply a committed `isLocked` query.
    pub fn is_locked(&self, ctx: CommandContext, request: IsLockedRequest) -> IsLockedResponse {
        let locked = self
            .holder
            .is_some_and(|held| request.index == 0 || held.index == request.index);
        IsLockedResponse {
            index: ctx.index,
            locked,
        }
    }

    // ------------------------------------------------------------------
    // Timer fires
    // ------------------------------------------------------------------

    /// Fire the expiration timer scheduled under `index`.
    ///
    /// Idempotent: a fire that lost the race against cancellation finds no
    /// queue entry and does nothing. A fire that finds the queue and timer
    /// table contradicting each other reports [`LockError::TimerDesync`],
    /// which the host must treat as replica corruption.
    pub fn handle_timer(&mut self, host: &mut H, index: LogIndex) -> Result<()> {
        let Some(position) = self.queue.iter().position(|w| w.index == index) else {
            if self.timers.contains_key(&index) {
                return Err(LockError::TimerDesync { index });
            }
            tracing::trace!(index, "timer fired for a waiter no longer queued");
            return Ok(());
        };

        if self.timers.remove(&index).is_none() {
            return Err(LockError::TimerDesync { index });
        }
        let Some(waiter) = self.queue.remove(position) else {
            return Err(LockError::TimerDesync { index });
        };

        tracing::debug!(
            index,
            session = %waiter.session,
            disposition = %WaiterDisposition::Expired,
            "bounded wait ran out"
        );
        if host.is_active(waiter.session) {
            host.emit_lock_event(
                waiter.session,
                LockResponse {
                    index: waiter.index,
                    id: waiter.id,
                    acquired: false,
                },
            );
        } else {
            tracing::trace!(index, session = %waiter.session, "expiry event suppressed, session inactive");
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------

    /// Apply an `onClose` session event.
    pub fn on_close(&mut self, host: &mut H, ctx: CommandContext) {
        self.release_session(host, ctx);
    }

    /// Apply an `onExpire` session event. Identical semantics to close.
    pub fn on_expire(&mut self, host: &mut H, ctx: CommandContext) {
        self.release_session(host, ctx);
    }

    /// Drop every trace of `ctx.session`: pending waits first, then the hold
    /// itself, promoting the next live waiter if there is one.
    fn release_session(&mut self, host: &mut H, ctx: CommandContext) {
        let victims: Vec<LogIndex> = self
            .queue
            .iter()
            .filter(|w| w.session == ctx.session)
            .map(|w| w.index)
            .collect();
        if !victims.is_empty() {
            tracing::debug!(
                session = %ctx.session,
                count = victims.len(),
                disposition = %WaiterDisposition::Cancelled,
                "sweeping waiters of released session"
            );
            self.queue.retain(|w| w.session != ctx.session);
            for index in victims {
                self.cancel_timer(host, index);
            }
        }

        if self.holder.is_some_and(|held| held.session == ctx.session) {
            tracing::debug!(session = %ctx.session, "holder's session released, lock freed");
            self.holder = None;
            self.promote(host, ctx.index);
        }
    }

    // ------------------------------------------------------------------
    // Promotion and rescinding
    // ------------------------------------------------------------------

    /// Hand the freed lock to the oldest waiter whose session is still
    /// active. Dead waiters are popped and discarded along the way.
    ///
    /// `current_index` is the index of the command or event that freed the
    /// lock; it becomes the `index` of the grant event, while the promoted
    /// waiter keeps its original acquisition index inside the service.
    fn promote(&mut self, host: &mut H, current_index: LogIndex) {
        while let Some(head) = self.queue.pop_front() {
            self.cancel_timer(host, head.index);
            if host.is_active(head.session) {
                self.holder = Some(head);
                tracing::debug!(
                    index = head.index,
                    session = %head.session,
                    disposition = %WaiterDisposition::Promoted,
                    "waiter promoted to holder"
                );
                host.emit_lock_event(
                    head.session,
                    LockResponse {
                        index: current_index,
                        id: head.id,
                        acquired: true,
                    },
                );
                return;
            }
            tracing::trace!(index = head.index, session = %head.session, "skipping waiter of inactive session");
        }
        tracing::trace!("queue drained, lock stays free");
    }

    /// Remove every pending wait matching the caller's `(session, id)` pair.
    ///
    /// This is the defined outcome of an unlock that does not release the
    /// holder: it lets a client withdraw a lock request it no longer wants.
    fn rescind(&mut self, host: &mut H, session: SessionId, id: i32) {
        let victims: Vec<LogIndex> = self
            .queue
            .iter()
            .filter(|w| w.session == session && w.id == id)
            .map(|w| w.index)
            .collect();
        for index in &victims {
            tracing::debug!(
                index,
                session = %session,
                disposition = %WaiterDisposition::Cancelled,
                "pending wait rescinded"
            );
        }
        self.queue.retain(|w| !(w.session == session && w.id == id));
        for index in victims {
            self.cancel_timer(host, index);
        }
    }

    fn cancel_timer(&mut self, host: &mut H, index: LogIndex) {
        if let Some(handle) = self.timers.remove(&index) {
            host.cancel(handle);
        }
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Current holder, if the lock is held. Read-only, not replicated.
    #[must_use]
    pub const fn holder(&self) -> Option<&LockHolder> {
        self.holder.as_ref()
    }

    /// Number of pending waits.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Pending waits in FIFO order.
    pub fn queued_waiters(&self) -> impl Iterator<Item = &LockHolder> {
        self.queue.iter()
    }

    // ------------------------------------------------------------------
    // Snapshot and restore
    // ------------------------------------------------------------------

    /// Write the compactable state to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::SnapshotEncode`] when the sink rejects the
    /// serialized record.
    pub fn backup<W: io::Write>(&self, sink: W) -> Result<()> {
        let snapshot = LockSnapshot {
            version: SNAPSHOT_VERSION,
            lock: self.holder.map(LockCall::from),
            queue: self.queue.iter().copied().map(LockCall::from).collect(),
        };
        serde_json::to_writer(sink, &snapshot).map_err(LockError::SnapshotEncode)
    }

    /// Replace all state with the snapshot read from `source`.
    ///
    /// Existing timers are cancelled and fresh ones scheduled from the
    /// restored deadlines: `delay = max(0, expire - now)`. A deadline already
    /// in the past still goes through the scheduler with delay zero rather
    /// than firing inline here.
    ///
    /// # Errors
    ///
    /// Any decode fault fails the restore and must abort the replica:
    /// unparseable bytes, an unknown layout version, or duplicate waiter
    /// indices.
    pub fn restore<R: io::Read>(&mut self, host: &mut H, source: R) -> Result<()> {
        let snapshot: LockSnapshot =
            serde_json::from_reader(source).map_err(LockError::SnapshotDecode)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LockError::UnsupportedSnapshotVersion {
                version: snapshot.version,
            });
        }

        let mut seen = BTreeSet::new();
        for call in snapshot.lock.iter().chain(snapshot.queue.iter()) {
            if !seen.insert(call.index) {
                return Err(LockError::SnapshotDuplicateIndex { index: call.index });
            }
        }

        let stale: Vec<LogIndex> = self.timers.keys().copied().collect();
        for index in stale {
            self.cancel_timer(host, index);
        }

        self.holder = snapshot.lock.map(LockCall::into_holder);
        self.queue = snapshot
            .queue
            .into_iter()
            .map(LockCall::into_holder)
            .collect();

        let now = host.now();
        for waiter in &self.queue {
            if waiter.has_deadline() {
                let delay = (waiter.expire - now).max(0);
                let handle = host.schedule(delay, waiter.index);
                self.timers.insert(waiter.index, handle);
            }
        }

        tracing::debug!(
            held = self.holder.is_some(),
            waiters = self.queue.len(),
            "state restored from snapshot"
        );
        Ok(())
    }
}

impl<H: HostRuntime> Default for LockService<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: HostRuntime> fmt::Debug for LockService<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let timer_keys: Vec<LogIndex> = self.timers.keys().copied().collect();
        f.debug_struct("LockService")
            .field("holder", &self.holder)
            .field("queue", &self.queue)
            .field("timers", &timer_keys)
            .finish()
    }
}
