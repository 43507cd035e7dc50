//! Driver for one simulated lock partition.
//!
//! [`Partition`] plays the role the consensus runtime plays in production:
//! it assigns log indices, serializes command/timer/session-event execution,
//! and buffers outbound events until the caller drains them. Two partitions
//! fed the same script take exactly the same steps.

use lockstep_core::{
    ClockMs, CommandContext, HostRuntime, IsLockedRequest, IsLockedResponse, LockHolder,
    LockRequest, LockService, LogIndex, SessionId, UnlockRequest, UnlockResponse,
};

use crate::host::{LockEvent, SimHost};

/// One lock partition with its scripted host runtime.
#[derive(Debug)]
pub struct Partition {
    host: SimHost,
    service: LockService<SimHost>,
    next_index: LogIndex,
}

impl Partition {
    /// Create a partition whose next committed entry gets `start_index` and
    /// whose replicated clock reads `clock`.
    #[must_use]
    pub fn new(start_index: LogIndex, clock: ClockMs) -> Self {
        Self {
            host: SimHost::starting_at(clock),
            service: LockService::new(),
            next_index: start_index,
        }
    }

    fn commit(&mut self, session: SessionId) -> CommandContext {
        let ctx = CommandContext::new(self.next_index, session);
        self.next_index += 1;
        ctx
    }

    /// Register a new active session with the host.
    pub fn register_session(&mut self, session: SessionId) {
        self.host.register_session(session);
    }

    /// Commit and apply a `lock` command. Returns the assigned log index;
    /// the outcome arrives through [`take_events`].
    ///
    /// [`take_events`]: Partition::take_events
    pub fn lock(&mut self, session: SessionId, request: LockRequest) -> LogIndex {
        let ctx = self.commit(session);
        self.service.lock(&mut self.host, ctx, request);
        ctx.index
    }

    /// Commit and apply an `unlock` command.
    pub fn unlock(&mut self, session: SessionId, request: UnlockRequest) -> UnlockResponse {
        let ctx = self.commit(session);
        self.service.unlock(&mut self.host, ctx, request)
    }

    /// Commit and apply an `isLocked` query.
    pub fn is_locked(&mut self, session: SessionId, request: IsLockedRequest) -> IsLockedResponse {
        let ctx = self.commit(session);
        self.service.is_locked(ctx, request)
    }

    /// Close `session`: the registry flips to inactive first, then the
    /// release event is applied as its own committed transition.
    pub fn close_session(&mut self, session: SessionId) {
        self.host.deactivate_session(session);
        let ctx = self.commit(session);
        self.service.on_close(&mut self.host, ctx);
    }

    /// Expire `session`. Identical semantics to closing it.
    pub fn expire_session(&mut self, session: SessionId) {
        self.host.deactivate_session(session);
        let ctx = self.commit(session);
        self.service.on_expire(&mut self.host, ctx);
    }

    /// Advance the replicated clock by `ms`, firing every timer that comes
    /// due on the way, in deadline order.
    ///
    /// # Errors
    ///
    /// Propagates replica corruption detected by a timer fire.
    pub fn advance_clock(&mut self, ms: ClockMs) -> lockstep_core::Result<()> {
        let target = self.host.now() + ms.max(0);
        while let Some(index) = self.host.pop_due(target) {
            tracing::trace!(index, clock = self.host.now(), "firing due timer");
            self.service.handle_timer(&mut self.host, index)?;
        }
        self.host.settle_clock(target);
        Ok(())
    }

    /// Drain buffered `onLock` deliveries in emission order.
    pub fn take_events(&mut self) -> Vec<LockEvent> {
        self.host.take_events()
    }

    /// Serialize the partition's compactable state.
    pub fn backup(&self) -> lockstep_core::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        self.service.backup(&mut bytes)?;
        Ok(bytes)
    }

    /// Replace this partition's state with a snapshot produced elsewhere.
    /// Timers are rebuilt against this partition's clock.
    pub fn restore_from(&mut self, bytes: &[u8]) -> lockstep_core::Result<()> {
        self.service.restore(&mut self.host, bytes)
    }

    /// Bring up a fresh replica of this partition from its own snapshot:
    /// same clock, same session registry, state rebuilt via restore.
    pub fn fork_from_snapshot(&self) -> lockstep_core::Result<Self> {
        let bytes = self.backup()?;
        let mut host = self.host.fresh_replica();
        let mut service = LockService::new();
        service.restore(&mut host, bytes.as_slice())?;
        Ok(Self {
            host,
            service,
            next_index: self.next_index,
        })
    }

    /// Current holder, if the lock is held.
    #[must_use]
    pub const fn holder(&self) -> Option<&LockHolder> {
        self.service.holder()
    }

    /// Number of pending waits.
    #[must_use]
    pub fn queue_len(&self) -> usize {
        self.service.queue_len()
    }

    /// Pending waits in FIFO order.
    pub fn queued_waiters(&self) -> impl Iterator<Item = &LockHolder> {
        self.service.queued_waiters()
    }

    /// Current replicated clock reading.
    #[must_use]
    pub fn clock(&self) -> ClockMs {
        self.host.now()
    }

    /// Timers currently scheduled with the host.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.host.pending_timers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_are_assigned_in_commit_order() {
        let mut partition = Partition::new(10, 0);
        partition.register_session(SessionId(1));
        partition.register_session(SessionId(2));

        let first = partition.lock(SessionId(1), LockRequest::wait_forever(1));
        let second = partition.lock(SessionId(2), LockRequest::wait_forever(2));
        let response = partition.unlock(SessionId(1), UnlockRequest { index: 0, id: 1 });

        assert_eq!((first, second), (10, 11));
        assert_eq!(response.index, 12);
    }

    #[test]
    fn test_events_stay_buffered_until_drained() {
        let mut partition = Partition::new(1, 0);
        partition.register_session(SessionId(1));

        partition.lock(SessionId(1), LockRequest::wait_forever(1));
        let events = partition.take_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].response.acquired);
        assert!(partition.take_events().is_empty());
    }

    #[test]
    fn test_session_events_consume_an_index() {
        let mut partition = Partition::new(5, 0);
        partition.register_session(SessionId(1));
        partition.register_session(SessionId(2));

        partition.lock(SessionId(1), LockRequest::wait_forever(1)); // 5
        partition.lock(SessionId(2), LockRequest::wait_forever(2)); // 6
        partition.close_session(SessionId(1)); // 7
        partition.take_events();

        // The grant to session 2 carried the close event's index.
        let response = partition.unlock(SessionId(2), UnlockRequest { index: 0, id: 2 });
        assert_eq!(response.index, 8);
    }

    #[test]
    fn test_advance_clock_is_cumulative() {
        let mut partition = Partition::new(1, 1000);
        partition.register_session(SessionId(1));
        partition.register_session(SessionId(2));
        partition.lock(SessionId(1), LockRequest::wait_forever(1));
        partition.lock(SessionId(2), LockRequest::wait_for(3, 500));
        partition.take_events();

        partition.advance_clock(300).expect("advance");
        assert_eq!(partition.queue_len(), 1);
        partition.advance_clock(200).expect("advance");
        assert_eq!(partition.queue_len(), 0);
        assert_eq!(partition.clock(), 1500);
    }
}
