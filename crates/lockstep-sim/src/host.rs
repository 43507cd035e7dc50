//! In-memory host runtime with a manual clock and an ordered timer wheel.
//!
//! Every source of host behavior the state machine can observe is explicit
//! and reproducible here: the clock moves only when told to, timers fire in
//! `(deadline, schedule order)`, sessions change lifecycle state only through
//! the registry methods, and emitted events accumulate in emission order
//! until drained.

use std::collections::BTreeMap;

use serde::Serialize;

use lockstep_core::{ClockMs, HostRuntime, LockResponse, LogIndex, SessionId};

/// Handle for one scheduled timer in the wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimTimer {
    due: ClockMs,
    seq: u64,
}

/// One buffered `onLock` delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LockEvent {
    /// Session the event is addressed to.
    pub session: SessionId,
    /// The acquisition outcome.
    pub response: LockResponse,
}

/// Scripted host runtime backing one simulated partition.
#[derive(Debug, Default)]
pub struct SimHost {
    clock: ClockMs,
    next_seq: u64,
    wheel: BTreeMap<(ClockMs, u64), LogIndex>,
    sessions: BTreeMap<SessionId, bool>,
    events: Vec<LockEvent>,
}

impl SimHost {
    /// Create a host with the replicated clock at `clock` and no sessions.
    #[must_use]
    pub fn starting_at(clock: ClockMs) -> Self {
        Self {
            clock,
            ..Self::default()
        }
    }

    /// Register `session` as active. Unknown sessions read as inactive.
    pub fn register_session(&mut self, session: SessionId) {
        self.sessions.insert(session, true);
    }

    /// Mark `session` inactive. Must happen before the close/expire event is
    /// applied, so promotion skips the departing session.
    pub fn deactivate_session(&mut self, session: SessionId) {
        self.sessions.insert(session, false);
    }

    /// Pop the earliest timer due at or before `target`, advancing the clock
    /// to its deadline. Returns the waiter index the timer was keyed by.
    pub fn pop_due(&mut self, target: ClockMs) -> Option<LogIndex> {
        let (&(due, seq), &index) = self.wheel.first_key_value()?;
        if due > target {
            return None;
        }
        self.wheel.remove(&(due, seq));
        self.clock = due;
        Some(index)
    }

    /// Move the clock forward to `target` without firing anything.
    /// Deadlines never move backwards.
    pub fn settle_clock(&mut self, target: ClockMs) {
        self.clock = self.clock.max(target);
    }

    /// Drain buffered `onLock` deliveries in emission order.
    pub fn take_events(&mut self) -> Vec<LockEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of timers currently in the wheel.
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.wheel.len()
    }

    /// A host for a replica catching up from a snapshot: same clock, same
    /// session registry, but no timers (restore rebuilds them) and no
    /// buffered events.
    #[must_use]
    pub fn fresh_replica(&self) -> Self {
        Self {
            clock: self.clock,
            next_seq: 0,
            wheel: BTreeMap::new(),
            sessions: self.sessions.clone(),
            events: Vec::new(),
        }
    }
}

impl HostRuntime for SimHost {
    type TimerHandle = SimTimer;

    fn now(&self) -> ClockMs {
        self.clock
    }

    fn schedule(&mut self, delay: ClockMs, index: LogIndex) -> SimTimer {
        let due = self.clock + delay.max(0);
        let seq = self.next_seq;
        self.next_seq += 1;
        self.wheel.insert((due, seq), index);
        SimTimer { due, seq }
    }

    fn cancel(&mut self, handle: SimTimer) {
        self.wheel.remove(&(handle.due, handle.seq));
    }

    fn is_active(&self, session: SessionId) -> bool {
        self.sessions.get(&session).copied().unwrap_or(false)
    }

    fn emit_lock_event(&mut self, session: SessionId, response: LockResponse) {
        self.events.push(LockEvent { session, response });
    }
}
