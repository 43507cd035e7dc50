//! Contract between the state machine and its host consensus runtime.
//!
//! The host owns everything non-deterministic: the log, the transport, the
//! session table, and real time. The state machine sees only what crosses
//! this boundary, and everything that crosses it is replicated:
//!
//! - committed commands arrive with a [`CommandContext`],
//! - time is read through [`HostRuntime::now`] (replicated clock, never the
//!   OS clock),
//! - timers fire by the host calling back into the service with the waiter
//!   index the timer was scheduled under,
//! - acquisition outcomes leave through [`HostRuntime::emit_lock_event`],
//!   which the host buffers and delivers only after the in-flight command's
//!   own response.

use crate::holder::{ClockMs, LogIndex, SessionId};
use crate::messages::LockResponse;

/// Execution context of one committed command or session lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandContext {
    /// Log index assigned to this command or event by the host.
    pub index: LogIndex,
    /// Session on whose behalf it executes.
    pub session: SessionId,
}

impl CommandContext {
    /// Build a context for a committed entry.
    #[must_use]
    pub const fn new(index: LogIndex, session: SessionId) -> Self {
        Self { index, session }
    }
}

/// Services the host runtime provides to the state machine.
///
/// Calls into this trait happen only from inside command, timer, and session
/// handlers, which the host runs strictly serialized: one logical thread per
/// partition, no handler overlap. Implementations therefore never need
/// interior locking to protect per-partition state.
pub trait HostRuntime {
    /// Opaque token for one scheduled timer, returned by [`schedule`] and
    /// consumed by [`cancel`].
    ///
    /// [`schedule`]: HostRuntime::schedule
    /// [`cancel`]: HostRuntime::cancel
    type TimerHandle;

    /// Current replicated wall-clock time in milliseconds.
    fn now(&self) -> ClockMs;

    /// Schedule a lock-expiration timer.
    ///
    /// After `delay` milliseconds of replicated time the host must call
    /// [`LockService::handle_timer`] with `index`, in the same serialized
    /// execution context as command handlers. A `delay` of zero is valid and
    /// still goes through the scheduler; it must not fire inline.
    ///
    /// [`LockService::handle_timer`]: crate::service::LockService::handle_timer
    fn schedule(&mut self, delay: ClockMs, index: LogIndex) -> Self::TimerHandle;

    /// Cancel a scheduled timer.
    ///
    /// Best-effort: if the fire already entered the executor the callback
    /// runs anyway, and the service treats it as a no-op.
    fn cancel(&mut self, handle: Self::TimerHandle);

    /// Whether the session is still in its `active` lifecycle state.
    fn is_active(&self, session: SessionId) -> bool;

    /// Queue an `onLock` event for delivery to `session`.
    ///
    /// The host buffers the event and dispatches it after the current
    /// handler returns; when the event originates inside a `lock` command it
    /// must reach the client strictly after that command's own response.
    fn emit_lock_event(&mut self, session: SessionId, response: LockResponse);
}
