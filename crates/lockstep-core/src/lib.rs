//! # Lockstep Core
//!
//! Deterministic replicated lock state machine: a fair, session-scoped,
//! exclusive lock with bounded wait, driven identically on every replica of a
//! consensus group.
//!
//! The crate is the command processor only. It consumes a host runtime
//! ([`HostRuntime`]) that feeds committed commands in log order, supplies the
//! replicated clock and timer scheduler, and delivers session lifecycle
//! events; it produces command responses and `onLock` session events. Given
//! the same inputs, two instances produce byte-identical snapshots and
//! identical event streams.
//!
//! ## Error Handling
//!
//! The command surface is total; only snapshot faults and detected replica
//! corruption return `Err`, and those are fatal to the replica. All fallible
//! operations return `Result<T, LockError>`; no `unwrap()`, `expect()`, or
//! `panic!()` outside tests.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

mod error;
pub mod holder;
pub mod host;
pub mod messages;
pub mod service;
pub mod snapshot;

pub use error::{LockError, Result};
pub use holder::{ClockMs, LockHolder, LogIndex, SessionId, WaiterDisposition};
pub use host::{CommandContext, HostRuntime};
pub use messages::{
    IsLockedRequest, IsLockedResponse, LockRequest, LockResponse, UnlockRequest, UnlockResponse,
};
pub use service::LockService;
pub use snapshot::{LockCall, LockSnapshot, SNAPSHOT_VERSION};
