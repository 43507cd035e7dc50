//! # Lockstep Sim
//!
//! Deterministic single-process host runtime for the lockstep state machine.
//!
//! Production embeds [`lockstep_core::LockService`] in a consensus runtime;
//! this crate embeds it in a scripted one. The clock is manual, the timer
//! wheel fires in a fixed order, sessions change state only when the script
//! says so, and every `onLock` delivery is recorded. That is exactly what the
//! determinism and snapshot properties need: a driver whose every choice is
//! reproducible, so two partitions fed the same script can be compared
//! event-for-event and byte-for-byte.
//!
//! Scenario and property suites live under `tests/`; embedders who want an
//! in-memory lock partition (single process, no consensus) can use
//! [`Partition`] directly.

#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::panic))]
#![forbid(unsafe_code)]

pub mod host;
pub mod partition;

pub use host::{LockEvent, SimHost, SimTimer};
pub use partition::Partition;
