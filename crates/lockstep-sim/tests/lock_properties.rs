//! Property-based tests for the lock partition invariants.
//!
//! Random command scripts are replayed against simulated partitions to check:
//! 1. Mutual exclusion (the holder is never also queued)
//! 2. FIFO fairness (queue sorted by commit index; holders acquire in
//!    commit order)
//! 3. No orphan timers (timer count matches queued deadlines exactly)
//! 4. Snapshot round-trip (a forked replica behaves identically afterwards)
//! 5. Determinism (identical scripts yield identical events and snapshots)
//! 6. Session cleanup (a released session leaves no trace)

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::missing_panics_doc
)]

use std::collections::BTreeSet;

use proptest::prelude::*;

use lockstep_core::{LockRequest, SessionId, UnlockRequest};
use lockstep_sim::Partition;

const SESSION_POOL: u64 = 4;

/// One scripted input to a partition.
#[derive(Debug, Clone)]
enum Op {
    /// A `lock` command from `session`.
    Lock { session: u64, id: i32, timeout: i64 },
    /// A well-formed `unlock` from whoever currently holds the lock.
    Release,
    /// An arbitrary `unlock`, possibly spurious or stale.
    Unlock { session: u64, index: i64, id: i32 },
    /// Close a session.
    Close { session: u64 },
    /// Expire a session.
    Expire { session: u64 },
    /// Advance the replicated clock, firing due timers.
    Advance { ms: i64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let session = 1u64..=SESSION_POOL;
    let timeout = prop_oneof![Just(0i64), Just(-1i64), 1i64..=800];
    prop_oneof![
        4 => (session.clone(), 1i32..=9, timeout)
            .prop_map(|(session, id, timeout)| Op::Lock { session, id, timeout }),
        3 => Just(Op::Release),
        2 => (session.clone(), prop_oneof![Just(0i64), 1i64..=60], 1i32..=9)
            .prop_map(|(session, index, id)| Op::Unlock { session, index, id }),
        1 => session.clone().prop_map(|session| Op::Close { session }),
        1 => session.prop_map(|session| Op::Expire { session }),
        3 => (0i64..=1000).prop_map(|ms| Op::Advance { ms }),
    ]
}

fn script_strategy() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(op_strategy(), 0..40)
}

/// A partition plus the bookkeeping the script needs: which sessions have
/// been released (commands from them are no longer fed in) and the largest
/// acquisition index granted so far.
struct Replica {
    partition: Partition,
    closed: BTreeSet<u64>,
    max_holder_index: i64,
}

impl Replica {
    fn new() -> Self {
        let mut partition = Partition::new(1, 0);
        for n in 1..=SESSION_POOL {
            partition.register_session(SessionId(n));
        }
        Self {
            partition,
            closed: BTreeSet::new(),
            max_holder_index: i64::MIN,
        }
    }

    fn fork(&self) -> lockstep_core::Result<Self> {
        Ok(Self {
            partition: self.partition.fork_from_snapshot()?,
            closed: self.closed.clone(),
            max_holder_index: self.max_holder_index,
        })
    }

    fn apply(&mut self, op: &Op) {
        match *op {
            Op::Lock {
                session,
                id,
                timeout,
            } => {
                if !self.closed.contains(&session) {
                    self.partition
                        .lock(SessionId(session), LockRequest { id, timeout });
                }
            }
            Op::Release => {
                if let Some(held) = self.partition.holder().copied() {
                    if !self.closed.contains(&held.session.0) {
                        self.partition
                            .unlock(held.session, UnlockRequest { index: 0, id: held.id });
                    }
                }
            }
            Op::Unlock { session, index, id } => {
                if !self.closed.contains(&session) {
                    self.partition
                        .unlock(SessionId(session), UnlockRequest { index, id });
                }
            }
            Op::Close { session } => {
                if self.closed.insert(session) {
                    self.partition.close_session(SessionId(session));
                }
            }
            Op::Expire { session } => {
                if self.closed.insert(session) {
                    self.partition.expire_session(SessionId(session));
                }
            }
            Op::Advance { ms } => {
                self.partition.advance_clock(ms).expect("timer fire");
            }
        }
    }

    fn check_invariants(&mut self) -> Result<(), TestCaseError> {
        let holder = self.partition.holder().copied();

        // Holders acquire in commit order: the acquisition index only grows.
        if let Some(held) = holder {
            prop_assert!(held.index >= self.max_holder_index);
            self.max_holder_index = self.max_holder_index.max(held.index);
        }

        let mut seen = BTreeSet::new();
        let mut previous = i64::MIN;
        let mut deadlines = 0usize;
        for waiter in self.partition.queued_waiters() {
            // Mutual exclusion: the holder is never also queued.
            prop_assert!(Some(waiter.index) != holder.map(|h| h.index));
            // Distinct identities, FIFO by commit index.
            prop_assert!(seen.insert(waiter.index));
            prop_assert!(waiter.index > previous);
            previous = waiter.index;
            if waiter.expire > 0 {
                deadlines += 1;
            }
        }

        // No orphan timers: exactly one timer per queued deadline.
        prop_assert_eq!(self.partition.pending_timers(), deadlines);

        // Session cleanup: released sessions leave no trace.
        for session in &self.closed {
            prop_assert!(holder.map_or(true, |h| h.session.0 != *session));
            prop_assert!(self
                .partition
                .queued_waiters()
                .all(|w| w.session.0 != *session));
        }
        Ok(())
    }
}

proptest! {
    /// Invariants 1, 2, 3, and 6 hold after every single step of any script.
    #[test]
    fn prop_invariants_hold_after_every_step(script in script_strategy()) {
        let mut replica = Replica::new();
        for op in &script {
            replica.apply(op);
            replica.check_invariants()?;
        }
    }

    /// Two replicas fed the same script emit identical event streams and
    /// byte-identical snapshots at every step.
    #[test]
    fn prop_identical_scripts_produce_identical_replicas(script in script_strategy()) {
        let mut left = Replica::new();
        let mut right = Replica::new();
        for op in &script {
            left.apply(op);
            right.apply(op);
            prop_assert_eq!(
                left.partition.take_events(),
                right.partition.take_events()
            );
        }
        prop_assert_eq!(left.partition.holder(), right.partition.holder());
        prop_assert_eq!(
            left.partition.backup().expect("backup"),
            right.partition.backup().expect("backup")
        );
    }

    /// A replica forked from a snapshot mid-script behaves identically to
    /// the original for the rest of the script.
    #[test]
    fn prop_snapshot_fork_preserves_future_behavior(
        script in script_strategy(),
        cut in any::<prop::sample::Index>(),
    ) {
        let cut = cut.index(script.len() + 1);
        let (prefix, suffix) = script.split_at(cut.min(script.len()));

        let mut original = Replica::new();
        for op in prefix {
            original.apply(op);
        }
        original.partition.take_events();

        let mut forked = original.fork().expect("fork");
        for op in suffix {
            original.apply(op);
            forked.apply(op);
            prop_assert_eq!(
                original.partition.take_events(),
                forked.partition.take_events()
            );
        }
        prop_assert_eq!(original.partition.holder(), forked.partition.holder());
        prop_assert_eq!(
            original.partition.backup().expect("backup"),
            forked.partition.backup().expect("backup")
        );
    }

    /// Releasing every session always drains the partition completely.
    #[test]
    fn prop_releasing_all_sessions_drains_the_partition(script in script_strategy()) {
        let mut replica = Replica::new();
        for op in &script {
            replica.apply(op);
        }
        for session in 1..=SESSION_POOL {
            replica.apply(&Op::Close { session });
        }
        prop_assert!(replica.partition.holder().is_none());
        prop_assert_eq!(replica.partition.queue_len(), 0);
        prop_assert_eq!(replica.partition.pending_timers(), 0);
    }
}
