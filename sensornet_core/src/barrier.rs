//! Reusable barrier built from two chained release phases.
//!
//! # Algorithm
//!
//! Each phase is a countdown guarded by a mutex plus a counting gate:
//!
//! ```text
//! arrive ──► lock ──► remaining -= 1 ──┬─ remaining == 0 ──► reset to N, open gate N times
//!                                      └─ remaining  > 0 ──► (nothing)
//!        ──► unlock ──► take one permit from the gate ──► leave
//! ```
//!
//! A single phase is not enough: a fast participant could leave, loop
//! around and decrement the countdown again before a slow one has taken
//! its permit. Every participant passes through both phases, so nobody can
//! re-enter phase one until phase two has released everyone, and the phases
//! never share a countdown or a gate.

use crate::error::CoreError;
use std::sync::{Condvar, Mutex, PoisonError};

/// A barrier for a fixed set of participants that can be reused for any
/// number of rounds.
#[derive(Debug)]
pub struct ReusableBarrier {
    participants: usize,
    phases: [Phase; 2],
}

impl ReusableBarrier {
    /// Creates a barrier for `participants` threads.
    ///
    /// # Errors
    /// `CoreError::ZeroParticipants` if `participants` is zero; such a
    /// barrier has no release condition.
    pub fn new(participants: usize) -> Result<Self, CoreError> {
        if participants == 0 {
            return Err(CoreError::ZeroParticipants);
        }

        Ok(Self {
            participants,
            phases: [Phase::new(participants), Phase::new(participants)],
        })
    }

    /// Returns the fixed participant count.
    pub fn participants(&self) -> usize {
        self.participants
    }

    /// Blocks until all participants have called `wait` for this round.
    ///
    /// Returns `true` for exactly one participant per round: the last one to
    /// arrive at the second phase.
    pub fn wait(&self) -> bool {
        self.phases[0].pass(self.participants);
        self.phases[1].pass(self.participants)
    }
}

#[derive(Debug)]
struct Phase {
    remaining: Mutex<usize>,
    gate: Gate,
}

impl Phase {
    fn new(participants: usize) -> Self {
        Self {
            remaining: Mutex::new(participants),
            gate: Gate::default(),
        }
    }

    fn pass(&self, participants: usize) -> bool {
        let released = {
            let mut remaining = self.remaining.lock().unwrap_or_else(PoisonError::into_inner);
            *remaining -= 1;

            if *remaining == 0 {
                *remaining = participants;
                self.gate.open(participants);
                true
            } else {
                false
            }
        };

        self.gate.take();
        released
    }
}

/// Counting gate: `open(n)` adds n permits, `take()` blocks for one.
#[derive(Debug, Default)]
struct Gate {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Gate {
    fn open(&self, permits: usize) {
        let mut current = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        *current += permits;
        self.available.notify_all();
    }

    fn take(&self) {
        let mut current = self.permits.lock().unwrap_or_else(PoisonError::into_inner);
        while *current == 0 {
            current = self
                .available
                .wait(current)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *current -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_zero_participants_rejected() {
        assert!(matches!(
            ReusableBarrier::new(0),
            Err(CoreError::ZeroParticipants)
        ));
    }

    #[test]
    fn test_single_participant_never_blocks() {
        let barrier = ReusableBarrier::new(1).unwrap();
        for _ in 0..10 {
            assert!(barrier.wait());
        }
    }

    #[test]
    fn test_nobody_released_before_everyone_arrives() {
        const N: usize = 8;
        const ROUNDS: usize = 50;

        let barrier = Arc::new(ReusableBarrier::new(N).unwrap());
        let arrived = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let arrived = Arc::clone(&arrived);
                thread::spawn(move || {
                    for round in 0..ROUNDS {
                        arrived.fetch_add(1, Ordering::SeqCst);
                        barrier.wait();
                        // Everyone of this round must have arrived, and nobody
                        // can have started the round after next yet.
                        let seen = arrived.load(Ordering::SeqCst);
                        assert!(seen >= (round + 1) * N, "released early: {seen}");
                        assert!(seen <= (round + 2) * N, "round overrun: {seen}");
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(arrived.load(Ordering::SeqCst), N * ROUNDS);
    }

    #[test]
    fn test_one_leader_per_round() {
        const N: usize = 5;
        const ROUNDS: usize = 20;

        let barrier = Arc::new(ReusableBarrier::new(N).unwrap());
        let leaders = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let leaders = Arc::clone(&leaders);
                thread::spawn(move || {
                    for _ in 0..ROUNDS {
                        if barrier.wait() {
                            leaders.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(leaders.load(Ordering::SeqCst), ROUNDS);
    }

    #[test]
    fn test_reuse_keeps_rounds_aligned() {
        const N: usize = 4;
        const ROUNDS: usize = 100;

        let barrier = Arc::new(ReusableBarrier::new(N).unwrap());
        let round_counters: Arc<Vec<AtomicUsize>> =
            Arc::new((0..ROUNDS).map(|_| AtomicUsize::new(0)).collect());

        let handles: Vec<_> = (0..N)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let counters = Arc::clone(&round_counters);
                thread::spawn(move || {
                    for round in 0..ROUNDS {
                        counters[round].fetch_add(1, Ordering::SeqCst);
                        barrier.wait();
                        assert_eq!(counters[round].load(Ordering::SeqCst), N);
                        if round >= 1 {
                            assert_eq!(counters[round - 1].load(Ordering::SeqCst), N);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(barrier.participants(), N);
    }
}
