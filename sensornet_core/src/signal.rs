//! One-shot-per-round flag used for "all scripts received".

use std::sync::{Condvar, Mutex, PoisonError};

/// A flag that one side raises and the other waits on, then clears.
///
/// Raising an already raised flag is a no-op, so a round's sentinel may
/// arrive before or after the coordinator starts waiting.
#[derive(Debug, Default)]
pub(crate) struct RoundSignal {
    raised: Mutex<bool>,
    changed: Condvar,
}

impl RoundSignal {
    pub(crate) fn raise(&self) {
        let mut raised = self.raised.lock().unwrap_or_else(PoisonError::into_inner);
        *raised = true;
        self.changed.notify_all();
    }

    /// Blocks until the flag is raised, then lowers it for the next round.
    pub(crate) fn wait_and_clear(&self) {
        let mut raised = self.raised.lock().unwrap_or_else(PoisonError::into_inner);
        while !*raised {
            raised = self
                .changed
                .wait(raised)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *raised = false;
    }

    #[cfg(test)]
    pub(crate) fn is_raised(&self) -> bool {
        *self.raised.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_raise_before_wait() {
        let signal = RoundSignal::default();
        signal.raise();
        signal.wait_and_clear();
        assert!(!signal.is_raised());
    }

    #[test]
    fn test_wait_blocks_until_raised() {
        let signal = Arc::new(RoundSignal::default());

        let raiser = Arc::clone(&signal);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            raiser.raise();
        });

        signal.wait_and_clear();
        handle.join().unwrap();
        assert!(!signal.is_raised());
    }

    #[test]
    fn test_reusable_across_rounds() {
        let signal = RoundSignal::default();
        for _ in 0..3 {
            signal.raise();
            signal.raise();
            signal.wait_and_clear();
            assert!(!signal.is_raised());
        }
    }
}
