//! The latest reading an observer holds, with change accounting.

use std::cell::Cell;
use std::fmt::Debug;

use tokio::sync::watch;

/// Current value plus a watch channel for consumers that re-render on change.
///
/// The first non-initial value is the baseline and is not counted as a
/// change; every later distinct value is.
pub(crate) struct ObservedValue<S> {
    tx: watch::Sender<S>,
    baseline_set: Cell<bool>,
    changes: Cell<u64>,
}

impl<S: Copy + PartialEq + Debug> ObservedValue<S> {
    pub(crate) fn new(initial: S) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            tx,
            baseline_set: Cell::new(false),
            changes: Cell::new(0),
        }
    }

    pub(crate) fn get(&self) -> S {
        *self.tx.borrow()
    }

    /// Move to an intermediate value (e.g. "resolving") that is neither
    /// the baseline nor a change.
    pub(crate) fn mark(&self, value: S) {
        self.tx.send_if_modified(|current| {
            let modified = *current != value;
            *current = value;
            modified
        });
    }

    /// Record a reading. Returns `true` if it was counted as a change.
    pub(crate) fn record(&self, value: S) -> bool {
        let modified = self.tx.send_if_modified(|current| {
            let modified = *current != value;
            *current = value;
            modified
        });

        if !self.baseline_set.replace(true) {
            return false;
        }
        if modified {
            self.changes.set(self.changes.get() + 1);
        }
        modified
    }

    pub(crate) fn change_count(&self) -> u64 {
        self.changes.get()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<S> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_is_not_a_change() {
        let value = ObservedValue::new(0_u8);
        value.mark(1);
        assert!(!value.record(2));
        assert_eq!(value.get(), 2);
        assert_eq!(value.change_count(), 0);

        assert!(!value.record(2));
        assert!(value.record(3));
        assert_eq!(value.change_count(), 1);
    }

    #[test]
    fn subscribers_see_updates() {
        let value = ObservedValue::new("a");
        let mut rx = value.subscribe();
        assert!(!rx.has_changed().unwrap());

        value.record("b");
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), "b");

        value.record("b");
        assert!(!rx.has_changed().unwrap());
    }
}
