//! LIFO cleanup primitive embedded in every class instance.
//!
//! Owners `give` units of cleanup (a disposable object or a plain closure)
//! as they acquire resources; `cleanup` releases them in reverse order,
//! exactly once, and tolerates being called again.

use std::panic::{self, AssertUnwindSafe};

use parking_lot::Mutex;
use tracing::{debug, error};

/// A unit of cleanup with its own teardown logic.
pub trait Dispose: Send {
    fn dispose(&mut self);
}

enum Unit {
    Action(Box<dyn FnOnce() + Send>),
    Disposable(Box<dyn Dispose>),
}

struct Inner {
    units: Vec<Unit>,
    drained: bool,
}

/// Ordered, idempotent release of heterogeneous acquired resources.
///
/// Units are disposed strictly LIFO. A unit that panics during disposal is
/// logged and does not prevent the remaining units from running. Giving a
/// unit after `cleanup` has already run disposes it immediately, so late
/// registration on a torn-down owner cannot leak.
pub struct CleanupStack {
    inner: Mutex<Inner>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                units: Vec::new(),
                drained: false,
            }),
        }
    }

    /// Record a disposable unit.
    pub fn give(&self, disposable: impl Dispose + 'static) {
        self.admit(Unit::Disposable(Box::new(disposable)));
    }

    /// Record a plain callback as a unit of cleanup.
    pub fn give_fn(&self, action: impl FnOnce() + Send + 'static) {
        self.admit(Unit::Action(Box::new(action)));
    }

    fn admit(&self, unit: Unit) {
        let late = {
            let mut inner = self.inner.lock();
            if inner.drained {
                true
            } else {
                inner.units.push(unit);
                return;
            }
        };
        // Lock released before running user code.
        if late {
            debug!(target: "cleanup", "unit given after cleanup, disposing immediately");
            dispose_unit(unit);
        }
    }

    /// Dispose every recorded unit in reverse give-order, then clear.
    ///
    /// Concurrent callers serialize on the drain flag; only the first call
    /// runs any disposal, later calls are no-ops.
    pub fn cleanup(&self) {
        let units = {
            let mut inner = self.inner.lock();
            if inner.drained {
                return;
            }
            inner.drained = true;
            std::mem::take(&mut inner.units)
        };
        for unit in units.into_iter().rev() {
            dispose_unit(unit);
        }
    }

    /// Whether `cleanup` has already run.
    pub fn is_drained(&self) -> bool {
        self.inner.lock().drained
    }

    /// Number of units currently recorded.
    pub fn len(&self) -> usize {
        self.inner.lock().units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CleanupStack {
    fn default() -> Self {
        Self::new()
    }
}

fn dispose_unit(unit: Unit) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| match unit {
        Unit::Action(action) => action(),
        Unit::Disposable(mut disposable) => disposable.dispose(),
    }));
    if let Err(cause) = outcome {
        error!(target: "cleanup", "cleanup unit panicked: {:?}", cause);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn cleanup_runs_in_reverse_give_order() {
        let stack = CleanupStack::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for name in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            stack.give_fn(move || log.lock().push(name));
        }

        stack.cleanup();
        assert_eq!(*log.lock(), vec!["c", "b", "a"]);
    }

    #[test]
    fn second_cleanup_is_a_noop() {
        let stack = CleanupStack::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        {
            let log = Arc::clone(&log);
            stack.give_fn(move || log.lock().push("once"));
        }

        stack.cleanup();
        stack.cleanup();
        assert_eq!(*log.lock(), vec!["once"]);
        assert!(stack.is_drained());
    }

    #[test]
    fn give_after_cleanup_disposes_immediately() {
        let stack = CleanupStack::new();
        stack.cleanup();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        stack.give_fn(move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
        assert!(stack.is_empty());
    }

    #[test]
    fn panicking_unit_does_not_stop_the_rest() {
        let stack = CleanupStack::new();
        let ran = Arc::new(AtomicBool::new(false));
        {
            let flag = Arc::clone(&ran);
            stack.give_fn(move || flag.store(true, Ordering::SeqCst));
        }
        stack.give_fn(|| panic!("bad unit"));

        // The panicking unit runs first (LIFO) and must not poison the drain.
        stack.cleanup();
        assert!(ran.load(Ordering::SeqCst));
    }

    struct Flagged(Arc<AtomicBool>);

    impl Dispose for Flagged {
        fn dispose(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn disposable_units_are_disposed() {
        let stack = CleanupStack::new();
        let flag = Arc::new(AtomicBool::new(false));
        stack.give(Flagged(Arc::clone(&flag)));

        stack.cleanup();
        assert!(flag.load(Ordering::SeqCst));
    }
}
