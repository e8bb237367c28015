use foundation::ids::UnitId;

use crate::unit::{SharedCallbacks, WorkUnit};

#[derive(Clone)]
enum HandleKind {
    /// Never fires. The safe fallback for scheduling into an unknown
    /// group: the call site degrades to "work silently never runs".
    Null,
    /// Fires its work callback immediately and synchronously upon
    /// registration, with zero elapsed time. Returned when the whole
    /// system is disabled so callers keep a single code path.
    Passthrough,
    /// Shares the unit's callback block.
    Live(SharedCallbacks),
}

/// Cheap-to-copy reference to a scheduled unit's callback slots.
///
/// Returned by `Manager::schedule_work`; register the actual work with
/// [`on_work`] and an optional cancellation path with [`on_abort`]. The
/// handle does not own the unit and stays valid after the unit has run.
///
/// For any one unit, either the work callback fires (exactly once) or
/// the abort callback fires (exactly once), never both.
///
/// [`on_work`]: WorkUnitHandle::on_work
/// [`on_abort`]: WorkUnitHandle::on_abort
#[derive(Clone)]
pub struct WorkUnitHandle {
    id: UnitId,
    kind: HandleKind,
}

impl WorkUnitHandle {
    pub(crate) fn live(unit: &WorkUnit) -> Self {
        Self {
            id: unit.id(),
            kind: HandleKind::Live(unit.callbacks()),
        }
    }

    pub fn null() -> Self {
        Self {
            id: UnitId(0),
            kind: HandleKind::Null,
        }
    }

    pub fn passthrough() -> Self {
        Self {
            id: UnitId(0),
            kind: HandleKind::Passthrough,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn is_live(&self) -> bool {
        matches!(self.kind, HandleKind::Live(_))
    }

    /// Registers the work to run when the budget allows. On a
    /// passthrough handle the callback is invoked here, synchronously,
    /// with zero elapsed time.
    pub fn on_work(&self, callback: impl FnMut(f64, &WorkUnitHandle) + 'static) {
        match &self.kind {
            HandleKind::Null => {}
            HandleKind::Passthrough => {
                let mut callback = callback;
                callback(0.0, self);
            }
            HandleKind::Live(block) => {
                block.borrow_mut().work = Some(Box::new(callback));
            }
        }
    }

    /// Registers a callback fired if the unit is aborted before it runs.
    pub fn on_abort(&self, callback: impl FnOnce() + 'static) {
        if let HandleKind::Live(block) = &self.kind {
            block.borrow_mut().abort = Some(Box::new(callback));
        }
    }

    /// Whether a work callback is currently bound. False once the
    /// callback has fired, since firing consumes it.
    pub fn has_work_callback(&self) -> bool {
        match &self.kind {
            HandleKind::Live(block) => block.borrow().work.is_some(),
            _ => false,
        }
    }

    pub fn has_abort_callback(&self) -> bool {
        match &self.kind {
            HandleKind::Live(block) => block.borrow().abort.is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WorkUnitHandle;
    use crate::options::WorkOptions;
    use crate::unit::WorkUnit;
    use foundation::ids::UnitId;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn passthrough_fires_synchronously_with_zero_elapsed() {
        let fired = Rc::new(Cell::new(false));
        let handle = WorkUnitHandle::passthrough();
        let seen = Rc::clone(&fired);
        handle.on_work(move |elapsed, _handle| {
            assert_eq!(elapsed, 0.0);
            seen.set(true);
        });
        assert!(fired.get());
    }

    #[test]
    fn null_handle_never_fires() {
        let handle = WorkUnitHandle::null();
        handle.on_work(|_, _| panic!("null handle must not fire"));
        handle.on_abort(|| panic!("null handle must not fire"));
        assert!(!handle.is_live());
    }

    #[test]
    fn live_handle_stores_callbacks_on_the_unit() {
        let unit = WorkUnit::new(UnitId(9), WorkOptions::default(), 0.0);
        let handle = WorkUnitHandle::live(&unit);
        assert!(handle.is_live());
        assert_eq!(handle.id(), UnitId(9));

        assert!(!handle.has_work_callback());
        handle.on_work(|_, _| {});
        handle.on_abort(|| {});
        assert!(handle.has_work_callback());
        assert!(handle.has_abort_callback());
        let block = unit.callbacks();
        assert!(block.borrow().work.is_some());
        assert!(block.borrow().abort.is_some());
    }
}
