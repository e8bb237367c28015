use std::cell::RefCell;
use std::rc::Rc;

use foundation::ids::UnitId;

use crate::handle::WorkUnitHandle;
use crate::options::WorkOptions;

/// The work callback receives the seconds elapsed since the unit was
/// scheduled and a handle to the unit itself, so it can compare
/// identities or schedule follow-on work.
pub type WorkFn = Box<dyn FnMut(f64, &WorkUnitHandle)>;
pub type AbortFn = Box<dyn FnOnce()>;

/// Callback slots shared between a [`WorkUnit`] and every
/// [`WorkUnitHandle`] pointing at it.
///
/// The block is reference counted because the handle's lifetime is not
/// tied to the unit's: a caller may still hold a handle after the unit
/// has completed and been removed from its queue. Callbacks are taken
/// out of their slot when fired, which makes delivery exactly-once and
/// turns late registration into a no-op in effect.
#[derive(Default)]
pub struct UnitCallbacks {
    pub(crate) work: Option<WorkFn>,
    pub(crate) abort: Option<AbortFn>,
}

pub(crate) type SharedCallbacks = Rc<RefCell<UnitCallbacks>>;

/// The stateful record of one scheduled unit of work. Internal to the
/// manager; callers interact through [`WorkUnitHandle`].
pub struct WorkUnit {
    id: UnitId,
    options: WorkOptions,
    scheduled_timestamp: f64,
    priority_offset: i32,
    callbacks: SharedCallbacks,
    has_completed_work: bool,
    is_aborted: bool,
    /// Set when scheduled mid-cycle with `defer_to_next_frame`; the
    /// cycle named here must not execute this unit.
    pub(crate) deferred_in_cycle: Option<u64>,
}

impl WorkUnit {
    pub(crate) fn new(id: UnitId, options: WorkOptions, scheduled_timestamp: f64) -> Self {
        Self {
            id,
            options,
            scheduled_timestamp,
            priority_offset: 0,
            callbacks: Rc::new(RefCell::new(UnitCallbacks::default())),
            has_completed_work: false,
            is_aborted: false,
            deferred_in_cycle: None,
        }
    }

    pub fn id(&self) -> UnitId {
        self.id
    }

    pub fn options(&self) -> &WorkOptions {
        &self.options
    }

    pub fn scheduled_timestamp(&self) -> f64 {
        self.scheduled_timestamp
    }

    /// Base priority plus any runtime adjustment.
    pub fn effective_priority(&self) -> i32 {
        self.options.priority + self.priority_offset
    }

    /// Whether this unit still needs to run. Completed and aborted units
    /// are dead weight, swept out of their queue on the next pass.
    pub fn has_work(&self) -> bool {
        !self.has_completed_work && !self.is_aborted
    }

    pub fn has_completed_work(&self) -> bool {
        self.has_completed_work
    }

    pub fn is_aborted(&self) -> bool {
        self.is_aborted
    }

    pub(crate) fn mark_completed(&mut self) {
        self.has_completed_work = true;
    }

    pub(crate) fn mark_aborted(&mut self) {
        self.is_aborted = true;
    }

    pub(crate) fn callbacks(&self) -> SharedCallbacks {
        Rc::clone(&self.callbacks)
    }
}

#[cfg(test)]
mod tests {
    use super::WorkUnit;
    use crate::options::WorkOptions;
    use foundation::ids::UnitId;

    #[test]
    fn fresh_unit_has_work() {
        let unit = WorkUnit::new(UnitId(1), WorkOptions::default(), 0.0);
        assert!(unit.has_work());
        assert!(!unit.has_completed_work());
        assert!(!unit.is_aborted());
    }

    #[test]
    fn terminal_flags_end_the_unit() {
        let mut unit = WorkUnit::new(UnitId(1), WorkOptions::default(), 0.0);
        unit.mark_completed();
        assert!(!unit.has_work());

        let mut unit = WorkUnit::new(UnitId(2), WorkOptions::default(), 0.0);
        unit.mark_aborted();
        assert!(!unit.has_work());
    }

    #[test]
    fn effective_priority_includes_offset() {
        let mut unit = WorkUnit::new(UnitId(1), WorkOptions::with_priority(5), 0.0);
        assert_eq!(unit.effective_priority(), 5);
        unit.priority_offset = -3;
        assert_eq!(unit.effective_priority(), 2);
    }
}
