use serde::{Deserialize, Serialize};

use crate::unit::WorkUnit;

/// Static description of a work group, loadable from configuration.
///
/// Groups partition scheduled work: each group has its own priority,
/// its own optional budgets, and its own skip behavior. Group ids are
/// unique within one manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkGroupDefinition {
    pub id: String,
    /// Priority of this group relative to other groups. Smaller values
    /// run earlier in the cycle.
    pub priority: i32,
    /// Per-frame time budget in seconds for this group alone. `<= 0`
    /// leaves the group constrained only by the global budget.
    pub max_frame_budget: f64,
    /// Per-frame cap on units executed from this group. `<= 0` means
    /// no cap.
    pub max_work_units_per_frame: i32,
    /// Whether this group may be skipped when the frame runs out of
    /// budget before reaching it.
    pub can_skip_frame: bool,
    /// Skip this group whenever it is not the first group of the frame.
    pub skip_unless_first_in_frame: bool,
    /// Cap on consecutive skipped frames before the group must run.
    /// `<= 0` means no cap.
    pub max_num_skipped_frames: i32,
    /// Keep skipping until `max_num_skipped_frames` is reached even
    /// when budget would allow the group to run.
    pub always_skip_until_max: bool,
    /// Added to the group's priority offset each time it is skipped,
    /// so starved groups climb toward the front of the cycle.
    pub skip_priority_delta: i32,
}

impl Default for WorkGroupDefinition {
    fn default() -> Self {
        Self {
            id: String::new(),
            priority: 0,
            max_frame_budget: -1.0,
            max_work_units_per_frame: -1,
            can_skip_frame: true,
            skip_unless_first_in_frame: false,
            max_num_skipped_frames: 0,
            always_skip_until_max: false,
            skip_priority_delta: 0,
        }
    }
}

impl WorkGroupDefinition {
    pub fn named(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}

/// Runtime state of one group: its definition plus the queue of
/// pending units and the skip bookkeeping the cycle maintains.
pub struct WorkGroup {
    pub(crate) def: WorkGroupDefinition,
    /// Sorted ascending by effective unit priority; equal priorities
    /// keep insertion order.
    pub(crate) queue: Vec<WorkUnit>,
    pub(crate) num_work_units_with_max_delay: usize,
    /// Accumulated skip escalation, folded into the group's effective
    /// priority and reset to zero once the group earns a turn.
    pub(crate) priority_offset: i32,
    pub(crate) num_skipped_frames: i32,
    /// EMA of this group's unit durations, fed by the group slicer.
    pub(crate) average_unit_time: f64,
}

impl WorkGroup {
    pub(crate) fn new(def: WorkGroupDefinition) -> Self {
        Self {
            def,
            queue: Vec::new(),
            num_work_units_with_max_delay: 0,
            priority_offset: 0,
            num_skipped_frames: 0,
            average_unit_time: 0.0,
        }
    }

    pub fn id(&self) -> &str {
        &self.def.id
    }

    pub fn effective_priority(&self) -> i32 {
        self.def.priority + self.priority_offset
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Inserts preserving the priority sort. Units land behind queued
    /// units of equal priority, or ahead of them when the unit asks for
    /// `add_to_front`.
    pub(crate) fn insert(&mut self, unit: WorkUnit) {
        let priority = unit.effective_priority();
        let index = if unit.options().add_to_front {
            self.queue
                .partition_point(|queued| queued.effective_priority() < priority)
        } else {
            self.queue
                .partition_point(|queued| queued.effective_priority() <= priority)
        };
        if unit.options().max_delay > 0.0 {
            self.num_work_units_with_max_delay += 1;
        }
        self.queue.insert(index, unit);
    }
}
