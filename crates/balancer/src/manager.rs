use std::cell::{Cell, RefCell};
use std::rc::Rc;

use foundation::clock::SharedClock;
use foundation::ids::UnitId;
use slicer::SlicerRegistry;
use tracing::{debug, error, trace};

use crate::config::{BalancerConfig, ConfigError, EscalationConfig};
use crate::driver::FrameDriver;
use crate::group::WorkGroup;
use crate::handle::WorkUnitHandle;
use crate::modifier::{BudgetExceededKind, FrameBudgetEscalationModifier, Modifier, ModifierManager};
use crate::options::WorkOptions;
use crate::unit::WorkUnit;

/// Slicer domain tracking the whole frame's budget. Group domains are
/// prefixed with `group:` so a group id can never collide with this.
pub const FRAME_DOMAIN: &str = "frame";

type BeforeWorkFn = Box<dyn FnMut(f64)>;

struct ManagerState {
    clock: SharedClock,
    config: BalancerConfig,
    /// Sorted ascending by effective group priority at the start of
    /// each cycle.
    groups: Vec<WorkGroup>,
    /// Shared with the built-in escalation modifier so tuning changes
    /// reach it without re-registering.
    escalation: Rc<Cell<EscalationConfig>>,
    modifiers: ModifierManager,
    driver: FrameDriver,
    registry: SlicerRegistry,
    is_doing_work: bool,
    pending_reset: bool,
    /// Number of queued units that still have work to do.
    total_work_count: usize,
    next_unit_id: u64,
    cycle_counter: u64,
    last_cycle_timestamp: f64,
    before_work: Vec<BeforeWorkFn>,
}

/// The work balancer. Cheap to clone; clones share one scheduler, which
/// is what lets work callbacks schedule follow-on work through a clone
/// they captured.
///
/// Single-threaded by construction. The embedding calls [`tick`] once
/// per frame; everything else happens from user code between or inside
/// ticks.
///
/// [`tick`]: Manager::tick
#[derive(Clone)]
pub struct Manager {
    state: Rc<RefCell<ManagerState>>,
}

impl Manager {
    pub fn new(clock: SharedClock) -> Self {
        Self::from_validated(clock, BalancerConfig::default())
    }

    pub fn with_config(clock: SharedClock, config: BalancerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_validated(clock, config))
    }

    fn from_validated(clock: SharedClock, mut config: BalancerConfig) -> Self {
        config.ensure_default_group();

        let groups = config
            .groups
            .iter()
            .map(|def| WorkGroup::new(def.clone()))
            .collect();

        let escalation = Rc::new(Cell::new(config.escalation));
        let mut modifiers = ModifierManager::default();
        modifiers.add_budget_modifier(Box::new(FrameBudgetEscalationModifier::shared(
            Rc::clone(&clock),
            Rc::clone(&escalation),
        )));

        let now = clock.now();
        let registry = SlicerRegistry::new(Rc::clone(&clock));
        Self {
            state: Rc::new(RefCell::new(ManagerState {
                clock,
                config,
                groups,
                escalation,
                modifiers,
                driver: FrameDriver::default(),
                registry,
                is_doing_work: false,
                pending_reset: false,
                total_work_count: 0,
                next_unit_id: 1,
                cycle_counter: 0,
                last_cycle_timestamp: now,
                before_work: Vec::new(),
            })),
        }
    }

    /// Queues work into the named group and returns a handle to bind
    /// callbacks on.
    ///
    /// While the balancer is disabled this returns a passthrough handle:
    /// the work callback runs inline the moment it is registered, and
    /// nothing is queued. An unknown group id returns a null handle that
    /// never fires anything.
    pub fn schedule_work(&self, group_id: &str, options: WorkOptions) -> WorkUnitHandle {
        let mut s = self.state.borrow_mut();
        if !s.config.enabled {
            return WorkUnitHandle::passthrough();
        }
        let Some(index) = s.groups.iter().position(|g| g.id() == group_id) else {
            error!(group_id, "cannot schedule work, no such work group");
            return WorkUnitHandle::null();
        };

        let id = UnitId(s.next_unit_id);
        s.next_unit_id += 1;
        let now = s.clock.now();
        let mut unit = WorkUnit::new(id, options, now);
        if options.defer_to_next_frame && s.is_doing_work {
            unit.deferred_in_cycle = Some(s.cycle_counter);
        }
        let handle = WorkUnitHandle::live(&unit);
        s.groups[index].insert(unit);
        s.total_work_count += 1;
        trace!(
            group_id,
            unit = id.0,
            priority = options.priority,
            total = s.total_work_count,
            "work scheduled"
        );
        let total = s.total_work_count;
        s.modifiers.notify_work_scheduled(total);
        s.driver.start();
        handle
    }

    /// [`schedule_work`] into the [`DEFAULT_GROUP`].
    ///
    /// [`schedule_work`]: Manager::schedule_work
    /// [`DEFAULT_GROUP`]: crate::config::DEFAULT_GROUP
    pub fn schedule_default_work(&self, options: WorkOptions) -> WorkUnitHandle {
        self.schedule_work(crate::config::DEFAULT_GROUP, options)
    }

    /// Aborts a queued unit. Its abort callback fires (once), its work
    /// callback never will. Aborting a unit that already ran or was
    /// already aborted is a silent no-op, so callers can abort
    /// unconditionally on teardown.
    ///
    /// The unit stays in its queue, still counted by
    /// [`total_work_count`], until the next work cycle sweeps it.
    ///
    /// [`total_work_count`]: Manager::total_work_count
    pub fn abort_work_unit(&self, handle: &WorkUnitHandle) {
        if !handle.is_live() {
            return;
        }
        let abort;
        {
            let mut s = self.state.borrow_mut();
            let id = handle.id();
            let found = s.groups.iter().enumerate().find_map(|(gi, group)| {
                group
                    .queue
                    .iter()
                    .position(|u| u.id() == id)
                    .map(|ui| (gi, ui))
            });
            let Some((gi, ui)) = found else {
                return;
            };
            if !s.groups[gi].queue[ui].has_work() {
                return;
            }
            s.groups[gi].queue[ui].mark_aborted();
            abort = s.groups[gi].queue[ui].callbacks().borrow_mut().abort.take();
            trace!(unit = id.0, "work aborted");
        }
        if let Some(abort) = abort {
            abort();
        }
    }

    /// Registers a listener invoked at the start of every work cycle
    /// with the seconds elapsed since the previous cycle. Listeners may
    /// schedule work; units scheduled here are eligible in the same
    /// cycle unless they ask to defer.
    pub fn on_before_work(&self, listener: impl FnMut(f64) + 'static) {
        self.state.borrow_mut().before_work.push(Box::new(listener));
    }

    /// Consumes a pending driver tick and runs one work cycle. Call
    /// once per frame; calls with no tick pending do nothing.
    pub fn tick(&self) {
        let should_run = self.state.borrow_mut().driver.take_tick();
        if should_run {
            self.do_work();
        }
    }

    /// Runs one work cycle immediately. Re-entrant calls (from inside a
    /// work callback) are no-ops.
    pub fn do_work(&self) {
        {
            let mut s = self.state.borrow_mut();
            if s.is_doing_work || !s.config.enabled {
                return;
            }
            let now = s.clock.now();
            if s.config.frame_interval > 0.0
                && now - s.last_cycle_timestamp < s.config.frame_interval
            {
                // Not yet time for another cycle; stay armed so the
                // queued work is not forgotten.
                if s.total_work_count > 0 {
                    s.driver.start();
                }
                return;
            }
            s.is_doing_work = true;
            s.cycle_counter += 1;

            // Pipe the global time budget through the registered budget
            // modifiers, then open this cycle's accounting window.
            let mut frame_budget = s.config.frame_budget;
            s.modifiers.process_budget_modifiers(&mut frame_budget);
            let count_budget = s.config.work_unit_count_budget;
            s.registry
                .get_mut(FRAME_DOMAIN)
                .configure_time_budget(frame_budget)
                .configure_work_unit_count_budget(count_budget);
            s.registry.get_mut(FRAME_DOMAIN).reset();
            trace!(
                cycle = s.cycle_counter,
                frame_budget,
                count_budget,
                backlog = s.total_work_count,
                "work cycle started"
            );
        }

        self.broadcast_before_work();

        {
            let mut s = self.state.borrow_mut();
            s.groups.sort_by_key(|g| g.effective_priority());
            s.last_cycle_timestamp = s.clock.now();
        }

        let group_count = self.state.borrow().groups.len();
        for index in 0..group_count {
            if self.state.borrow().pending_reset {
                break;
            }
            if !self.run_group(index) {
                break;
            }
        }

        {
            let mut s = self.state.borrow_mut();
            s.is_doing_work = false;
        }
        let reset_requested = {
            let mut s = self.state.borrow_mut();
            std::mem::take(&mut s.pending_reset)
        };
        if reset_requested {
            self.reset_now();
        }
        let mut s = self.state.borrow_mut();
        if s.total_work_count > 0 {
            s.driver.start();
        }
    }

    /// Drops all queued work. Every live unit's abort callback fires.
    /// Group definitions survive, so the manager is immediately
    /// reusable. Called mid-cycle, the reset is deferred to the end of
    /// the current cycle.
    pub fn reset(&self) {
        {
            let mut s = self.state.borrow_mut();
            if s.is_doing_work {
                s.pending_reset = true;
                return;
            }
        }
        self.reset_now();
    }

    pub fn total_work_count(&self) -> usize {
        self.state.borrow().total_work_count
    }

    pub fn is_doing_work(&self) -> bool {
        self.state.borrow().is_doing_work
    }

    pub fn valid_group_names(&self) -> Vec<String> {
        self.state
            .borrow()
            .groups
            .iter()
            .map(|g| g.id().to_owned())
            .collect()
    }

    pub fn config(&self) -> BalancerConfig {
        self.state.borrow().config.clone()
    }

    /// Disabling flips future scheduling to passthrough; already queued
    /// work stays queued until re-enabled.
    pub fn set_enabled(&self, enabled: bool) {
        self.state.borrow_mut().config.enabled = enabled;
    }

    pub fn set_frame_budget(&self, seconds: f64) {
        self.state.borrow_mut().config.frame_budget = seconds;
    }

    pub fn set_frame_interval(&self, seconds: f64) {
        self.state.borrow_mut().config.frame_interval = seconds;
    }

    pub fn set_work_unit_count_budget(&self, count: i32) {
        self.state.borrow_mut().config.work_unit_count_budget = count;
    }

    /// Retunes the built-in budget escalation. The installed modifier
    /// picks the new values up on its next update, so this is safe to
    /// call while work is queued.
    pub fn set_escalation_config(&self, config: EscalationConfig) {
        let mut s = self.state.borrow_mut();
        s.config.escalation = config;
        s.escalation.set(config);
    }

    pub fn add_budget_modifier(&self, modifier: Box<dyn Modifier>) {
        self.state.borrow_mut().modifiers.add_budget_modifier(modifier);
    }

    pub fn add_priority_modifier(&self, modifier: Box<dyn Modifier>) {
        self.state
            .borrow_mut()
            .modifiers
            .add_priority_modifier(modifier);
    }

    fn broadcast_before_work(&self) {
        let (mut listeners, elapsed) = {
            let mut s = self.state.borrow_mut();
            let elapsed = s.clock.now() - s.last_cycle_timestamp;
            (std::mem::take(&mut s.before_work), elapsed)
        };
        for listener in &mut listeners {
            listener(elapsed);
        }
        // Listeners registered during the broadcast landed in the state
        // vec; keep the earlier listeners ahead of them.
        let mut s = self.state.borrow_mut();
        listeners.extend(s.before_work.drain(..));
        s.before_work = listeners;
    }

    /// Runs (or skips) the group at `index` for this cycle. Returns
    /// `false` once the whole frame's budget is gone: the first group
    /// cut off takes the skip escalation, and every group after it
    /// waits for the next cycle without escalating.
    fn run_group(&self, index: usize) -> bool {
        let entry = {
            let mut s = self.state.borrow_mut();
            if s.groups[index].is_empty() {
                return true;
            }
            let frame = s.registry.get_mut(FRAME_DOMAIN);
            let time_cut = frame.has_frame_budget_been_exceeded();
            let count_cut = frame.has_work_unit_count_budget_been_exceeded();
            if count_cut || time_cut {
                let kind = if count_cut {
                    BudgetExceededKind::UnitCount
                } else {
                    BudgetExceededKind::FrameTime
                };
                let group = &mut s.groups[index];
                group.num_skipped_frames += 1;
                group.priority_offset += group.def.skip_priority_delta;
                debug!(
                    group = group.id(),
                    skipped = group.num_skipped_frames,
                    offset = group.priority_offset,
                    ?kind,
                    "work cycle cut off at group"
                );
                let remaining = s.total_work_count;
                s.modifiers.notify_work_deferred(remaining);
                s.modifiers.notify_budget_exceeded(kind, remaining);
                return false;
            }

            // Group window: its own budget clamped to what is left of
            // the global one. Negative means unconstrained.
            let remaining_global = s.registry.get_mut(FRAME_DOMAIN).remaining_time_in_budget();
            let def = &s.groups[index].def;
            let own = if def.max_frame_budget > 0.0 {
                def.max_frame_budget
            } else {
                f64::INFINITY
            };
            let window = own.min(remaining_global.max(0.0));
            let time_budget = if window.is_finite() { window } else { -1.0 };
            let count_budget = def.max_work_units_per_frame;
            let domain = format!("group:{}", def.id);
            s.registry
                .get_mut(&domain)
                .configure_time_budget(time_budget)
                .configure_work_unit_count_budget(count_budget);
            s.registry.get_mut(&domain).reset();
            domain
        };

        let executed = self.run_group_units(index, &entry);
        if executed > 0 {
            let mut s = self.state.borrow_mut();
            let avg = s
                .registry
                .get_mut(&entry)
                .average_unit_duration();
            let group = &mut s.groups[index];
            group.average_unit_time = avg;
            // The group earned a turn; its starvation escalation resets.
            group.num_skipped_frames = 0;
            group.priority_offset = 0;
        }
        true
    }

    /// Index loop over the group's queue, re-reading the length every
    /// pass: work callbacks may schedule into this very group, and the
    /// new units are eligible as soon as the index reaches them.
    fn run_group_units(&self, index: usize, domain: &str) -> usize {
        let mut executed = 0usize;
        let mut i = 0usize;
        loop {
            let (elapsed, work, handle) = {
                let mut s = self.state.borrow_mut();
                if s.pending_reset {
                    break;
                }
                let cycle = s.cycle_counter;
                let now = s.clock.now();
                let group = &mut s.groups[index];
                if i >= group.queue.len() {
                    break;
                }
                // Sweep aborted units as we meet them. Aborts leave the
                // unit in place and counted; this is where it leaves
                // the books.
                if !group.queue[i].has_work() {
                    let dead = group.queue.remove(i);
                    if dead.options().max_delay > 0.0 {
                        group.num_work_units_with_max_delay -= 1;
                    }
                    s.total_work_count -= 1;
                    continue;
                }
                if group.queue[i].deferred_in_cycle == Some(cycle) {
                    i += 1;
                    continue;
                }

                // A unit that has waited past its max_delay overrides
                // the time cutoff. It never overrides the count cutoff,
                // and never reopens a frame whose budget was already
                // gone before the group started.
                let unit = &group.queue[i];
                let aged = unit.options().max_delay > 0.0
                    && now - unit.scheduled_timestamp() >= unit.options().max_delay;

                let group_slicer = s.registry.get_mut(domain);
                let g_time = group_slicer.has_frame_budget_been_exceeded();
                let g_count = group_slicer.has_work_unit_count_budget_been_exceeded();
                let frame_slicer = s.registry.get_mut(FRAME_DOMAIN);
                let f_time = frame_slicer.has_frame_budget_been_exceeded();
                let f_count = frame_slicer.has_work_unit_count_budget_been_exceeded();

                if g_count || f_count {
                    let remaining = s.total_work_count;
                    s.modifiers.notify_work_deferred(remaining);
                    s.modifiers
                        .notify_budget_exceeded(BudgetExceededKind::UnitCount, remaining);
                    break;
                }
                if (g_time || f_time) && !aged {
                    let remaining = s.total_work_count;
                    s.modifiers.notify_work_deferred(remaining);
                    s.modifiers
                        .notify_budget_exceeded(BudgetExceededKind::FrameTime, remaining);
                    break;
                }

                s.registry.get_mut(FRAME_DOMAIN).start_work();
                s.registry.get_mut(domain).start_work();

                let group = &mut s.groups[index];
                let unit = &mut group.queue[i];
                let elapsed = now - unit.scheduled_timestamp();
                // Completed before the callback runs: delivery is
                // exactly-once even if the callback panics or aborts us.
                unit.mark_completed();
                let work = unit.callbacks().borrow_mut().work.take();
                let handle = WorkUnitHandle::live(unit);
                s.total_work_count -= 1;
                (elapsed, work, handle)
            };

            if let Some(mut work) = work {
                work(elapsed, &handle);
            }

            {
                let mut s = self.state.borrow_mut();
                s.registry.get_mut(domain).end_work();
                s.registry.get_mut(FRAME_DOMAIN).end_work();
                let remaining = s.total_work_count;
                s.modifiers.notify_work_complete(remaining);
                // Re-locate by id: reentrant scheduling may have moved
                // the unit since we released the state.
                let id = handle.id();
                let group = &mut s.groups[index];
                if let Some(pos) = group.queue.iter().position(|u| u.id() == id) {
                    let done = group.queue.remove(pos);
                    if done.options().max_delay > 0.0 {
                        group.num_work_units_with_max_delay -= 1;
                    }
                }
            }
            executed += 1;
        }
        executed
    }

    fn reset_now(&self) {
        let aborts = {
            let mut s = self.state.borrow_mut();
            let mut aborts = Vec::new();
            for group in &mut s.groups {
                for unit in &mut group.queue {
                    if unit.has_work() {
                        unit.mark_aborted();
                        if let Some(abort) = unit.callbacks().borrow_mut().abort.take() {
                            aborts.push(abort);
                        }
                    }
                }
                group.queue.clear();
                group.num_work_units_with_max_delay = 0;
                group.num_skipped_frames = 0;
                group.priority_offset = 0;
            }
            s.total_work_count = 0;
            s.driver.stop();
            s.before_work.clear();
            debug!(aborted = aborts.len(), "balancer reset");
            aborts
        };
        for abort in aborts {
            abort();
        }
    }
}
