use std::cell::Cell;
use std::rc::Rc;

use foundation::clock::SharedClock;
use tracing::trace;

use crate::config::EscalationConfig;

/// Which budget ran out when a cycle was cut short.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BudgetExceededKind {
    FrameTime,
    UnitCount,
}

/// Hook points for adjusting budgets and observing scheduling events.
///
/// Every method has an empty default so implementors override only
/// what they care about. `modify_value` is the active hook: budget
/// modifiers get the frame budget piped through it in registration
/// order before each cycle. The `on_*` notifications are passive and
/// delivered to budget and priority modifiers alike.
pub trait Modifier {
    fn modify_value(&mut self, _value: &mut f64) {}
    fn on_work_scheduled(&mut self, _total_num_work_instances: usize) {}
    fn on_work_complete(&mut self, _remaining_num_work_instances: usize) {}
    fn on_work_deferred(&mut self, _remaining_num_work_instances: usize) {}
    fn on_budget_exceeded(&mut self, _kind: BudgetExceededKind, _remaining: usize) {}
}

/// Owns the registered modifiers and fans notifications out to them.
#[derive(Default)]
pub struct ModifierManager {
    budget_modifiers: Vec<Box<dyn Modifier>>,
    priority_modifiers: Vec<Box<dyn Modifier>>,
}

impl ModifierManager {
    pub fn add_budget_modifier(&mut self, modifier: Box<dyn Modifier>) {
        self.budget_modifiers.push(modifier);
    }

    pub fn add_priority_modifier(&mut self, modifier: Box<dyn Modifier>) {
        self.priority_modifiers.push(modifier);
    }

    /// Pipes `value` through the budget modifiers in registration order.
    pub fn process_budget_modifiers(&mut self, value: &mut f64) {
        for modifier in &mut self.budget_modifiers {
            modifier.modify_value(value);
        }
    }

    pub fn process_priority_modifiers(&mut self, value: &mut f64) {
        for modifier in &mut self.priority_modifiers {
            modifier.modify_value(value);
        }
    }

    pub fn notify_work_scheduled(&mut self, total: usize) {
        for modifier in self.all_mut() {
            modifier.on_work_scheduled(total);
        }
    }

    pub fn notify_work_complete(&mut self, remaining: usize) {
        for modifier in self.all_mut() {
            modifier.on_work_complete(remaining);
        }
    }

    pub fn notify_work_deferred(&mut self, remaining: usize) {
        for modifier in self.all_mut() {
            modifier.on_work_deferred(remaining);
        }
    }

    pub fn notify_budget_exceeded(&mut self, kind: BudgetExceededKind, remaining: usize) {
        for modifier in self.all_mut() {
            modifier.on_budget_exceeded(kind, remaining);
        }
    }

    fn all_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Modifier>> {
        self.budget_modifiers
            .iter_mut()
            .chain(self.priority_modifiers.iter_mut())
    }
}

/// Grows the frame budget while the backlog stays above a threshold.
///
/// The scalar ramps from 0 toward `max_scalar` over `ramp_seconds`
/// whenever the number of live work instances exceeds
/// `count_threshold`, and decays back toward 0 over `decay_seconds`
/// otherwise. The budget it is applied to becomes
/// `budget + budget * scalar`, so a fully ramped scalar of 0.5 turns a
/// 10ms budget into 15ms until the backlog drains.
///
/// The tunables live in a shared cell and are re-read on every update,
/// so whoever holds the other end of the cell can retune the ramp
/// while the modifier is installed.
pub struct FrameBudgetEscalationModifier {
    clock: SharedClock,
    config: Rc<Cell<EscalationConfig>>,
    escalation_scalar: f64,
    last_update_timestamp: f64,
    total_num_work_instances: usize,
}

impl FrameBudgetEscalationModifier {
    pub fn new(clock: SharedClock, config: EscalationConfig) -> Self {
        Self::shared(clock, Rc::new(Cell::new(config)))
    }

    pub fn shared(clock: SharedClock, config: Rc<Cell<EscalationConfig>>) -> Self {
        let now = clock.now();
        Self {
            clock,
            config,
            escalation_scalar: 0.0,
            last_update_timestamp: now,
            total_num_work_instances: 0,
        }
    }

    pub fn escalation_scalar(&self) -> f64 {
        self.escalation_scalar
    }

    fn update_scalar(&mut self) {
        let now = self.clock.now();
        let dt = (now - self.last_update_timestamp).max(0.0);
        self.last_update_timestamp = now;

        let config = self.config.get();
        let previous = self.escalation_scalar;
        if self.total_num_work_instances > config.count_threshold {
            self.escalation_scalar = if config.ramp_seconds > 0.0 {
                (previous + config.max_scalar / config.ramp_seconds * dt).min(config.max_scalar)
            } else {
                config.max_scalar
            };
        } else {
            self.escalation_scalar = if config.decay_seconds > 0.0 {
                (previous - config.max_scalar / config.decay_seconds * dt).max(0.0)
            } else {
                0.0
            };
        }

        if self.escalation_scalar != previous {
            trace!(
                scalar = self.escalation_scalar,
                instances = self.total_num_work_instances,
                "escalation scalar updated"
            );
        }
    }
}

impl Modifier for FrameBudgetEscalationModifier {
    fn modify_value(&mut self, value: &mut f64) {
        self.update_scalar();
        // A negative budget means unconstrained; scaling it would
        // shrink an already-infinite window, so leave it alone.
        if *value >= 0.0 {
            *value += *value * self.escalation_scalar;
        }
    }

    fn on_work_scheduled(&mut self, total_num_work_instances: usize) {
        self.total_num_work_instances = total_num_work_instances;
    }

    fn on_work_complete(&mut self, remaining_num_work_instances: usize) {
        self.total_num_work_instances = remaining_num_work_instances;
    }
}

/// Multiplies the frame budget by a fixed scale. Useful to globally
/// loosen or tighten the balancer from one knob.
pub struct ScaleBudgetModifier {
    scale: f64,
}

impl ScaleBudgetModifier {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }
}

impl Modifier for ScaleBudgetModifier {
    fn modify_value(&mut self, value: &mut f64) {
        if *value >= 0.0 {
            *value *= self.scale;
        }
    }
}
