use foundation::clock::SharedClock;

/// Number of recent unit durations kept for telemetry, and the window of
/// the exponential moving average folded over them.
pub const TELEMETRY_WINDOW: usize = 5;

/// Per-domain time and unit-count budget accounting.
///
/// A slicer answers one question: has this domain's allowance been
/// exceeded since its last reset. It knows nothing about the work being
/// measured; callers bracket each unit with [`start_work`]/[`end_work`]
/// and consult the `has_*` predicates between units.
///
/// Budget conventions:
/// - time budget `< 0`: unconstrained (never exceeded by time);
///   `0` is a valid, immediately-exhausted window.
/// - unit-count budget `<= 0`: unconstrained.
///
/// [`start_work`]: TimeSlicer::start_work
/// [`end_work`]: TimeSlicer::end_work
pub struct TimeSlicer {
    clock: SharedClock,
    frame_time_budget: f64,
    work_unit_count_budget: i32,
    cycle_work_units_completed: u32,
    cycle_last_timestamp: f64,
    last_reset_timestamp: f64,
    // telemetry
    unit_durations: [f64; TELEMETRY_WINDOW],
    units_recorded: u32,
    average_unit_duration: f64,
}

impl TimeSlicer {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            frame_time_budget: -1.0,
            work_unit_count_budget: -1,
            cycle_work_units_completed: 0,
            cycle_last_timestamp: 0.0,
            last_reset_timestamp: 0.0,
            unit_durations: [0.0; TELEMETRY_WINDOW],
            units_recorded: 0,
            average_unit_duration: 0.0,
        }
    }

    /// Builder-style setter so budgets read as
    /// `slicer.configure_time_budget(b).configure_work_unit_count_budget(n).reset()`.
    pub fn configure_time_budget(&mut self, seconds: f64) -> &mut Self {
        self.frame_time_budget = seconds;
        self
    }

    pub fn configure_work_unit_count_budget(&mut self, count: i32) -> &mut Self {
        self.work_unit_count_budget = count;
        self
    }

    /// Starts a fresh accounting window at the current time.
    pub fn reset(&mut self) {
        self.cycle_work_units_completed = 0;
        self.last_reset_timestamp = self.clock.now();
    }

    /// Marks the start of one unit's execution.
    pub fn start_work(&mut self) {
        self.cycle_last_timestamp = self.clock.now();
    }

    /// Marks the end of one unit's execution, counting it against the
    /// unit-count budget and folding its duration into the telemetry.
    pub fn end_work(&mut self) {
        self.cycle_work_units_completed += 1;
        let duration = self.clock.now() - self.cycle_last_timestamp;
        self.record_telemetry(duration);
    }

    pub fn has_frame_budget_been_exceeded(&self) -> bool {
        self.frame_time_budget >= 0.0
            && self.clock.now() >= self.last_reset_timestamp + self.frame_time_budget
    }

    pub fn has_work_unit_count_budget_been_exceeded(&self) -> bool {
        self.work_unit_count_budget > 0
            && self.cycle_work_units_completed >= self.work_unit_count_budget as u32
    }

    pub fn has_budget_been_exceeded(&self) -> bool {
        self.has_work_unit_count_budget_been_exceeded() || self.has_frame_budget_been_exceeded()
    }

    /// Seconds left in the current window; `f64::INFINITY` when the time
    /// budget is unconstrained. May be negative once the window is blown.
    pub fn remaining_time_in_budget(&self) -> f64 {
        if self.frame_time_budget < 0.0 {
            return f64::INFINITY;
        }
        self.last_reset_timestamp + self.frame_time_budget - self.clock.now()
    }

    pub fn frame_time_budget(&self) -> f64 {
        self.frame_time_budget
    }

    pub fn work_unit_count_budget(&self) -> i32 {
        self.work_unit_count_budget
    }

    pub fn cycle_work_units_completed(&self) -> u32 {
        self.cycle_work_units_completed
    }

    pub fn last_reset_timestamp(&self) -> f64 {
        self.last_reset_timestamp
    }

    /// Exponentially weighted average of recent unit durations.
    pub fn average_unit_duration(&self) -> f64 {
        self.average_unit_duration
    }

    /// The most recent unit durations, oldest slot first once the ring
    /// has wrapped.
    pub fn recent_unit_durations(&self) -> &[f64] {
        let len = (self.units_recorded as usize).min(TELEMETRY_WINDOW);
        &self.unit_durations[..len]
    }

    fn record_telemetry(&mut self, duration: f64) {
        let capacity = TELEMETRY_WINDOW as f64;
        let new_weight = 1.0 / capacity;
        let past_weight = (capacity - 1.0) / capacity;
        self.average_unit_duration = new_weight * duration + past_weight * self.average_unit_duration;
        self.unit_durations[self.units_recorded as usize % TELEMETRY_WINDOW] = duration;
        self.units_recorded += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{TELEMETRY_WINDOW, TimeSlicer};
    use foundation::clock::ManualClock;
    use std::rc::Rc;

    fn slicer_at(start: f64) -> (ManualClock, TimeSlicer) {
        let clock = ManualClock::starting_at(start);
        let slicer = TimeSlicer::new(Rc::new(clock.clone()));
        (clock, slicer)
    }

    #[test]
    fn unconstrained_by_default() {
        let (clock, mut slicer) = slicer_at(100.0);
        slicer.reset();
        clock.advance(1e6);
        assert!(!slicer.has_budget_been_exceeded());
        assert_eq!(slicer.remaining_time_in_budget(), f64::INFINITY);
    }

    #[test]
    fn zero_time_budget_is_immediately_exhausted() {
        let (_clock, mut slicer) = slicer_at(5.0);
        slicer.configure_time_budget(0.0).reset();
        assert!(slicer.has_frame_budget_been_exceeded());
    }

    #[test]
    fn time_budget_window_tracks_reset() {
        let (clock, mut slicer) = slicer_at(0.0);
        slicer.configure_time_budget(0.5).reset();
        clock.advance(0.4);
        assert!(!slicer.has_frame_budget_been_exceeded());
        clock.advance(0.1);
        assert!(slicer.has_frame_budget_been_exceeded());
        slicer.reset();
        assert!(!slicer.has_frame_budget_been_exceeded());
    }

    #[test]
    fn count_budget_counts_completed_units() {
        let (_clock, mut slicer) = slicer_at(0.0);
        slicer.configure_work_unit_count_budget(2).reset();
        for _ in 0..2 {
            assert!(!slicer.has_work_unit_count_budget_been_exceeded());
            slicer.start_work();
            slicer.end_work();
        }
        assert!(slicer.has_work_unit_count_budget_been_exceeded());
        slicer.reset();
        assert!(!slicer.has_work_unit_count_budget_been_exceeded());
    }

    #[test]
    fn non_positive_count_budget_is_unconstrained() {
        let (_clock, mut slicer) = slicer_at(0.0);
        slicer.configure_work_unit_count_budget(0).reset();
        for _ in 0..10 {
            slicer.start_work();
            slicer.end_work();
        }
        assert!(!slicer.has_work_unit_count_budget_been_exceeded());
    }

    #[test]
    fn telemetry_folds_durations_into_average() {
        let (clock, mut slicer) = slicer_at(0.0);
        slicer.reset();
        slicer.start_work();
        clock.advance(1.0);
        slicer.end_work();
        // First sample: 1/5 of the duration.
        assert!((slicer.average_unit_duration() - 0.2).abs() < 1e-9);
        slicer.start_work();
        clock.advance(1.0);
        slicer.end_work();
        // Second sample: 0.2 * 1.0 + 0.8 * 0.2.
        assert!((slicer.average_unit_duration() - 0.36).abs() < 1e-9);
        assert_eq!(slicer.recent_unit_durations().len(), 2);
    }

    #[test]
    fn telemetry_ring_wraps() {
        let (clock, mut slicer) = slicer_at(0.0);
        slicer.reset();
        for _ in 0..TELEMETRY_WINDOW + 2 {
            slicer.start_work();
            clock.advance(0.01);
            slicer.end_work();
        }
        assert_eq!(slicer.recent_unit_durations().len(), TELEMETRY_WINDOW);
    }
}
