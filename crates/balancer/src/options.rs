/// Per-unit scheduling options. Immutable once a unit is created.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WorkOptions {
    /// Priority of this unit within its group. Smaller values run
    /// earlier; this never lets a unit jump ahead of other groups.
    pub priority: i32,
    /// Maximum delay in seconds before this work must be done. Once a
    /// unit has waited longer than this, it runs even if the time budget
    /// is already blown. `<= 0` disables the override.
    pub max_delay: f64,
    /// Maximum number of frames this unit may be skipped. `<= 0` disables.
    pub max_num_skipped_frames: i32,
    /// Insert ahead of queued units with the same priority instead of
    /// behind them.
    pub add_to_front: bool,
    /// When scheduled from inside a work cycle, hold the unit until the
    /// next cycle instead of letting the current one pick it up.
    pub defer_to_next_frame: bool,
}

impl Default for WorkOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            max_delay: 0.0,
            max_num_skipped_frames: 0,
            add_to_front: false,
            defer_to_next_frame: false,
        }
    }
}

impl WorkOptions {
    pub fn with_priority(priority: i32) -> Self {
        Self {
            priority,
            ..Self::default()
        }
    }

    pub fn with_max_delay(priority: i32, max_delay: f64) -> Self {
        Self {
            priority,
            max_delay,
            ..Self::default()
        }
    }
}
