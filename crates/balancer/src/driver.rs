/// One-pending-tick latch between scheduling and the frame loop.
///
/// Scheduling arms the driver; the embedding's per-frame `tick` call
/// consumes the pending tick and runs a work cycle. Arming twice before
/// a tick still yields a single cycle, so schedule storms cannot stack
/// extra work into one frame.
#[derive(Debug, Default)]
pub struct FrameDriver {
    tick_pending: bool,
}

impl FrameDriver {
    /// Arms at most one pending tick. Idempotent while armed.
    pub fn start(&mut self) {
        self.tick_pending = true;
    }

    /// Disarms without consuming.
    pub fn stop(&mut self) {
        self.tick_pending = false;
    }

    pub fn is_pending(&self) -> bool {
        self.tick_pending
    }

    /// Consumes the pending tick, if any. Returns whether a cycle
    /// should run.
    pub fn take_tick(&mut self) -> bool {
        std::mem::take(&mut self.tick_pending)
    }
}

#[cfg(test)]
mod tests {
    use super::FrameDriver;

    #[test]
    fn start_is_idempotent_and_take_consumes_once() {
        let mut driver = FrameDriver::default();
        assert!(!driver.take_tick());

        driver.start();
        driver.start();
        assert!(driver.is_pending());
        assert!(driver.take_tick());
        assert!(!driver.take_tick());
    }

    #[test]
    fn stop_disarms() {
        let mut driver = FrameDriver::default();
        driver.start();
        driver.stop();
        assert!(!driver.take_tick());
    }
}
