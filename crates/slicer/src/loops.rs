use tracing::trace;

use crate::registry::SlicerRegistry;

/// Handle passed to budgeted loop bodies so they can end the loop early.
#[derive(Debug, Default)]
pub struct LoopBreak {
    should_break: bool,
}

impl LoopBreak {
    /// Ends the loop after the current iteration.
    pub fn break_loop(&mut self) {
        self.should_break = true;
    }

    pub fn should_break(&self) -> bool {
        self.should_break
    }
}

/// Runs `work` over `items` until either budget of the named domain is
/// exhausted or the body calls [`LoopBreak::break_loop`].
///
/// Each call opens a fresh accounting window, so one call is one frame's
/// slice of the loop; call again next frame with the remaining items to
/// continue. A non-positive `time_budget` runs nothing.
pub fn budgeted_for_each<I, F>(
    registry: &mut SlicerRegistry,
    domain: &str,
    time_budget: f64,
    max_work_count: i32,
    items: I,
    mut work: F,
) -> usize
where
    I: IntoIterator,
    F: FnMut(&mut LoopBreak, I::Item),
{
    if time_budget <= 0.0 {
        return 0;
    }

    registry
        .get_mut(domain)
        .configure_time_budget(time_budget)
        .configure_work_unit_count_budget(max_work_count)
        .reset();

    let mut done = 0usize;
    let mut brk = LoopBreak::default();
    for item in items {
        {
            let slicer = registry.get_mut(domain);
            if slicer.has_budget_been_exceeded() {
                trace!(domain, done, "budgeted loop out of budget");
                break;
            }
            slicer.start_work();
        }
        work(&mut brk, item);
        registry.get_mut(domain).end_work();
        done += 1;
        if brk.should_break() {
            break;
        }
    }
    done
}
