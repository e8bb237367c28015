use std::collections::HashMap;

use foundation::clock::SharedClock;

use crate::slicer::TimeSlicer;

/// Keyed collection of [`TimeSlicer`] domains.
///
/// Domains are created lazily on first reference and live as long as the
/// registry. The registry is an explicit object rather than a process
/// global: whoever needs budget lookups holds (or is handed) a reference,
/// which keeps tests and multiple independent schedulers possible.
///
/// State under one key is shared by every caller using that key; callers
/// must not interleave incompatible budget configurations under the same
/// key without understanding that.
pub struct SlicerRegistry {
    clock: SharedClock,
    slicers: HashMap<String, TimeSlicer>,
}

impl SlicerRegistry {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            clock,
            slicers: HashMap::new(),
        }
    }

    /// Gets the slicer for `id`, creating it on first reference.
    pub fn get_mut(&mut self, id: &str) -> &mut TimeSlicer {
        self.slicers
            .entry(id.to_owned())
            .or_insert_with(|| TimeSlicer::new(self.clock.clone()))
    }

    pub fn get(&self, id: &str) -> Option<&TimeSlicer> {
        self.slicers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.slicers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.slicers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slicers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::SlicerRegistry;
    use foundation::clock::ManualClock;
    use std::rc::Rc;

    #[test]
    fn creates_domains_lazily() {
        let clock = ManualClock::new();
        let mut registry = SlicerRegistry::new(Rc::new(clock));
        assert!(registry.is_empty());
        assert!(registry.get("frame").is_none());

        registry.get_mut("frame");
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("frame"));
    }

    #[test]
    fn same_key_shares_state() {
        let clock = ManualClock::new();
        let mut registry = SlicerRegistry::new(Rc::new(clock));
        registry.get_mut("loading").configure_work_unit_count_budget(1);
        registry.get_mut("loading").reset();
        registry.get_mut("loading").start_work();
        registry.get_mut("loading").end_work();
        assert!(
            registry
                .get("loading")
                .unwrap()
                .has_work_unit_count_budget_been_exceeded()
        );
    }
}
