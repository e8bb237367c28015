/// Stable identity for a scheduled unit of work.
///
/// Ids are allocated from a per-manager counter so they are deterministic
/// and never reused within one manager's lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(pub u64);
