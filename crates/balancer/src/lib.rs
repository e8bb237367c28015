//! Frame-budget work balancer.
//!
//! Callers schedule units of deferred work into named groups; once per
//! frame the [`Manager`] runs as many queued units as the configured
//! time and count budgets allow, in priority order, and carries the
//! rest over to later frames. Groups that keep getting cut off escalate
//! in priority so nothing starves forever.

pub mod config;
pub mod driver;
pub mod group;
pub mod handle;
pub mod manager;
pub mod modifier;
pub mod options;
pub mod unit;

pub use config::{BalancerConfig, ConfigError, EscalationConfig, DEFAULT_GROUP};
pub use driver::FrameDriver;
pub use group::{WorkGroup, WorkGroupDefinition};
pub use handle::WorkUnitHandle;
pub use manager::{FRAME_DOMAIN, Manager};
pub use modifier::{
    BudgetExceededKind, FrameBudgetEscalationModifier, Modifier, ModifierManager,
    ScaleBudgetModifier,
};
pub use options::WorkOptions;
pub use unit::WorkUnit;
