use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::group::WorkGroupDefinition;

/// Group every manager owns even when configuration names none, so
/// `schedule_work` with the default group id always has a home.
pub const DEFAULT_GROUP: &str = "Default";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse balancer config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("duplicate work group id {0:?}")]
    DuplicateGroupId(String),
}

/// Tuning for [`FrameBudgetEscalationModifier`].
///
/// [`FrameBudgetEscalationModifier`]: crate::modifier::FrameBudgetEscalationModifier
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Ceiling for the escalation scalar.
    pub max_scalar: f64,
    /// Backlog size at which escalation starts ramping.
    pub count_threshold: usize,
    /// Seconds for the scalar to ramp from 0 to `max_scalar`.
    pub ramp_seconds: f64,
    /// Seconds for the scalar to decay from `max_scalar` back to 0.
    pub decay_seconds: f64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            max_scalar: 0.5,
            count_threshold: 30,
            ramp_seconds: 0.5,
            decay_seconds: 0.5,
        }
    }
}

/// Top-level tunables, read fresh at the start of every work cycle so
/// edits between frames take effect on the next frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// When false, scheduling returns passthrough handles and work runs
    /// inline at the call site.
    pub enabled: bool,
    /// Global per-frame time budget in seconds. Negative means
    /// unconstrained; exactly zero is a valid, already-empty window.
    pub frame_budget: f64,
    /// Minimum seconds between cycle budget resets. Zero resets every
    /// cycle.
    pub frame_interval: f64,
    /// Global per-frame cap on executed units. `<= 0` means no cap.
    pub work_unit_count_budget: i32,
    pub escalation: EscalationConfig,
    pub groups: Vec<WorkGroupDefinition>,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            frame_budget: 0.005,
            frame_interval: 0.0,
            work_unit_count_budget: -1,
            escalation: EscalationConfig::default(),
            groups: Vec::new(),
        }
    }
}

impl BalancerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(json)?;
        config.validate()?;
        config.ensure_default_group();
        debug!(groups = config.groups.len(), "balancer config loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for group in &self.groups {
            if !seen.insert(group.id.as_str()) {
                return Err(ConfigError::DuplicateGroupId(group.id.clone()));
            }
        }
        Ok(())
    }

    /// Appends the [`DEFAULT_GROUP`] unless configuration already
    /// defines it.
    pub fn ensure_default_group(&mut self) {
        if !self.groups.iter().any(|g| g.id == DEFAULT_GROUP) {
            self.groups.push(WorkGroupDefinition::named(DEFAULT_GROUP));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BalancerConfig, ConfigError, DEFAULT_GROUP};
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_the_documented_tunables() {
        let config = BalancerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.frame_budget, 0.005);
        assert_eq!(config.frame_interval, 0.0);
        assert_eq!(config.work_unit_count_budget, -1);
        assert_eq!(config.escalation.max_scalar, 0.5);
        assert_eq!(config.escalation.count_threshold, 30);
    }

    #[test]
    fn from_json_fills_in_the_default_group() {
        let config = BalancerConfig::from_json(r#"{ "frame_budget": 0.01 }"#).unwrap();
        assert_eq!(config.frame_budget, 0.01);
        assert_eq!(config.groups.len(), 1);
        assert_eq!(config.groups[0].id, DEFAULT_GROUP);
    }

    #[test]
    fn from_json_keeps_configured_groups_and_adds_default() {
        let config = BalancerConfig::from_json(
            r#"{ "groups": [ { "id": "Physics", "priority": 1 }, { "id": "Audio" } ] }"#,
        )
        .unwrap();
        let ids: Vec<&str> = config.groups.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, vec!["Physics", "Audio", DEFAULT_GROUP]);
    }

    #[test]
    fn duplicate_group_ids_are_rejected() {
        let err = BalancerConfig::from_json(
            r#"{ "groups": [ { "id": "Physics" }, { "id": "Physics" } ] }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateGroupId(id) if id == "Physics"));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let err = BalancerConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
