//! Domain types shared by the planner, dispatcher, and game backends.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier returned by a successful remote launch.
pub type LaunchId = u64;

/// The kind of action a batch stage runs against a target.
///
/// A full batch dispatches four stages: `Soften`, `Replenish`, `Extract`,
/// `Soften`. The two soften passes bracket the value-moving pair and pay
/// back the security each of them adds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Reduce the target's security level.
    Soften,
    /// Restore extracted value via compounding growth.
    Replenish,
    /// Remove a fraction of the target's value.
    Extract,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Soften => "soften",
            StageKind::Replenish => "replenish",
            StageKind::Extract => "extract",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node offering parallel execution capacity.
///
/// Discovered fresh each planning cycle. The scheduler never mutates the
/// live node (capacity changes come from externally observed load), it
/// only decrements its own in-memory snapshot while allocating a pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerNode {
    pub name: String,
    /// Total capacity in abstract units (one thread costs a configured
    /// number of units).
    pub total_capacity: f64,
    /// Capacity currently consumed by running work, as observed.
    pub used_capacity: f64,
    /// Primary nodes keep a fixed reserve floor; secondary nodes keep a
    /// proportional reserve.
    pub is_primary: bool,
}

impl WorkerNode {
    /// Raw free capacity before any reservation policy is applied.
    pub fn free_capacity(&self) -> f64 {
        (self.total_capacity - self.used_capacity).max(0.0)
    }
}

/// Read-only snapshot of a target resource pool for one planning cycle.
///
/// The remote game mutates the live target as stages land; the scheduler
/// only ever reads a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub name: String,
    pub current_value: f64,
    pub max_value: f64,
    pub current_security: f64,
    pub min_security: f64,
    /// Wall-clock duration of a single extract thread.
    pub extract_time: Duration,
    /// Wall-clock duration of a single replenish thread.
    pub replenish_time: Duration,
    /// Wall-clock duration of a single soften thread (typically the longest).
    pub soften_time: Duration,
    /// Fraction of `max_value` removed per extract thread.
    pub yield_per_thread: f64,
    /// Multiplicative growth applied per replenish thread (must be > 1).
    pub growth_per_thread: f64,
    /// Security added per extract thread.
    pub extract_security_delta: f64,
    /// Security added per replenish thread.
    pub replenish_security_delta: f64,
    /// Security removed per soften thread.
    pub soften_security_decrease: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_capacity_clamps_at_zero() {
        let node = WorkerNode {
            name: "w1".to_string(),
            total_capacity: 8.0,
            used_capacity: 10.0,
            is_primary: false,
        };
        assert_eq!(node.free_capacity(), 0.0);
    }

    #[test]
    fn free_capacity_subtracts_used() {
        let node = WorkerNode {
            name: "w1".to_string(),
            total_capacity: 32.0,
            used_capacity: 12.0,
            is_primary: true,
        };
        assert_eq!(node.free_capacity(), 20.0);
    }

    #[test]
    fn stage_kind_display_matches_wire_name() {
        assert_eq!(StageKind::Soften.to_string(), "soften");
        assert_eq!(StageKind::Replenish.to_string(), "replenish");
        assert_eq!(StageKind::Extract.to_string(), "extract");
    }

    #[test]
    fn stage_kind_serde_roundtrip() {
        let json = serde_json::to_string(&StageKind::Extract).unwrap();
        assert_eq!(json, r#""extract""#);
        let back: StageKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, StageKind::Extract);
    }
}
