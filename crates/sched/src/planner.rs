//! Four-stage batch planning.
//!
//! A batch moves value out of a target without letting its security level
//! creep: a soften pass, a replenish pass, an extract pass, and a second
//! soften pass, sized so each value-moving stage's security cost is paid
//! back. Stage durations differ (extraction is fast, softening slow), so
//! start offsets are computed backward from a shared completion ladder:
//! stage k completes at `longest + k * gap`. The ladder is the only ordering
//! mechanism between stages; there is no synchronization once they launch.

use std::time::Duration;

use gleaner_core::{StageKind, TargetSnapshot};

use crate::error::SchedError;

/// Cap on the fraction of a target drained in one batch. Ceiling rounding
/// can push the nominal fraction over; letting it reach 1.0 would make the
/// replenish factor blow up.
const MAX_EXTRACTED_FRACTION: f64 = 0.99;

/// One planned stage: what to run, how wide, and when to start it so it
/// completes on its ladder rung.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStage {
    pub kind: StageKind,
    /// Human-readable position in the batch ("soften-pre", ...).
    pub role: &'static str,
    pub threads: u32,
    pub start_offset: Duration,
    pub duration: Duration,
}

impl PlannedStage {
    /// When this stage completes, relative to dispatch.
    pub fn completion(&self) -> Duration {
        self.start_offset + self.duration
    }
}

/// A fully sized batch against one target. Derived and ephemeral: planned
/// from a snapshot, dispatched once, never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    pub target: String,
    pub soften_pre: PlannedStage,
    pub replenish: PlannedStage,
    pub extract: PlannedStage,
    pub soften_post: PlannedStage,
    /// Longest stage duration plus four inter-stage gaps.
    pub total_duration: Duration,
    /// Value the extract stage is sized to remove, assuming no concurrent
    /// batch touches the target first.
    pub expected_yield: f64,
}

impl BatchPlan {
    /// Stages in dispatch (and completion) order.
    pub fn stages(&self) -> [&PlannedStage; 4] {
        [
            &self.soften_pre,
            &self.replenish,
            &self.extract,
            &self.soften_post,
        ]
    }

    /// Total threads across all four stages.
    pub fn total_threads(&self) -> u32 {
        self.stages().iter().map(|s| s.threads).sum()
    }
}

/// Size the four stages of a batch against `target`.
///
/// `extract_fraction` is the share of the target's maximum value to take per
/// batch; `gap` separates consecutive stage completions and must exceed
/// dispatch jitter. All thread counts round up (under-provisioned softening
/// compounds into runaway security, while over-provisioning only idles
/// capacity) and every stage gets at least one thread.
pub fn plan_batch(
    target: &TargetSnapshot,
    extract_fraction: f64,
    gap: Duration,
) -> Result<BatchPlan, SchedError> {
    if target.max_value <= 0.0 {
        return Err(SchedError::PlanInfeasible(format!(
            "target '{}' has no extractable value",
            target.name
        )));
    }
    if target.yield_per_thread <= 0.0 {
        return Err(SchedError::PlanInfeasible(format!(
            "target '{}' has non-positive yield per thread",
            target.name
        )));
    }
    if target.growth_per_thread <= 1.0 {
        return Err(SchedError::PlanInfeasible(format!(
            "target '{}' has growth factor {} (needs > 1)",
            target.name, target.growth_per_thread
        )));
    }
    if target.soften_security_decrease <= 0.0 {
        return Err(SchedError::PlanInfeasible(format!(
            "target '{}' has non-positive soften decrease",
            target.name
        )));
    }
    if target.extract_time.is_zero()
        || target.replenish_time.is_zero()
        || target.soften_time.is_zero()
    {
        return Err(SchedError::PlanInfeasible(format!(
            "target '{}' reports a zero stage duration",
            target.name
        )));
    }

    // Extract: enough threads to cover the requested fraction of max value.
    let extract_threads = ceil_threads(extract_fraction / target.yield_per_thread);

    // Replenish: solve growth^threads >= 1 / (1 - extracted) for the fraction
    // those extract threads will actually take.
    let extracted = (extract_threads as f64 * target.yield_per_thread).min(MAX_EXTRACTED_FRACTION);
    let replenish_factor = 1.0 / (1.0 - extracted);
    let replenish_threads =
        ceil_threads(replenish_factor.ln() / target.growth_per_thread.ln());

    // Soften passes pay back the security each value-moving stage adds.
    let soften_pre_threads = ceil_threads(
        extract_threads as f64 * target.extract_security_delta / target.soften_security_decrease,
    );
    let soften_post_threads = ceil_threads(
        replenish_threads as f64 * target.replenish_security_delta
            / target.soften_security_decrease,
    );

    // Completion ladder: stage k lands at longest + k * gap, so a stage's
    // start offset is its completion minus its own duration (never negative
    // because longest >= duration).
    let longest = target
        .soften_time
        .max(target.replenish_time)
        .max(target.extract_time);
    let rung = |k: u32| longest + gap * k;

    let soften_pre = PlannedStage {
        kind: StageKind::Soften,
        role: "soften-pre",
        threads: soften_pre_threads,
        start_offset: rung(0) - target.soften_time,
        duration: target.soften_time,
    };
    let replenish = PlannedStage {
        kind: StageKind::Replenish,
        role: "replenish",
        threads: replenish_threads,
        start_offset: rung(1) - target.replenish_time,
        duration: target.replenish_time,
    };
    let extract = PlannedStage {
        kind: StageKind::Extract,
        role: "extract",
        threads: extract_threads,
        start_offset: rung(2) - target.extract_time,
        duration: target.extract_time,
    };
    let soften_post = PlannedStage {
        kind: StageKind::Soften,
        role: "soften-post",
        threads: soften_post_threads,
        start_offset: rung(3) - target.soften_time,
        duration: target.soften_time,
    };

    Ok(BatchPlan {
        target: target.name.clone(),
        soften_pre,
        replenish,
        extract,
        soften_post,
        total_duration: longest + gap * 4,
        expected_yield: extracted * target.max_value,
    })
}

/// Round up to a whole thread count, never below one.
fn ceil_threads(x: f64) -> u32 {
    let n = x.ceil();
    if n < 1.0 {
        1
    } else {
        n as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAP: Duration = Duration::from_millis(200);

    fn snapshot() -> TargetSnapshot {
        TargetSnapshot {
            name: "shallow-seam".to_string(),
            current_value: 1_000_000.0,
            max_value: 1_000_000.0,
            current_security: 5.0,
            min_security: 1.0,
            extract_time: Duration::from_millis(1_000),
            replenish_time: Duration::from_millis(3_200),
            soften_time: Duration::from_millis(4_000),
            yield_per_thread: 0.01,
            growth_per_thread: 1.05,
            extract_security_delta: 0.002,
            replenish_security_delta: 0.004,
            soften_security_decrease: 0.05,
        }
    }

    #[test]
    fn every_stage_gets_at_least_one_thread() {
        let plan = plan_batch(&snapshot(), 0.1, GAP).unwrap();
        for stage in plan.stages() {
            assert!(stage.threads >= 1, "{} has zero threads", stage.role);
        }
    }

    #[test]
    fn reference_scenario_thread_counts() {
        // max 1,000,000 / fraction 0.1 / yield 0.01 gives 10 extract threads;
        // 10 * 0.002 security / 0.05 per soften thread gives 1 soften-pre thread.
        let plan = plan_batch(&snapshot(), 0.1, GAP).unwrap();
        assert_eq!(plan.extract.threads, 10);
        assert_eq!(plan.soften_pre.threads, 1);
    }

    #[test]
    fn soften_covers_security_added() {
        let target = snapshot();
        let plan = plan_batch(&target, 0.1, GAP).unwrap();

        let added_by_extract = plan.extract.threads as f64 * target.extract_security_delta;
        let removed_pre = plan.soften_pre.threads as f64 * target.soften_security_decrease;
        assert!(removed_pre >= added_by_extract);

        let added_by_replenish =
            plan.replenish.threads as f64 * target.replenish_security_delta;
        let removed_post = plan.soften_post.threads as f64 * target.soften_security_decrease;
        assert!(removed_post >= added_by_replenish);
    }

    #[test]
    fn replenish_restores_what_extract_takes() {
        let target = snapshot();
        let plan = plan_batch(&target, 0.1, GAP).unwrap();

        let extracted = plan.extract.threads as f64 * target.yield_per_thread;
        let growth = target
            .growth_per_thread
            .powi(plan.replenish.threads as i32);
        assert!(
            growth >= 1.0 / (1.0 - extracted),
            "growth {growth} too small for extracted fraction {extracted}"
        );
    }

    #[test]
    fn completion_ladder_is_strictly_ordered_with_gap_spacing() {
        let plan = plan_batch(&snapshot(), 0.1, GAP).unwrap();
        let stages = plan.stages();
        for pair in stages.windows(2) {
            let earlier = pair[0].completion();
            let later = pair[1].completion();
            assert!(later > earlier, "{} must land after {}", pair[1].role, pair[0].role);
            assert!(
                later - earlier >= GAP,
                "{} lands within the jitter gap of {}",
                pair[1].role,
                pair[0].role
            );
        }
    }

    #[test]
    fn offsets_are_completion_minus_duration() {
        let target = snapshot();
        let plan = plan_batch(&target, 0.1, GAP).unwrap();

        // Soften is the longest stage, so soften-pre starts immediately.
        assert_eq!(plan.soften_pre.start_offset, Duration::ZERO);
        // Replenish completes one rung later: starts at 4000 - 3200 + 200.
        assert_eq!(plan.replenish.start_offset, Duration::from_millis(1_000));
        // Extract: 4000 - 1000 + 400.
        assert_eq!(plan.extract.start_offset, Duration::from_millis(3_400));
        // Soften-post: 4000 - 4000 + 600.
        assert_eq!(plan.soften_post.start_offset, Duration::from_millis(600));
    }

    #[test]
    fn total_duration_is_longest_plus_four_gaps() {
        let plan = plan_batch(&snapshot(), 0.1, GAP).unwrap();
        assert_eq!(
            plan.total_duration,
            Duration::from_millis(4_000) + GAP * 4
        );
    }

    #[test]
    fn offsets_stay_non_negative_when_soften_is_not_longest() {
        let mut target = snapshot();
        // Replenish slower than soften is unusual, but the ladder must hold.
        target.replenish_time = Duration::from_millis(6_000);
        let plan = plan_batch(&target, 0.1, GAP).unwrap();

        for stage in plan.stages() {
            assert!(stage.completion() >= stage.duration);
        }
        let stages = plan.stages();
        for pair in stages.windows(2) {
            assert!(pair[1].completion() > pair[0].completion());
        }
        assert_eq!(plan.total_duration, Duration::from_millis(6_000) + GAP * 4);
    }

    #[test]
    fn identical_snapshot_yields_identical_plan() {
        let target = snapshot();
        let first = plan_batch(&target, 0.1, GAP).unwrap();
        let second = plan_batch(&target, 0.1, GAP).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn expected_yield_matches_extracted_fraction() {
        let target = snapshot();
        let plan = plan_batch(&target, 0.1, GAP).unwrap();
        let extracted = plan.extract.threads as f64 * target.yield_per_thread;
        assert_eq!(plan.expected_yield, extracted * target.max_value);
    }

    #[test]
    fn worthless_target_is_infeasible() {
        let mut target = snapshot();
        target.max_value = 0.0;
        let err = plan_batch(&target, 0.1, GAP).unwrap_err();
        assert!(matches!(err, SchedError::PlanInfeasible(_)));
    }

    #[test]
    fn inconsistent_snapshot_is_infeasible() {
        let mut no_yield = snapshot();
        no_yield.yield_per_thread = 0.0;
        assert!(plan_batch(&no_yield, 0.1, GAP).is_err());

        let mut no_growth = snapshot();
        no_growth.growth_per_thread = 1.0;
        assert!(plan_batch(&no_growth, 0.1, GAP).is_err());

        let mut no_soften = snapshot();
        no_soften.soften_security_decrease = 0.0;
        assert!(plan_batch(&no_soften, 0.1, GAP).is_err());

        let mut zero_time = snapshot();
        zero_time.extract_time = Duration::ZERO;
        assert!(plan_batch(&zero_time, 0.1, GAP).is_err());
    }

    #[test]
    fn tiny_yield_still_caps_extracted_fraction() {
        let mut target = snapshot();
        // One thread takes half the pool; ceiling pushes past the nominal
        // fraction but the replenish factor must stay finite.
        target.yield_per_thread = 0.5;
        let plan = plan_batch(&target, 0.9, GAP).unwrap();
        assert_eq!(plan.extract.threads, 2);
        assert!(plan.replenish.threads >= 1);
        assert!(plan.expected_yield <= target.max_value);
    }
}
