//! Default target selection: highest value throughput wins.

use async_trait::async_trait;

use crate::api::{GameApi, TargetSelector};
use crate::error::GameError;

/// Scores each candidate by `max_value / soften_time` and picks the best.
///
/// Soften time dominates the batch duration, so this approximates value
/// gained per unit of wall-clock time. Unreachable candidates are skipped
/// rather than failing the cycle; a candidate with nothing to extract scores
/// nothing.
pub struct RateSelector;

#[async_trait]
impl TargetSelector for RateSelector {
    async fn select_target(
        &self,
        api: &dyn GameApi,
        candidates: &[String],
    ) -> Result<Option<String>, GameError> {
        let mut best: Option<(String, f64)> = None;

        for name in candidates {
            let snapshot = match api.target_snapshot(name).await {
                Ok(s) => s,
                Err(GameError::TargetUnavailable(_)) => continue,
                Err(e) => return Err(e),
            };
            if snapshot.max_value <= 0.0 {
                continue;
            }

            let millis = snapshot.soften_time.as_millis().max(1) as f64;
            let score = snapshot.max_value / millis;
            if best.as_ref().map_or(true, |(_, b)| score > *b) {
                best = Some((name.clone(), score));
            }
        }

        Ok(best.map(|(name, _)| name))
    }
}
