//! Configuration for the gleaner scheduler.
//!
//! Parsed from `gleaner.toml` with environment variable overrides. Every
//! field has a serde default so a partial (or missing) file still yields a
//! runnable config. The `[scheduler]` table drives the batch loop; the
//! `[[sim.workers]]` / `[[sim.targets]]` tables describe the simulated world
//! the binary and the integration tests run against.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

// ── Top-level config ────────────────────────────────────────────────

/// Full configuration, one file for the loop and the simulated world.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GleanerConfig {
    /// Batch scheduling parameters.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Simulated world definition (workers and targets).
    #[serde(default)]
    pub sim: SimConfig,
}

impl GleanerConfig {
    /// Parse config from a TOML string, apply env overrides, and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Default config with a small built-in simulated world, usable with no
    /// config file at all.
    pub fn local() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            sim: SimConfig::local(),
        }
    }

    /// Validate field ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if !(s.extract_fraction > 0.0 && s.extract_fraction < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.extract_fraction must be in (0, 1), got {}",
                s.extract_fraction
            )));
        }
        if !(0.0..1.0).contains(&s.secondary_reserve_fraction) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.secondary_reserve_fraction must be in [0, 1), got {}",
                s.secondary_reserve_fraction
            )));
        }
        if s.primary_reserve < 0.0 {
            return Err(ConfigError::Invalid(
                "scheduler.primary_reserve must be >= 0".to_string(),
            ));
        }
        if s.cost_per_thread <= 0.0 {
            return Err(ConfigError::Invalid(
                "scheduler.cost_per_thread must be > 0".to_string(),
            ));
        }
        if s.stage_gap_ms == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.stage_gap_ms must be > 0 (it absorbs dispatch jitter)".to_string(),
            ));
        }
        for worker in &self.sim.workers {
            if worker.total_capacity < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "sim worker '{}' has negative total_capacity",
                    worker.name
                )));
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides.
    ///
    /// Convention: `GLEANER_SCHEDULER_KEY` overrides `scheduler.key`.
    /// Examples:
    /// - `GLEANER_SCHEDULER_TARGETS` (comma-separated) -> `scheduler.targets`
    /// - `GLEANER_SCHEDULER_PRIMARY_RESERVE` -> `scheduler.primary_reserve`
    /// - `GLEANER_SCHEDULER_BATCH_LIMIT` -> `scheduler.batch_limit`
    /// - `GLEANER_SCHEDULER_IDLE_BACKOFF_MS` -> `scheduler.idle_backoff_ms`
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("GLEANER_SCHEDULER_TARGETS") {
            let targets: Vec<String> = v
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            if !targets.is_empty() {
                self.scheduler.targets = targets;
            }
        }
        if let Ok(v) = std::env::var("GLEANER_SCHEDULER_PRIMARY_RESERVE") {
            if let Ok(n) = v.parse::<f64>() {
                self.scheduler.primary_reserve = n;
            }
        }
        if let Ok(v) = std::env::var("GLEANER_SCHEDULER_SECONDARY_RESERVE_FRACTION") {
            if let Ok(n) = v.parse::<f64>() {
                self.scheduler.secondary_reserve_fraction = n;
            }
        }
        if let Ok(v) = std::env::var("GLEANER_SCHEDULER_BATCH_LIMIT") {
            if let Ok(n) = v.parse::<u64>() {
                self.scheduler.batch_limit = Some(n);
            }
        }
        if let Ok(v) = std::env::var("GLEANER_SCHEDULER_IDLE_BACKOFF_MS") {
            if let Ok(n) = v.parse::<u64>() {
                self.scheduler.idle_backoff_ms = n;
            }
        }
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        let s = &self.scheduler;
        tracing::info!(
            targets = ?s.targets,
            primary_reserve = s.primary_reserve,
            secondary_reserve_fraction = s.secondary_reserve_fraction,
            extract_fraction = s.extract_fraction,
            stage_gap_ms = s.stage_gap_ms,
            batch_limit = ?s.batch_limit,
            "scheduler config loaded"
        );
        tracing::info!(
            workers = self.sim.workers.len(),
            targets = self.sim.targets.len(),
            "sim world config loaded"
        );
    }
}

// ── Scheduler section ───────────────────────────────────────────────

/// Parameters of the batch scheduling loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Candidate target names, ranked each cycle by the selector.
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,

    /// Capacity units held back on the primary node (fixed floor).
    #[serde(default = "default_primary_reserve")]
    pub primary_reserve: f64,

    /// Fraction of free capacity held back on secondary nodes.
    #[serde(default = "default_secondary_reserve_fraction")]
    pub secondary_reserve_fraction: f64,

    /// Fraction of a target's maximum value extracted per batch.
    #[serde(default = "default_extract_fraction")]
    pub extract_fraction: f64,

    /// Capacity units consumed by one thread of any stage.
    #[serde(default = "default_cost_per_thread")]
    pub cost_per_thread: f64,

    /// Workers with less usable capacity than this are skipped entirely.
    #[serde(default = "default_min_worker_capacity")]
    pub min_worker_capacity: f64,

    /// Gap between consecutive stage completions. Must exceed dispatch jitter.
    #[serde(default = "default_stage_gap_ms")]
    pub stage_gap_ms: u64,

    /// Safety margin added to the post-dispatch sleep.
    #[serde(default = "default_cycle_margin_ms")]
    pub cycle_margin_ms: u64,

    /// Sleep between cycles when there is nothing to do.
    #[serde(default = "default_idle_backoff_ms")]
    pub idle_backoff_ms: u64,

    /// Stop after this many dispatched batches (absent = run until stopped).
    #[serde(default)]
    pub batch_limit: Option<u64>,
}

fn default_targets() -> Vec<String> {
    vec![
        "shallow-seam".to_string(),
        "gravel-flat".to_string(),
        "old-quarry".to_string(),
    ]
}
fn default_primary_reserve() -> f64 {
    8.0
}
fn default_secondary_reserve_fraction() -> f64 {
    0.25
}
fn default_extract_fraction() -> f64 {
    0.1
}
fn default_cost_per_thread() -> f64 {
    1.75
}
fn default_min_worker_capacity() -> f64 {
    2.0
}
fn default_stage_gap_ms() -> u64 {
    200
}
fn default_cycle_margin_ms() -> u64 {
    200
}
fn default_idle_backoff_ms() -> u64 {
    2_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            primary_reserve: default_primary_reserve(),
            secondary_reserve_fraction: default_secondary_reserve_fraction(),
            extract_fraction: default_extract_fraction(),
            cost_per_thread: default_cost_per_thread(),
            min_worker_capacity: default_min_worker_capacity(),
            stage_gap_ms: default_stage_gap_ms(),
            cycle_margin_ms: default_cycle_margin_ms(),
            idle_backoff_ms: default_idle_backoff_ms(),
            batch_limit: None,
        }
    }
}

impl SchedulerConfig {
    pub fn stage_gap(&self) -> Duration {
        Duration::from_millis(self.stage_gap_ms)
    }

    pub fn cycle_margin(&self) -> Duration {
        Duration::from_millis(self.cycle_margin_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }
}

// ── Sim world section ───────────────────────────────────────────────

/// Simulated world: the workers and targets the loop runs against.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SimConfig {
    #[serde(default)]
    pub workers: Vec<SimWorkerConfig>,

    #[serde(default)]
    pub targets: Vec<SimTargetConfig>,
}

impl SimConfig {
    /// A small world: one primary node, two rented rigs, the default targets.
    pub fn local() -> Self {
        Self {
            workers: vec![
                SimWorkerConfig {
                    name: "home".to_string(),
                    total_capacity: 32.0,
                    used_capacity: 0.0,
                    is_primary: true,
                },
                SimWorkerConfig {
                    name: "rig-01".to_string(),
                    total_capacity: 16.0,
                    used_capacity: 0.0,
                    is_primary: false,
                },
                SimWorkerConfig {
                    name: "rig-02".to_string(),
                    total_capacity: 16.0,
                    used_capacity: 0.0,
                    is_primary: false,
                },
            ],
            targets: default_targets()
                .into_iter()
                .map(SimTargetConfig::named)
                .collect(),
        }
    }
}

/// One simulated worker node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimWorkerConfig {
    pub name: String,
    pub total_capacity: f64,
    #[serde(default)]
    pub used_capacity: f64,
    #[serde(default)]
    pub is_primary: bool,
}

/// One simulated target pool. Per-thread constants default to plausible
/// mid-game values so a config only has to name the target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimTargetConfig {
    pub name: String,
    #[serde(default = "default_max_value")]
    pub max_value: f64,
    #[serde(default = "default_max_value")]
    pub current_value: f64,
    #[serde(default = "default_min_security")]
    pub min_security: f64,
    #[serde(default = "default_current_security")]
    pub current_security: f64,
    #[serde(default = "default_extract_ms")]
    pub extract_ms: u64,
    #[serde(default = "default_replenish_ms")]
    pub replenish_ms: u64,
    #[serde(default = "default_soften_ms")]
    pub soften_ms: u64,
    #[serde(default = "default_yield_per_thread")]
    pub yield_per_thread: f64,
    #[serde(default = "default_growth_per_thread")]
    pub growth_per_thread: f64,
    #[serde(default = "default_extract_security_delta")]
    pub extract_security_delta: f64,
    #[serde(default = "default_replenish_security_delta")]
    pub replenish_security_delta: f64,
    #[serde(default = "default_soften_security_decrease")]
    pub soften_security_decrease: f64,
}

impl SimTargetConfig {
    /// A target with the given name and default constants.
    pub fn named(name: String) -> Self {
        Self {
            name,
            max_value: default_max_value(),
            current_value: default_max_value(),
            min_security: default_min_security(),
            current_security: default_current_security(),
            extract_ms: default_extract_ms(),
            replenish_ms: default_replenish_ms(),
            soften_ms: default_soften_ms(),
            yield_per_thread: default_yield_per_thread(),
            growth_per_thread: default_growth_per_thread(),
            extract_security_delta: default_extract_security_delta(),
            replenish_security_delta: default_replenish_security_delta(),
            soften_security_decrease: default_soften_security_decrease(),
        }
    }
}

fn default_max_value() -> f64 {
    1_000_000.0
}
fn default_min_security() -> f64 {
    1.0
}
fn default_current_security() -> f64 {
    5.0
}
fn default_extract_ms() -> u64 {
    1_000
}
fn default_replenish_ms() -> u64 {
    3_200
}
fn default_soften_ms() -> u64 {
    4_000
}
fn default_yield_per_thread() -> f64 {
    0.01
}
fn default_growth_per_thread() -> f64 {
    1.05
}
fn default_extract_security_delta() -> f64 {
    0.002
}
fn default_replenish_security_delta() -> f64 {
    0.004
}
fn default_soften_security_decrease() -> f64 {
    0.05
}

// ── Tests ───────────────────────────────────────────────────────────
