//! Growth-stage catalog and schedule resolution.
//!
//! The catalog is an ordered list of phenological stages.  Cumulative stage
//! durations partition elapsed days into stage boundaries; the boundary day
//! belongs to the earlier stage.  Past the end of the catalog the plant stays
//! in the final stage.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Valid range for a stage's humidity threshold, percent.
pub const THRESHOLD_RANGE: std::ops::RangeInclusive<i64> = 0..=100;
/// Valid range for a stage's watering duration, seconds.
pub const WATERING_SEC_RANGE: std::ops::RangeInclusive<i64> = 0..=600;

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stage {
    pub name: String,
    pub duration_days: u32,
    /// Water when measured humidity drops below this, percent.
    pub humidity_threshold: u8,
    pub watering_time_sec: u32,
}

/// Editable per-stage parameters, persisted separately from the catalog so
/// runtime edits survive restarts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StageParams {
    pub humidity_threshold: u8,
    pub watering_time_sec: u32,
}

/// Which stage is active: resolved from elapsed days, or pinned manually.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageSelection {
    pub manual_override: bool,
    pub index: usize,
}

impl StageSelection {
    pub fn automatic() -> Self {
        Self {
            manual_override: false,
            index: 0,
        }
    }

    pub fn manual(index: usize) -> Self {
        Self {
            manual_override: true,
            index,
        }
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StageCatalog {
    stages: Vec<Stage>,
}

impl StageCatalog {
    /// Build a catalog from pre-validated stages (see `config::Config`).
    pub fn new(stages: Vec<Stage>) -> Self {
        assert!(!stages.is_empty(), "stage catalog cannot be empty");
        Self { stages }
    }

    /// The built-in five-stage grow schedule.
    pub fn default_catalog() -> Self {
        let stage = |name: &str, days, threshold, watering| Stage {
            name: name.to_string(),
            duration_days: days,
            humidity_threshold: threshold,
            watering_time_sec: watering,
        };
        Self::new(vec![
            stage("Germination", 7, 65, 15),
            stage("Vegetative", 14, 60, 25),
            stage("Preflowering", 7, 55, 35),
            stage("Flowering", 30, 50, 35),
            stage("Maturation", 10, 45, 20),
        ])
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn get(&self, index: usize) -> &Stage {
        &self.stages[index]
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Resolve the active stage index for `elapsed_days`.
    ///
    /// A manual override wins unconditionally.  Otherwise this returns the
    /// first stage whose cumulative duration covers `elapsed_days`, or the
    /// last stage once the schedule is exhausted.
    pub fn resolve(&self, selection: StageSelection, elapsed_days: u64) -> usize {
        if selection.manual_override {
            return selection.index.min(self.stages.len() - 1);
        }

        let mut cumulative: u64 = 0;
        for (i, stage) in self.stages.iter().enumerate() {
            cumulative += u64::from(stage.duration_days);
            if elapsed_days <= cumulative {
                return i;
            }
        }
        self.stages.len() - 1
    }

    /// Update the editable parameters of one stage.  All inputs are checked
    /// before anything is mutated.
    pub fn update_params(
        &mut self,
        index: usize,
        humidity_threshold: Option<i64>,
        watering_time_sec: Option<i64>,
    ) -> Result<()> {
        if index >= self.stages.len() {
            bail!("stage index {index} out of range (0-{})", self.stages.len() - 1);
        }
        if humidity_threshold.is_none() && watering_time_sec.is_none() {
            bail!("no stage parameters provided");
        }
        if let Some(t) = humidity_threshold {
            if !THRESHOLD_RANGE.contains(&t) {
                bail!("humidity threshold {t} out of range [0, 100]");
            }
        }
        if let Some(w) = watering_time_sec {
            if !WATERING_SEC_RANGE.contains(&w) {
                bail!("watering time {w}s out of range [0, 600]");
            }
        }

        let stage = &mut self.stages[index];
        if let Some(t) = humidity_threshold {
            stage.humidity_threshold = t as u8;
            tracing::info!(stage = %stage.name, threshold = t, "stage threshold updated");
        }
        if let Some(w) = watering_time_sec {
            stage.watering_time_sec = w as u32;
            tracing::info!(stage = %stage.name, watering_sec = w, "stage watering time updated");
        }
        Ok(())
    }

    /// Apply persisted parameter overrides, in catalog order.  Extra entries
    /// are ignored with a warning; a short list leaves the tail untouched.
    pub fn apply_params(&mut self, params: &[StageParams]) {
        if params.len() > self.stages.len() {
            tracing::warn!(
                saved = params.len(),
                stages = self.stages.len(),
                "more saved stage parameters than stages, ignoring extras"
            );
        }
        for (stage, p) in self.stages.iter_mut().zip(params) {
            stage.humidity_threshold = p.humidity_threshold;
            stage.watering_time_sec = p.watering_time_sec;
        }
    }

    /// Snapshot of the editable parameters, for persistence.
    pub fn params(&self) -> Vec<StageParams> {
        self.stages
            .iter()
            .map(|s| StageParams {
                humidity_threshold: s.humidity_threshold,
                watering_time_sec: s.watering_time_sec,
            })
            .collect()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
