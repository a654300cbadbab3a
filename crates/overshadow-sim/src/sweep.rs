//! Parameter-sweep experiment controller
//!
//! Iterates a grid of parameter values — Cartesian product or zipped —
//! building and running one simulation per combination. Output files
//! get deterministic names derived from the combination's values, so a
//! finished sweep is discoverable from the directory listing alone. A
//! sweep resumes from any run index, and a failing run is logged and
//! skipped over, never fatal to its siblings.

use crate::params::OvershadowParams;
use crate::run::{RunStatus, SimulationRun};
use overshadow_core::types::{DspError, DspResult};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One swept parameter: a recognized field name plus its value sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterAxis {
    /// Field selector, e.g. `"noise_voltage"` or `"attacker_gain_db"`.
    pub name: String,
    /// Ordered values this axis takes.
    pub values: Vec<f64>,
}

impl ParameterAxis {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// How multiple axes combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SweepPolicy {
    /// Every combination of values, last axis fastest (nested loops).
    Cartesian,
    /// Axes advance together; the sweep length is the shortest axis.
    Zipped,
}

/// Per-run bookkeeping the controller returns.
#[derive(Debug, Clone)]
pub struct RunRecord {
    /// Run index within the full (unresumed) sweep.
    pub index: usize,
    /// The axis values this run used, in axis order.
    pub values: Vec<f64>,
    /// The output file the run wrote (or would have written).
    pub out_file: PathBuf,
    /// Terminal status.
    pub status: RunStatus,
    /// Victim/attacker/neither rates when evaluation ran.
    pub result: Option<overshadow_core::bit_error::BitErrorResult>,
}

type PrepareHook = Box<dyn Fn(usize, &mut OvershadowParams) + Send + Sync>;

/// Drives a grid of simulation runs.
pub struct SweepController {
    axes: Vec<ParameterAxis>,
    policy: SweepPolicy,
    base: OvershadowParams,
    out_dir: PathBuf,
    start_index: usize,
    end_index: Option<usize>,
    prepare: Option<PrepareHook>,
}

impl SweepController {
    /// Create a sweep over `axes` starting from `base` parameters,
    /// writing outputs under `out_dir`.
    pub fn new(
        axes: Vec<ParameterAxis>,
        policy: SweepPolicy,
        base: OvershadowParams,
        out_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            axes,
            policy,
            base,
            out_dir: out_dir.into(),
            start_index: 0,
            end_index: None,
            prepare: None,
        }
    }

    /// Resume from `start` (inclusive). Combinations before it are
    /// skipped entirely — counted, but never built or written.
    pub fn with_start_index(mut self, start: usize) -> Self {
        self.start_index = start;
        self
    }

    /// Stop after `end` (inclusive).
    pub fn with_end_index(mut self, end: usize) -> Self {
        self.end_index = Some(end);
        self
    }

    /// Install a per-run parameter hook, applied after the axis values.
    /// Used for per-run adjustments the axis mechanism cannot express
    /// (alternate input files, per-run seeds).
    pub fn with_prepare(mut self, hook: PrepareHook) -> Self {
        self.prepare = Some(hook);
        self
    }

    /// All value combinations in sweep order.
    pub fn combinations(&self) -> Vec<Vec<f64>> {
        if self.axes.is_empty() {
            return vec![Vec::new()];
        }
        match self.policy {
            SweepPolicy::Cartesian => {
                let mut combos: Vec<Vec<f64>> = vec![Vec::new()];
                for axis in &self.axes {
                    let mut next = Vec::with_capacity(combos.len() * axis.values.len());
                    for combo in &combos {
                        for &v in &axis.values {
                            let mut c = combo.clone();
                            c.push(v);
                            next.push(c);
                        }
                    }
                    combos = next;
                }
                combos
            }
            SweepPolicy::Zipped => {
                let len = self.axes.iter().map(|a| a.values.len()).min().unwrap_or(0);
                (0..len)
                    .map(|i| self.axes.iter().map(|a| a.values[i]).collect())
                    .collect()
            }
        }
    }

    /// Deterministic output name for a combination: the axis values
    /// joined into `OUT_v0_v1_...raw`. Distinct tuples give distinct
    /// names.
    pub fn output_name(values: &[f64]) -> String {
        let mut name = String::from("OUT");
        for v in values {
            name.push('_');
            name.push_str(&format!("{v}"));
        }
        name.push_str(".raw");
        name
    }

    /// Apply one axis value to a parameter set by field name.
    fn apply(params: &mut OvershadowParams, name: &str, value: f64) -> DspResult<()> {
        match name {
            "noise_voltage" => {
                params.noise_voltage_victim = value;
                params.noise_voltage_attacker = value;
            }
            "noise_voltage_victim" => params.noise_voltage_victim = value,
            "noise_voltage_attacker" => params.noise_voltage_attacker = value,
            "processing_noise" => params.processing_noise = value,
            "attacker_gain_db" => params.attacker_gain_db = value,
            "victim_gain_db" => params.victim_gain_db = value,
            "frequency_offset_victim" => params.frequency_offset_victim = value,
            "frequency_offset_attacker" => params.frequency_offset_attacker = value,
            "timing_offset_victim" => params.timing_offset_victim = value,
            "timing_offset_attacker" => params.timing_offset_attacker = value,
            "padding_bytes" => params.padding_bytes = value as usize,
            "num_packets" => params.num_packets = value as usize,
            "delay" => params.delay = value as i64,
            other => {
                return Err(DspError::invalid(format!("unknown sweep axis: {other}")));
            }
        }
        Ok(())
    }

    /// Build the parameter set for one combination.
    fn params_for(&self, index: usize, values: &[f64]) -> DspResult<OvershadowParams> {
        let mut params = self.base.clone();
        for (axis, &value) in self.axes.iter().zip(values.iter()) {
            Self::apply(&mut params, &axis.name, value)?;
        }
        params.out_file = self.out_dir.join(Self::output_name(values));
        if let Some(hook) = &self.prepare {
            hook(index, &mut params);
        }
        Ok(params)
    }

    /// Whether a sweep index is inside the [start, end] window.
    fn selected(&self, index: usize) -> bool {
        index >= self.start_index && self.end_index.map_or(true, |end| index <= end)
    }

    fn execute_one(&self, index: usize, values: Vec<f64>) -> RunRecord {
        tracing::info!(index, ?values, "sweep run");
        match self.params_for(index, &values) {
            Ok(params) => {
                let out_file = params.out_file.clone();
                let mut run = SimulationRun::new(index, params);
                run.execute();
                RunRecord {
                    index,
                    values,
                    out_file,
                    status: run.status,
                    result: run.result,
                }
            }
            Err(err) => {
                tracing::warn!(index, error = %err, "sweep run rejected");
                RunRecord {
                    index,
                    values,
                    out_file: PathBuf::new(),
                    status: RunStatus::Failed(err.to_string()),
                    result: None,
                }
            }
        }
    }

    /// Run the selected window sequentially. Failed runs are recorded
    /// and the sweep continues; no failure aborts a sibling.
    pub fn run(&self) -> Vec<RunRecord> {
        self.combinations()
            .into_iter()
            .enumerate()
            .filter(|(i, _)| self.selected(*i))
            .map(|(i, values)| self.execute_one(i, values))
            .collect()
    }

    /// Run the selected window on a worker pool, one graph per worker.
    /// Runs share no mutable state, so ordering of completion is the
    /// only difference from the sequential mode; records come back in
    /// sweep order.
    pub fn run_parallel(&self) -> Vec<RunRecord> {
        let selected: Vec<(usize, Vec<f64>)> = self
            .combinations()
            .into_iter()
            .enumerate()
            .filter(|(i, _)| self.selected(*i))
            .collect();
        let mut records: Vec<RunRecord> = selected
            .into_par_iter()
            .map(|(i, values)| self.execute_one(i, values))
            .collect();
        records.sort_by_key(|r| r.index);
        records
    }
}
