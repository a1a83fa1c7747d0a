/*
SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The predictor interface (spec §4.5): an external, pluggable runtime
//! estimator. The worker treats its output as an opaque non-negative
//! duration and clamps it to `sched_period` itself (§7, "Predictor
//! excursion") — the predictor is never trusted to self-clamp.
//!
//! `task_slot` is always `0` in this library (one sub-task per task); it is
//! threaded through anyway so a single predictor instance could in
//! principle serve more than one task slot, matching the shape of the
//! reference's estimator interface.

/// An external runtime estimator, trained online from measured per-job
/// CPU time and queried before each job (except the first) to reprogram
/// the kernel runtime budget.
///
/// Implementations own their model state; a fresh instance is constructed
/// per [`crate::task::Task`] that selects [`crate::task::Flavour::Predictive`].
pub trait Predictor: Send {
    /// Predict the runtime budget (nanoseconds) for job `job_slot`, given
    /// `metrics` (possibly empty). May return a negative or over-period
    /// value; the caller clamps.
    fn predict(&mut self, task_slot: u32, job_slot: u64, metrics: &[f64]) -> i64;

    /// Feed back the measured CPU runtime (nanoseconds, as a float per the
    /// reference's deliberate half-nanosecond rounding-up bias) for the job
    /// that was just measured.
    fn train(&mut self, task_slot: u32, job_slot: u64, measured_runtime_ns: f64);
}

/// A predictor that always predicts zero and discards every measurement.
///
/// Not meant for production use of the predictive flavour — it exists so
/// tests can exercise the reprogramming protocol (§4.2, property 5)
/// without depending on a trained model's convergence behavior.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPredictor;

impl Predictor for NoopPredictor {
    fn predict(&mut self, _task_slot: u32, _job_slot: u64, _metrics: &[f64]) -> i64 {
        0
    }

    fn train(&mut self, _task_slot: u32, _job_slot: u64, _measured_runtime_ns: f64) {}
}

/// Clamp a raw predictor output to `[0, period_ns]`, per §7's "Predictor
/// excursion" rule: out-of-range values are clamped silently, never
/// reported as an error.
pub fn clamp_to_period(predicted_ns: i64, period_ns: u64) -> u64 {
    (predicted_ns.max(0) as u64).min(period_ns)
}

/// An exponential-moving-average predictor: the default used by the C-ABI
/// constructor ([`crate::ffi::create_task_with_prediction`]), which has no
/// parameter for supplying a predictor implementation of its own.
///
/// `predict` simply returns the current average; `train` folds each new
/// measurement in with weight `alpha`. Ignores `metrics` — it has no use
/// for a feature vector, only the measured-runtime feedback.
#[derive(Debug, Clone, Copy)]
pub struct EmaPredictor {
    alpha: f64,
    average_ns: Option<f64>,
}

impl EmaPredictor {
    /// `alpha` is the weight given to each new measurement, in `(0.0, 1.0]`.
    pub fn new(alpha: f64) -> Self {
        Self {
            alpha,
            average_ns: None,
        }
    }
}

impl Default for EmaPredictor {
    /// `alpha = 0.5`: converges within a handful of jobs without being
    /// whipsawed by a single outlier measurement.
    fn default() -> Self {
        Self::new(0.5)
    }
}

impl Predictor for EmaPredictor {
    fn predict(&mut self, _task_slot: u32, _job_slot: u64, _metrics: &[f64]) -> i64 {
        self.average_ns.unwrap_or(0.0).round() as i64
    }

    fn train(&mut self, _task_slot: u32, _job_slot: u64, measured_runtime_ns: f64) {
        self.average_ns = Some(match self.average_ns {
            Some(avg) => avg + self.alpha * (measured_runtime_ns - avg),
            None => measured_runtime_ns,
        });
    }
}
