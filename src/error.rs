/*
SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the task runtime's misuse taxonomy (spec §7).
//!
//! Syscall failures (`sched_setaffinity`, `sched_setattr`, `sched_getattr`)
//! are **not** represented here — per §7 they are fatal and the worker
//! aborts the process after logging a diagnostic, since a real-time task
//! that cannot be admitted to its intended policy cannot meet its contract
//! and the caller has no correct continuation. [`TaskError`] covers only
//! the failures a caller can react to: bad construction parameters and
//! protocol misuse.
//!
//! **Do not** replace these with a type-erased error chain — the structured
//! variants let a caller match on exactly what was misused.

use thiserror::Error;

/// Errors raised while constructing or driving a [`crate::task::Task`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// A [`crate::task::Flavour`] requiring a real-time policy was given a
    /// zero or negative period.
    #[error("task '{id}' has a non-positive period ({period_ns} ns); real-time tasks require period > 0")]
    NonPositivePeriod { id: i32, period_ns: i64 },

    /// [`crate::task::Flavour::Predictive`] was selected without a
    /// [`crate::predictor::Predictor`] implementation linked.
    #[error("task '{id}' selects the predictive flavour but no predictor implementation was supplied")]
    NoPredictorLinked { id: i32 },

    /// `add_job` was called after [`crate::task::Task::join`] had already
    /// been requested.
    #[error("task '{id}' has already been joined; no further jobs may be enqueued")]
    AlreadyJoined { id: i32 },

    /// A caller-supplied metrics generator returned a non-finite value
    /// (NaN or infinite), which would corrupt predictor training.
    #[error("task '{id}' job {job_id}: metrics generator produced a non-finite value at index {index}")]
    NonFiniteMetric { id: i32, job_id: u64, index: usize },
}
