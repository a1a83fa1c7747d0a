/*
SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Metrics adapter: turns a user-supplied metrics producer into the finite
//! feature vector the [`crate::predictor::Predictor`] expects.
//!
//! A predictive task may be created without a metrics generator at all —
//! that is equivalent to "always produce the empty vector" (spec §4.3).
//! The C ABI's generator returns a `{size, data}` buffer it owns; freeing
//! that buffer after the copy happens at the FFI boundary
//! ([`crate::ffi::collect_c_metrics`]), not here — this module only deals
//! with the already-safe `Vec<f64>` form used by the native Rust API.

use crate::error::TaskError;

/// Validate a metrics vector before it reaches the predictor: every
/// element must be finite (no NaN, no infinity), since a non-finite
/// feature would silently corrupt the predictor's trained model.
pub fn validate(id: i32, job_id: u64, metrics: &[f64]) -> Result<(), TaskError> {
    if let Some(index) = metrics.iter().position(|v| !v.is_finite()) {
        return Err(TaskError::NonFiniteMetric { id, job_id, index });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_vector_is_valid() {
        assert!(validate(1, 0, &[]).is_ok());
    }

    #[test]
    fn finite_values_are_valid() {
        assert!(validate(1, 0, &[1.0, -2.5, 0.0]).is_ok());
    }

    #[test]
    fn nan_is_rejected_with_its_index() {
        let err = validate(1, 3, &[1.0, f64::NAN, 2.0]).unwrap_err();
        assert_eq!(
            err,
            TaskError::NonFiniteMetric { id: 1, job_id: 3, index: 1 }
        );
    }

    #[test]
    fn infinity_is_rejected() {
        let err = validate(2, 0, &[f64::INFINITY]).unwrap_err();
        assert_eq!(err, TaskError::NonFiniteMetric { id: 2, job_id: 0, index: 0 });
    }
}
