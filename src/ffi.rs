/*
SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! C-ABI entry points (spec §6): the surface two demonstration drivers use
//! to build pipelines of tasks. Handles are plain `c_int`s indexing into a
//! single process-global [`Registry`]; every call is thread-safe with
//! respect to calls on a *different* handle, and the caller must serialize
//! calls on the same handle themselves (spec §6).
//!
//! Mirrors `original_source/ctask.h`/`ctask.cc`'s surface one-to-one, with
//! the same `cpu_mask` low-8-bits convention and the same
//! `{size, data}`-owned-by-callee metrics contract — the pointer is
//! expected to come from `malloc` (or an equivalent C allocator) and is
//! released here with `libc::free` after its contents are copied into a
//! native `Vec<f64>`, never with `Vec::from_raw_parts`, since the caller
//! and this library are not guaranteed to share a Rust global allocator.

use std::ffi::c_void;
use std::sync::OnceLock;

use crate::platform::cpu_mask_to_vec;
use crate::predictor::EmaPredictor;
use crate::registry::Registry;
use crate::task::{CpuMask, Task};

/// A `void *` payload, opaque to the library. `execute` and
/// `generate_metrics` are the only code that ever dereferences it.
struct RawPayload(*mut c_void);

// SAFETY: the library never dereferences the pointer itself — it is handed
// unchanged to the caller-supplied `execute`/`generate_metrics` function
// pointers, which the caller has promised are safe to invoke from the
// task's worker thread.
unsafe impl Send for RawPayload {}

/// Mirrors `struct metrics` in `ctask.h`: a caller-allocated, library-freed
/// buffer of `size` doubles.
#[repr(C)]
pub struct CMetrics {
    pub size: i32,
    pub data: *mut f64,
}

type ExecuteFn = extern "C" fn(*mut c_void);
type GenerateMetricsFn = extern "C" fn(*mut c_void) -> CMetrics;

fn registry() -> &'static Registry<RawPayload> {
    static REGISTRY: OnceLock<Registry<RawPayload>> = OnceLock::new();
    REGISTRY.get_or_init(Registry::new)
}

/// Copy a caller-produced `{size, data}` buffer into a `Vec<f64>` and free
/// the original allocation. `size <= 0` or a null `data` yields an empty
/// vector without touching the pointer.
///
/// # Safety
/// `data` must either be null, or point to at least `size` contiguous,
/// initialized `f64`s allocated by a `libc::free`-compatible allocator.
unsafe fn collect_c_metrics(raw: CMetrics) -> Vec<f64> {
    if raw.data.is_null() || raw.size <= 0 {
        return Vec::new();
    }
    let slice = std::slice::from_raw_parts(raw.data, raw.size as usize);
    let metrics = slice.to_vec();
    libc::free(raw.data as *mut c_void);
    metrics
}

fn fatal_misuse(id: i32, err: crate::error::TaskError) -> ! {
    tracing::error!(target: "cbs_rt::ffi", id, error = %err, "misuse across the C boundary, aborting");
    std::process::abort();
}

/// `create_non_rt_task(cpu_mask, id, execute)` → handle. Best-effort
/// flavour.
///
/// # Safety
/// `execute` must be a valid function pointer, safe to call from any
/// thread with the payload pointer it was given by
/// [`add_job_to_task`].
#[no_mangle]
pub unsafe extern "C" fn create_non_rt_task(cpu_mask: u8, id: i32, execute: ExecuteFn) -> i32 {
    let cpus = cpu_mask_to_vec(cpu_mask);
    let task = Task::best_effort(id, CpuMask::pinned(cpus), move |payload: RawPayload| {
        execute(payload.0);
    });
    registry().insert(task)
}

/// `create_task(cpu_mask, id, period_ns, execute, execution_time_ns)` →
/// handle. Fixed-budget real-time flavour.
///
/// # Safety
/// See [`create_non_rt_task`].
#[no_mangle]
pub unsafe extern "C" fn create_task(
    cpu_mask: u8,
    id: i32,
    period_ns: u64,
    execute: ExecuteFn,
    execution_time_ns: u64,
) -> i32 {
    let cpus = cpu_mask_to_vec(cpu_mask);
    let task = Task::fixed_budget(
        id,
        std::time::Duration::from_nanos(period_ns),
        CpuMask::pinned(cpus),
        std::time::Duration::from_nanos(execution_time_ns),
        move |payload: RawPayload| {
            execute(payload.0);
        },
    )
    .unwrap_or_else(|e| fatal_misuse(id, e));
    registry().insert(task)
}

/// `create_task_with_prediction(cpu_mask, id, period_ns, execute,
/// generate_metrics_or_null)` → handle. Predictive flavour; a null
/// `generate_metrics` is equivalent to "always empty metrics vector".
/// Uses [`EmaPredictor`] — the native API's [`Predictor`](crate::predictor::Predictor)
/// trait has no slot in this fixed C signature for a caller-supplied
/// implementation.
///
/// # Safety
/// See [`create_non_rt_task`]. `generate_metrics`, if non-null, must
/// return a `{size, data}` buffer meeting [`collect_c_metrics`]'s
/// safety contract.
#[no_mangle]
pub unsafe extern "C" fn create_task_with_prediction(
    cpu_mask: u8,
    id: i32,
    period_ns: u64,
    execute: ExecuteFn,
    generate_metrics: Option<GenerateMetricsFn>,
) -> i32 {
    let cpus = cpu_mask_to_vec(cpu_mask);
    let metrics_fn: Option<Box<dyn FnMut(&RawPayload) -> Vec<f64> + Send>> =
        generate_metrics.map(|generate| {
            Box::new(move |payload: &RawPayload| {
                // SAFETY: contract documented on `collect_c_metrics` and on
                // this function.
                unsafe { collect_c_metrics(generate(payload.0)) }
            }) as Box<dyn FnMut(&RawPayload) -> Vec<f64> + Send>
        });

    let task = Task::predictive(
        id,
        std::time::Duration::from_nanos(period_ns),
        CpuMask::pinned(cpus),
        None,
        Box::new(EmaPredictor::default()),
        metrics_fn,
        move |payload: RawPayload| {
            execute(payload.0);
        },
    )
    .unwrap_or_else(|e| fatal_misuse(id, e));
    registry().insert(task)
}

/// `add_job_to_task(handle, payload)`: enqueue and signal. Enqueuing on an
/// already-joined task is misuse (spec §7) and is fatal at the site, since
/// the C signature has no channel to report it back to the caller.
#[no_mangle]
pub extern "C" fn add_job_to_task(handle: i32, payload: *mut c_void) {
    if let Some(task) = registry().get(handle) {
        let id = task.id();
        if let Err(e) = task.add_job(RawPayload(payload)) {
            fatal_misuse(id, e);
        }
    }
}

/// `release_sem(handle)`: extra semaphore release (shutdown nudge).
#[no_mangle]
pub extern "C" fn release_sem(handle: i32) {
    if let Some(task) = registry().get(handle) {
        task.sem_release();
    }
}

/// `join_task(handle)`: block until the worker exits.
#[no_mangle]
pub extern "C" fn join_task(handle: i32) {
    if let Some(task) = registry().get(handle) {
        task.join();
    }
}

/// `task_id(handle)`: the caller-assigned id.
#[no_mangle]
pub extern "C" fn task_id(handle: i32) -> i32 {
    registry().get(handle).map(|t| t.id()).unwrap_or(-1)
}

/// `task_period(handle)`: period in nanoseconds.
#[no_mangle]
pub extern "C" fn task_period(handle: i32) -> u64 {
    registry()
        .get(handle)
        .map(|t| t.period().as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    static LAST_SEEN: AtomicI32 = AtomicI32::new(-1);

    extern "C" fn record_payload(payload: *mut c_void) {
        LAST_SEEN.store(payload as i32, Ordering::SeqCst);
    }

    #[test]
    fn best_effort_round_trip_through_the_c_abi() {
        // SAFETY: `record_payload` is a valid, thread-safe function pointer.
        let handle = unsafe { create_non_rt_task(0b0000_0001, 42, record_payload) };
        assert_eq!(task_id(handle), 42);
        assert_eq!(task_period(handle), 0);

        add_job_to_task(handle, 7 as *mut c_void);
        release_sem(handle);
        join_task(handle);

        assert_eq!(LAST_SEEN.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn unknown_handle_accessors_are_inert() {
        assert_eq!(task_id(9_999), -1);
        assert_eq!(task_period(9_999), 0);
        // Must not panic.
        add_job_to_task(9_999, std::ptr::null_mut());
        release_sem(9_999);
        join_task(9_999);
    }

    #[test]
    fn fixed_budget_task_reports_its_period() {
        extern "C" fn noop(_: *mut c_void) {}
        // SAFETY: `noop` is a valid function pointer.
        let handle = unsafe { create_task(0, 1, 40_000_000, noop, 10_000_000) };
        assert_eq!(task_period(handle), 40_000_000);
        release_sem(handle);
        join_task(handle);
    }

    #[test]
    fn predictive_task_with_null_generator_runs_to_completion() {
        extern "C" fn noop(_: *mut c_void) {}
        // SAFETY: `noop` is a valid function pointer; `None` generator is
        // explicitly supported.
        let handle =
            unsafe { create_task_with_prediction(0, 2, 33_333_333, noop, None) };
        add_job_to_task(handle, std::ptr::null_mut());
        release_sem(handle);
        join_task(handle);
        assert_eq!(task_id(handle), 2);
    }
}
