/*
SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Periodic real-time task runtime with `SCHED_DEADLINE` budget prediction.
//!
//! An application decomposes work into a small number of long-lived
//! [`task::Task`]s, each a dedicated worker bound to a CPU set and
//! (optionally) the Linux `SCHED_DEADLINE` policy. Jobs — opaque payloads —
//! are enqueued to a task and executed strictly in FIFO order by its worker.
//! When prediction is enabled, the worker measures per-job CPU runtime, feeds
//! it to an external [`predictor::Predictor`], and reprograms the kernel
//! runtime reservation for the next job.
//!
//! Linux only — the runtime directly programs `sched_setattr`/`sched_getattr`
//! and `CLOCK_THREAD_CPUTIME_ID`.
//!
//! Module layout:
//! ```text
//! lib.rs
//! ├── error      – TaskError, the misuse taxonomy (§7)
//! ├── platform   – KernelPort: syscalls, clocks, CPU masks
//! ├── trace      – EventSink: the fixed tracing catalog (§4.6)
//! ├── predictor  – Predictor: predict/train interface (§4.5)
//! ├── metrics    – user metrics closure → feature vector
//! ├── queue      – FIFO job queue + counting semaphore (§4.4)
//! ├── task       – the task worker itself: flavours, state machine, run_job
//! ├── registry   – process-global handle table (used by ffi)
//! └── ffi        – C-ABI entry points (§6)
//! ```

pub mod error;
pub mod ffi;
pub mod metrics;
pub mod platform;
pub mod predictor;
pub mod queue;
pub mod registry;
pub mod task;
pub mod trace;

pub use error::TaskError;
pub use predictor::{EmaPredictor, NoopPredictor, Predictor};
pub use task::{CpuMask, Flavour, Task};
pub use trace::EventSink;
