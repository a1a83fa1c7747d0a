/*
SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The task worker: the per-task state machine (spec §4.1), the per-job
//! protocol (spec §4.2, `run_job`), and the three task flavours (§4.3).
//!
//! ```text
//!  INIT ──► PIN ──► POLICY ──► LOOP ──► EXIT
//!                                 │ ▲
//!                                 │ │ semaphore.acquire()
//!                                 ▼ │
//!                              RUN_JOB
//! ```
//!
//! `Task<T>` is the worker core plus a job adapter (`execute`,
//! `generate_metrics`) composed inside it, per spec §9's "composition over
//! inheritance" redesign note — there is no separate non-generic base type
//! because Rust's trait objects for the closures already erase the type
//! down to `T`, the one generic parameter that matters.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::TaskError;
use crate::metrics;
use crate::platform::{KernelPort, LinuxKernelPort};
use crate::predictor::{self, Predictor};
use crate::queue::JobQueue;
use crate::trace::EventSink;

/// 90% of the period — the initial `sched_runtime` for a predictive task
/// with no caller-supplied `execution_time`, so its first job can over-run
/// freely and produce a clean measurement (spec §3, §4.1).
const INITIAL_BUDGET_FRACTION: f64 = 0.9;

/// A caller-supplied `execution_time` of at most this is treated as "not
/// supplied" for the purposes of the 90%-of-period fallback (spec §3).
const MIN_EXPLICIT_EXECUTION_TIME: Duration = Duration::from_micros(1);

// ── CPU affinity ──────────────────────────────────────────────────────────────

/// The CPU set a task's worker thread pins itself to.
///
/// Mirrors the teacher's `CpuAffinity` enum (typed bitmask instead of a
/// bare `int`), generalized from "lowest bit only" to the full set, since
/// this library's worker genuinely supports multi-CPU affinity sets (spec
/// §3: "`cpu_mask`: set of CPU indices").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuMask(Vec<u32>);

impl CpuMask {
    /// No constraint — the worker does not call `sched_setaffinity` at all.
    pub fn any() -> Self {
        Self(Vec::new())
    }

    /// Pin to exactly this set of CPU indices.
    pub fn pinned(cpus: impl IntoIterator<Item = u32>) -> Self {
        Self(cpus.into_iter().collect())
    }

    pub fn is_any(&self) -> bool {
        self.0.is_empty()
    }

    pub fn cpus(&self) -> &[u32] {
        &self.0
    }
}

// ── Flavours ──────────────────────────────────────────────────────────────────

/// The three task flavours of spec §4.3. All three share the same worker
/// state machine; only the scheduling-policy setup and the per-job
/// reprogramming step differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavour {
    /// Runs under the default kernel policy; period and execution time are
    /// ignored.
    BestEffort,
    /// `SCHED_DEADLINE` with a fixed, caller-supplied runtime budget.
    FixedBudget,
    /// `SCHED_DEADLINE` with the runtime budget reprogrammed before each
    /// job (from job 2 onward) from a [`Predictor`].
    Predictive,
}

impl Flavour {
    pub fn realtime_enabled(self) -> bool {
        !matches!(self, Flavour::BestEffort)
    }

    pub fn prediction_enabled(self) -> bool {
        matches!(self, Flavour::Predictive)
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// A long-lived worker bound to a CPU set, its FIFO job queue, and (for the
/// real-time flavours) its `SCHED_DEADLINE` reservation.
///
/// Exactly one worker thread exists for a `Task`'s entire lifetime (spec
/// §3's invariant); it is joined in [`Task::join`] or when the `Task` is
/// dropped. Two flavour constructors ([`Task::fixed_budget`],
/// [`Task::predictive`]) validate their period and return [`TaskError`] on
/// misuse (§7) instead of spawning a worker doomed to hit a fatal syscall.
pub struct Task<T: Send + 'static> {
    id: i32,
    period: Duration,
    queue: Arc<JobQueue<T>>,
    running: Arc<AtomicBool>,
    runtimes: Arc<Mutex<Vec<Duration>>>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    joined: AtomicBool,
}

impl<T: Send + 'static> Task<T> {
    /// Best-effort flavour (spec §4.3 table row 1).
    pub fn best_effort(
        id: i32,
        cpu_mask: CpuMask,
        execute: impl FnMut(T) + Send + 'static,
    ) -> Self {
        Self::spawn(
            id,
            Duration::ZERO,
            cpu_mask,
            Flavour::BestEffort,
            None,
            None,
            None,
            execute,
            Arc::new(LinuxKernelPort),
            Arc::new(()),
        )
        .expect("best-effort construction never fails validation")
    }

    /// Fixed-budget real-time flavour (spec §4.3 table row 2).
    pub fn fixed_budget(
        id: i32,
        period: Duration,
        cpu_mask: CpuMask,
        execution_time: Duration,
        execute: impl FnMut(T) + Send + 'static,
    ) -> Result<Self, TaskError> {
        if period.is_zero() {
            return Err(TaskError::NonPositivePeriod {
                id,
                period_ns: period.as_nanos() as i64,
            });
        }
        Self::spawn(
            id,
            period,
            cpu_mask,
            Flavour::FixedBudget,
            Some(execution_time),
            None,
            None,
            execute,
            Arc::new(LinuxKernelPort),
            Arc::new(()),
        )
    }

    /// Predictive real-time flavour (spec §4.3 table row 3). `generate_metrics`
    /// may be omitted — absence is equivalent to "always empty vector"
    /// (spec §4.3).
    pub fn predictive(
        id: i32,
        period: Duration,
        cpu_mask: CpuMask,
        execution_time: Option<Duration>,
        predictor: Box<dyn Predictor>,
        generate_metrics: Option<Box<dyn FnMut(&T) -> Vec<f64> + Send>>,
        execute: impl FnMut(T) + Send + 'static,
    ) -> Result<Self, TaskError> {
        if period.is_zero() {
            return Err(TaskError::NonPositivePeriod {
                id,
                period_ns: period.as_nanos() as i64,
            });
        }
        Self::spawn(
            id,
            period,
            cpu_mask,
            Flavour::Predictive,
            execution_time,
            Some(predictor),
            generate_metrics,
            execute,
            Arc::new(LinuxKernelPort),
            Arc::new(()),
        )
    }

    /// Shared constructor. `kernel` and `sink` are injected so tests can
    /// substitute [`crate::platform::fake::FakeKernelPort`] and a recording
    /// sink without touching the three public flavour constructors above.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn spawn(
        id: i32,
        period: Duration,
        cpu_mask: CpuMask,
        flavour: Flavour,
        execution_time: Option<Duration>,
        predictor: Option<Box<dyn Predictor>>,
        generate_metrics: Option<Box<dyn FnMut(&T) -> Vec<f64> + Send>>,
        execute: impl FnMut(T) + Send + 'static,
        kernel: Arc<dyn KernelPort>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self, TaskError> {
        if flavour.prediction_enabled() && predictor.is_none() {
            return Err(TaskError::NoPredictorLinked { id });
        }

        let queue: Arc<JobQueue<T>> = Arc::new(JobQueue::new());
        let running = Arc::new(AtomicBool::new(true));
        let runtimes = Arc::new(Mutex::new(Vec::new()));

        let worker_queue = Arc::clone(&queue);
        let worker_running = Arc::clone(&running);
        let worker_runtimes = Arc::clone(&runtimes);

        let mut worker = Worker::new(
            id,
            period,
            cpu_mask,
            flavour,
            execution_time,
            predictor,
            generate_metrics,
            execute,
            kernel,
            sink,
            worker_queue,
            worker_running,
            worker_runtimes,
        );

        let join_handle = thread::Builder::new()
            .name(format!("cbs-rt-task-{id}"))
            .spawn(move || worker.run())
            .expect("spawning the task worker thread");

        Ok(Self {
            id,
            period,
            queue,
            running,
            runtimes,
            join_handle: Mutex::new(Some(join_handle)),
            joined: AtomicBool::new(false),
        })
    }

    /// Enqueue `payload` and release one wake token. Never blocks. Fails
    /// with [`TaskError::AlreadyJoined`] if [`Task::join`] has already been
    /// requested (spec §4.1, §7) — `joined` is set the moment `join` is
    /// called, not once the worker has actually exited, since the contract
    /// is about the driver's intent, not the worker's progress.
    pub fn add_job(&self, payload: T) -> Result<(), TaskError> {
        if self.joined.load(Ordering::SeqCst) {
            return Err(TaskError::AlreadyJoined { id: self.id });
        }
        self.queue.add_job(payload);
        Ok(())
    }

    /// Release one wake token without enqueuing — a cheap shutdown nudge,
    /// or any other reason the driver wants the worker to re-check its
    /// queue.
    pub fn sem_release(&self) {
        self.queue.signal();
    }

    /// Block until the worker has exited. Idempotent: a second call
    /// returns immediately once the handle has already been taken.
    pub fn join(&self) {
        self.joined.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
    }

    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Advisory: `false` once the worker has observed an empty queue after
    /// a wake. Drivers may read this to decide not to enqueue further, but
    /// it is not synchronized with `add_job` — a driver racing a shutdown
    /// must not rely on it for correctness.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of jobs whose runtime has been measured so far.
    pub fn jobs_completed(&self) -> usize {
        self.runtimes.lock().unwrap().len()
    }

    /// A snapshot of every measured per-job CPU runtime, in completion
    /// order (spec §3's `runtimes`).
    pub fn runtimes(&self) -> Vec<Duration> {
        self.runtimes.lock().unwrap().clone()
    }
}

impl<T: Send + 'static> Drop for Task<T> {
    fn drop(&mut self) {
        // Joining is mandatory before destruction (spec §5); a `Task` that
        // still has a live handle here was dropped without an explicit
        // `join()`, so do it now rather than leak the thread.
        self.join();
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

/// The state owned exclusively by one worker thread for the task's entire
/// lifetime (spec §5: "Each worker is an exclusive producer of its own
/// `runtimes`, `last_checkpoint`, and predictor state").
struct Worker<T> {
    id: i32,
    period: Duration,
    cpu_mask: CpuMask,
    flavour: Flavour,
    execution_time: Option<Duration>,
    predictor: Option<Box<dyn Predictor>>,
    generate_metrics: Option<Box<dyn FnMut(&T) -> Vec<f64> + Send>>,
    execute: Box<dyn FnMut(T) + Send>,
    kernel: Arc<dyn KernelPort>,
    sink: Arc<dyn EventSink>,
    queue: Arc<JobQueue<T>>,
    running: Arc<AtomicBool>,
    runtimes: Arc<Mutex<Vec<Duration>>>,
    last_checkpoint: Duration,
}

impl<T> Worker<T> {
    fn new(
        id: i32,
        period: Duration,
        cpu_mask: CpuMask,
        flavour: Flavour,
        execution_time: Option<Duration>,
        predictor: Option<Box<dyn Predictor>>,
        generate_metrics: Option<Box<dyn FnMut(&T) -> Vec<f64> + Send>>,
        execute: impl FnMut(T) + Send + 'static,
        kernel: Arc<dyn KernelPort>,
        sink: Arc<dyn EventSink>,
        queue: Arc<JobQueue<T>>,
        running: Arc<AtomicBool>,
        runtimes: Arc<Mutex<Vec<Duration>>>,
    ) -> Self {
        Self {
            id,
            period,
            cpu_mask,
            flavour,
            execution_time,
            predictor,
            generate_metrics,
            execute: Box::new(execute),
            kernel,
            sink,
            queue,
            running,
            runtimes,
            last_checkpoint: Duration::ZERO,
        }
    }

    /// INIT → PIN → POLICY → LOOP ⇄ RUN_JOB → EXIT (spec §4.1).
    fn run(&mut self) {
        let tid = self.kernel.gettid();
        self.sink.init_task(self.id, tid);

        // PIN
        if !self.cpu_mask.is_any() {
            if let Err(e) = self.kernel.set_affinity(self.cpu_mask.cpus()) {
                fatal(self.id, "sched_setaffinity", &e);
            }
            let first_cpu = self.cpu_mask.cpus().first().copied().unwrap_or(0);
            self.sink.migrated_task(self.id, first_cpu);
        }

        // POLICY
        if self.flavour.realtime_enabled() {
            let period_ns = self.period.as_nanos() as u64;
            let runtime_ns = self.initial_runtime_ns(period_ns);
            if let Err(e) = self.kernel.enter_deadline(runtime_ns, period_ns, period_ns) {
                fatal(self.id, "sched_setattr", &e);
            }
            self.sink.started_real_time_task(self.id);
            thread::yield_now();
        }

        self.last_checkpoint = self.kernel.thread_cpu_now();

        // LOOP ⇄ RUN_JOB
        let mut job_id: u64 = 0;
        loop {
            self.sink.acquire_sem(self.id);
            let payload = self.queue.acquire_and_pop();
            self.sink.acquired_sem(self.id);

            let Some(payload) = payload else {
                break;
            };

            self.run_job(job_id, payload);
            job_id += 1;
        }

        // EXIT
        self.running.store(false, Ordering::SeqCst);
        self.sink.finished_task(self.id);
    }

    /// The initial `sched_runtime` (spec §3, §4.1): the caller-supplied
    /// `execution_time` when it is more than a microsecond, else — for the
    /// predictive flavour only — `floor(0.9 × period)`. A fixed-budget task
    /// with no meaningful `execution_time` gets `0`, which the kernel will
    /// reject; that is a misuse case the flavour constructors already
    /// guard against by requiring `execution_time` for `FixedBudget`.
    fn initial_runtime_ns(&self, period_ns: u64) -> u64 {
        match self.execution_time {
            Some(d) if d > MIN_EXPLICIT_EXECUTION_TIME => d.as_nanos() as u64,
            _ if self.flavour.prediction_enabled() => {
                (period_ns as f64 * INITIAL_BUDGET_FRACTION).floor() as u64
            }
            Some(d) => d.as_nanos() as u64,
            None => 0,
        }
    }

    /// One iteration of `run_job` (spec §4.2).
    fn run_job(&mut self, job_id: u64, payload: T) {
        if self.flavour.prediction_enabled() {
            self.reprogram_before_job(job_id, &payload);
        }

        self.sink.begin_job(self.id, job_id);
        (self.execute)(payload);

        let now = self.kernel.thread_cpu_now();
        let runtime = now.saturating_sub(self.last_checkpoint);
        self.last_checkpoint = now;
        let completed = {
            let mut runtimes = self.runtimes.lock().unwrap();
            runtimes.push(runtime);
            runtimes.len()
        };

        if self.flavour.prediction_enabled() {
            // The reference's deliberate half-nanosecond rounding-up bias.
            let measured = runtime.as_nanos() as f64 + 0.5;
            if let Some(predictor) = self.predictor.as_mut() {
                predictor.train(0, job_id, measured);
            }
            if completed == 1 {
                // Let the kernel pick up the newly trained model before the
                // next dispatch.
                thread::yield_now();
            }
        }

        self.sink.end_job(self.id, job_id, runtime.as_nanos() as u64);
    }

    /// Steps 2a–2d of §4.2: produce metrics, predict, and — except for the
    /// very first job, which has no measurement yet — reprogram
    /// `sched_runtime` from the prediction.
    fn reprogram_before_job(&mut self, job_id: u64, payload: &T) {
        let mut m = match self.generate_metrics.as_mut() {
            Some(f) => f(payload),
            None => Vec::new(),
        };
        if let Err(e) = metrics::validate(self.id, job_id, &m) {
            tracing::error!(target: "cbs_rt", id = self.id, job_id, error = %e, "non-finite metric, dropping to empty vector");
            m = Vec::new();
        }

        let predicted_ns = self
            .predictor
            .as_mut()
            .expect("predictive flavour always carries a predictor")
            .predict(0, job_id, &m);

        let first_job = self.runtimes.lock().unwrap().is_empty();
        if first_job {
            // First-job escape hatch (spec §4.2 step 2c): no reprogramming,
            // the kernel still runs at the initial 90%-of-period budget
            // (§8 property 6). The protocol calls for the checkpoint to be
            // re-stamped *here*, not once at worker entry, so this job's
            // measured runtime does not include the cost of this function's
            // own metrics/predict calls.
            self.last_checkpoint = self.kernel.thread_cpu_now();
            return;
        }

        self.sink.prediction(self.id, job_id, predicted_ns);
        let period_ns = self.period.as_nanos() as u64;
        let clamped = predictor::clamp_to_period(predicted_ns, period_ns);
        if let Err(e) = self.kernel.set_runtime(clamped) {
            fatal(self.id, "sched_setattr (reprogram)", &e);
        }
    }
}

/// Syscall failures are fatal per spec §7: the worker cannot meet its
/// real-time contract if it can't be admitted, and there is no correct
/// continuation for the caller. Log a structured diagnostic, then abort.
fn fatal(id: i32, what: &str, err: &io::Error) -> ! {
    tracing::error!(target: "cbs_rt", id, what, error = %err, "fatal syscall failure, aborting");
    std::process::abort();
}
