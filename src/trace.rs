/*
SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The tracing sink (spec §4.6): a fixed, typed event catalog emitted by the
//! task worker at precisely the transitions named in §4.1 and §4.2.
//!
//! Implementations must keep emission off the critical path — no
//! allocations, no locks — so the kernel's CPU-time accounting stays
//! meaningful. The default, `()`, does nothing at all; every method below
//! has an empty default body, so `()` costs exactly zero.

/// A sink for the task worker's fixed event catalog.
///
/// All methods have no-op default bodies; implementors override only the
/// events they care about. `id` is always the caller-assigned
/// [`crate::task::Task`] id, copied verbatim.
pub trait EventSink: Send + Sync {
    /// The worker thread has started and captured its OS thread id.
    fn init_task(&self, id: i32, tid: i32) {
        let _ = (id, tid);
    }

    /// The worker has pinned itself to `cpu` (the first CPU of its mask).
    fn migrated_task(&self, id: i32, cpu: u32) {
        let _ = (id, cpu);
    }

    /// The worker has entered `SCHED_DEADLINE` and is about to yield so the
    /// kernel can evaluate admission before the first job.
    fn started_real_time_task(&self, id: i32) {
        let _ = id;
    }

    /// The worker is about to block on the job semaphore.
    fn acquire_sem(&self, id: i32) {
        let _ = id;
    }

    /// The worker has woken from the job semaphore (job or shutdown token).
    fn acquired_sem(&self, id: i32) {
        let _ = id;
    }

    /// `execute` is about to be invoked for `job_id`.
    fn begin_job(&self, id: i32, job_id: u64) {
        let _ = (id, job_id);
    }

    /// `execute` returned; `runtime_ns` is the measured thread-CPU-time delta.
    fn end_job(&self, id: i32, job_id: u64, runtime_ns: u64) {
        let _ = (id, job_id, runtime_ns);
    }

    /// The predictor produced `predicted_ns` for the upcoming job (emitted
    /// only from job 2 onward — see §4.2's first-job special case).
    fn prediction(&self, id: i32, job_id: u64, predicted_ns: i64) {
        let _ = (id, job_id, predicted_ns);
    }

    /// The worker observed an empty queue after a wake and is exiting.
    fn finished_task(&self, id: i32) {
        let _ = id;
    }
}

/// No-op sink. The library default.
impl EventSink for () {}

/// Adapts the fixed event catalog onto ordinary [`tracing`] events, target
/// `cbs_rt::trace`. Installing any `tracing_subscriber` subscriber captures
/// both this crate's domain events and its operational logging
/// (fatal-syscall diagnostics in [`crate::platform`]) through one pipeline.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn init_task(&self, id: i32, tid: i32) {
        tracing::debug!(target: "cbs_rt::trace", id, tid, "init_task");
    }

    fn migrated_task(&self, id: i32, cpu: u32) {
        tracing::debug!(target: "cbs_rt::trace", id, cpu, "migrated_task");
    }

    fn started_real_time_task(&self, id: i32) {
        tracing::info!(target: "cbs_rt::trace", id, "started_real_time_task");
    }

    fn acquire_sem(&self, id: i32) {
        tracing::trace!(target: "cbs_rt::trace", id, "acquire_sem");
    }

    fn acquired_sem(&self, id: i32) {
        tracing::trace!(target: "cbs_rt::trace", id, "acquired_sem");
    }

    fn begin_job(&self, id: i32, job_id: u64) {
        tracing::trace!(target: "cbs_rt::trace", id, job_id, "begin_job");
    }

    fn end_job(&self, id: i32, job_id: u64, runtime_ns: u64) {
        tracing::debug!(target: "cbs_rt::trace", id, job_id, runtime_ns, "end_job");
    }

    fn prediction(&self, id: i32, job_id: u64, predicted_ns: i64) {
        tracing::debug!(target: "cbs_rt::trace", id, job_id, predicted_ns, "prediction");
    }

    fn finished_task(&self, id: i32) {
        tracing::info!(target: "cbs_rt::trace", id, "finished_task");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::EventSink;
    use std::sync::Mutex;

    /// Records every emitted event in order, for assertions in tests.
    #[derive(Debug, Clone, PartialEq)]
    pub enum Event {
        InitTask { id: i32 },
        MigratedTask { id: i32, cpu: u32 },
        StartedRealTimeTask { id: i32 },
        AcquireSem { id: i32 },
        AcquiredSem { id: i32 },
        BeginJob { id: i32, job_id: u64 },
        EndJob { id: i32, job_id: u64, runtime_ns: u64 },
        Prediction { id: i32, job_id: u64, predicted_ns: i64 },
        FinishedTask { id: i32 },
    }

    #[derive(Debug, Default)]
    pub struct RecordingSink {
        events: Mutex<Vec<Event>>,
    }

    impl RecordingSink {
        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn init_task(&self, id: i32, _tid: i32) {
            self.events.lock().unwrap().push(Event::InitTask { id });
        }
        fn migrated_task(&self, id: i32, cpu: u32) {
            self.events.lock().unwrap().push(Event::MigratedTask { id, cpu });
        }
        fn started_real_time_task(&self, id: i32) {
            self.events.lock().unwrap().push(Event::StartedRealTimeTask { id });
        }
        fn acquire_sem(&self, id: i32) {
            self.events.lock().unwrap().push(Event::AcquireSem { id });
        }
        fn acquired_sem(&self, id: i32) {
            self.events.lock().unwrap().push(Event::AcquiredSem { id });
        }
        fn begin_job(&self, id: i32, job_id: u64) {
            self.events.lock().unwrap().push(Event::BeginJob { id, job_id });
        }
        fn end_job(&self, id: i32, job_id: u64, runtime_ns: u64) {
            self.events
                .lock()
                .unwrap()
                .push(Event::EndJob { id, job_id, runtime_ns });
        }
        fn prediction(&self, id: i32, job_id: u64, predicted_ns: i64) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Prediction { id, job_id, predicted_ns });
        }
        fn finished_task(&self, id: i32) {
            self.events.lock().unwrap().push(Event::FinishedTask { id });
        }
    }
}
