/*
SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Platform shim: `gettid`, `sched_setattr`/`sched_getattr` via raw
//! syscalls, CPU-affinity set construction, and the monotonic / thread-CPU
//! clocks (spec §6, "Kernel interface").
//!
//! Kernel interaction is reached through [`KernelPort`] rather than called
//! directly from [`crate::task`], the same way the teacher takes its
//! `NodeConfigManager` as an injected dependency rather than a global: the
//! production [`LinuxKernelPort`] issues real syscalls, while tests inject
//! a fake that records calls and simulates CPU-time advancement, so the
//! budget-reprogramming and affinity laws (spec §8, properties 5 and 7)
//! are checkable without `CAP_SYS_NICE`.

use std::io;
use std::time::Duration;

/// `SCHED_DEADLINE`'s numeric policy value (spec §6).
pub const SCHED_DEADLINE: u32 = 6;

/// The kernel ABI's `sched_attr` layout (spec §6). Field order and sizes
/// must match the kernel's `struct sched_attr` exactly, since it crosses
/// the `sched_setattr`/`sched_getattr` syscall boundary as raw bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedAttr {
    pub size: u32,
    pub sched_policy: u32,
    pub sched_flags: u64,
    pub sched_nice: i32,
    pub sched_priority: u32,
    pub sched_runtime: u64,
    pub sched_deadline: u64,
    pub sched_period: u64,
}

impl SchedAttr {
    pub fn deadline(runtime_ns: u64, deadline_ns: u64, period_ns: u64) -> Self {
        Self {
            size: std::mem::size_of::<Self>() as u32,
            sched_policy: SCHED_DEADLINE,
            sched_flags: 0,
            sched_nice: 0,
            sched_priority: 0,
            sched_runtime: runtime_ns,
            sched_deadline: deadline_ns,
            sched_period: period_ns,
        }
    }
}

/// Everything the task worker needs from the kernel, as a pluggable
/// dependency (spec §9's "Predictor as dependency" note applies equally
/// here — the same pattern, a different seam).
pub trait KernelPort: Send + Sync {
    /// The calling thread's OS thread id (`gettid`).
    fn gettid(&self) -> i32;

    /// Pin the *calling* thread to exactly the CPUs in `cpus`
    /// (`sched_setaffinity(0, ...)`). An empty slice is a caller error —
    /// the worker only calls this when the mask is non-empty (spec §4.1).
    fn set_affinity(&self, cpus: &[u32]) -> io::Result<()>;

    /// Enter `SCHED_DEADLINE` on the calling thread with the given initial
    /// reservation (`sched_setattr(0, ...)`).
    fn enter_deadline(&self, runtime_ns: u64, deadline_ns: u64, period_ns: u64) -> io::Result<()>;

    /// Read back the calling thread's current `sched_attr`
    /// (`sched_getattr(0, ...)`).
    fn get_attr(&self) -> io::Result<SchedAttr>;

    /// Reprogram the calling thread's `sched_runtime`, leaving the rest of
    /// its `sched_attr` untouched (read-modify-write via `get_attr` then
    /// `sched_setattr`, per spec §4.2d).
    fn set_runtime(&self, runtime_ns: u64) -> io::Result<()>;

    /// Thread-CPU-time clock (`CLOCK_THREAD_CPUTIME_ID`) — used to measure
    /// per-job runtime, since the `SCHED_DEADLINE` budget is CPU-time, not
    /// wall-time (spec §4.2).
    fn thread_cpu_now(&self) -> Duration;

    /// Monotonic wall clock (`CLOCK_MONOTONIC`) — used outside jobs only;
    /// the worker itself never measures a job with this clock.
    fn monotonic_now(&self) -> Duration;
}

/// The real, Linux `KernelPort`: every method is a raw syscall.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxKernelPort;

impl KernelPort for LinuxKernelPort {
    fn gettid(&self) -> i32 {
        unsafe { libc::gettid() }
    }

    fn set_affinity(&self, cpus: &[u32]) -> io::Result<()> {
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_ZERO(&mut set);
            for &cpu in cpus {
                libc::CPU_SET(cpu as usize, &mut set);
            }
            let ret = libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set);
            if ret < 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    fn enter_deadline(&self, runtime_ns: u64, deadline_ns: u64, period_ns: u64) -> io::Result<()> {
        let attr = SchedAttr::deadline(runtime_ns, deadline_ns, period_ns);
        sched_setattr(&attr)
    }

    fn get_attr(&self) -> io::Result<SchedAttr> {
        sched_getattr()
    }

    fn set_runtime(&self, runtime_ns: u64) -> io::Result<()> {
        let mut attr = self.get_attr()?;
        attr.sched_runtime = runtime_ns;
        sched_setattr(&attr)
    }

    fn thread_cpu_now(&self) -> Duration {
        clock_now(libc::CLOCK_THREAD_CPUTIME_ID)
    }

    fn monotonic_now(&self) -> Duration {
        clock_now(libc::CLOCK_MONOTONIC)
    }
}

fn clock_now(clock_id: libc::clockid_t) -> Duration {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `ts` is a valid, fully-initialized out-pointer of the right type.
    let ret = unsafe { libc::clock_gettime(clock_id, &mut ts) };
    debug_assert_eq!(ret, 0, "clock_gettime failed for clock {clock_id}");
    Duration::new(ts.tv_sec.max(0) as u64, ts.tv_nsec as u32)
}

fn sched_setattr(attr: &SchedAttr) -> io::Result<()> {
    // SAFETY: `attr` matches the kernel's struct sched_attr layout exactly
    // and `size` is set to its own size, as the ABI requires.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_sched_setattr,
            0, // pid: the calling thread
            attr as *const SchedAttr,
            0u32, // flags
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn sched_getattr() -> io::Result<SchedAttr> {
    let mut attr = SchedAttr {
        size: std::mem::size_of::<SchedAttr>() as u32,
        ..Default::default()
    };
    // SAFETY: `attr` is large enough for the kernel to fill and `size`
    // tells it exactly how large.
    let ret = unsafe {
        libc::syscall(
            libc::SYS_sched_getattr,
            0, // pid: the calling thread
            &mut attr as *mut SchedAttr,
            std::mem::size_of::<SchedAttr>() as u32,
            0u32, // flags
        )
    };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(attr)
}

/// Parse a `cpu_mask` bitmap into the list of requested CPU ids, lowest bit
/// first. Only the low 8 bits are honored (spec §6); an all-zero mask means
/// "no affinity change" and yields an empty vec.
///
/// Mirrors `original_source/ctask.cc::get_cpus`'s low-bit walk.
pub fn cpu_mask_to_vec(cpu_mask: u8) -> Vec<u32> {
    (0..8u32).filter(|bit| (cpu_mask >> bit) & 1 == 1).collect()
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpu_mask_zero_is_empty() {
        assert_eq!(cpu_mask_to_vec(0), Vec::<u32>::new());
    }

    #[test]
    fn cpu_mask_single_bit() {
        assert_eq!(cpu_mask_to_vec(0b0000_0001), vec![0]);
    }

    #[test]
    fn cpu_mask_multiple_bits_lowest_first() {
        assert_eq!(cpu_mask_to_vec(0b0000_1010), vec![1, 3]);
    }

    #[test]
    fn cpu_mask_full_byte() {
        assert_eq!(cpu_mask_to_vec(0xFF), vec![0, 1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn sched_attr_deadline_sets_matching_fields() {
        let attr = SchedAttr::deadline(10, 40, 40);
        assert_eq!(attr.sched_policy, SCHED_DEADLINE);
        assert_eq!(attr.sched_runtime, 10);
        assert_eq!(attr.sched_deadline, 40);
        assert_eq!(attr.sched_period, 40);
        assert_eq!(attr.size as usize, std::mem::size_of::<SchedAttr>());
    }
}
