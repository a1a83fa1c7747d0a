/*
SPDX-FileCopyrightText: Copyright 2024 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Process-global handle table (spec §9, "Global handle table").
//!
//! The reference keeps a raw vector of task pointers; handles here are
//! likewise plain integers (so the C ABI in [`crate::ffi`] stays unchanged),
//! but the table itself is an owned object rather than a bare global, the
//! same "manager owns the map" shape as the teacher's `NodeConfigManager`
//! (`config/mod.rs`) — a `Mutex`-guarded collection plus accessor methods,
//! no YAML loading involved since this table has no file to load.
//!
//! Handles are never reused: the table only grows, and the spec's C ABI
//! exposes no "destroy task" entry point, so a freed slot that could be
//! recycled never arises. A handle from a past process (or a bogus caller
//! value) simply fails to resolve.

use std::sync::{Arc, Mutex};

/// A growing table mapping integer handles to live tasks.
///
/// Generic over the task's payload type so it can be tested independently
/// of the C-ABI's `RawPayload` wrapper used in [`crate::ffi`].
pub struct Registry<T: Send + 'static> {
    tasks: Mutex<Vec<Arc<crate::task::Task<T>>>>,
}

impl<T: Send + 'static> Registry<T> {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Insert a task, returning its handle. Handles are assigned in
    /// insertion order starting at 0 and are never reused.
    pub fn insert(&self, task: crate::task::Task<T>) -> i32 {
        let mut tasks = self.tasks.lock().unwrap();
        let handle = tasks.len() as i32;
        tasks.push(Arc::new(task));
        handle
    }

    /// Resolve a handle to its task, or `None` if it was never issued.
    pub fn get(&self, handle: i32) -> Option<Arc<crate::task::Task<T>>> {
        if handle < 0 {
            return None;
        }
        self.tasks.lock().unwrap().get(handle as usize).cloned()
    }

    /// Number of tasks ever registered.
    pub fn len(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + 'static> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
