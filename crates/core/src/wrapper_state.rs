// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mutable, single-run-scoped wrapper state (spec.md §3).

use crate::progress::ProgressReceiver;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Invariant 4 (spec.md §3): `done_try_unlock` transitions false → true at
/// most once per run. `set_pid` is a shared cell so it stays re-entrant
/// safe for observation by signal handling (spec.md §5).
pub struct WrapperState {
    pub start_time: Instant,
    pub execution_time: Duration,
    done_try_unlock: bool,
    pub no_lock: bool,
    pub lock_wait: Option<Duration>,
    pub set_pid: Arc<Mutex<Option<u32>>>,
    pub progress: Vec<Arc<dyn ProgressReceiver>>,
}

impl WrapperState {
    pub fn new(start_time: Instant) -> Self {
        Self {
            start_time,
            execution_time: Duration::ZERO,
            done_try_unlock: false,
            no_lock: false,
            lock_wait: None,
            set_pid: Arc::new(Mutex::new(None)),
            progress: Vec::new(),
        }
    }

    pub fn done_try_unlock(&self) -> bool {
        self.done_try_unlock
    }

    /// Marks the single automatic remote-lock removal attempt as taken.
    /// Returns `false` if it had already been marked (invariant 4).
    pub fn mark_try_unlock(&mut self) -> bool {
        if self.done_try_unlock {
            false
        } else {
            self.done_try_unlock = true;
            true
        }
    }

    pub fn notify_progress(&self, command: &str, summary: &crate::progress::Summary, stderr: &str, succeeded: bool) {
        for receiver in &self.progress {
            receiver.summary(command, summary, stderr, succeeded);
        }
    }
}

#[cfg(test)]
#[path = "wrapper_state_tests.rs"]
mod tests;
