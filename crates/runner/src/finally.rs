// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scope-exit registration for finally hooks (spec.md §4.7 "Finally
//! guarantee"): actions registered here run in reverse order on drop,
//! regardless of how the scope is left — ordinary return, early `?`, or
//! the caught panic from the spawned phase task.

pub struct FinallyGuard<'a> {
    actions: Vec<Box<dyn FnOnce() + Send + 'a>>,
}

impl<'a> FinallyGuard<'a> {
    pub fn new() -> Self {
        Self { actions: Vec::new() }
    }

    pub fn register(&mut self, action: impl FnOnce() + Send + 'a) {
        self.actions.push(Box::new(action));
    }
}

impl Default for FinallyGuard<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FinallyGuard<'_> {
    fn drop(&mut self) {
        for action in self.actions.drain(..).rev() {
            action();
        }
    }
}

#[cfg(test)]
#[path = "finally_tests.rs"]
mod tests;
