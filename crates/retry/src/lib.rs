// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Retry policy (spec.md §4.5): decides retry/succeed/fail after each
//! engine invocation. Pure and IO-free — the actual `unlock` subprocess
//! invocation is performed by the caller (`pr-runner`) after this crate
//! says `AttemptUnlock`, and the outcome is fed back through
//! `resolve_after_unlock_attempt`.

use pr_core::{CommandError, OutputAnalysis, ProfileCommand, MAX_RESTIC_LOCK_RETRY_TIME, MIN_RESTIC_LOCK_RETRY_TIME, MIN_RESTIC_STALE_LOCK_AGE};
use std::time::{Duration, Instant};

/// What the remote-lock-failure decision tree (spec.md §4.5.1–2) resolved
/// to for this invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteLockDecision {
    NoRetry,
    RetryAfter(Duration),
    /// The caller must run the engine's `unlock` subcommand and report the
    /// outcome back through `resolve_after_unlock_attempt`.
    AttemptUnlock,
}

/// Everything `can_retry_after_remote_lock_failure` needs, gathered from
/// `Global`, the profile, and `WrapperState`.
pub struct RemoteLockInput {
    pub restic_stale_lock_age: Duration,
    pub restic_lock_retry_after: Duration,
    pub force_lock: bool,
    pub done_try_unlock: bool,
    pub lock_wait: Option<Duration>,
    pub start_time: Instant,
    pub execution_time: Duration,
}

/// Returns true iff `command` is backup, `no_error_on_warning` is set, and
/// the underlying exit code is exactly 3 ("could not read some source
/// files") — spec.md §4.5.
pub fn can_succeed_after_error(
    command: &ProfileCommand,
    no_error_on_warning: bool,
    err: &CommandError,
) -> bool {
    matches!(command, ProfileCommand::Backup) && no_error_on_warning && err.exit_code() == Some(3)
}

/// spec.md §4.5 "canRetryAfterError": true iff the output analysis
/// indicates a remote-lock failure and the decision tree below grants a
/// retry. `check` and `retention` invocations route through this same
/// function too (spec.md §9, Open Question 4).
pub fn can_retry_after_error(
    analysis: &OutputAnalysis,
    input: &RemoteLockInput,
    now: Instant,
) -> RemoteLockDecision {
    if !analysis.contains_remote_lock_failure() {
        return RemoteLockDecision::NoRetry;
    }
    can_retry_after_remote_lock_failure(analysis, input, now)
}

/// spec.md §4.5.1–2 decision tree.
pub fn can_retry_after_remote_lock_failure(
    analysis: &OutputAnalysis,
    input: &RemoteLockInput,
    now: Instant,
) -> RemoteLockDecision {
    if let Some(decision) = stale_lock_branch(analysis, input) {
        return decision;
    }
    wait_and_retry_branch(input, now)
}

/// Returns `Some` only when the stale-lock branch actually fires (age
/// present, staleness configured, and the lock is in fact stale). `None`
/// means "fall through to the wait-and-retry branch".
fn stale_lock_branch(analysis: &OutputAnalysis, input: &RemoteLockInput) -> Option<RemoteLockDecision> {
    let age = analysis.remote_locked_since()?;
    if input.restic_stale_lock_age.is_zero() {
        return None;
    }
    let threshold = input.restic_stale_lock_age.max(MIN_RESTIC_STALE_LOCK_AGE);
    if age < threshold {
        return None;
    }

    if input.done_try_unlock {
        return Some(RemoteLockDecision::NoRetry);
    }
    if !input.force_lock {
        tracing::warn!(
            age_secs = age.as_secs(),
            "repository has a stale lock; rerun with force-lock enabled to remove it"
        );
        return Some(RemoteLockDecision::NoRetry);
    }
    Some(RemoteLockDecision::AttemptUnlock)
}

fn wait_and_retry_branch(input: &RemoteLockInput, now: Instant) -> RemoteLockDecision {
    let Some(lock_wait) = input.lock_wait else {
        return RemoteLockDecision::NoRetry;
    };
    if input.restic_lock_retry_after.is_zero() {
        return RemoteLockDecision::NoRetry;
    }

    let elapsed = now.saturating_duration_since(input.start_time);
    let available = lock_wait.saturating_sub(elapsed) + input.execution_time;
    let delay = input
        .restic_lock_retry_after
        .clamp(MIN_RESTIC_LOCK_RETRY_TIME, MAX_RESTIC_LOCK_RETRY_TIME)
        .min(available);

    if delay >= MIN_RESTIC_LOCK_RETRY_TIME {
        tracing::info!(
            "{}",
            pr_core::lock_wait_message(delay, elapsed, "remote repository")
        );
        RemoteLockDecision::RetryAfter(delay)
    } else {
        RemoteLockDecision::NoRetry
    }
}

/// Resolves the result of having run the engine's `unlock` subcommand
/// after `AttemptUnlock` was returned: retry with zero delay on success,
/// otherwise no retry (spec.md §4.5.1).
pub fn resolve_after_unlock_attempt(unlock_succeeded: bool) -> RemoteLockDecision {
    if unlock_succeeded {
        RemoteLockDecision::RetryAfter(Duration::ZERO)
    } else {
        RemoteLockDecision::NoRetry
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
