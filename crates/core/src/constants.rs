// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tunable magnitudes from spec.md §6, with their defaults.

use std::time::Duration;

/// Lower bound enforced on `Global.restic_stale_lock_age`, even if the
/// user configures something smaller.
pub const MIN_RESTIC_STALE_LOCK_AGE: Duration = Duration::from_secs(60 * 60);

/// Clamp window for the wait-and-retry delay computed in `pr-retry`.
pub const MIN_RESTIC_LOCK_RETRY_TIME: Duration = Duration::from_secs(1);
pub const MAX_RESTIC_LOCK_RETRY_TIME: Duration = Duration::from_secs(60);

/// How often the throttled lock-wait log line may repeat.
pub const LOG_LOCK_WAIT_EVERY: Duration = Duration::from_secs(5 * 60);

/// Internal sleep between `TryAcquire` attempts in the filesystem lock loop.
pub const LOCK_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Upper bound on captured stderr kept for a `CommandError` (spec.md §9,
/// Open Question 3): a ring buffer of this many trailing lines.
pub const MAX_CAPTURED_STDERR_LINES: usize = 200;
