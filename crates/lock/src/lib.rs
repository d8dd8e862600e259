// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Advisory per-profile file lock (spec.md §4.4): owner identity, forced
//! acquisition, and stale detection via the acquisition protocol in
//! `lock_run`.

use pr_core::LOCK_POLL_INTERVAL;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another process is already running this profile: {holder}")]
    AlreadyRunning { holder: String },
    #[error("io error on lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// An advisory lock identified by a filesystem path. Existence of the
/// file denotes ownership; its contents identify the holder.
#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempts atomic, exclusive creation of the lock file.
    pub fn try_acquire(&self, holder: &str) -> io::Result<bool> {
        #[cfg(unix)]
        use std::os::unix::fs::OpenOptionsExt;

        let mut opts = std::fs::OpenOptions::new();
        opts.write(true).create_new(true);
        #[cfg(unix)]
        opts.mode(0o644);

        match opts.open(&self.path) {
            Ok(mut file) => {
                use std::io::Write;
                file.write_all(holder.as_bytes())?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Unconditionally overwrites the lock file, claiming it regardless of
    /// the current holder.
    pub fn force_acquire(&self, holder: &str) -> io::Result<bool> {
        self.write_contents(holder)?;
        Ok(true)
    }

    /// Returns the current holder identity. A not-exist error distinguishes
    /// "lock vanished" from other unreadable-lock failures.
    pub fn who(&self) -> io::Result<String> {
        std::fs::read_to_string(&self.path)
    }

    /// Records the current child PID into the lock file for introspection
    /// (spec.md §3 "setPID", §4.4 point 4: the locked body runs "with
    /// SetPID bound").
    pub fn set_pid(&self, holder: &str, pid: u32) -> io::Result<()> {
        self.write_contents(&format!("{holder} (pid {pid})"))
    }

    /// Reverts the lock file to plain holder identity once the child that
    /// `set_pid` recorded has exited.
    pub fn clear_pid(&self, holder: &str) -> io::Result<()> {
        self.write_contents(holder)
    }

    fn write_contents(&self, contents: &str) -> io::Result<()> {
        std::fs::write(&self.path, contents.as_bytes())
    }

    pub fn release(&self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "failed to release lock file");
            }
        }
    }
}

/// RAII guard that releases the lock on every exit path, including
/// unwinding (spec.md §4.4 point 4, §9 "Finally semantics via scope-exit").
struct ReleaseGuard<'a> {
    lock: &'a FileLock,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

/// Caller-supplied knobs for one `lock_run` invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockOptions {
    pub force: bool,
    pub wait_budget: Option<Duration>,
}

/// Bound into `lock_run`'s body (spec.md §4.4 point 4: "run the supplied
/// body with SetPID bound"). Calling `set` records the currently running
/// child's PID into the lock file for introspection, and clears it back
/// to plain holder identity once the child exits. A no-op when the run is
/// unlocked (empty lock path, or the lock directory could not be created).
#[derive(Clone)]
pub struct SetPid {
    inner: Option<(Arc<FileLock>, String)>,
}

impl SetPid {
    fn bound(lock: Arc<FileLock>, holder: String) -> Self {
        Self {
            inner: Some((lock, holder)),
        }
    }

    fn unbound() -> Self {
        Self { inner: None }
    }

    pub fn set(&self, pid: Option<u32>) {
        let Some((lock, holder)) = &self.inner else {
            return;
        };
        let result = match pid {
            Some(pid) => lock.set_pid(holder, pid),
            None => lock.clear_pid(holder),
        };
        if let Err(e) = result {
            tracing::warn!(path = %lock.path().display(), error = %e, "failed to update lock file with child pid");
        }
    }
}

/// The acquisition protocol of spec.md §4.4, run around `body`.
///
/// If `lock_path` is empty, proceeds unlocked. Otherwise loops trying to
/// acquire the lock, waiting (throttled, logged once every
/// `LOG_LOCK_WAIT_EVERY`) up to `options.wait_budget`, or force-acquiring
/// when `options.force` is set and the budget is exhausted.
pub async fn lock_run<F, Fut, T>(
    lock_path: &Path,
    holder: &str,
    mut options: LockOptions,
    body: F,
) -> Result<T, LockError>
where
    F: FnOnce(SetPid) -> Fut,
    Fut: Future<Output = T>,
{
    if lock_path.as_os_str().is_empty() {
        return Ok(body(SetPid::unbound()).await);
    }

    if let Some(parent) = lock_path.parent() {
        if let Err(e) = create_dir_all_0755(parent) {
            tracing::warn!(path = %parent.display(), error = %e, "failed to create lock directory, proceeding unlocked");
            return Ok(body(SetPid::unbound()).await);
        }
    }

    let lock = Arc::new(FileLock::new(lock_path.to_path_buf()));
    let start = Instant::now();
    let mut last_logged: Option<Instant> = None;

    loop {
        if lock.try_acquire(holder).map_err(|e| io_err(lock_path, e))? {
            break;
        }

        let current_holder = match lock.who() {
            Ok(h) => h.trim().to_string(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => "none".to_string(),
            Err(e) => return Err(io_err(lock_path, e)),
        };

        // Force-acquisition bypass only applies once there is no further
        // waiting to do (invariant 1 in spec.md §3: "except when ForceLock
        // bypass is explicitly invoked after a wait deadline"). A budget
        // that hasn't been exhausted yet still gets its full wait.
        match options.wait_budget {
            Some(budget) => {
                let elapsed = start.elapsed();
                if elapsed < budget {
                    let now = Instant::now();
                    let should_log = last_logged
                        .map(|l| now.duration_since(l) >= pr_core::LOG_LOCK_WAIT_EVERY)
                        .unwrap_or(true);
                    if should_log {
                        tracing::info!(
                            "{}",
                            pr_core::lock_wait_message(budget - elapsed, elapsed, &current_holder)
                        );
                        last_logged = Some(now);
                    }
                    let remaining = budget - elapsed;
                    let sleep_for = remaining.min(LOCK_POLL_INTERVAL);
                    tokio::time::sleep(sleep_for).await;
                } else {
                    tracing::warn!(
                        holder = %current_holder,
                        "lock-wait budget exhausted, will fail if still locked"
                    );
                    options.wait_budget = None;
                }
            }
            None => {
                if options.force {
                    if lock.force_acquire(holder).map_err(|e| io_err(lock_path, e))? {
                        tracing::warn!(previous_holder = %current_holder, "forced lock acquisition");
                        break;
                    }
                }
                return Err(LockError::AlreadyRunning {
                    holder: current_holder,
                });
            }
        }
    }

    let guard = ReleaseGuard { lock: &lock };
    let set_pid = SetPid::bound(lock.clone(), holder.to_string());
    let result = body(set_pid).await;
    drop(guard);
    Ok(result)
}

fn io_err(path: &Path, source: io::Error) -> LockError {
    LockError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Creates the lock file's parent directories with mode `0755` (spec.md
/// §6), rather than `create_dir_all`'s umask-dependent mode.
#[cfg(unix)]
fn create_dir_all_0755(path: &Path) -> io::Result<()> {
    use std::fs::DirBuilder;
    use std::os::unix::fs::DirBuilderExt;

    DirBuilder::new().recursive(true).mode(0o755).create(path)
}

#[cfg(not(unix))]
fn create_dir_all_0755(path: &Path) -> io::Result<()> {
    std::fs::create_dir_all(path)
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
