// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Profile run state machine (spec.md §4.7): the top-level choreography
//! that turns a single `(profile, command)` request into a correctly
//! ordered sequence of subprocess executions — lock acquisition, pre-hooks,
//! conditional init, backup-specific sub-phases, the retrying main
//! command, post-hooks, and a finally guarantee that survives even a
//! panic in the main phase.

mod finally;

use pr_core::{
    ArgBuilder, ArgKind, Clock, CommandError, Global, Profile, ProfileCommand, ProgressReceiver,
    ScanMode, Signal, WrapperState,
};
use pr_hooks::{HookContext, HookErrorContext};
use pr_lock::{LockError, LockOptions};
use pr_process::ProcessSpec;
use pr_retry::{RemoteLockDecision, RemoteLockInput};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

pub use finally::FinallyGuard;

/// Top-level failure chain returned by `run_profile` (spec.md §7).
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("profile {profile}: lock: {source}")]
    Lock {
        profile: String,
        #[source]
        source: LockError,
    },
    #[error("profile {profile}: {phase}: {source}")]
    Hook {
        profile: String,
        phase: String,
        #[source]
        source: pr_hooks::HookError,
    },
    #[error("profile {profile}: {phase}: {source}")]
    Command {
        profile: String,
        phase: String,
        #[source]
        source: CommandError,
    },
    /// spec.md §9, Open Question 1: this repo converts a panic in the
    /// main phase into an ordinary error so `run-after-fail` runs for it
    /// too, rather than treating it as a second, unhandled failure path.
    #[error("profile {profile}: main phase panicked: {message}")]
    Panicked { profile: String, message: String },
}

impl RunnerError {
    /// The `CommandError` carried by this failure, when there is one —
    /// the access pattern spec.md §9 "Error as data" calls for.
    pub fn as_command_error(&self) -> Option<&CommandError> {
        match self {
            RunnerError::Command { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Everything one `run_profile` invocation needs from its caller.
pub struct RunContext {
    pub profile: Profile,
    pub global: Global,
    pub command: ProfileCommand,
    /// Path or name of the engine binary (e.g. `restic`).
    pub engine_program: String,
    /// User-supplied extra arguments, appended via `ArgKind::CommandLineEscape`.
    pub extra_args: Vec<String>,
    /// Base argument vector (repository flags, global options) prepared by
    /// the caller; cloned once per subprocess invocation (spec.md §4.7
    /// "Argument preparation contract").
    pub arg_builder: Box<dyn ArgBuilder>,
    pub dry_run: bool,
    /// Identity recorded into the lock file and used for "forced
    /// acquisition" warnings.
    pub holder: String,
    /// Delivers termination signals to whichever child is currently running.
    pub signal_tx: broadcast::Sender<Signal>,
    pub progress: Vec<Arc<dyn ProgressReceiver>>,
    /// Caller override: skip filesystem locking entirely.
    pub no_lock: bool,
    /// Caller override: how long to wait for the lock / remote-lock retries.
    pub lock_wait: Option<Duration>,
    pub clock: Arc<dyn Clock>,
}

/// The subset of `RunContext` that must cross the `tokio::spawn` boundary
/// used to isolate a panic in the phase sequence (spec.md §9, Open
/// Question 1; SPEC_FULL.md §4.7).
struct RunContextInner {
    profile: Profile,
    global: Global,
    command: ProfileCommand,
    engine_program: String,
    extra_args: Vec<String>,
    arg_builder: Box<dyn ArgBuilder>,
    dry_run: bool,
    signal_tx: broadcast::Sender<Signal>,
    clock: Arc<dyn Clock>,
}

impl Clone for RunContextInner {
    fn clone(&self) -> Self {
        Self {
            profile: self.profile.clone(),
            global: self.global.clone(),
            command: self.command.clone(),
            engine_program: self.engine_program.clone(),
            extra_args: self.extra_args.clone(),
            arg_builder: self.arg_builder.clone_box(),
            dry_run: self.dry_run,
            signal_tx: self.signal_tx.clone(),
            clock: self.clock.clone(),
        }
    }
}

/// Runs a single `(profile, command)` request to completion (spec.md §4.7).
///
/// Locking (spec.md §4.4) scopes the whole choreography; finally hooks
/// (backup + profile, combined and reversed per spec.md §4.6) always run,
/// even if the main phase panics.
pub async fn run_profile(ctx: RunContext) -> Result<(), RunnerError> {
    let profile_name = ctx.profile.name.clone();
    let span = tracing::info_span!(
        "profile_run",
        profile = %profile_name,
        command = ctx.command.as_str()
    );
    let _entered = span.enter();

    let mut scope_guard = FinallyGuard::new();
    let guard_profile = profile_name.clone();
    scope_guard.register(move || {
        tracing::debug!(profile = %guard_profile, "profile run scope exited");
    });

    let lock_path = if ctx.no_lock {
        PathBuf::new()
    } else {
        PathBuf::from(&ctx.profile.lock)
    };
    let lock_options = LockOptions {
        force: ctx.profile.force_lock,
        wait_budget: ctx.lock_wait,
    };
    let holder = ctx.holder.clone();

    let inner = RunContextInner {
        profile: ctx.profile,
        global: ctx.global,
        command: ctx.command,
        engine_program: ctx.engine_program,
        extra_args: ctx.extra_args,
        arg_builder: ctx.arg_builder,
        dry_run: ctx.dry_run,
        signal_tx: ctx.signal_tx,
        clock: ctx.clock,
    };
    let no_lock = ctx.no_lock;
    let lock_wait = ctx.lock_wait;
    let progress = ctx.progress;
    let start_time = inner.clock.now();

    let body = move |set_pid: pr_lock::SetPid| async move {
        let mut state = WrapperState::new(start_time);
        state.no_lock = no_lock;
        state.lock_wait = lock_wait;
        state.progress = progress;

        let spawn_inner = inner.clone();
        let spawn_set_pid = set_pid.clone();
        let handle = tokio::spawn(async move {
            let mut state = state;
            let result = run_phases(&spawn_inner, &mut state, &spawn_set_pid).await;
            (state, result)
        });

        let mut result: Result<(), RunnerError> = match handle.await {
            Ok((_state, result)) => result,
            Err(join_err) => Err(RunnerError::Panicked {
                profile: inner.profile.name.clone(),
                message: join_err.to_string(),
            }),
        };

        if result.is_err() {
            let fail_ctx = build_hook_ctx(&inner, result.as_ref().err());
            if let Err(hook_err) =
                pr_hooks::run_sequential(&inner.profile.run_after_fail, &fail_ctx).await
            {
                tracing::error!(error = %hook_err, "run-after-fail hook failed");
                result = Err(RunnerError::Hook {
                    profile: inner.profile.name.clone(),
                    phase: "run-after-fail".to_string(),
                    source: hook_err,
                });
            }
        }

        let mut finally_hooks = inner.profile.run_finally.clone();
        if matches!(inner.command, ProfileCommand::Backup) {
            if let Some(backup) = &inner.profile.backup {
                finally_hooks.extend(backup.run_finally.clone());
            }
        }
        let finally_ctx = build_hook_ctx(&inner, result.as_ref().err());
        pr_hooks::run_finally(&finally_hooks, &finally_ctx).await;

        result
    };

    pr_lock::lock_run(&lock_path, &holder, lock_options, body)
        .await
        .map_err(|source| RunnerError::Lock {
            profile: profile_name,
            source,
        })?
}

/// spec.md §4.7's phase list, minus lock acquisition (handled by the caller
/// via `pr_lock::lock_run`) and finally (handled by the caller once this
/// returns, success or failure).
async fn run_phases(
    ctx: &RunContextInner,
    state: &mut WrapperState,
    set_pid: &pr_lock::SetPid,
) -> Result<(), RunnerError> {
    run_hooks(&ctx.profile.run_before, ctx, "run-before (profile)").await?;

    if (ctx.global.initialize || ctx.profile.initialize) && !matches!(ctx.command, ProfileCommand::Init)
    {
        run_init(ctx, state, ctx.arg_builder.clone_box(), set_pid).await;
    }

    if matches!(ctx.command, ProfileCommand::Copy) {
        if let Some(copy) = ctx.profile.copy.clone() {
            if ctx.profile.initialize || copy.initialize {
                let mut builder = ctx.arg_builder.clone_box();
                builder.promote_secondary_to_primary();
                run_init(ctx, state, builder, set_pid).await;
            }
        }
    }

    let is_backup = matches!(ctx.command, ProfileCommand::Backup);
    // Configuration-missing sub-records are "feature disabled", not fatal
    // (spec.md §7 taxonomy item 1): an absent Backup/Retention record just
    // means every field under it defaults to off/empty.
    let backup_cfg = ctx.profile.backup.clone().unwrap_or_default();
    let retention_cfg = ctx.profile.retention.clone().unwrap_or_default();
    let check_command = ProfileCommand::Other("check".to_string());
    let retention_command = ProfileCommand::Other("forget".to_string());

    if is_backup {
        run_hooks(&backup_cfg.run_before, ctx, "run-before (backup)").await?;

        if backup_cfg.check_before {
            run_retriable(
                ctx,
                state,
                set_pid,
                &check_command,
                "check-before",
                "check",
                false,
                ScanMode::BackupPlain,
                false,
                false,
            )
            .await?;
        }
        if retention_cfg.before_backup {
            run_retriable(
                ctx,
                state,
                set_pid,
                &retention_command,
                "retention-before",
                "forget",
                false,
                ScanMode::BackupPlain,
                false,
                false,
            )
            .await?;
        }
    }

    // spec.md §4.7: JSON scanning when ExtendedStatus is set, plain-text
    // scanning otherwise when the attached terminal isn't a TTY, and no
    // scanning at all for an interactive non-extended run (the engine's
    // own progress bar is what the operator watches in that case).
    let main_scan_mode = if is_backup {
        if backup_cfg.extended_status {
            ScanMode::BackupJson
        } else if !std::io::stdout().is_terminal() {
            ScanMode::BackupPlain
        } else {
            ScanMode::None
        }
    } else {
        ScanMode::BackupPlain
    };
    let main_label = ctx.command.as_str().to_string();
    run_retriable(
        ctx,
        state,
        set_pid,
        &ctx.command,
        &main_label,
        ctx.command.as_str(),
        is_backup,
        main_scan_mode,
        is_backup && backup_cfg.use_stdin,
        is_backup && backup_cfg.no_error_on_warning,
    )
    .await?;

    if is_backup {
        if retention_cfg.after_backup {
            run_retriable(
                ctx,
                state,
                set_pid,
                &retention_command,
                "retention-after",
                "forget",
                false,
                ScanMode::BackupPlain,
                false,
                false,
            )
            .await?;
        }
        if backup_cfg.check_after {
            run_retriable(
                ctx,
                state,
                set_pid,
                &check_command,
                "check-after",
                "check",
                false,
                ScanMode::BackupPlain,
                false,
                false,
            )
            .await?;
        }
        run_hooks(&backup_cfg.run_after, ctx, "run-after (backup)").await?;
    }

    run_hooks(&ctx.profile.run_after, ctx, "run-after (profile)").await?;

    Ok(())
}

/// Runs one subcommand to completion, retrying transient remote-lock
/// failures under the budgets of spec.md §4.5. Shared by the main command
/// and, per spec.md §9 Open Question 4, the check/retention sub-phases.
#[allow(clippy::too_many_arguments)]
async fn run_retriable(
    ctx: &RunContextInner,
    state: &mut WrapperState,
    set_pid: &pr_lock::SetPid,
    succeed_after_error_command: &ProfileCommand,
    phase_label: &str,
    subcommand: &str,
    include_sources: bool,
    scan_mode: ScanMode,
    use_stdin: bool,
    no_error_on_warning: bool,
) -> Result<(), RunnerError> {
    loop {
        let (argv, public_cmdline) = build_args(ctx, subcommand, include_sources);
        let spec = ProcessSpec {
            env: engine_env(ctx),
            signal_rx: Some(ctx.signal_tx.subscribe()),
            pid_cell: Some(state.set_pid.clone()),
            pid_reporter: Some(pid_reporter(set_pid)),
            use_stdin,
            scan_mode,
            dry_run: ctx.dry_run,
            ..ProcessSpec::new(ctx.engine_program.clone(), argv)
        };

        let (summary, stderr, result) = pr_process::run(spec).await;
        state.execution_time += summary.duration;

        match result {
            Ok(()) => {
                if !ctx.dry_run {
                    state.notify_progress(phase_label, &summary, &stderr, true);
                }
                return Ok(());
            }
            Err(process_err) => {
                let full_cmdline = format!("{} {}", ctx.engine_program, public_cmdline);
                let cmd_err = CommandError::new(full_cmdline, stderr, process_err);

                if pr_retry::can_succeed_after_error(
                    succeed_after_error_command,
                    no_error_on_warning,
                    &cmd_err,
                ) {
                    tracing::warn!(
                        phase = phase_label,
                        error = %cmd_err,
                        "exit code 3 with no-error-on-warning set, treating as success"
                    );
                    if !ctx.dry_run {
                        state.notify_progress(phase_label, &summary, &cmd_err.stderr, true);
                    }
                    return Ok(());
                }

                if !ctx.dry_run {
                    state.notify_progress(phase_label, &summary, &cmd_err.stderr, false);
                }

                let now = ctx.clock.now();
                let input = RemoteLockInput {
                    restic_stale_lock_age: ctx.global.restic_stale_lock_age,
                    restic_lock_retry_after: ctx.global.restic_lock_retry_after,
                    force_lock: ctx.profile.force_lock,
                    done_try_unlock: state.done_try_unlock(),
                    lock_wait: state.lock_wait,
                    start_time: state.start_time,
                    execution_time: state.execution_time,
                };

                match pr_retry::can_retry_after_error(&summary.analysis, &input, now) {
                    RemoteLockDecision::NoRetry => {
                        return Err(RunnerError::Command {
                            profile: ctx.profile.name.clone(),
                            phase: phase_label.to_string(),
                            source: cmd_err,
                        });
                    }
                    RemoteLockDecision::RetryAfter(delay) => {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        continue;
                    }
                    RemoteLockDecision::AttemptUnlock => {
                        state.mark_try_unlock();
                        let unlocked = run_unlock(ctx, state, set_pid).await;
                        match pr_retry::resolve_after_unlock_attempt(unlocked) {
                            RemoteLockDecision::RetryAfter(_) => continue,
                            _ => {
                                return Err(RunnerError::Command {
                                    profile: ctx.profile.name.clone(),
                                    phase: phase_label.to_string(),
                                    source: cmd_err,
                                });
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Both init passes swallow their error — engines typically fail
/// "already initialized" (spec.md §4.7 "Init exceptions").
async fn run_init(
    ctx: &RunContextInner,
    state: &mut WrapperState,
    builder: Box<dyn ArgBuilder>,
    set_pid: &pr_lock::SetPid,
) {
    let mut argv = vec!["init".to_string()];
    argv.extend(builder.into_vec());
    let spec = ProcessSpec {
        env: engine_env(ctx),
        signal_rx: Some(ctx.signal_tx.subscribe()),
        pid_cell: Some(state.set_pid.clone()),
        pid_reporter: Some(pid_reporter(set_pid)),
        dry_run: ctx.dry_run,
        ..ProcessSpec::new(ctx.engine_program.clone(), argv)
    };
    let (summary, stderr, result) = pr_process::run(spec).await;
    state.execution_time += summary.duration;
    if !ctx.dry_run {
        state.notify_progress("init", &summary, &stderr, result.is_ok());
    }
    if let Err(err) = result {
        tracing::debug!(error = %err, stderr = %stderr, "init failed, assuming already initialized");
    }
}

/// Invoked from the stale-lock branch of spec.md §4.5.1 when `ForceLock`
/// is set; returns whether the unlock subcommand itself succeeded.
async fn run_unlock(ctx: &RunContextInner, state: &mut WrapperState, set_pid: &pr_lock::SetPid) -> bool {
    let spec = ProcessSpec {
        env: engine_env(ctx),
        signal_rx: Some(ctx.signal_tx.subscribe()),
        pid_cell: Some(state.set_pid.clone()),
        pid_reporter: Some(pid_reporter(set_pid)),
        dry_run: ctx.dry_run,
        ..ProcessSpec::new(ctx.engine_program.clone(), vec!["unlock".to_string()])
    };
    let (summary, stderr, result) = pr_process::run(spec).await;
    state.execution_time += summary.duration;
    match result {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(error = %err, stderr = %stderr, "unlock attempt failed");
            false
        }
    }
}

async fn run_hooks(
    hooks: &[String],
    ctx: &RunContextInner,
    phase_label: &str,
) -> Result<(), RunnerError> {
    if hooks.is_empty() {
        return Ok(());
    }
    let hook_ctx = build_hook_ctx(ctx, None);
    pr_hooks::run_sequential(hooks, &hook_ctx)
        .await
        .map_err(|source| RunnerError::Hook {
            profile: ctx.profile.name.clone(),
            phase: phase_label.to_string(),
            source,
        })
}

/// Clones the base builder, appends extra args and (for the backup main
/// command) source paths, prefixes the subcommand, and returns both the
/// real argument vector and a redacted public commandline for logging
/// (spec.md §4.7 "Argument preparation contract").
fn build_args(ctx: &RunContextInner, subcommand: &str, include_sources: bool) -> (Vec<String>, String) {
    let mut builder = ctx.arg_builder.clone_box();
    if !ctx.extra_args.is_empty() {
        builder.add_args(&ctx.extra_args, ArgKind::CommandLineEscape);
    }
    if include_sources {
        if let Some(backup) = &ctx.profile.backup {
            if !backup.source.is_empty() {
                builder.add_args(&backup.source, ArgKind::ConfigBackupSource);
            }
        }
    }

    let public_cmdline = std::iter::once(subcommand.to_string())
        .chain(builder.redacted().into_vec())
        .collect::<Vec<_>>()
        .join(" ");

    let mut argv = vec![subcommand.to_string()];
    argv.extend(builder.into_vec());
    (argv, public_cmdline)
}

/// Adapts the lock's `SetPid` into the `pid_reporter` callback `pr_process`
/// invokes around spawn/exit, wiring §4.4 point 4's "body with SetPID
/// bound" to the engine's running PID.
fn pid_reporter(set_pid: &pr_lock::SetPid) -> Arc<dyn Fn(Option<u32>) + Send + Sync> {
    let set_pid = set_pid.clone();
    Arc::new(move |pid| set_pid.set(pid))
}

/// The environment every engine invocation (not just hooks) receives:
/// the profile's own uppercased keys, plus the repository, forwarded as
/// credentials/configuration (spec.md §1 "forwarding them as environment
/// variables").
fn engine_env(ctx: &RunContextInner) -> Vec<(String, String)> {
    let mut env: Vec<(String, String)> = ctx.profile.uppercased_environment().into_iter().collect();
    if !ctx.profile.repository.is_empty() {
        env.push(("RESTIC_REPOSITORY".to_string(), ctx.profile.repository.clone()));
    }
    env
}

fn build_hook_ctx(ctx: &RunContextInner, error: Option<&RunnerError>) -> HookContext {
    HookContext {
        profile_name: ctx.profile.name.clone(),
        profile_command: ctx.command.as_str().to_string(),
        env: ctx.profile.uppercased_environment().into_iter().collect(),
        error: error.map(hook_error_context),
        dry_run: ctx.dry_run,
    }
}

fn hook_error_context(err: &RunnerError) -> HookErrorContext {
    match err.as_command_error() {
        Some(cmd_err) => HookErrorContext::from_command_error(cmd_err),
        None => HookErrorContext {
            message: err.to_string(),
            commandline: String::new(),
            exit_code: None,
            stderr: String::new(),
        },
    }
}

/// A reasonable default holder identity: `user@host (pid N)`, falling back
/// gracefully when either part of the environment is unavailable.
pub fn default_holder() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());
    let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string());
    format!("{user}@{host} (pid {})", std::process::id())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
