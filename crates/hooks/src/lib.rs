// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Hook sequencer (spec.md §4.6): runs ordered lists of opaque shell
//! command strings at phase boundaries, with environment augmentation and
//! the stop-on-first-error / run-all-and-log semantics of spec.md's table.

use pr_core::CommandError;
use pr_process::ProcessSpec;
use thiserror::Error;

/// Shell used to launch each hook. No arguments beyond the hook string
/// itself are appended by this crate (spec.md §4.6).
#[cfg(unix)]
const SHELL: &str = "sh";
#[cfg(windows)]
const SHELL: &str = "cmd";
#[cfg(unix)]
const SHELL_ARG: &str = "-c";
#[cfg(windows)]
const SHELL_ARG: &str = "/C";

#[derive(Debug, Error)]
pub enum HookError {
    #[error("hook failed: {0}")]
    Failed(#[from] CommandError),
}

/// Error context exposed to fail/finally hooks as `ERROR_*` / `RESTIC_STDERR`
/// (spec.md §6).
#[derive(Debug, Clone)]
pub struct HookErrorContext {
    pub message: String,
    pub commandline: String,
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl HookErrorContext {
    pub fn from_command_error(err: &CommandError) -> Self {
        Self {
            message: err.to_string(),
            commandline: err.commandline.clone(),
            exit_code: err.exit_code(),
            stderr: err.stderr.clone(),
        }
    }
}

/// Everything every hook in one run shares: `PROFILE_NAME`, `PROFILE_COMMAND`,
/// the profile's own (already-uppercased) environment, a dry-run flag, and
/// — for fail/finally lists — the error that triggered them.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    pub profile_name: String,
    pub profile_command: String,
    pub env: Vec<(String, String)>,
    pub error: Option<HookErrorContext>,
    pub dry_run: bool,
}

impl HookContext {
    fn build_env(&self) -> Vec<(String, String)> {
        let mut env = self.env.clone();
        env.push(("PROFILE_NAME".to_string(), self.profile_name.clone()));
        env.push(("PROFILE_COMMAND".to_string(), self.profile_command.clone()));
        if let Some(error) = &self.error {
            env.push(("ERROR".to_string(), error.message.clone()));
            env.push(("ERROR_COMMANDLINE".to_string(), error.commandline.clone()));
            env.push((
                "ERROR_EXIT_CODE".to_string(),
                error.exit_code.map(|c| c.to_string()).unwrap_or_default(),
            ));
            env.push(("ERROR_STDERR".to_string(), error.stderr.clone()));
            env.push(("RESTIC_STDERR".to_string(), error.stderr.clone()));
        }
        env
    }
}

async fn run_one(hook: &str, ctx: &HookContext) -> Result<(), HookError> {
    let spec = ProcessSpec {
        dry_run: ctx.dry_run,
        ..ProcessSpec::new(SHELL, vec![SHELL_ARG.to_string(), hook.to_string()])
    };
    let mut spec = spec;
    spec.env = ctx.build_env();
    let (_summary, stderr, result) = pr_process::run(spec).await;
    result.map_err(|source| {
        HookError::Failed(CommandError::new(hook.to_string(), stderr, source))
    })
}

/// Runs `hooks` in declaration order, stopping at the first error
/// (pre-profile / pre-backup / post-backup / post-profile / run-after-fail,
/// spec.md §4.6's table).
pub async fn run_sequential(hooks: &[String], ctx: &HookContext) -> Result<(), HookError> {
    for hook in hooks {
        tracing::debug!(hook, profile = %ctx.profile_name, "running hook");
        run_one(hook, ctx).await?;
    }
    Ok(())
}

/// Runs every hook in `hooks`, in **reverse** declaration order, never
/// stopping — errors are logged, not returned (spec.md §4.6 "Run-finally").
pub async fn run_finally(hooks: &[String], ctx: &HookContext) {
    for hook in hooks.iter().rev() {
        tracing::debug!(hook, profile = %ctx.profile_name, "running finally hook");
        if let Err(err) = run_one(hook, ctx).await {
            tracing::error!(hook, error = %err, "finally hook failed, continuing");
        }
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
