// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-error carrier (spec.md §4.3) and the subprocess failure taxonomy
//! it wraps.

use thiserror::Error;

/// Failure modes a single subprocess invocation can return.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with status {code}")]
    Exited { program: String, code: i32 },
    #[error("{program} terminated by signal")]
    SignalTerminated { program: String },
    #[error("io error reading {program} output: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl ProcessError {
    /// The OS exit code, if this is an ordinary non-zero exit.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::Exited { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_signal_terminated(&self) -> bool {
        matches!(self, ProcessError::SignalTerminated { .. })
    }
}

/// Bundles a non-confidential command line, captured stderr, and the
/// underlying cause into a single typed failure value (spec.md §4.3).
///
/// This is the shape surfaced in the `ERROR_*` hook environment variables
/// (spec.md §6) and the value downcast out of a `RunnerError` when callers
/// need the exit code.
#[derive(Debug, Error)]
#[error("command failed: {commandline}: {source}")]
pub struct CommandError {
    /// Redacted argument vector, joined with spaces, suitable for logs.
    pub commandline: String,
    /// Last `MAX_CAPTURED_STDERR_LINES` lines of stderr.
    pub stderr: String,
    #[source]
    pub source: ProcessError,
}

impl CommandError {
    pub fn new(commandline: impl Into<String>, stderr: impl Into<String>, source: ProcessError) -> Self {
        Self {
            commandline: commandline.into(),
            stderr: stderr.into(),
            source,
        }
    }

    /// Unwraps down to the OS exit-status type (spec.md §4.3).
    pub fn exit_code(&self) -> Option<i32> {
        self.source.exit_code()
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
