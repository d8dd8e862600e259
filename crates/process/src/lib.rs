// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Process runner (spec.md §4.1): spawns the engine or a hook subprocess,
//! wires stdio, tracks PID, forwards termination signals, and returns
//! `(Summary, captured stderr, Result<(), ProcessError>)`.

mod signal_forward;

use parking_lot::Mutex;
use pr_core::{OutputScanner, ProcessError, ScanMode, Signal, Summary};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;

/// Caps the captured-stderr ring buffer (spec.md §9, Open Question 3).
pub const MAX_CAPTURED_STDERR_LINES: usize = pr_core::MAX_CAPTURED_STDERR_LINES;

/// Everything a single invocation needs.
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Overlay on the current process environment.
    pub env: Vec<(String, String)>,
    pub dry_run: bool,
    /// Receives termination signals to forward to the child.
    pub signal_rx: Option<broadcast::Receiver<Signal>>,
    /// Published immediately after spawn, cleared on exit.
    pub pid_cell: Option<Arc<Mutex<Option<u32>>>>,
    /// Invoked with `Some(pid)` immediately after spawn and again with
    /// `None` on exit — the `SetPID` reporter of spec.md §3/§4.4 point 4,
    /// used by callers to record the running child's PID into the profile
    /// lock file for introspection.
    pub pid_reporter: Option<Arc<dyn Fn(Option<u32>) + Send + Sync>>,
    /// Inherit the parent's stdin instead of closing it (spec.md §4.1).
    pub use_stdin: bool,
    pub scan_mode: ScanMode,
    /// Optional sink lines are forwarded to after scanning (e.g. for
    /// streaming output to a terminal). Hooks pass `None`.
    pub sink: Option<Box<dyn FnMut(&str) + Send>>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
            dry_run: false,
            signal_rx: None,
            pid_cell: None,
            pid_reporter: None,
            use_stdin: false,
            scan_mode: ScanMode::None,
            sink: None,
        }
    }

    pub fn commandline(&self) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Runs one subprocess invocation to completion.
///
/// In dry-run mode, logs the command but performs no spawn and returns a
/// zero summary with no error (spec.md §4.1, §4.7 "Dry-run").
pub async fn run(mut spec: ProcessSpec) -> (Summary, String, Result<(), ProcessError>) {
    let commandline = spec.commandline();

    if spec.dry_run {
        tracing::info!(commandline = %commandline, "dry-run: would execute");
        return (Summary::default(), String::new(), Ok(()));
    }

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args);
    for (key, value) in &spec.env {
        cmd.env(key, value);
    }
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.stdin(if spec.use_stdin {
        std::process::Stdio::inherit()
    } else {
        std::process::Stdio::null()
    });

    let start = Instant::now();
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            return (
                Summary::default(),
                String::new(),
                Err(ProcessError::Spawn {
                    program: spec.program.clone(),
                    source,
                }),
            );
        }
    };

    if let Some(pid_cell) = &spec.pid_cell {
        *pid_cell.lock() = child.id();
    }
    if let Some(reporter) = &spec.pid_reporter {
        reporter(child.id());
    }

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut scanner = OutputScanner::new(spec.scan_mode);
    let mut captured_stderr: VecDeque<String> = VecDeque::with_capacity(MAX_CAPTURED_STDERR_LINES);

    let outcome = run_to_completion(
        &mut child,
        stdout,
        stderr,
        &mut scanner,
        &mut captured_stderr,
        spec.sink.as_deref_mut(),
        spec.signal_rx.take(),
        &spec.program,
    )
    .await;

    if let Some(pid_cell) = &spec.pid_cell {
        *pid_cell.lock() = None;
    }
    if let Some(reporter) = &spec.pid_reporter {
        reporter(None);
    }

    let duration = start.elapsed();
    let stderr_joined = captured_stderr.into_iter().collect::<Vec<_>>().join("\n");
    let summary = Summary {
        duration,
        analysis: scanner.finish(),
    };
    (summary, stderr_joined, outcome)
}

#[allow(clippy::too_many_arguments)]
async fn run_to_completion(
    child: &mut tokio::process::Child,
    stdout: Option<tokio::process::ChildStdout>,
    stderr: Option<tokio::process::ChildStderr>,
    scanner: &mut OutputScanner,
    captured_stderr: &mut VecDeque<String>,
    mut sink: Option<&mut (dyn FnMut(&str) + Send)>,
    signal_rx: Option<broadcast::Receiver<Signal>>,
    program: &str,
) -> Result<(), ProcessError> {
    let mut stdout_lines = stdout.map(|s| BufReader::new(s).lines());
    let mut stderr_lines = stderr.map(|s| BufReader::new(s).lines());

    let wait_fut = signal_forward::wait_with_signal_forwarding(child, signal_rx, program);
    tokio::pin!(wait_fut);

    loop {
        tokio::select! {
            biased;
            line = read_next(&mut stdout_lines) => {
                match line {
                    Some(Ok(line)) => {
                        scanner.scan_line(&line);
                        if let Some(sink) = sink.as_deref_mut() {
                            sink(&line);
                        }
                    }
                    Some(Err(_)) | None => stdout_lines = None,
                }
            }
            line = read_next(&mut stderr_lines) => {
                match line {
                    Some(Ok(line)) => {
                        scanner.scan_line(&line);
                        push_capped(captured_stderr, line);
                    }
                    Some(Err(_)) | None => stderr_lines = None,
                }
            }
            status = &mut wait_fut => {
                // Drain whatever is left before returning.
                drain_remaining(&mut stdout_lines, scanner, sink.as_deref_mut()).await;
                drain_remaining_stderr(&mut stderr_lines, scanner, captured_stderr).await;
                return status;
            }
        }
    }
}

async fn read_next(
    lines: &mut Option<tokio::io::Lines<BufReader<impl tokio::io::AsyncRead + Unpin>>>,
) -> Option<std::io::Result<String>> {
    match lines {
        Some(l) => l.next_line().await.transpose(),
        None => std::future::pending().await,
    }
}

async fn drain_remaining(
    stdout_lines: &mut Option<tokio::io::Lines<BufReader<tokio::process::ChildStdout>>>,
    scanner: &mut OutputScanner,
    mut sink: Option<&mut (dyn FnMut(&str) + Send)>,
) {
    if let Some(lines) = stdout_lines {
        while let Ok(Some(line)) = lines.next_line().await {
            scanner.scan_line(&line);
            if let Some(sink) = sink.as_deref_mut() {
                sink(&line);
            }
        }
    }
}

async fn drain_remaining_stderr(
    stderr_lines: &mut Option<tokio::io::Lines<BufReader<tokio::process::ChildStderr>>>,
    scanner: &mut OutputScanner,
    captured_stderr: &mut VecDeque<String>,
) {
    if let Some(lines) = stderr_lines {
        while let Ok(Some(line)) = lines.next_line().await {
            scanner.scan_line(&line);
            push_capped(captured_stderr, line);
        }
    }
}

fn push_capped(buf: &mut VecDeque<String>, line: String) {
    if buf.len() >= MAX_CAPTURED_STDERR_LINES {
        buf.pop_front();
    }
    buf.push_back(line);
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
