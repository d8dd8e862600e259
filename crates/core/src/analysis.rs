// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output analyzer (spec.md §4.2): a stateful line scanner that recognizes
//! well-known engine stderr/stdout markers and exposes idempotent,
//! side-effect-free queries over the result.

use std::time::Duration;

/// Which line-oriented filter a process-runner invocation should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    #[default]
    None,
    BackupJson,
    BackupPlain,
}

/// Queryable result of scanning one invocation's output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputAnalysis {
    remote_lock_failure: bool,
    remote_locked_since: Option<Duration>,
    remote_locked_by: Option<String>,
}

impl OutputAnalysis {
    pub fn contains_remote_lock_failure(&self) -> bool {
        self.remote_lock_failure
    }

    pub fn remote_locked_since(&self) -> Option<Duration> {
        self.remote_locked_since
    }

    pub fn remote_locked_by(&self) -> Option<&str> {
        self.remote_locked_by.as_deref()
    }
}

/// Feeds lines from a subprocess's output into an `OutputAnalysis`.
///
/// Not byte-exact to any particular engine version — recognizes the shape
/// of the messages described in spec.md §4.2, not a fixed string.
#[derive(Debug, Default)]
pub struct OutputScanner {
    mode: ScanMode,
    analysis: OutputAnalysis,
}

impl OutputScanner {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            mode,
            analysis: OutputAnalysis::default(),
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    /// Feed one line of output (without trailing newline) into the scanner.
    pub fn scan_line(&mut self, line: &str) {
        if self.mode == ScanMode::None {
            return;
        }
        let lower = line.to_ascii_lowercase();
        if lower.contains("repository is already locked") || lower.contains("already locked") {
            self.analysis.remote_lock_failure = true;
        }
        if self.analysis.remote_lock_failure {
            if let Some(age) = extract_lock_age(&lower) {
                self.analysis.remote_locked_since = Some(age);
            }
            if let Some(holder) = extract_lock_holder(line) {
                self.analysis.remote_locked_by = Some(holder);
            }
        }
    }

    pub fn finish(self) -> OutputAnalysis {
        self.analysis
    }
}

/// Parses a phrase like "locked exclusively since 3h27m14s by ..." into a
/// duration. Supports the `h`/`m`/`s` suffixes the engine emits.
fn extract_lock_age(lower: &str) -> Option<Duration> {
    let marker = "since ";
    let start = lower.find(marker)? + marker.len();
    let rest = &lower[start..];
    let end = rest.find(" by").unwrap_or(rest.len());
    parse_duration_literal(rest[..end].trim())
}

/// Parses a phrase like "by user@host, pid 1234" into a holder string.
fn extract_lock_holder(line: &str) -> Option<String> {
    let lower = line.to_ascii_lowercase();
    let marker = " by ";
    let start = lower.find(marker)? + marker.len();
    let holder = line[start..].trim_end_matches('.').trim();
    if holder.is_empty() {
        None
    } else {
        Some(holder.to_string())
    }
}

/// Parses a compact duration literal such as `3h27m14s`, `45m`, `10s`.
fn parse_duration_literal(s: &str) -> Option<Duration> {
    let mut total = Duration::ZERO;
    let mut num = String::new();
    let mut any = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            num.push(c);
        } else if matches!(c, 'h' | 'm' | 's') {
            if num.is_empty() {
                return None;
            }
            let value: u64 = num.parse().ok()?;
            num.clear();
            any = true;
            total += match c {
                'h' => Duration::from_secs(value * 3600),
                'm' => Duration::from_secs(value * 60),
                's' => Duration::from_secs(value),
                _ => unreachable!(),
            };
        } else if c.is_ascii_whitespace() {
            continue;
        } else {
            return None;
        }
    }
    any.then_some(total)
}

#[cfg(test)]
#[path = "analysis_tests.rs"]
mod tests;
