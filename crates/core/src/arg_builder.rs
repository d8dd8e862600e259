// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Argument builder contract (spec.md §4.7 "Argument preparation contract",
//! §6). `pr-runner` clones a builder per invocation (the builder is
//! single-use per call), appends user extras and sources, prefixes the
//! engine subcommand, and computes a parallel redacted vector for logging.

/// How a batch of values should be appended to the argument vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Values are shell-escaped as a single command-line-style string.
    CommandLineEscape,
    /// Values are backup source paths, appended as positional arguments.
    ConfigBackupSource,
}

/// Clonable argument vector builder, generalized from spec.md §6.
pub trait ArgBuilder: Send {
    fn add_args(&mut self, values: &[String], kind: ArgKind);
    /// For `copy`: promotes secondary-repository flags to primary before
    /// invoking the init subcommand (spec.md §4.7 "Init exceptions").
    fn promote_secondary_to_primary(&mut self);
    fn clone_box(&self) -> Box<dyn ArgBuilder>;
    /// A redacted copy, safe to log (spec.md §6 "Non-confidential argument
    /// projection").
    fn redacted(&self) -> Box<dyn ArgBuilder>;
    fn into_vec(self: Box<Self>) -> Vec<String>;
    fn as_vec(&self) -> &[String];
}

/// A straightforward `Vec<String>`-backed builder. Values added via
/// `ArgKind::CommandLineEscape` are split on whitespace the way a shell
/// would tokenize a user-supplied extra-args string; values containing
/// what looks like a secret (`--password`, `--key`) are replaced with
/// `***` by `redacted()`.
#[derive(Debug, Clone, Default)]
pub struct VecArgBuilder {
    args: Vec<String>,
    secondary_repository: Option<String>,
}

const REDACT_FLAGS: &[&str] = &[
    "--password",
    "--password-file",
    "--key",
    "--aws-access-key-id",
    "--aws-secret-access-key",
];

impl VecArgBuilder {
    pub fn new(base: Vec<String>) -> Self {
        Self {
            args: base,
            secondary_repository: None,
        }
    }

    pub fn with_secondary_repository(mut self, repo: impl Into<String>) -> Self {
        self.secondary_repository = Some(repo.into());
        self
    }
}

impl ArgBuilder for VecArgBuilder {
    fn add_args(&mut self, values: &[String], kind: ArgKind) {
        match kind {
            ArgKind::CommandLineEscape => {
                for value in values {
                    self.args.extend(value.split_whitespace().map(String::from));
                }
            }
            ArgKind::ConfigBackupSource => {
                self.args.extend(values.iter().cloned());
            }
        }
    }

    fn promote_secondary_to_primary(&mut self) {
        if let Some(repo) = self.secondary_repository.take() {
            self.args.push("--repo2".to_string());
            self.args.push(repo);
        }
    }

    fn clone_box(&self) -> Box<dyn ArgBuilder> {
        Box::new(self.clone())
    }

    fn redacted(&self) -> Box<dyn ArgBuilder> {
        let mut redacted = self.clone();
        let mut iter = redacted.args.iter_mut().peekable();
        while let Some(arg) = iter.next() {
            if REDACT_FLAGS.contains(&arg.as_str()) {
                if let Some(next) = iter.peek_mut() {
                    **next = "***".to_string();
                }
            }
        }
        Box::new(redacted)
    }

    fn into_vec(self: Box<Self>) -> Vec<String> {
        self.args
    }

    fn as_vec(&self) -> &[String] {
        &self.args
    }
}

#[cfg(test)]
#[path = "arg_builder_tests.rs"]
mod tests;
