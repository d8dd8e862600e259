// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable `Profile` and `Global` configuration (spec.md §3).
//!
//! Loading and schema validation are out of scope for this crate (spec.md
//! §1's "out of scope" collaborators) — these types are the shape that an
//! external config loader is expected to hand the orchestrator.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// The engine subcommand a `run_profile` call is being asked to perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileCommand {
    Backup,
    Check,
    Init,
    Copy,
    /// Any other engine subcommand (`forget`, `prune`, `snapshots`, …).
    /// Still goes through lock + pre/post hooks, but skips the
    /// backup-specific sub-phases of spec.md §4.7.
    Other(String),
}

impl ProfileCommand {
    pub fn as_str(&self) -> &str {
        match self {
            ProfileCommand::Backup => "backup",
            ProfileCommand::Check => "check",
            ProfileCommand::Init => "init",
            ProfileCommand::Copy => "copy",
            ProfileCommand::Other(s) => s,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CopyConfig {
    #[serde(default)]
    pub initialize: bool,
    #[serde(default)]
    pub repository: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub check_before: bool,
    #[serde(default)]
    pub check_after: bool,
    #[serde(default)]
    pub no_error_on_warning: bool,
    #[serde(default)]
    pub use_stdin: bool,
    #[serde(default)]
    pub extended_status: bool,
    #[serde(default)]
    pub run_before: Vec<String>,
    #[serde(default)]
    pub run_after: Vec<String>,
    #[serde(default)]
    pub run_finally: Vec<String>,
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub before_backup: bool,
    #[serde(default)]
    pub after_backup: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub lock: String,
    #[serde(default)]
    pub force_lock: bool,
    #[serde(default)]
    pub initialize: bool,
    #[serde(default)]
    pub copy: Option<CopyConfig>,
    #[serde(default)]
    pub backup: Option<BackupConfig>,
    #[serde(default)]
    pub retention: Option<RetentionConfig>,
    #[serde(default)]
    pub run_before: Vec<String>,
    #[serde(default)]
    pub run_after: Vec<String>,
    #[serde(default)]
    pub run_after_fail: Vec<String>,
    #[serde(default)]
    pub run_finally: Vec<String>,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    #[serde(default)]
    pub repository: String,
}

impl Profile {
    /// `Profile.Environment`, uppercased keys (spec.md §6).
    pub fn uppercased_environment(&self) -> BTreeMap<String, String> {
        self.environment
            .iter()
            .map(|(k, v)| (k.to_ascii_uppercase(), v.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Global {
    #[serde(default)]
    pub initialize: bool,
    #[serde(default = "default_stale_lock_age", with = "humantime_secs")]
    pub restic_stale_lock_age: Duration,
    #[serde(default = "default_lock_retry_after", with = "humantime_secs")]
    pub restic_lock_retry_after: Duration,
}

impl Default for Global {
    fn default() -> Self {
        Self {
            initialize: false,
            restic_stale_lock_age: default_stale_lock_age(),
            restic_lock_retry_after: default_lock_retry_after(),
        }
    }
}

fn default_stale_lock_age() -> Duration {
    Duration::ZERO
}

fn default_lock_retry_after() -> Duration {
    Duration::ZERO
}

/// Deserializes a plain integer number of seconds into a `Duration`, so
/// the TOML config can write `restic_stale_lock_age_secs = 3600` instead of
/// a nested struct.
mod humantime_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
