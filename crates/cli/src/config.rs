// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Minimal TOML configuration loader.
//!
//! Configuration loading and schema validation are explicitly out of
//! scope for the orchestrator core (spec.md §1) — this is the thin,
//! stand-in "external collaborator" the CLI front-end needs to be
//! runnable end to end. It is not a claim to replicate any particular
//! engine's full configuration schema (SPEC_FULL.md §1).
//!
//! Shape:
//!
//! ```toml
//! [global]
//! restic_stale_lock_age = 3600
//! restic_lock_retry_after = 30
//!
//! [profiles.home]
//! name = "home"
//! repository = "/mnt/backup/home"
//! lock = "/var/run/restic-home.lock"
//!
//! [profiles.home.backup]
//! source = ["/home"]
//! check_before = true
//! ```

use pr_core::{Global, Profile};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("no profile named {0:?} in config")]
    UnknownProfile(String),
}

#[derive(Debug, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl ConfigFile {
    pub fn profile(&self, name: &str) -> Result<Profile, ConfigError> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))
    }
}

pub fn load(path: &Path) -> Result<ConfigFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
