// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pr-core: data model and pure decision helpers shared by every crate in
//! the profile-run orchestrator.
//!
//! This crate owns nothing that touches the filesystem or spawns a
//! process — it is the immutable `Profile`/`Global` configuration shape,
//! the `Summary`/`OutputAnalysis` types each invocation produces, the
//! `CommandError` carrier, and the small injectable `Clock` abstraction
//! used to make time-budget logic testable without real sleeps.

pub mod analysis;
pub mod arg_builder;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod messages;
pub mod progress;
pub mod signal;
pub mod wrapper_state;

pub use analysis::{OutputAnalysis, OutputScanner, ScanMode};
pub use arg_builder::{ArgBuilder, ArgKind};
pub use clock::{Clock, FakeClock, SystemClock};
pub use config::{
    BackupConfig, CopyConfig, Global, Profile, ProfileCommand, RetentionConfig,
};
pub use constants::*;
pub use error::{CommandError, ProcessError};
pub use messages::lock_wait_message;
pub use progress::{ProgressReceiver, Summary};
pub use signal::Signal;
pub use wrapper_state::WrapperState;
