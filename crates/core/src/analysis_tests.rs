// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn none_mode_ignores_everything() {
    let mut scanner = OutputScanner::new(ScanMode::None);
    scanner.scan_line("repository is already locked exclusively by someone");
    let analysis = scanner.finish();
    assert!(!analysis.contains_remote_lock_failure());
}

#[test]
fn detects_remote_lock_failure() {
    let mut scanner = OutputScanner::new(ScanMode::BackupPlain);
    scanner.scan_line("unable to create lock: repository is already locked exclusively");
    let analysis = scanner.finish();
    assert!(analysis.contains_remote_lock_failure());
}

#[test]
fn extracts_lock_age_and_holder() {
    let mut scanner = OutputScanner::new(ScanMode::BackupPlain);
    scanner.scan_line("repository is already locked exclusively");
    scanner.scan_line("lock was created at 2024-01-01 10:00:00, locked since 3h27m14s by user@host, pid 1234");
    let analysis = scanner.finish();
    assert!(analysis.contains_remote_lock_failure());
    assert_eq!(
        analysis.remote_locked_since(),
        Some(Duration::from_secs(3 * 3600 + 27 * 60 + 14))
    );
    assert_eq!(analysis.remote_locked_by(), Some("user@host, pid 1234"));
}

#[test]
fn plain_duration_literal_forms() {
    assert_eq!(parse_duration_literal("45m"), Some(Duration::from_secs(45 * 60)));
    assert_eq!(parse_duration_literal("10s"), Some(Duration::from_secs(10)));
    assert_eq!(parse_duration_literal("1h"), Some(Duration::from_secs(3600)));
    assert_eq!(parse_duration_literal("garbage"), None);
}

#[test]
fn queries_are_idempotent() {
    let mut scanner = OutputScanner::new(ScanMode::BackupPlain);
    scanner.scan_line("repository is already locked exclusively");
    let analysis = scanner.finish();
    assert!(analysis.contains_remote_lock_failure());
    assert!(analysis.contains_remote_lock_failure());
}
