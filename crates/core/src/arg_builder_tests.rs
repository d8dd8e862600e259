// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn command_line_escape_splits_on_whitespace() {
    let mut builder = VecArgBuilder::new(vec!["restic".into(), "backup".into()]);
    builder.add_args(&["--tag foo".to_string()], ArgKind::CommandLineEscape);
    assert_eq!(
        builder.as_vec(),
        &["restic", "backup", "--tag", "foo"]
    );
}

#[test]
fn config_backup_source_appends_verbatim() {
    let mut builder = VecArgBuilder::new(vec!["restic".into(), "backup".into()]);
    builder.add_args(&["/s1".to_string(), "/s2".to_string()], ArgKind::ConfigBackupSource);
    assert_eq!(builder.as_vec(), &["restic", "backup", "/s1", "/s2"]);
}

#[test]
fn redacted_masks_secret_flags() {
    let builder = VecArgBuilder::new(vec![
        "restic".into(),
        "--password".into(),
        "hunter2".into(),
    ]);
    let redacted = builder.redacted();
    assert_eq!(redacted.as_vec(), &["restic", "--password", "***"]);
    // Original is untouched.
    assert_eq!(builder.as_vec(), &["restic", "--password", "hunter2"]);
}

#[test]
fn promote_secondary_to_primary_appends_repo2() {
    let mut builder =
        VecArgBuilder::new(vec!["restic".into(), "init".into()]).with_secondary_repository("s3:bucket");
    builder.promote_secondary_to_primary();
    assert_eq!(builder.as_vec(), &["restic", "init", "--repo2", "s3:bucket"]);
    // Second call is a no-op (the field was taken).
    builder.promote_secondary_to_primary();
    assert_eq!(builder.as_vec(), &["restic", "init", "--repo2", "s3:bucket"]);
}

#[test]
fn clone_box_is_independent() {
    let builder = VecArgBuilder::new(vec!["restic".into()]);
    let mut cloned = builder.clone_box();
    cloned.add_args(&["backup".to_string()], ArgKind::ConfigBackupSource);
    assert_eq!(builder.as_vec(), &["restic"]);
    assert_eq!(cloned.as_vec(), &["restic", "backup"]);
}
