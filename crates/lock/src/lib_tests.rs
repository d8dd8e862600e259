// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use tempfile::tempdir;

#[test]
fn try_acquire_then_release_allows_reacquire() {
    let dir = tempdir().unwrap();
    let lock = FileLock::new(dir.path().join("profile.lock"));
    assert!(lock.try_acquire("me").unwrap());
    assert!(!lock.try_acquire("someone-else").unwrap());
    lock.release();
    assert!(lock.try_acquire("someone-else").unwrap());
}

#[test]
fn who_reports_holder_and_not_found() {
    let dir = tempdir().unwrap();
    let lock = FileLock::new(dir.path().join("profile.lock"));
    assert_eq!(lock.who().unwrap_err().kind(), io::ErrorKind::NotFound);
    lock.try_acquire("alice@host").unwrap();
    assert_eq!(lock.who().unwrap(), "alice@host");
}

#[test]
fn force_acquire_overwrites_existing_holder() {
    let dir = tempdir().unwrap();
    let lock = FileLock::new(dir.path().join("profile.lock"));
    lock.try_acquire("alice@host").unwrap();
    assert!(lock.force_acquire("bob@host").unwrap());
    assert_eq!(lock.who().unwrap(), "bob@host");
}

#[tokio::test]
async fn lock_run_with_empty_path_is_unlocked() {
    let result = lock_run(Path::new(""), "me", LockOptions::default(), |_set_pid| async { 42 }).await;
    assert_eq!(result.unwrap(), 42);
}

#[tokio::test]
async fn lock_run_releases_lock_after_body_completes() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("profile.lock");
    let result = lock_run(&path, "me", LockOptions::default(), |_set_pid| async { "done" }).await;
    assert_eq!(result.unwrap(), "done");
    assert!(!path.exists());
}

#[tokio::test]
async fn lock_run_fails_fast_with_no_wait_budget() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("profile.lock");
    let lock = FileLock::new(&path);
    lock.try_acquire("holder@host").unwrap();

    let result = lock_run(&path, "me", LockOptions::default(), |_set_pid| async { () }).await;
    match result {
        Err(LockError::AlreadyRunning { holder }) => assert_eq!(holder, "holder@host"),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn lock_run_waits_then_succeeds_once_released() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("profile.lock");
    let lock = FileLock::new(&path);
    lock.try_acquire("holder@host").unwrap();

    let path_for_release = path.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(4)).await;
        FileLock::new(&path_for_release).release();
    });

    let options = LockOptions {
        force: false,
        wait_budget: Some(Duration::from_secs(30)),
    };
    let result = lock_run(&path, "me", options, |_set_pid| async { "acquired" }).await;
    assert_eq!(result.unwrap(), "acquired");
}

#[tokio::test(start_paused = true)]
async fn lock_run_force_acquires_after_exhausting_budget() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("profile.lock");
    let lock = FileLock::new(&path);
    lock.try_acquire("holder@host").unwrap();

    let options = LockOptions {
        force: true,
        wait_budget: Some(Duration::from_secs(2)),
    };
    let result = lock_run(&path, "me", options, |_set_pid| async { "acquired" }).await;
    assert_eq!(result.unwrap(), "acquired");
}

#[tokio::test]
async fn set_pid_records_and_clears_pid_in_lock_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("profile.lock");
    let path_in_body = path.clone();
    let result = lock_run(&path, "me@host", LockOptions::default(), |set_pid| async move {
        set_pid.set(Some(4242));
        let during = std::fs::read_to_string(&path_in_body).unwrap();
        assert_eq!(during, "me@host (pid 4242)");
        set_pid.set(None);
        std::fs::read_to_string(&path_in_body).unwrap()
    })
    .await;
    assert_eq!(result.unwrap(), "me@host");
}

#[tokio::test]
async fn set_pid_is_a_no_op_when_unlocked() {
    let result = lock_run(Path::new(""), "me", LockOptions::default(), |set_pid| async move {
        set_pid.set(Some(1));
        set_pid.set(None);
        "ok"
    })
    .await;
    assert_eq!(result.unwrap(), "ok");
}
