//! End-to-end backup invocation specs.

use crate::prelude::*;

#[test]
fn dry_run_never_spawns_engine() {
    let project = Project::empty();
    // A fake engine that would fail loudly if actually invoked.
    let engine = project.write_engine("fake-engine", "echo should-not-run; exit 1");
    project.write_config(&format!(
        r#"
[profiles.home]
name = "home"
repository = "/tmp/does-not-matter"
lock = "{lock}"

[profiles.home.backup]
source = ["/home"]
"#,
        lock = project.lock_path().display(),
    ));

    project
        .pr()
        .args(&["--engine", engine.to_str().unwrap(), "--dry-run", "home", "backup"])
        .passes()
        .stdout_lacks("should-not-run");
}

#[test]
fn successful_backup_exits_zero() {
    let project = Project::empty();
    let engine = project.write_engine("fake-engine", "exit 0");
    project.write_config(&format!(
        r#"
[profiles.home]
name = "home"
repository = "/tmp/does-not-matter"
lock = "{lock}"

[profiles.home.backup]
source = ["/home"]
"#,
        lock = project.lock_path().display(),
    ));

    project
        .pr()
        .args(&["--engine", engine.to_str().unwrap(), "home", "backup"])
        .passes();
}

#[test]
fn failing_backup_exits_nonzero_and_reports_error() {
    let project = Project::empty();
    let engine = project.write_engine("fake-engine", "echo boom 1>&2; exit 1");
    project.write_config(&format!(
        r#"
[profiles.home]
name = "home"
repository = "/tmp/does-not-matter"
lock = "{lock}"

[profiles.home.backup]
source = ["/home"]
"#,
        lock = project.lock_path().display(),
    ));

    project
        .pr()
        .args(&["--engine", engine.to_str().unwrap(), "home", "backup"])
        .fails()
        .stderr_has("home");
}
