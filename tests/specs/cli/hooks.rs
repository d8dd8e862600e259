//! End-to-end hook sequencing specs.

use crate::prelude::*;

#[test]
fn hooks_run_in_order_around_a_successful_backup() {
    let project = Project::empty();
    let engine = project.write_engine("fake-engine", "exit 0");
    let marker = project.path().join("marker.log");

    project.write_config(&format!(
        r#"
[profiles.home]
name = "home"
repository = "/tmp/does-not-matter"
lock = "{lock}"
run_before = ["echo before >> {marker}"]
run_after = ["echo after >> {marker}"]
run_finally = ["echo finally >> {marker}"]

[profiles.home.backup]
source = ["/home"]
"#,
        lock = project.lock_path().display(),
        marker = marker.display(),
    ));

    project
        .pr()
        .args(&["--engine", engine.to_str().unwrap(), "home", "backup"])
        .passes();

    let log = std::fs::read_to_string(&marker).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines, vec!["before", "after", "finally"]);
}

#[test]
fn run_after_fail_executes_when_the_engine_fails_and_finally_still_runs() {
    let project = Project::empty();
    let engine = project.write_engine("fake-engine", "exit 1");
    let marker = project.path().join("marker.log");

    project.write_config(&format!(
        r#"
[profiles.home]
name = "home"
repository = "/tmp/does-not-matter"
lock = "{lock}"
run_after_fail = ["echo failed >> {marker}"]
run_finally = ["echo finally >> {marker}"]

[profiles.home.backup]
source = ["/home"]
"#,
        lock = project.lock_path().display(),
        marker = marker.display(),
    ));

    project
        .pr()
        .args(&["--engine", engine.to_str().unwrap(), "home", "backup"])
        .fails();

    let log = std::fs::read_to_string(&marker).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines, vec!["failed", "finally"]);
}
