//! CLI-level configuration and argument error specs.

use crate::prelude::*;

#[test]
fn missing_config_file_shows_error() {
    let project = Project::empty();

    project
        .pr()
        .args(&["home", "backup"])
        .fails()
        .stderr_has("loading");
}

#[test]
fn unknown_profile_shows_error() {
    let project = Project::empty();
    project.write_config(
        r#"
[profiles.home]
name = "home"
repository = "/tmp/does-not-matter"
lock = "/tmp/does-not-matter.lock"
"#,
    );

    project
        .pr()
        .args(&["nope", "backup"])
        .fails()
        .stderr_has("no profile named");
}

#[test]
fn missing_subcommand_shows_usage_error() {
    let project = Project::empty();
    project.write_config(
        r#"
[profiles.home]
name = "home"
repository = "/tmp/does-not-matter"
lock = "/tmp/does-not-matter.lock"
"#,
    );

    project.pr().arg("home").fails();
}
