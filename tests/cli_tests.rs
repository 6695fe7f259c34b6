use assert_cmd::Command;
use assert_fs::TempDir;
use common::file::{project_dir, upload_dir};
use predicates::prelude::predicate;
use rstest::rstest;

mod common;

fn bitpush() -> Command {
    let mut cmd = Command::cargo_bin("bitpush").expect("binary is built");
    cmd.env_remove("GITHUB_TOKEN").env("NO_COLOR", "1");
    cmd
}

#[test]
fn help_lists_every_command() {
    bitpush()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("push"))
        .stdout(predicate::str::contains("create-repo"))
        .stdout(predicate::str::contains("resolve"));
}

#[rstest]
fn dry_run_commits_without_a_token(project_dir: TempDir) {
    bitpush()
        .args(["push", "--repo", "octo/hello", "--dry-run"])
        .arg(project_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("[main "))
        .stdout(predicate::str::contains("Upload from"))
        .stdout(predicate::str::contains("3 files uploaded"))
        .stdout(predicate::str::contains("dry run"));
}

#[rstest]
fn dry_run_on_a_new_branch_reports_it(project_dir: TempDir) {
    bitpush()
        .args(["push", "--repo", "octo/hello", "--dry-run", "--new-branch", "release"])
        .arg(project_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Created branch release"))
        .stdout(predicate::str::contains("[release "));
}

#[rstest]
fn push_without_a_token_fails(project_dir: TempDir) {
    bitpush()
        .args(["push", "--repo", "octo/hello"])
        .arg(project_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("GITHUB_TOKEN"));
}

#[rstest]
fn malformed_repository_is_rejected(upload_dir: TempDir) {
    bitpush()
        .args(["push", "--repo", "not-a-slug", "--dry-run"])
        .arg(upload_dir.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("owner/name"));
}
