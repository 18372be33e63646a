use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn prints_help() {
    Command::cargo_bin("jobd").unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("--data-dir"));
}

#[test]
fn rejects_bad_listen_address() {
    let tmp = tempfile::TempDir::new().unwrap();
    Command::cargo_bin("jobd").unwrap()
        .args(["--config"]).arg(tmp.path().join("config.toml"))
        .args(["--data-dir"]).arg(tmp.path().join("data"))
        .args(["--listen", "not-an-address"])
        .assert()
        .failure()
        .stderr(contains("parse listen address"));
}
