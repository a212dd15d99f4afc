use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn prints_version() {
    Command::cargo_bin("food-feed")
        .expect("food-feed binary")
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn prints_help() {
    Command::cargo_bin("food-feed")
        .expect("food-feed binary")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("food-feed"))
        .stdout(predicate::str::contains("--version"))
        .stdout(predicate::str::contains("nutrition-grade-asc"));
}

#[test]
fn rejects_unknown_sort_key() {
    Command::cargo_bin("food-feed")
        .expect("food-feed binary")
        .args(["--sort", "price-asc"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unknown sort key"));
}
