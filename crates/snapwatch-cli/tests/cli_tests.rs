use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn snapwatch(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_snapwatch"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("EMAIL_USERNAME")
        .env_remove("EMAIL_PASSWORD")
        .env_remove("EMAIL_RECIPIENT")
        .env_remove("CC_RECIPIENT")
        .env("RUST_LOG", "off")
        .output()
        .expect("spawn snapwatch")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn write_config(dir: &Path, targets: &str) -> PathBuf {
    let path = dir.join("snapwatch.toml");
    let body = format!(
        r#"
[store]
dir = "{store}"

{targets}
"#,
        store = dir.join("store").display(),
        targets = targets,
    );
    std::fs::write(&path, body).unwrap();
    path
}

const QUIET_RATINGS: &str = r#"
[[targets]]
name = "ratings"
history = true
collector = { kind = "static", ids = ["Ghost 16"] }

[targets.mode]
kind = "predicate"
rule = { kind = "below", field = "reviews", threshold = 1.0 }
"#;

#[test]
fn missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let out = snapwatch(&dir.path().join("absent.toml"), &["run", "--all"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("snapwatch init"));
}

#[test]
fn invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapwatch.toml");
    std::fs::write(&path, "[[targets]]\nname = \"no-collector\"\n").unwrap();
    assert!(!snapwatch(&path, &["run", "--all"]).status.success());

    let path = write_config(dir.path(), "[[targets]]\nname = \"../etc\"\ncollector = { kind = \"static\", ids = [] }\n");
    assert!(!snapwatch(&path, &["status"]).status.success());
}

#[test]
fn collection_failure_exits_non_zero_and_saves_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        r##"
[[targets]]
name = "camry"
collector = { kind = "listing", url = "http://127.0.0.1:9/used-vehicles/", item_selector = "#srp-results .listing", id_attr = "data-ag-vdp-url" }
"##,
    );
    let out = snapwatch(&path, &["run", "--target", "camry"]);
    assert!(!out.status.success());
    assert!(!dir.path().join("store").join("camry.json").exists());
}

#[test]
fn quiet_run_succeeds_without_email_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), QUIET_RATINGS);
    let out = snapwatch(&path, &["run", "--all"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    assert!(stdout(&out).contains("ratings: 1 entities"));
    assert!(dir.path().join("store").join("ratings.json").exists());

    let out = snapwatch(&path, &["history", "--target", "ratings"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("Ghost 16"));
}

#[test]
fn alerting_run_without_credentials_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        dir.path(),
        "[[targets]]\nname = \"camry\"\ncollector = { kind = \"static\", ids = [\"url1\"] }\n",
    );
    let out = snapwatch(&path, &["run", "--target", "camry"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("EMAIL_USERNAME"));
    assert!(!dir.path().join("store").join("camry.json").exists());
}

#[test]
fn run_needs_target_or_all() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(dir.path(), QUIET_RATINGS);
    assert!(!snapwatch(&path, &["run"]).status.success());
}

#[test]
fn init_then_status_and_check() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapwatch.toml");
    let out = snapwatch(&path, &["init"]);
    assert!(out.status.success());
    assert!(path.exists());
    assert!(stdout(&snapwatch(&path, &["init"])).contains("left unchanged"));

    let path = write_config(dir.path(), QUIET_RATINGS);
    let out = snapwatch(&path, &["check", "--target", "ratings"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("nothing to send"));

    let out = snapwatch(&path, &["status"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("ratings [never run]"));
}
