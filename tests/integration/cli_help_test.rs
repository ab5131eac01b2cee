use assert_cmd::Command;
use kommo::core::webhook::compute_signature;
use predicates::prelude::*;
use tempfile::TempDir;

/// Command with logging pointed at a throwaway directory.
fn kommo(logs: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("kommo"));
    cmd.env("KOMMO_LOG_DIR", logs.path())
        .env_remove("RUST_LOG")
        .env_remove("KOMMO_LOG_CONSOLE");
    cmd
}

#[test]
fn test_top_level_help_lists_commands() {
    let logs = TempDir::new().unwrap();
    kommo(&logs)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("USAGE:"))
        .stdout(predicate::str::contains("request"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("webhook"))
        .stdout(predicate::str::contains("operations"));
}

#[test]
fn test_request_help_shows_example() {
    let logs = TempDir::new().unwrap();
    kommo(&logs)
        .args(["request", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--all"))
        .stdout(predicate::str::contains("KEY=VALUE"))
        .stdout(predicate::str::contains("kommo request GET leads"));
}

#[test]
fn test_run_help_mentions_continue_on_fail() {
    let logs = TempDir::new().unwrap();
    kommo(&logs)
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--continue-on-fail"))
        .stdout(predicate::str::contains("--items"));
}

#[test]
fn test_request_rejects_bad_method() {
    let logs = TempDir::new().unwrap();
    kommo(&logs)
        .args(["request", "FETCH LEADS", "leads"])
        .assert()
        .failure();
}

#[test]
fn test_webhook_sign_matches_library() {
    let logs = TempDir::new().unwrap();
    let body = r#"{"event_type":"lead_added","entity_id":1,"created_at":1700000000}"#;
    let expected = compute_signature(body.as_bytes(), "top-secret").unwrap();
    kommo(&logs)
        .args(["webhook", "sign", "--secret", "top-secret", "--body", body])
        .assert()
        .success()
        .stdout(format!("{}\n", expected));
}

#[test]
fn test_operations_lists_builtins() {
    let logs = TempDir::new().unwrap();
    kommo(&logs)
        .arg("operations")
        .assert()
        .success()
        .stdout(predicate::str::contains("leads.getLeads"))
        .stdout(predicate::str::contains("purchases.createPurchases"))
        .stdout(predicate::str::contains("unsorted.accept"));
}

#[test]
fn test_run_with_missing_items_file_fails() {
    let logs = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    kommo(&logs)
        .arg("--workspace")
        .arg(workspace.path())
        .args(["run", "--items"])
        .arg(workspace.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read items file"));
}

#[test]
fn test_webhook_serve_rejects_relative_path_override() {
    let logs = TempDir::new().unwrap();
    let workspace = TempDir::new().unwrap();
    kommo(&logs)
        .arg("--workspace")
        .arg(workspace.path())
        .args(["webhook", "serve", "--bind", "127.0.0.1:0", "--path", "hooks"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("webhook.path must start with '/'"));
}
