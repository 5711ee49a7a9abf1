//! End-to-end CLI tests for the catalog-dl binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Command isolated from the user's config file and log settings.
fn catalog_dl(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("catalog-dl").unwrap();
    cmd.env("XDG_CONFIG_HOME", home.join("config"))
        .env("HOME", home)
        .env_remove("RUST_LOG");
    cmd
}

fn write_catalog(dir: &Path, rows: &str) -> std::path::PathBuf {
    let path = dir.join("catalog.jsonl");
    std::fs::write(&path, rows).unwrap();
    path
}

#[test]
fn test_binary_help_displays_usage() {
    let home = TempDir::new().unwrap();
    catalog_dl(home.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("content-addressed catalog"))
        .stdout(predicate::str::contains("requeue"));
}

#[test]
fn test_binary_version_displays_version() {
    let home = TempDir::new().unwrap();
    catalog_dl(home.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("catalog-dl"));
}

#[test]
fn test_binary_without_subcommand_fails() {
    let home = TempDir::new().unwrap();
    catalog_dl(home.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_binary_invalid_flag_returns_error() {
    let home = TempDir::new().unwrap();
    catalog_dl(home.path())
        .args(["run", "--invalid-flag"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_import_then_status_json() {
    let home = TempDir::new().unwrap();
    let db = home.path().join("catalog.db");
    let catalog = write_catalog(
        home.path(),
        "{\"md5\":\"k1\",\"title\":\"Dune\",\"extension\":\"epub\"}\n\
         {\"md5\":\"k2\",\"title\":\"Emma\",\"extension\":\"pdf\"}\n\
         {\"md5\":\" \",\"title\":\"No key\"}\n",
    );

    catalog_dl(home.path())
        .arg("--database")
        .arg(&db)
        .arg("import")
        .arg(&catalog)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 new, 0 merged, 1 rejected"));

    catalog_dl(home.path())
        .arg("--database")
        .arg(&db)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"unset\": 2"));
}

#[test]
fn test_import_missing_file_fails() {
    let home = TempDir::new().unwrap();
    catalog_dl(home.path())
        .arg("--database")
        .arg(home.path().join("catalog.db"))
        .args(["import", "does-not-exist.jsonl"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("does-not-exist.jsonl"));
}

#[test]
fn test_invalid_config_file_fails() {
    let home = TempDir::new().unwrap();
    let config = home.path().join("bad.toml");
    std::fs::write(&config, "concurrency = 500\n").unwrap();

    catalog_dl(home.path())
        .arg("--config")
        .arg(&config)
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("concurrency"));
}

/// One item downloads and one 404s: exit code 2, then the failure can be requeued.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_run_partial_failure_exits_two_and_requeue_recovers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/k1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"dune".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/k2"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let base = server.uri();
    tokio::task::spawn_blocking(move || {
        let home = TempDir::new().unwrap();
        let db = home.path().join("catalog.db");
        let out = home.path().join("out");
        let catalog = write_catalog(
            home.path(),
            &format!(
                "{{\"md5\":\"k1\",\"title\":\"Dune\",\"extension\":\"epub\",\
                   \"download_url\":\"{base}/files/k1\"}}\n\
                 {{\"md5\":\"k2\",\"title\":\"Emma\",\"extension\":\"pdf\",\
                   \"download_url\":\"{base}/files/k2\"}}\n"
            ),
        );

        catalog_dl(home.path())
            .arg("--database")
            .arg(&db)
            .arg("import")
            .arg(&catalog)
            .assert()
            .success();

        catalog_dl(home.path())
            .arg("--database")
            .arg(&db)
            .args(["run", "--resolver", "direct", "-r", "1", "-o"])
            .arg(&out)
            .assert()
            .code(2)
            .stdout(predicate::str::contains("1 downloaded"))
            .stdout(predicate::str::contains("1 failed"));
        assert_eq!(std::fs::read(out.join("Dune.epub")).unwrap(), b"dune");

        catalog_dl(home.path())
            .arg("--database")
            .arg(&db)
            .args(["list", "--status", "failed"])
            .assert()
            .success()
            .stdout(predicate::str::contains("k2\tfailed\tfetch failed:"));

        catalog_dl(home.path())
            .arg("--database")
            .arg(&db)
            .arg("requeue")
            .assert()
            .success()
            .stdout(predicate::str::contains("Requeued 1 failed item(s)"));

        catalog_dl(home.path())
            .arg("--database")
            .arg(&db)
            .args(["status", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"pending\": 1"))
            .stdout(predicate::str::contains("\"success\": 1"));
    })
    .await
    .unwrap();
}

#[test]
fn test_run_on_empty_catalog_succeeds() {
    let home = TempDir::new().unwrap();
    catalog_dl(home.path())
        .arg("--database")
        .arg(home.path().join("catalog.db"))
        .args(["-q", "run", "-o"])
        .arg(home.path().join("out"))
        .assert()
        .success();
}
