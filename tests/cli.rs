//! Integration tests for the `nlm` binary.

use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

fn nlm_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("nlm");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_path = config_dir.join("nlm.toml");
    fs::write(
        &config_path,
        format!(
            r#"
[db]
path = "{}"

[uploads]
dir = "{}"

[server]
bind = "127.0.0.1:0"
"#,
            root.join("data/nlm.sqlite").display(),
            root.join("data/uploads").display()
        ),
    )
    .unwrap();

    (tmp, config_path)
}

fn run_nlm(config: &PathBuf, args: &[&str]) -> (bool, String, String) {
    let output = Command::new(nlm_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run nlm");
    (
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

fn insert_notebook(tmp: &TempDir, subject: &str) {
    let db = tmp.path().join("data/nlm.sqlite");
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&format!("sqlite:{}", db.display()))
            .await
            .unwrap();
        sqlx::query("INSERT INTO notebooks (subject, created_at) VALUES (?, datetime('now'))")
            .bind(subject)
            .execute(&pool)
            .await
            .unwrap();
        pool.close().await;
    });
}

#[test]
fn test_init_is_idempotent() {
    let (tmp, config) = setup_test_env();

    let (ok, stdout, stderr) = run_nlm(&config, &["init"]);
    assert!(ok, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully."));
    assert!(tmp.path().join("data/nlm.sqlite").exists());
    assert!(tmp.path().join("data/uploads").is_dir());

    let (ok, stdout, _) = run_nlm(&config, &["init"]);
    assert!(ok);
    assert!(stdout.contains("0 migration(s) applied"));
}

#[test]
fn test_notebooks_lists_subjects() {
    let (tmp, config) = setup_test_env();

    let (ok, stdout, _) = run_nlm(&config, &["notebooks"]);
    assert!(ok);
    assert!(stdout.contains("No notebooks."));

    insert_notebook(&tmp, "Biology");
    let (ok, stdout, _) = run_nlm(&config, &["notebooks"]);
    assert!(ok);
    assert!(stdout.contains("SUBJECT"));
    assert!(stdout.contains("Biology"));
}

#[test]
fn test_reset_clears_notebooks_and_uploads() {
    let (tmp, config) = setup_test_env();
    let (ok, _, _) = run_nlm(&config, &["init"]);
    assert!(ok);

    insert_notebook(&tmp, "Physics");
    fs::write(tmp.path().join("data/uploads/old.pdf"), b"%PDF-1.4").unwrap();

    let (ok, stdout, stderr) = run_nlm(&config, &["reset"]);
    assert!(ok, "reset failed: {}", stderr);
    assert!(stdout.contains("Database and uploads reset successfully!"));
    assert!(!tmp.path().join("data/uploads/old.pdf").exists());

    let (_, stdout, _) = run_nlm(&config, &["notebooks"]);
    assert!(stdout.contains("No notebooks."));
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (ok, _, stderr) = run_nlm(&tmp.path().join("absent.toml"), &["init"]);
    assert!(!ok);
    assert!(stderr.contains("Failed to read config file"));
}
