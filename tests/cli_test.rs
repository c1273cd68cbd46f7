use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const SETTINGS: &str = r#"
[retrieval]
chunk_size = 200
chunk_overlap = 20
top_k = 4

[embedding]
model = "hashing-64"
"#;

fn portops(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_portops"))
        .args(args)
        .current_dir(dir)
        .env_remove("EMBEDDING_MODEL")
        .env("RUST_LOG", "error")
        .output()
        .expect("Failed to run portops")
}

/// Workspace with a settings file and the given documents under data/raw.
fn workspace(docs: &[(&str, &[u8])]) -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".portops");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(config_dir.join("settings.toml"), SETTINGS).unwrap();

    let raw = temp_dir.path().join("data/raw");
    fs::create_dir_all(&raw).unwrap();
    for (name, content) in docs {
        fs::write(raw.join(name), content).unwrap();
    }
    temp_dir
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path();

    let output = portops(temp_path, &["init"]);
    assert!(output.status.success());

    let config_path = temp_path.join(".portops/settings.toml");
    assert!(config_path.exists());

    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[paths]"));
    assert!(content.contains("[retrieval]"));
    assert!(content.contains("chunk_size = 800"));

    // Second init refuses to overwrite
    let output = portops(temp_path, &["init"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("--force"));

    let output = portops(temp_path, &["init", "--force"]);
    assert!(output.status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = workspace(&[]);

    let output = portops(temp_dir.path(), &["config"]);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("top_k = 4"));
    assert!(stdout.contains("model = \"hashing-64\""));
}

#[test]
fn test_invalid_config_exits_with_error() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("bad.toml");
    fs::write(&config_path, "[retrieval]\nchunk_size = 0\n").unwrap();

    let output = portops(
        temp_dir.path(),
        &["config", "--config", config_path.to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Configuration error"));
}

#[test]
fn test_ingest_then_retrieve_json() {
    let temp_dir = workspace(&[
        (
            "gate.txt",
            b"Check the container seal number against the booking at the gate.",
        ),
        (
            "reefer.md",
            b"Plug in reefer containers within thirty minutes of grounding.",
        ),
        ("empty.txt", b""),
    ]);

    let output = portops(temp_dir.path(), &["ingest", "--no-progress"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Ingest complete. Vector store at: data/vectorstore"));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Indexed: data/raw/gate.txt (1 chunks)"));
    assert!(stderr.contains("Indexed: data/raw/reefer.md (1 chunks)"));
    assert!(stderr.contains("Empty file (skipped): data/raw/empty.txt"));
    assert!(temp_dir.path().join("data/vectorstore").is_dir());

    let output = portops(
        temp_dir.path(),
        &["retrieve", "container seal at the gate", "-k", "5", "--json"],
    );
    assert!(output.status.success());

    let hits: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let hits = hits.as_array().unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0]["meta"]["source"], "gate.txt");
    assert!(hits[0]["distance"].as_f64().unwrap() <= hits[1]["distance"].as_f64().unwrap());
}

#[test]
fn test_retrieve_on_fresh_workspace_is_empty() {
    let temp_dir = workspace(&[]);

    let output = portops(temp_dir.path(), &["retrieve", "berth window", "--json"]);
    assert!(output.status.success());
    let hits: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(hits, serde_json::json!([]));
}

#[test]
fn test_ingest_without_documents_succeeds() {
    let temp_dir = workspace(&[]);

    let output = portops(temp_dir.path(), &["ingest", "--no-progress"]);
    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("No documents found in"));
}

#[test]
fn test_ingest_missing_source_directory_fails() {
    let temp_dir = workspace(&[]);
    fs::remove_dir_all(temp_dir.path().join("data/raw")).unwrap();

    let output = portops(temp_dir.path(), &["ingest", "--no-progress"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("No documents found in: data/raw (directory does not exist)"));
}

#[test]
fn test_commands_without_settings_file_fail() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("data/raw")).unwrap();
    fs::write(temp_dir.path().join("data/raw/gate.txt"), "Seal check.").unwrap();

    let output = portops(temp_dir.path(), &["ingest", "--no-progress"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("Configuration error: settings file not found"));
    assert!(stderr.contains("portops init"));
    assert!(!temp_dir.path().join("data/vectorstore").exists());

    let missing = temp_dir.path().join("nowhere.toml");
    let output = portops(
        temp_dir.path(),
        &["retrieve", "seal", "--config", missing.to_str().unwrap()],
    );
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_ingest_failed_file_exit_codes() {
    let temp_dir = workspace(&[
        ("broken.docx", b"not a zip archive"),
        ("gate.txt", b"Seal check at the gate."),
    ]);

    let output = portops(temp_dir.path(), &["ingest", "--no-progress"]);
    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr).unwrap();
    assert!(stderr.contains("broken.docx"));

    let output = portops(
        temp_dir.path(),
        &["ingest", "--no-progress", "--fail-on-error"],
    );
    assert_eq!(output.status.code(), Some(2));
}
