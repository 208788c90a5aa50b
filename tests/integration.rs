use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const ALPHA: &str = "# Alpha Document\n\nThis is the alpha document about Rust programming. \
It contains information about cargo and crates, workspaces, and how release builds are tuned.";
const BETA: &str = "# Beta Document\n\nThis document discusses Python and machine learning. \
Deep learning frameworks like PyTorch are covered, along with notebooks and datasets.";
const GAMMA: &str = "Gamma plain text file.\n\nContains notes about deployment and infrastructure. \
Kubernetes and Docker are mentioned here, with a short section on rollbacks.";

fn ctxr_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ctxr");
    path
}

fn write_config(root: &Path, name: &str, dims: usize) -> PathBuf {
    let config_content = format!(
        r#"[db]
path = "{root}/data/ctxr.sqlite"

[blobs]
root = "{root}/data/blobs"

[embedding]
transport = "mock"
dims = {dims}

[ingest]
batch_delay_ms = 0
include_globs = ["**/*.md", "**/*.txt"]

[retrieval]
top_k = 3
"#,
        root = root.display(),
        dims = dims,
    );

    let config_path = root.join("config").join(name);
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let files_dir = root.join("files");
    fs::create_dir_all(&files_dir).unwrap();
    fs::write(files_dir.join("alpha.md"), ALPHA).unwrap();
    fs::write(files_dir.join("beta.md"), BETA).unwrap();
    fs::write(files_dir.join("gamma.txt"), GAMMA).unwrap();
    fs::write(files_dir.join("ignored.png"), [0x89, b'P', b'N', b'G']).unwrap();

    let config_path = write_config(&root, "ctxr.toml", 50);
    (tmp, config_path)
}

fn run_ctxr(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ctxr_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ctxr binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn files_dir(tmp: &TempDir) -> String {
    tmp.path().join("files").to_str().unwrap().to_string()
}

#[test]
fn test_init_creates_store() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ctxr(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/ctxr.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_ctxr(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_ctxr(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_init_rejects_other_dims() {
    let (tmp, config_path) = setup_test_env();
    run_ctxr(&config_path, &["init"]);

    let other = write_config(tmp.path(), "other.toml", 8);
    let (_, stderr, success) = run_ctxr(&other, &["init"]);
    assert!(!success);
    assert!(stderr.contains("dimension mismatch"), "stderr: {}", stderr);
}

#[test]
fn test_ingest_directory() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ctxr(
        &config_path,
        &["ingest", &files_dir(&tmp), "--collection", "docs"],
    );
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("documents: 3"), "stdout: {}", stdout);
    assert!(stdout.contains("chunks failed: 0"));
    assert!(stdout.contains("ok"));
    assert!(!stdout.contains("ignored.png"));
}

#[test]
fn test_ingest_archives_blobs() {
    let (tmp, config_path) = setup_test_env();
    run_ctxr(&config_path, &["ingest", &files_dir(&tmp)]);

    let archived: Vec<_> = walk_files(&tmp.path().join("data/blobs"))
        .into_iter()
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    assert!(archived.contains(&"alpha.md".to_string()));
    assert!(archived.contains(&"gamma.txt".to_string()));
}

fn walk_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.extend(walk_files(&path));
            } else {
                out.push(path);
            }
        }
    }
    out
}

#[test]
fn test_reingest_unchanged() {
    let (tmp, config_path) = setup_test_env();

    run_ctxr(&config_path, &["ingest", &files_dir(&tmp)]);
    let (stdout, _, success) = run_ctxr(&config_path, &["ingest", &files_dir(&tmp)]);
    assert!(success);
    assert!(stdout.contains("unchanged: 3"), "stdout: {}", stdout);

    // Modify one file
    fs::write(
        tmp.path().join("files/alpha.md"),
        "# Alpha Document Updated\n\nThis file was modified and now talks about borrow checking in depth.",
    )
    .unwrap();
    let (stdout, _, _) = run_ctxr(&config_path, &["ingest", &files_dir(&tmp)]);
    assert!(stdout.contains("unchanged: 2"), "stdout: {}", stdout);
}

#[test]
fn test_ingest_missing_path_fails() {
    let (tmp, config_path) = setup_test_env();
    let missing = tmp.path().join("nope");
    let (_, stderr, success) = run_ctxr(&config_path, &["ingest", missing.to_str().unwrap()]);
    assert!(!success);
    assert!(stderr.contains("does not exist"));
}

#[test]
fn test_ingest_unsupported_file_fails() {
    let (tmp, config_path) = setup_test_env();
    let png = tmp.path().join("files/ignored.png");
    let (stdout, stderr, success) = run_ctxr(&config_path, &["ingest", png.to_str().unwrap()]);
    assert!(!success, "stdout: {}", stdout);
    assert!(stderr.contains("unsupported content-type"), "stderr: {}", stderr);
}

#[test]
fn test_query_ranks_matching_document_first() {
    let (tmp, config_path) = setup_test_env();
    run_ctxr(&config_path, &["ingest", &files_dir(&tmp), "--collection", "docs"]);

    let (stdout, stderr, success) = run_ctxr(
        &config_path,
        &["query", ALPHA, "--collection", "docs", "--top-k", "1"],
    );
    assert!(success, "query failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.starts_with("From document \"alpha.md\""), "stdout: {}", stdout);
    assert!(!stdout.contains("beta.md"));
    assert!(stdout.contains("sources:"));
}

#[test]
fn test_query_json() {
    let (tmp, config_path) = setup_test_env();
    run_ctxr(&config_path, &["ingest", &files_dir(&tmp), "--collection", "docs"]);

    let (stdout, _, success) = run_ctxr(
        &config_path,
        &["query", "deployment with Docker", "--collection", "docs", "--json"],
    );
    assert!(success);
    let parsed: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(parsed["overview"], false);
    assert_eq!(parsed["matches"].as_array().unwrap().len(), 3);
    assert!(parsed["context"].as_str().unwrap().contains("From document"));
}

#[test]
fn test_overview_query_uses_summaries() {
    let (tmp, config_path) = setup_test_env();
    run_ctxr(&config_path, &["ingest", &files_dir(&tmp), "--collection", "docs"]);

    let (stdout, _, success) = run_ctxr(
        &config_path,
        &["query", "Give me an overview", "--collection", "docs"],
    );
    assert!(success);
    assert!(stdout.contains("(overview from document summaries)"), "stdout: {}", stdout);
    assert!(stdout.contains("From document \"gamma.txt\": Gamma plain text file."));
}

#[test]
fn test_query_empty_collection_fails() {
    let (tmp, config_path) = setup_test_env();
    run_ctxr(&config_path, &["ingest", &files_dir(&tmp), "--collection", "docs"]);

    let (_, stderr, success) = run_ctxr(&config_path, &["query", "anything", "--collection", "other"]);
    assert!(!success);
    assert!(stderr.contains("has no indexed chunks"), "stderr: {}", stderr);
}

#[test]
fn test_chunks_by_path() {
    let (tmp, config_path) = setup_test_env();
    run_ctxr(&config_path, &["ingest", &files_dir(&tmp)]);

    let alpha = tmp.path().join("files/alpha.md");
    let (stdout, _, success) = run_ctxr(&config_path, &["chunks", alpha.to_str().unwrap()]);
    assert!(success);
    assert!(stdout.contains("(1 chunks)"), "stdout: {}", stdout);
    assert!(stdout.contains("summary: # Alpha Document"));
    assert!(stdout.contains("#0"));
}

#[test]
fn test_clear_collection() {
    let (tmp, config_path) = setup_test_env();
    run_ctxr(&config_path, &["ingest", &files_dir(&tmp), "--collection", "docs"]);

    let (stdout, _, success) = run_ctxr(&config_path, &["clear", "--collection", "docs"]);
    assert!(success);
    assert!(stdout.contains("Deleted 3 chunks from collection docs."), "stdout: {}", stdout);

    let (_, _, success) = run_ctxr(&config_path, &["query", "Rust", "--collection", "docs"]);
    assert!(!success);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_ctxr(&tmp.path().join("absent.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
