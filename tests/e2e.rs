//! End-to-end tests against the live document service.
//!
//! These tests upload small generated documents and make real API calls.
//! They are gated behind the `E2E_ENABLED` environment variable and need
//! `CLIENT_ID`/`CLIENT_SECRET` (a `.env` file works), so they do not run in
//! CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture

use pdf_sequencer::{
    Credentials, FileStatus, RunConfig, RunOptions, Sequence, Sequencer, ServiceClient,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set and credentials are available.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        dotenvy::dotenv().ok();
        match Credentials::from_env() {
            Ok(c) => c,
            Err(e) => {
                println!("SKIP — {e}");
                return;
            }
        }
    }};
}

fn input_tree(files: &[(&str, &str)]) -> (tempfile::TempDir, PathBuf, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    for (name, body) in files {
        let p = input.join(name);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(&p, body).unwrap();
    }
    (dir, input, output)
}

async fn sequencer(credentials: &Credentials, options: RunOptions) -> Sequencer {
    let config = RunConfig::default();
    let client = ServiceClient::connect(&config, credentials)
        .await
        .expect("token request should succeed");
    Sequencer::new(Arc::new(client), config, options)
}

fn assert_pdf(path: &Path) {
    let bytes = std::fs::read(path).unwrap_or_else(|e| panic!("{}: {e}", path.display()));
    assert!(bytes.starts_with(b"%PDF-"), "{} is not a PDF", path.display());
    println!("✓  {} ({} bytes)", path.display(), bytes.len());
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_token_acquisition() {
    let credentials = e2e_skip_unless_ready!();
    let config = RunConfig::default();
    ServiceClient::connect(&config, &credentials)
        .await
        .expect("token request should succeed");
}

#[tokio::test]
async fn test_create_then_compress() {
    let credentials = e2e_skip_unless_ready!();
    let (_dir, input, output) = input_tree(&[("notes/hello.txt", "Hello from the batch sequencer.\n")]);
    let sequence =
        Sequence::parse(r#"[{"operation":"createpdf"},{"operation":"compresspdf"}]"#).unwrap();

    let out = sequencer(&credentials, RunOptions::default())
        .await
        .run(&input, &output, &sequence)
        .await
        .expect("run should complete");

    assert_eq!(out.files.len(), 1);
    assert_eq!(out.files[0].status, FileStatus::Completed);
    assert_pdf(&output.join("notes/hello_compresspdf.pdf"));
}

#[tokio::test]
async fn test_properties_after_create() {
    let credentials = e2e_skip_unless_ready!();
    let (_dir, input, output) = input_tree(&[("hello.txt", "One page of text.\n")]);
    let sequence =
        Sequence::parse(r#"[{"operation":"createpdf"},{"operation":"pdfproperties"}]"#).unwrap();

    let out = sequencer(&credentials, RunOptions::default())
        .await
        .run(&input, &output, &sequence)
        .await
        .expect("run should complete");

    assert_eq!(out.files[0].status, FileStatus::Completed);
    let json = std::fs::read_to_string(output.join("hello_properties.json")).unwrap();
    let metadata: Value = serde_json::from_str(&json).unwrap();
    assert!(metadata.get("document").is_some(), "got: {metadata}");
    println!("Properties: {metadata}");
}

#[tokio::test]
async fn test_protect_with_run_password() {
    let credentials = e2e_skip_unless_ready!();
    let (_dir, input, output) = input_tree(&[("secret.txt", "Classified.\n")]);
    let sequence = Sequence::parse(
        r#"[{"operation":"createpdf"},
            {"operation":"protectpdf","parameters":{"encryptionAlgorithm":"AES_256"}}]"#,
    )
    .unwrap();
    let options = RunOptions::parse(["userPassword=e2e-pass", "moveProcessed=true"]);

    let out = sequencer(&credentials, options)
        .await
        .run(&input, &output, &sequence)
        .await
        .expect("run should complete");

    assert_eq!(out.files[0].status, FileStatus::Completed);
    assert_pdf(&output.join("secret_protectpdf.pdf"));
    assert!(output.join("secret.txt").exists());
    assert!(!input.join("secret.txt").exists());
}
