#![cfg(unix)]

use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    time::Duration,
};

use tempfile::TempDir;

use mcptex::application::compile::{JobRunner, RunnerConfig};
use mcptex::domain::compile::{CompilationResult, FailureKind};

/// Stand-in for xelatex: reads the document from stdin and writes
/// `texput.pdf` into the `-output-directory`. Markers in the document
/// select failure modes.
const FAKE_TEX: &str = r#"#!/bin/sh
out=""
for arg in "$@"; do
  case "$arg" in
    -output-directory=*) out="${arg#-output-directory=}" ;;
  esac
done
printf '%s\n' "$@" > "$out/../args-$$.log"
doc=$(cat)
case "$doc" in
  *FAIL*)
    echo "! Undefined control sequence."
    echo "fatal error occurred" >&2
    exit 1
    ;;
  *NOPDF*)
    exit 0
    ;;
  *PDFDIR*)
    mkdir "$out/texput.pdf"
    exit 0
    ;;
  *NESTEDSLOW*)
    sleep 30
    ;;
  *SLOW*)
    exec sleep 30
    ;;
esac
printf '%%PDF-1.5\n%s\n' "$doc" > "$out/texput.pdf"
"#;

struct Fixture {
    _root: TempDir,
    output_dir: PathBuf,
    compiler: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().expect("temp dir");
        let compiler = root.path().join("fake-xelatex");
        fs::write(&compiler, FAKE_TEX).expect("write fake compiler");
        let mut perms = fs::metadata(&compiler).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&compiler, perms).expect("set perms");
        let output_dir = root.path().join("output");
        Self {
            _root: root,
            output_dir,
            compiler,
        }
    }

    fn runner(&self) -> JobRunner {
        self.runner_with_timeout(Duration::from_secs(20))
    }

    fn runner_with_timeout(&self, timeout: Duration) -> JobRunner {
        JobRunner::new(RunnerConfig {
            compiler: self.compiler.clone(),
            output_dir: self.output_dir.clone(),
            timeout,
            max_output_bytes: 64 * 1024,
        })
    }

    /// Job directories left under the output directory (argument logs excluded).
    fn leftover_workspaces(&self) -> Vec<PathBuf> {
        match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries
                .map(|entry| entry.expect("dir entry").path())
                .filter(|path| path.is_dir())
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    fn recorded_args(&self) -> Vec<String> {
        let log = fs::read_dir(&self.output_dir)
            .expect("output dir")
            .map(|entry| entry.expect("dir entry").path())
            .find(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with("args-"))
            })
            .expect("args log");
        fs::read_to_string(log)
            .expect("read args")
            .lines()
            .map(str::to_string)
            .collect()
    }
}

fn expect_artifact(result: CompilationResult) -> (Vec<u8>, String) {
    match result {
        CompilationResult::Artifact(artifact) => {
            assert_eq!(artifact.mime_type, "application/pdf");
            (artifact.bytes, artifact.location)
        }
        CompilationResult::Failure { kind, message } => {
            panic!("expected artifact, got {kind}: {message}")
        }
    }
}

fn expect_failure(result: CompilationResult) -> (FailureKind, String) {
    match result {
        CompilationResult::Failure { kind, message } => (kind, message),
        CompilationResult::Artifact(artifact) => {
            panic!("expected failure, got artifact at {}", artifact.location)
        }
    }
}

#[tokio::test]
async fn valid_document_yields_pdf_artifact() {
    let fixture = Fixture::new();
    let document = "\\documentclass{article}\\begin{document}Hi\\end{document}";

    let (bytes, location) = expect_artifact(fixture.runner().run(document, &[]).await);

    assert!(bytes.starts_with(b"%PDF"));
    assert!(String::from_utf8_lossy(&bytes).contains(document));
    assert!(location.ends_with("texput.pdf"));
    assert!(Path::new(&location).starts_with(&fixture.output_dir));
    assert!(fixture.leftover_workspaces().is_empty());
}

#[tokio::test]
async fn compiler_error_reports_captured_output() {
    let fixture = Fixture::new();

    let (kind, message) = expect_failure(fixture.runner().run("\\FAIL", &[]).await);

    assert_eq!(kind, FailureKind::CompilerInvocationFailed);
    assert!(message.starts_with("Failed to convert LaTeX to PDF: "));
    assert!(message.contains("Undefined control sequence"));
    assert!(message.contains("fatal error occurred"));
    assert!(fixture.leftover_workspaces().is_empty());
}

#[tokio::test]
async fn zero_exit_without_pdf_is_missing_artifact() {
    let fixture = Fixture::new();

    let (kind, message) = expect_failure(fixture.runner().run("NOPDF", &[]).await);

    assert_eq!(kind, FailureKind::OutputArtifactMissing);
    assert_eq!(message, "PDF file does not exist");
    assert!(fixture.leftover_workspaces().is_empty());
}

#[tokio::test]
async fn unreadable_artifact_is_read_failure() {
    let fixture = Fixture::new();

    let (kind, message) = expect_failure(fixture.runner().run("PDFDIR", &[]).await);

    assert_eq!(kind, FailureKind::ArtifactReadFailed);
    assert_eq!(message, "Failed to convert LaTeX to PDF");
    assert!(fixture.leftover_workspaces().is_empty());
}

#[tokio::test]
async fn location_is_reported_below_configured_output_dir() {
    let fixture = Fixture::new();
    let runner = JobRunner::new(RunnerConfig {
        compiler: fixture.compiler.clone(),
        output_dir: fixture.output_dir.join("nested").join("..").join("jobs"),
        timeout: Duration::from_secs(20),
        max_output_bytes: 64 * 1024,
    });
    fs::create_dir_all(fixture.output_dir.join("nested")).expect("nested dir");

    let (_, location) = expect_artifact(runner.run("\\relax", &[]).await);

    let expected_base = fixture.output_dir.join("nested").join("..").join("jobs");
    let location = Path::new(&location);
    assert_eq!(location.file_name().and_then(|name| name.to_str()), Some("texput.pdf"));
    assert_eq!(location.parent().and_then(Path::parent), Some(expected_base.as_path()));
}

#[tokio::test]
async fn shell_compiler_waiting_on_a_child_still_times_out() {
    let fixture = Fixture::new();
    let runner = fixture.runner_with_timeout(Duration::from_millis(500));

    let started = std::time::Instant::now();
    let (kind, _) = expect_failure(runner.run("NESTEDSLOW", &[]).await);

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(kind, FailureKind::Timeout);
    assert!(fixture.leftover_workspaces().is_empty());
}

#[tokio::test]
async fn missing_toolchain_creates_no_workspace() {
    let fixture = Fixture::new();
    let runner = JobRunner::new(RunnerConfig {
        compiler: fixture.output_dir.with_file_name("no-such-xelatex"),
        output_dir: fixture.output_dir.clone(),
        ..RunnerConfig::default()
    });

    let (kind, message) = expect_failure(runner.run("\\relax", &[]).await);

    assert_eq!(kind, FailureKind::ToolchainNotFound);
    assert_eq!(message, "compiler executable not found");
    assert!(!fixture.output_dir.exists());
}

#[tokio::test]
async fn unusable_output_directory_fails_before_invocation() {
    let fixture = Fixture::new();
    fs::write(&fixture.output_dir, b"occupied").expect("block output dir");

    let (kind, message) = expect_failure(fixture.runner().run("\\relax", &[]).await);

    assert_eq!(kind, FailureKind::WorkspacePrepareFailed);
    assert_eq!(message, "failed to prepare working area");
}

#[tokio::test]
async fn slow_compiler_times_out_and_cleans_up() {
    let fixture = Fixture::new();
    let runner = fixture.runner_with_timeout(Duration::from_millis(500));

    let started = std::time::Instant::now();
    let (kind, message) = expect_failure(runner.run("SLOW", &[]).await);

    assert!(started.elapsed() < Duration::from_secs(15));
    assert_eq!(kind, FailureKind::Timeout);
    assert!(message.starts_with("compiler timed out after"));
    assert!(fixture.leftover_workspaces().is_empty());
}

#[tokio::test]
async fn caller_options_follow_mandatory_flags_in_order() {
    let fixture = Fixture::new();
    let options = vec!["-mltex".to_string(), "-etex".to_string()];

    expect_artifact(fixture.runner().run("\\relax", &options).await);

    let args = fixture.recorded_args();
    assert_eq!(args.len(), 4);
    assert!(args[0].starts_with("-output-directory="));
    assert_eq!(args[1], "-halt-on-error");
    assert_eq!(&args[2..], ["-mltex", "-etex"]);
}

#[tokio::test]
async fn same_input_twice_gives_distinct_locations_and_identical_bytes() {
    let fixture = Fixture::new();
    let runner = fixture.runner();

    let (first_bytes, first_location) = expect_artifact(runner.run("\\relax", &[]).await);
    let (second_bytes, second_location) = expect_artifact(runner.run("\\relax", &[]).await);

    assert_ne!(first_location, second_location);
    assert_eq!(first_bytes, second_bytes);
}

#[tokio::test]
async fn concurrent_jobs_never_share_a_workspace() {
    let fixture = Fixture::new();
    let runner = fixture.runner();

    let mut handles = Vec::new();
    for index in 0..12 {
        let runner = runner.clone();
        handles.push(tokio::spawn(async move {
            runner.run(&format!("document {index}"), &[]).await
        }));
    }

    let mut locations = std::collections::HashSet::new();
    for (index, handle) in handles.into_iter().enumerate() {
        let (bytes, location) = expect_artifact(handle.await.expect("join"));
        assert!(String::from_utf8_lossy(&bytes).contains(&format!("document {index}")));
        assert!(locations.insert(location));
    }
    assert_eq!(locations.len(), 12);
    assert!(fixture.leftover_workspaces().is_empty());
}

#[tokio::test]
async fn every_outcome_is_exactly_one_variant_and_leaves_no_workspace() {
    let fixture = Fixture::new();
    let runner = fixture.runner();

    for document in ["\\relax", "\\FAIL", "NOPDF"] {
        let result = runner.run(document, &[]).await;
        assert_eq!(
            result.is_success(),
            matches!(result, CompilationResult::Artifact(_))
        );
        assert!(fixture.leftover_workspaces().is_empty(), "after {document}");
    }
}
