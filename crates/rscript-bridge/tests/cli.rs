//! Command-line tests for the bridge.

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use rscript_core::Endpoint;

fn bridge() -> Command {
    Command::cargo_bin("rscript-bridge").unwrap()
}

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

#[test]
fn test_missing_path_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    bridge()
        .arg(dir.path().join("nowhere"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("script path not found"));
}

#[test]
fn test_missing_entry_is_caught_locally() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Helpers.rs", "pub fn help() {}\n");

    bridge()
        .arg(dir.path())
        .args(["--endpoint", Endpoint::unique("rscript-cli").as_str()])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("entry file 'Main' not found"));
}

#[test]
fn test_syntax_error_with_emit_is_caught_locally() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Main.rs", "let x = ;\n");

    bridge()
        .arg(dir.path())
        .arg("--emit")
        .arg(dir.path().join("out.rs"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Main.rs:1:"));
    assert!(!dir.path().join("out.rs").exists());
}

#[test]
fn test_unreachable_host() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Main.rs", "print(\"hi\");\n");

    bridge()
        .arg(dir.path())
        .args(["--endpoint", Endpoint::unique("rscript-cli").as_str()])
        .args(["--connect-timeout", "200"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("hint:"));
}

#[test]
fn test_emit_writes_combined_unit() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "Main.rs", "print(Greeting::text());\n");
    write(
        dir.path(),
        "Greeting.rs",
        "pub struct Greeting;\nimpl Greeting { pub fn text() -> &'static str { \"hi\" } }\n",
    );
    let target = dir.path().join("combined.rs");

    bridge()
        .arg(dir.path())
        .arg("--emit")
        .arg(&target)
        .args(["--endpoint", Endpoint::unique("rscript-cli").as_str()])
        .args(["--connect-timeout", "200"])
        .assert()
        .code(2);

    let unit = fs::read_to_string(&target).unwrap();
    assert!(unit.contains("pub struct Greeting;"));
    let report = fs::read_to_string(dir.path().join("combined.report.txt")).unwrap();
    assert!(report.contains("Greeting.rs"));
}

#[cfg(unix)]
mod with_host {
    use std::sync::Arc;
    use std::time::Duration;

    use rscript_core::execute::{FrameSink, OutputSink};
    use rscript_core::host::UiThread;
    use rscript_core::{
        ExecutionJob, ExecutionQueue, ExecutionResult, JobRunner, ScriptServer, ServerConfig,
    };

    use super::*;

    /// Echoes the file names back, streaming each one first.
    fn fake_runner() -> Arc<dyn JobRunner> {
        Arc::new(|job: ExecutionJob| {
            let mut lines = Vec::new();
            let mut sink = job.output.as_ref().and_then(|e| FrameSink::connect(e).ok());
            for file in &job.files {
                let line = format!("got {}", file.name);
                if let Some(sink) = sink.as_mut() {
                    sink.emit(&line).unwrap();
                }
                lines.push(line);
            }
            if job.files.iter().any(|f| f.content.contains("panic!")) {
                return ExecutionResult::runtime_error("boom", vec!["boom".to_string()]);
            }
            ExecutionResult::completed(&lines)
        })
    }

    async fn start_host() -> (Arc<ScriptServer>, Endpoint, tokio::task::JoinHandle<()>) {
        let ui = Arc::new(UiThread::spawn("cli-test-ui").unwrap());
        let queue = ExecutionQueue::new(ui, fake_runner());
        let config = ServerConfig {
            endpoint: Endpoint::unique("rscript-cli"),
            ..ServerConfig::default()
        };
        let server = Arc::new(ScriptServer::new(config, queue));
        let endpoint = server.config().endpoint.clone();
        let listener = server.bind().unwrap();
        let running = server.clone();
        let task = tokio::spawn(async move {
            running.serve(listener).await.unwrap();
        });
        (server, endpoint, task)
    }

    async fn run_bridge(args: Vec<String>) -> assert_cmd::assert::Assert {
        tokio::task::spawn_blocking(move || bridge().args(args).assert())
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_result_is_printed() {
        let (server, endpoint, task) = start_host().await;
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Main.rs", "print(\"hi\");\n");
        write(dir.path(), "Util.rs", "pub fn util() {}\n");

        run_bridge(vec![
            dir.path().display().to_string(),
            "--endpoint".into(),
            endpoint.to_string(),
        ])
        .await
        .code(0)
        .stdout(predicate::str::contains("got Main.rs\ngot Util.rs"))
        .stderr(predicate::str::contains("got Main.rs"));

        server.stop();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_no_stream_prints_only_the_result() {
        let (server, endpoint, task) = start_host().await;
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Main.rs", "print(\"hi\");\n");

        run_bridge(vec![
            dir.path().display().to_string(),
            "--endpoint".into(),
            endpoint.to_string(),
            "--no-stream".into(),
        ])
        .await
        .code(0)
        .stdout(predicate::str::contains("got Main.rs"))
        .stderr(predicate::str::contains("got Main.rs").not());

        server.stop();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_script_failure_is_still_delivered() {
        let (server, endpoint, task) = start_host().await;
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Main.rs", "panic!(\"boom\");\n");

        run_bridge(vec![
            dir.path().display().to_string(),
            "--endpoint".into(),
            endpoint.to_string(),
        ])
        .await
        .code(0)
        .stdout(predicate::str::contains("[ERROR] Runtime error: boom"));

        server.stop();
        tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    }
}
