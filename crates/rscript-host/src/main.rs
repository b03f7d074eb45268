//! RScript host - runs the script server against an in-memory document.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rscript_core::host::{MemoryApplication, MemoryDocument, UiThread};
use rscript_core::{
    Endpoint, Engine, EngineConfig, ExecutionQueue, HostRunner, ScriptServer, ServerConfig,
};

#[derive(Parser)]
#[command(name = "rscript-host")]
#[command(about = "Serve RScript requests against an in-memory document")]
#[command(version)]
struct Cli {
    /// Endpoint to listen on (defaults to RSCRIPT_ENDPOINT or the standard socket)
    #[arg(long)]
    endpoint: Option<String>,

    /// Directory holding the host API libraries (RSCRIPT_HOST_API_DIR)
    #[arg(long)]
    host_api_dir: Option<PathBuf>,

    /// Root for per-job build directories (RSCRIPT_BUILD_DIR)
    #[arg(long)]
    build_dir: Option<PathBuf>,

    /// Seconds a client waits for a job before it is withdrawn
    #[arg(long, default_value = "45")]
    timeout: u64,

    /// Title of the open document
    #[arg(long, default_value = "Untitled")]
    document: String,

    /// Initial document parameter, as key=value (repeatable)
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.trim().is_empty() {
        return Err(format!("empty parameter name in '{}'", raw));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut engine_config = EngineConfig::from_env();
    if let Some(dir) = cli.host_api_dir {
        engine_config.host_api_dir = Some(dir);
    }
    if let Some(dir) = cli.build_dir {
        engine_config.build_dir = dir;
    }

    let server_config = ServerConfig {
        endpoint: cli
            .endpoint
            .map(Endpoint::from)
            .unwrap_or_else(Endpoint::from_env),
        execution_timeout: Duration::from_secs(cli.timeout),
        ..ServerConfig::default()
    };

    let app = Arc::new(MemoryApplication::with_document(
        MemoryDocument::with_parameters(cli.document, cli.params),
    ));
    let ui = Arc::new(UiThread::spawn("rscript-ui").context("failed to start the UI thread")?);
    let engine = Arc::new(Engine::new(engine_config));
    let runner = Arc::new(HostRunner::new(app.clone(), engine));
    let queue = ExecutionQueue::new(ui.clone(), runner);

    let server = Arc::new(ScriptServer::new(server_config, queue));
    let listener = server
        .bind()
        .with_context(|| format!("failed to listen on {}", server.config().endpoint))?;

    println!("RScript host listening on {}", listener.endpoint());
    println!("Press Ctrl+C to stop");

    let running = server.clone();
    let serve = tokio::spawn(async move { running.serve(listener).await });

    tokio::signal::ctrl_c()
        .await
        .context("failed to wait for Ctrl+C")?;
    tracing::info!("shutting down");
    server.stop();
    serve.await.context("server task failed")??;
    ui.shutdown();

    if let Some(document) = app.document() {
        for (key, value) in document.parameters() {
            tracing::info!(%key, %value, "final parameter");
        }
        for name in document.history() {
            tracing::info!(transaction = %name, "committed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("height=30").unwrap(),
            ("height".to_string(), "30".to_string())
        );
        assert_eq!(
            parse_param("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_param("height").is_err());
        assert!(parse_param("=3").is_err());
    }
}
