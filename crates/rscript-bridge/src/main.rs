//! RScript bridge - submits a script folder to a running host.

mod client;
mod render;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use rscript_core::script::DEFAULT_ENTRY;
use rscript_core::{Combiner, Endpoint, Request, ScriptFile};

use crate::client::{Client, ClientConfig};

/// Result delivered and printed, whether or not the script succeeded.
const EXIT_DELIVERED: u8 = 0;
/// Bad arguments, unreadable files or a local combine failure.
const EXIT_USAGE: u8 = 1;
/// Nothing is listening on the endpoint.
const EXIT_UNREACHABLE: u8 = 2;
/// The host was reached but the exchange failed.
const EXIT_TRANSPORT: u8 = 3;

#[derive(Parser)]
#[command(name = "rscript-bridge")]
#[command(about = "Send a script folder to a running RScript host")]
#[command(version)]
struct Cli {
    /// Script folder, or a single script file
    path: PathBuf,

    /// Endpoint of the host (defaults to RSCRIPT_ENDPOINT or the standard socket)
    #[arg(long)]
    endpoint: Option<String>,

    /// Entry file name without extension (default: Main, or the file's own name)
    #[arg(long)]
    entry: Option<String>,

    /// Milliseconds to wait for the host to accept the connection
    #[arg(long, default_value = "1000")]
    connect_timeout: u64,

    /// Seconds to wait for the result
    #[arg(long, default_value = "60")]
    timeout: u64,

    /// Do not stream printed lines while the script runs
    #[arg(long)]
    no_stream: bool,

    /// Also write the combined unit to this file, with a report next to it
    #[arg(long)]
    emit: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    ExitCode::from(run(cli).await)
}

async fn run(cli: Cli) -> u8 {
    let (files, entry) = match prepare(&cli) {
        Ok(prepared) => prepared,
        Err(e) => {
            render::print_error(&format!("{:#}", e), None);
            return EXIT_USAGE;
        }
    };

    let config = ClientConfig {
        endpoint: cli
            .endpoint
            .map(Endpoint::from)
            .unwrap_or_else(Endpoint::from_env),
        connect_timeout: Duration::from_millis(cli.connect_timeout),
        response_timeout: Duration::from_secs(cli.timeout),
        stream: !cli.no_stream,
    };

    let mut request = Request::new(files);
    if entry != DEFAULT_ENTRY {
        request = request.with_entry(entry);
    }

    let client = Client::new(config);
    match client.submit(request, render::print_streamed).await {
        Ok(result) => {
            render::print_result(&result, render::use_color());
            EXIT_DELIVERED
        }
        Err(e) => {
            render::print_error(&e.to_string(), e.hint());
            if e.is_unreachable() {
                EXIT_UNREACHABLE
            } else {
                EXIT_TRANSPORT
            }
        }
    }
}

/// Read the scripts and check them locally before anything is sent.
fn prepare(cli: &Cli) -> anyhow::Result<(Vec<ScriptFile>, String)> {
    let (files, default_entry) = read_scripts(&cli.path)?;
    if files.iter().all(ScriptFile::is_blank) {
        anyhow::bail!("no script content found in {}", cli.path.display());
    }
    let entry = cli.entry.clone().unwrap_or(default_entry);
    let combiner = Combiner::new(entry.clone());

    match &cli.emit {
        Some(target) => {
            let unit = combiner.combine(&files)?;
            emit(target, unit.source(), &unit.report().render())?;
        }
        None => {
            combiner.find_entry(&files)?;
        }
    }
    Ok((files, entry))
}

/// Scripts at `path` and the entry name to use when none is given.
///
/// A single file is its own entry.
fn read_scripts(path: &Path) -> anyhow::Result<(Vec<ScriptFile>, String)> {
    if path.is_dir() {
        let files = ScriptFile::read_dir(path)
            .with_context(|| format!("failed to read scripts in {}", path.display()))?;
        if files.is_empty() {
            anyhow::bail!("no .rs files found in {}", path.display());
        }
        return Ok((files, DEFAULT_ENTRY.to_string()));
    }
    if !path.exists() {
        anyhow::bail!("script path not found: {}", path.display());
    }
    let file = ScriptFile::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let entry = file.stem().to_string();
    Ok((vec![file], entry))
}

/// Write the combined unit and its report.
fn emit(target: &Path, source: &str, report: &str) -> anyhow::Result<()> {
    fs::write(target, source).with_context(|| format!("failed to write {}", target.display()))?;
    let report_path = target.with_extension("report.txt");
    fs::write(&report_path, report)
        .with_context(|| format!("failed to write {}", report_path.display()))?;
    tracing::info!(unit = %target.display(), report = %report_path.display(), "emitted combined unit");
    Ok(())
}
