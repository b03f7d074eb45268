//! Runs queued jobs against the host's active document.

use std::sync::Arc;

use crate::host::{HostApplication, HostError};
use crate::queue::{ExecutionJob, JobRunner};
use crate::result::ExecutionResult;

use super::engine::{Engine, ScriptBindings};
use super::output::{FrameSink, OutputSink};

/// [`JobRunner`] that resolves the active document and hands the job to the
/// [`Engine`]. Called on the UI thread.
pub struct HostRunner {
    app: Arc<dyn HostApplication>,
    engine: Arc<Engine>,
}

impl HostRunner {
    pub fn new(app: Arc<dyn HostApplication>, engine: Arc<Engine>) -> Self {
        Self { app, engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }
}

impl JobRunner for HostRunner {
    fn run(&self, job: ExecutionJob) -> ExecutionResult {
        let Some(document) = self.app.active_document() else {
            tracing::info!(job = %job.id, "no active document");
            return ExecutionResult::rejected(HostError::NoActiveDocument.to_string());
        };

        let mut bindings = ScriptBindings::new(document);
        if let Some(ui_document) = self.app.active_ui_document() {
            bindings = bindings.with_ui_document(ui_document);
        }
        if let Some(endpoint) = &job.output {
            match FrameSink::connect(endpoint) {
                Ok(sink) => bindings = bindings.with_output(Box::new(sink) as Box<dyn OutputSink>),
                Err(e) => {
                    tracing::warn!(job = %job.id, error = %e, "output stream unavailable, printing to result only");
                }
            }
        }

        tracing::debug!(
            job = %job.id,
            waited_ms = job.submitted_at.elapsed().as_millis() as u64,
            "running job"
        );
        self.engine
            .compile_and_run(&job.files, job.entry.as_deref(), bindings)
    }
}
