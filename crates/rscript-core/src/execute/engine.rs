//! Combine, compile, load and run one submission.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use crate::combine::{CombineError, CombinedUnit, Combiner};
use crate::compile::{Diagnostic, EngineConfig, HostReferences, ToolchainManager, UNIT_FILE, UnitCompiler};
use crate::error::Result;
use crate::host::{Document, UiDocument};
use crate::result::ExecutionResult;
use crate::script::ScriptFile;

use super::abi::{ABI_MISMATCH, ABSENT, HostSession, NULL_API, OK, ScriptFailure};
use super::context::IsolatedContext;
use super::output::OutputSink;

/// What a script sees of the host while it runs.
pub struct ScriptBindings {
    pub document: Arc<dyn Document>,
    pub ui_document: Option<Arc<dyn UiDocument>>,
    /// Receives printed lines as they happen, in addition to the result.
    pub output: Option<Box<dyn OutputSink>>,
}

impl ScriptBindings {
    pub fn new(document: Arc<dyn Document>) -> Self {
        Self {
            document,
            ui_document: None,
            output: None,
        }
    }

    pub fn with_ui_document(mut self, ui_document: Arc<dyn UiDocument>) -> Self {
        self.ui_document = Some(ui_document);
        self
    }

    pub fn with_output(mut self, output: Box<dyn OutputSink>) -> Self {
        self.output = Some(output);
        self
    }
}

/// Turns submitted files into an [`ExecutionResult`].
///
/// The toolchain and host libraries are looked up on first use and kept.
/// A failed lookup is retried on the next job.
pub struct Engine {
    config: EngineConfig,
    compiler: OnceLock<UnitCompiler>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            compiler: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn compiler(&self) -> Result<&UnitCompiler> {
        if let Some(compiler) = self.compiler.get() {
            return Ok(compiler);
        }
        let toolchain = ToolchainManager::new()?;
        let references = match &self.config.host_api_dir {
            Some(dir) => HostReferences::discover(dir)?,
            None => HostReferences::none(),
        };
        tracing::info!(
            rustc = %toolchain.version(),
            libraries = references.libraries().len(),
            skipped = references.skipped().len(),
            "script compiler ready"
        );
        let compiler = UnitCompiler::new(self.config.clone(), toolchain, references);
        Ok(self.compiler.get_or_init(|| compiler))
    }

    /// Run `files` against `bindings`. `entry` overrides the configured
    /// entry name. Never fails; every outcome is a result for the client.
    pub fn compile_and_run(
        &self,
        files: &[ScriptFile],
        entry: Option<&str>,
        bindings: ScriptBindings,
    ) -> ExecutionResult {
        let combiner = Combiner::new(entry.unwrap_or(&self.config.entry_name));
        let unit = match combiner.combine(files) {
            Ok(unit) => unit,
            Err(err @ CombineError::Syntax { .. }) => {
                return ExecutionResult::compilation_failed(vec![err.diagnostic()]);
            }
            Err(err) => return ExecutionResult::rejected(err.to_string()),
        };

        let start = Instant::now();
        let result = self.build_and_run(&unit, bindings);
        tracing::info!(
            entry = unit.entry_file(),
            files = files.len(),
            success = result.success(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "script finished"
        );
        result.for_script(unit.entry_file())
    }

    fn build_and_run(&self, unit: &CombinedUnit, bindings: ScriptBindings) -> ExecutionResult {
        let compiler = match self.compiler() {
            Ok(compiler) => compiler,
            Err(e) => return ExecutionResult::rejected(format!("Script compiler unavailable: {}", e)),
        };
        let mut context = match IsolatedContext::create(&self.config.build_dir) {
            Ok(context) => context,
            Err(e) => return ExecutionResult::rejected(format!("Failed to prepare build directory: {}", e)),
        };

        let library = match compiler.compile(unit, context.dir(), &context.crate_name()) {
            Ok(path) => path,
            Err(diagnostics) => {
                return ExecutionResult::compilation_failed(
                    diagnostics.iter().map(Diagnostic::format_line).collect(),
                );
            }
        };
        if let Err(e) = context.load(&library) {
            return ExecutionResult::rejected(format!("Failed to load compiled script: {}", e));
        }

        let result = invoke(&context, unit, bindings);
        context.unload();
        result
    }
}

fn invoke(context: &IsolatedContext, unit: &CombinedUnit, bindings: ScriptBindings) -> ExecutionResult {
    let entry = match context.entry() {
        Ok(entry) => entry,
        Err(e) => return ExecutionResult::rejected(e.to_string()),
    };

    let ScriptBindings {
        document,
        ui_document,
        output,
    } = bindings;
    let session = HostSession::new(document.as_ref(), ui_document.as_deref(), output);
    let api = session.api();
    tracing::debug!(job = %context.id(), "calling script entry");
    // Safety: `api` and the session behind it outlive the call, and the
    // entry was resolved from an image built by `UnitCompiler`.
    let code = unsafe { entry(&api) };
    let (output, failure) = session.into_parts();

    match code {
        OK => ExecutionResult::completed(&output),
        ABSENT => {
            let failure = failure.unwrap_or_else(|| ScriptFailure {
                message: "script panicked".to_string(),
                trace: String::new(),
            });
            let trace = unit.line_map().rewrite(&failure.trace, UNIT_FILE);
            let mut details = vec![failure.message.clone()];
            details.extend(
                trace
                    .lines()
                    .map(str::trim_end)
                    .filter(|line| !line.trim().is_empty())
                    .map(str::to_string),
            );
            ExecutionResult::runtime_error(&failure.message, details)
        }
        NULL_API | ABI_MISMATCH => ExecutionResult::runtime_error(
            "script was built for a different host interface",
            Vec::new(),
        ),
        other => ExecutionResult::runtime_error(
            &format!("script entry returned unexpected status {}", other),
            Vec::new(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryDocument;
    use crate::result::ResultKind;

    fn engine(root: &std::path::Path) -> Engine {
        Engine::new(EngineConfig {
            build_dir: root.to_path_buf(),
            ..EngineConfig::default()
        })
    }

    fn bindings() -> ScriptBindings {
        ScriptBindings::new(Arc::new(MemoryDocument::new("Model")))
    }

    #[test]
    fn test_missing_entry_is_rejected_before_compiling() {
        let root = tempfile::tempdir().unwrap();
        let files = vec![ScriptFile::new("Helper.rs", "pub fn helper() {}")];
        let result = engine(root.path()).compile_and_run(&files, None, bindings());

        assert_eq!(result.kind(), ResultKind::Rejected);
        assert!(result.error_message().unwrap().contains("Main"));
        assert!(result.script_name().is_none());
    }

    #[test]
    fn test_syntax_error_is_a_compilation_failure() {
        let root = tempfile::tempdir().unwrap();
        let files = vec![ScriptFile::new("Main.rs", "let x = ;\n")];
        let result = engine(root.path()).compile_and_run(&files, None, bindings());

        assert_eq!(result.kind(), ResultKind::CompileError);
        assert_eq!(result.error_message(), Some("Compilation failed"));
        assert_eq!(result.error_details().len(), 1);
        assert!(result.error_details()[0].starts_with("Main.rs:1:"));
    }

    #[test]
    fn test_entry_override() {
        let root = tempfile::tempdir().unwrap();
        let files = vec![ScriptFile::new("Main.rs", "print(1);")];
        let result = engine(root.path()).compile_and_run(&files, Some("Start"), bindings());

        assert_eq!(result.kind(), ResultKind::Rejected);
        assert!(result.error_message().unwrap().contains("Start"));
    }
}
