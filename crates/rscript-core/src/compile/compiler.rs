//! Compiles combined units to dynamic libraries.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use crate::combine::CombinedUnit;

use super::diagnostics::{Diagnostic, DiagnosticMapper};
use super::references::HostReferences;
use super::toolchain::ToolchainManager;
use super::types::{EngineConfig, dylib_extension, dylib_prefix};

/// File name the combined source is written to inside a job directory.
pub const UNIT_FILE: &str = "combined.rs";

/// Runs rustc on combined units.
pub struct UnitCompiler {
    /// Compiler configuration
    config: EngineConfig,

    /// Toolchain manager
    toolchain: ToolchainManager,

    /// Host API libraries linked into every unit
    references: HostReferences,
}

impl UnitCompiler {
    pub fn new(config: EngineConfig, toolchain: ToolchainManager, references: HostReferences) -> Self {
        Self {
            config,
            toolchain,
            references,
        }
    }

    pub fn toolchain(&self) -> &ToolchainManager {
        &self.toolchain
    }

    /// Compile `unit` into `out_dir` as crate `crate_name`.
    ///
    /// Returns the library path, or the error-level diagnostics mapped to
    /// script locations.
    pub fn compile(
        &self,
        unit: &CombinedUnit,
        out_dir: &Path,
        crate_name: &str,
    ) -> std::result::Result<PathBuf, Vec<Diagnostic>> {
        fs::create_dir_all(out_dir).map_err(|e| {
            vec![Diagnostic::simple(format!("Failed to create build directory: {}", e))]
        })?;

        let src_file = out_dir.join(UNIT_FILE);
        fs::write(&src_file, unit.source())
            .map_err(|e| vec![Diagnostic::simple(format!("Failed to write source: {}", e))])?;

        let dylib_path = out_dir.join(format!(
            "{}{}.{}",
            dylib_prefix(),
            crate_name,
            dylib_extension()
        ));

        // Relative, so panic locations in the image read `combined.rs:N`.
        let mut cmd = Command::new(self.toolchain.rustc_path());
        cmd.arg(UNIT_FILE)
            .arg("--crate-type=cdylib")
            .arg("--edition=2021")
            .arg("--crate-name")
            .arg(crate_name)
            .arg("-o")
            .arg(&dylib_path)
            .arg("--error-format=json")
            .arg("--cap-lints=warn");

        if self.config.use_cranelift && self.toolchain.has_cranelift() {
            for flag in self.toolchain.cranelift_flags() {
                cmd.arg(&flag);
            }
        }

        cmd.arg(format!("-Copt-level={}", self.config.opt_level));

        if self.config.debug_info {
            cmd.arg("-g");
        }

        cmd.args(self.references.rustc_args());
        cmd.args(&self.config.extra_rustc_flags);
        cmd.current_dir(out_dir);

        let start = Instant::now();
        let output = cmd
            .output()
            .map_err(|e| vec![Diagnostic::simple(format!("Failed to run rustc: {}", e))])?;

        if output.status.success() {
            tracing::debug!(
                crate_name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "compiled script"
            );
            return Ok(dylib_path);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        let mapper = DiagnosticMapper::new(unit.line_map(), UNIT_FILE);
        let errors = mapper.errors(&stderr);

        if errors.is_empty() {
            // Linker failures and crashes do not come as JSON.
            Err(vec![Diagnostic::simple(stderr.trim().to_string())])
        } else {
            Err(errors)
        }
    }
}
