//! Locating `rustc` and probing what it supports.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

/// The Rust compiler used to build scripts.
#[derive(Debug, Clone)]
pub struct ToolchainManager {
    /// Path to rustc
    rustc_path: PathBuf,

    /// Whether Cranelift is available
    cranelift_available: bool,

    /// Toolchain version string
    version: String,
}

impl ToolchainManager {
    /// Detect the toolchain: `$RUSTC` if set, otherwise `rustc` on `PATH`.
    pub fn new() -> Result<Self> {
        let rustc_path = Self::find_rustc()?;
        let version = Self::get_rustc_version(&rustc_path)?;
        let cranelift_available = Self::check_cranelift_available(&rustc_path);

        tracing::debug!(rustc = %rustc_path.display(), %version, cranelift_available, "detected toolchain");

        Ok(Self {
            rustc_path,
            cranelift_available,
            version,
        })
    }

    /// Check if Cranelift backend is available.
    pub fn has_cranelift(&self) -> bool {
        self.cranelift_available
    }

    /// Get the rustc path.
    pub fn rustc_path(&self) -> &Path {
        &self.rustc_path
    }

    /// Get the toolchain version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Get rustc flags for Cranelift compilation.
    pub fn cranelift_flags(&self) -> Vec<String> {
        if self.cranelift_available {
            vec!["-Zcodegen-backend=cranelift".to_string()]
        } else {
            Vec::new()
        }
    }

    fn find_rustc() -> Result<PathBuf> {
        if let Some(rustc) = std::env::var_os("RUSTC").filter(|v| !v.is_empty()) {
            return which::which(&rustc)
                .map_err(|_| Error::Toolchain(format!("RUSTC={} not found", rustc.to_string_lossy())));
        }
        which::which("rustc").map_err(|_| Error::Toolchain("rustc not found in PATH".to_string()))
    }

    fn get_rustc_version(rustc: &Path) -> Result<String> {
        let output = Command::new(rustc)
            .arg("--version")
            .output()
            .map_err(|e| Error::Toolchain(format!("Failed to run rustc: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Toolchain("Failed to get rustc version".to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn check_cranelift_available(rustc: &Path) -> bool {
        Command::new(rustc)
            .args(["-Zcodegen-backend=cranelift", "--print", "crate-name", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}
