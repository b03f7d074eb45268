//! Common types for the compilation pipeline.

use std::path::PathBuf;

use crate::script::DEFAULT_ENTRY;

/// Environment variable naming the build root.
pub const BUILD_DIR_ENV: &str = "RSCRIPT_BUILD_DIR";

/// Environment variable naming the host API directory.
pub const HOST_API_DIR_ENV: &str = "RSCRIPT_HOST_API_DIR";

/// Configuration for compiling and running scripts.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root under which per-job build directories are created
    pub build_dir: PathBuf,

    /// Directory holding the host API libraries scripts link against
    pub host_api_dir: Option<PathBuf>,

    /// Name of the entry file when a request does not name one
    pub entry_name: String,

    /// Use Cranelift backend (fast compilation, needs nightly)
    pub use_cranelift: bool,

    /// Emit debug info
    pub debug_info: bool,

    /// Optimization level (0-3)
    pub opt_level: u8,

    /// Additional rustc flags
    pub extra_rustc_flags: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            build_dir: std::env::temp_dir().join("rscript").join("build"),
            host_api_dir: None,
            entry_name: DEFAULT_ENTRY.to_string(),
            use_cranelift: false,
            debug_info: true,
            opt_level: 0,
            extra_rustc_flags: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Create config for fast development builds.
    pub fn development() -> Self {
        Self::default()
    }

    /// Create config for optimized builds.
    pub fn production() -> Self {
        Self {
            debug_info: false,
            opt_level: 3,
            ..Default::default()
        }
    }

    /// Development config with `RSCRIPT_BUILD_DIR` and
    /// `RSCRIPT_HOST_API_DIR` applied.
    pub fn from_env() -> Self {
        let mut config = Self::development();
        if let Some(dir) = env_path(BUILD_DIR_ENV) {
            config.build_dir = dir;
        }
        config.host_api_dir = env_path(HOST_API_DIR_ENV);
        config
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var_os(name)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Platform-specific dynamic library extension.
pub fn dylib_extension() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        "dll"
    }
    #[cfg(target_os = "macos")]
    {
        "dylib"
    }
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        "so"
    }
}

/// Platform-specific dynamic library prefix.
pub fn dylib_prefix() -> &'static str {
    #[cfg(target_os = "windows")]
    {
        ""
    }
    #[cfg(not(target_os = "windows"))]
    {
        "lib"
    }
}
