//! Compilation of combined units with `rustc`.
//!
//! Each job gets its own build directory and a uniquely named `cdylib`, so
//! a new image never collides with one that is still mapped.

mod compiler;
mod diagnostics;
mod references;
mod toolchain;
mod types;

pub use compiler::{UNIT_FILE, UnitCompiler};
pub use diagnostics::{Diagnostic, DiagnosticMapper, Level, Location};
pub use references::{HostLibrary, HostReferences, LibraryKind};
pub use toolchain::ToolchainManager;
pub use types::{
    BUILD_DIR_ENV, EngineConfig, HOST_API_DIR_ENV, dylib_extension, dylib_prefix,
};
