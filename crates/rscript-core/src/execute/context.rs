//! Per-job arena for compiled code.
//!
//! Every job gets its own build directory and a library file named after the
//! job, so no two jobs ever load the same path and a crate can be redefined
//! freely between runs. Dropping the context closes the library and removes
//! the directory.

use std::fs;
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};
use uuid::Uuid;

use crate::combine::ENTRY_SYMBOL;
use crate::error::{Error, Result};

use super::abi::EntryFn;

pub struct IsolatedContext {
    id: Uuid,
    dir: PathBuf,
    library: Option<Library>,
}

impl IsolatedContext {
    /// Create a fresh job directory under `build_root`.
    pub fn create(build_root: &Path) -> Result<Self> {
        let id = Uuid::new_v4();
        let dir = std::path::absolute(build_root)?.join(format!("job-{}", id.simple()));
        fs::create_dir_all(&dir)?;
        tracing::debug!(dir = %dir.display(), "created job directory");
        Ok(Self {
            id,
            dir,
            library: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Crate name for this job's unit, unique per job.
    pub fn crate_name(&self) -> String {
        format!("rscript_job_{}", self.id.simple())
    }

    /// Load the compiled image. Replaces anything loaded before.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        self.unload();
        // Safety: the image was just built from a unit whose only
        // initialisation code is the prelude.
        let library = unsafe { Library::new(path) }?;
        self.library = Some(library);
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.library.is_some()
    }

    /// Resolve `rscript_entry` in the loaded image.
    pub fn entry(&self) -> Result<Symbol<'_, EntryFn>> {
        let library = self
            .library
            .as_ref()
            .ok_or_else(|| Error::Execution("no library loaded".to_string()))?;
        // Safety: every combined unit exports the entry with this signature.
        unsafe { library.get::<EntryFn>(ENTRY_SYMBOL.as_bytes()) }.map_err(|e| {
            Error::Execution(format!("Failed to get symbol {}: {}", ENTRY_SYMBOL, e))
        })
    }

    /// Close the library, keeping the directory.
    pub fn unload(&mut self) {
        if let Some(library) = self.library.take() {
            if let Err(e) = library.close() {
                tracing::warn!(job = %self.id, error = %e, "failed to close script library");
            }
        }
    }
}

impl Drop for IsolatedContext {
    fn drop(&mut self) {
        self.unload();
        if let Err(e) = fs::remove_dir_all(&self.dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %self.dir.display(), error = %e, "failed to remove job directory");
            }
        }
    }
}
