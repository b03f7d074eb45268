//! Script files as they travel from the editor to the host.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default name of the entry file (without extension).
pub const DEFAULT_ENTRY: &str = "Main";

/// Extension of script source files.
pub const SCRIPT_EXTENSION: &str = "rs";

/// One source file of a submission.
///
/// Identity is the file name, unique within one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptFile {
    /// File name including extension, e.g. `Main.rs`.
    #[serde(alias = "FileName")]
    pub name: String,
    /// Full source text.
    #[serde(alias = "Content")]
    pub content: String,
}

impl ScriptFile {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }

    /// File name without its extension.
    pub fn stem(&self) -> &str {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&self.name)
    }

    /// Whether this file is the entry file for `entry`.
    ///
    /// The comparison ignores ASCII case and an optional extension, so
    /// `main.rs`, `Main` and `MAIN.RS` all match `Main`.
    pub fn is_entry(&self, entry: &str) -> bool {
        let entry = Path::new(entry)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(entry);
        self.stem().eq_ignore_ascii_case(entry)
    }

    /// Whether the file has nothing but whitespace.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }

    /// Read a single file from disk.
    pub fn read(path: &Path) -> io::Result<Self> {
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("not a file path: {}", path.display()),
                )
            })?
            .to_string();
        let content = fs::read_to_string(path)?;
        Ok(Self { name, content })
    }

    /// Read every `*.rs` file directly inside `dir`, sorted by name.
    pub fn read_dir(dir: &Path) -> io::Result<Vec<Self>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let is_script = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(SCRIPT_EXTENSION));
            if is_script {
                files.push(Self::read(&path)?);
            }
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}
