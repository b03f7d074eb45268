//! Discovery of the host API libraries scripts are compiled against.
//!
//! Only files whose header identifies them as a Rust library archive or a
//! loadable image are used. Anything else with a library extension is
//! skipped with a warning instead of failing the compile.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

const AR_MAGIC: &[u8] = b"!<arch>\n";
const ELF_MAGIC: &[u8] = b"\x7fELF";
const PE_MAGIC: &[u8] = b"MZ";
const MACHO_MAGICS: &[[u8; 4]] = &[
    [0xfe, 0xed, 0xfa, 0xce],
    [0xfe, 0xed, 0xfa, 0xcf],
    [0xce, 0xfa, 0xed, 0xfe],
    [0xcf, 0xfa, 0xed, 0xfe],
    [0xca, 0xfe, 0xba, 0xbe],
];

/// How a library is handed to rustc.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryKind {
    /// `.rlib`, passed with `--extern`.
    Rust,
    /// Shared library, made visible through `-L native=`.
    Native,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLibrary {
    /// Crate name scripts use, e.g. `host_api` for `libhost_api-1f2e.rlib`.
    pub crate_name: String,
    pub path: PathBuf,
    pub kind: LibraryKind,
}

/// The host API libraries found in one directory.
#[derive(Debug, Clone, Default)]
pub struct HostReferences {
    dir: Option<PathBuf>,
    libraries: Vec<HostLibrary>,
    skipped: Vec<PathBuf>,
}

impl HostReferences {
    /// No host libraries; scripts see only std and the prelude.
    pub fn none() -> Self {
        Self::default()
    }

    /// Scan `dir`. A configured directory that does not exist is an error.
    pub fn discover(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Toolchain(format!(
                "host API directory not found: {}",
                dir.display()
            )));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut references = Self {
            dir: Some(dir.to_path_buf()),
            ..Self::default()
        };
        for path in paths {
            let Some(kind) = kind_for_extension(&path) else {
                continue;
            };
            let crate_name = crate_name_for(&path);
            match (has_valid_header(&path, kind), crate_name) {
                (true, Some(crate_name)) => references.libraries.push(HostLibrary {
                    crate_name,
                    path,
                    kind,
                }),
                _ => {
                    tracing::warn!(path = %path.display(), "skipping invalid host library");
                    references.skipped.push(path);
                }
            }
        }

        tracing::debug!(
            dir = %dir.display(),
            libraries = references.libraries.len(),
            skipped = references.skipped.len(),
            "discovered host API libraries"
        );
        Ok(references)
    }

    pub fn libraries(&self) -> &[HostLibrary] {
        &self.libraries
    }

    pub fn skipped(&self) -> &[PathBuf] {
        &self.skipped
    }

    /// Arguments that make the libraries visible to rustc.
    pub fn rustc_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        let Some(dir) = &self.dir else {
            return args;
        };

        if self.libraries.iter().any(|l| l.kind == LibraryKind::Rust) {
            args.push("-L".to_string());
            args.push(format!("dependency={}", dir.display()));
        }
        for library in self.libraries.iter().filter(|l| l.kind == LibraryKind::Rust) {
            args.push("--extern".to_string());
            args.push(format!("{}={}", library.crate_name, library.path.display()));
        }
        if self.libraries.iter().any(|l| l.kind == LibraryKind::Native) {
            args.push("-L".to_string());
            args.push(format!("native={}", dir.display()));
            #[cfg(any(target_os = "linux", target_os = "macos"))]
            args.push(format!("-Clink-arg=-Wl,-rpath,{}", dir.display()));
        }
        args
    }
}

fn kind_for_extension(path: &Path) -> Option<LibraryKind> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "rlib" => Some(LibraryKind::Rust),
        "so" | "dylib" | "dll" => Some(LibraryKind::Native),
        _ => None,
    }
}

fn has_valid_header(path: &Path, kind: LibraryKind) -> bool {
    let mut header = [0u8; 8];
    let read = File::open(path).and_then(|mut file| file.read(&mut header));
    let Ok(len) = read else {
        return false;
    };
    let header = &header[..len];
    match kind {
        LibraryKind::Rust => header.starts_with(AR_MAGIC),
        LibraryKind::Native => {
            header.starts_with(ELF_MAGIC)
                || header.starts_with(PE_MAGIC)
                || MACHO_MAGICS.iter().any(|magic| header.starts_with(magic))
        }
    }
}

/// `libhost_api-1f2e3d.rlib` -> `host_api`.
fn crate_name_for(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let stem = stem.strip_prefix("lib").unwrap_or(stem);
    let name = stem.split('-').next()?.replace('.', "_");
    let valid = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    valid.then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_discovery_filters_by_header() {
        let dir = TempDir::new().unwrap();
        write(&dir, "libhost_api-1f2e3d.rlib", b"!<arch>\nrest");
        write(&dir, "libgeometry.so", b"\x7fELF\x02\x01");
        write(&dir, "libbroken.rlib", b"garbage!");
        write(&dir, "README.txt", b"docs");

        let refs = HostReferences::discover(dir.path()).unwrap();
        let names: Vec<_> = refs
            .libraries()
            .iter()
            .map(|l| (l.crate_name.as_str(), l.kind))
            .collect();
        assert_eq!(
            names,
            vec![("geometry", LibraryKind::Native), ("host_api", LibraryKind::Rust)]
        );
        assert_eq!(refs.skipped().len(), 1);
        assert!(refs.skipped()[0].ends_with("libbroken.rlib"));
    }

    #[test]
    fn test_rustc_args() {
        let dir = TempDir::new().unwrap();
        let rlib = write(&dir, "libhost_api.rlib", b"!<arch>\n");

        let args = HostReferences::discover(dir.path()).unwrap().rustc_args();
        assert_eq!(args[0], "-L");
        assert_eq!(args[1], format!("dependency={}", dir.path().display()));
        assert_eq!(args[2], "--extern");
        assert_eq!(args[3], format!("host_api={}", rlib.display()));
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(HostReferences::discover(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_none_has_no_args() {
        assert!(HostReferences::none().rustc_args().is_empty());
    }

    #[test]
    fn test_crate_names() {
        assert_eq!(crate_name_for(Path::new("libfoo_bar-abc.rlib")).as_deref(), Some("foo_bar"));
        assert_eq!(crate_name_for(Path::new("HostApi.dll")).as_deref(), Some("HostApi"));
        assert_eq!(crate_name_for(Path::new("lib9bad.so")), None);
    }
}
