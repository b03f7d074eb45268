//! Merging a script folder into one compilation unit.
//!
//! The entry file holds top-level statements; every other file contributes
//! declarations. A declaration is copied into the unit when its name is
//! mentioned by the entry file or by another copied declaration.

mod emit;
mod parse;
mod refs;
mod source;

use std::collections::{BTreeMap, BTreeSet};

use rustc_hash::FxHashSet;
use thiserror::Error;

pub use emit::{LineMap, SourceLocation};
pub use parse::DeclKind;

use crate::script::{DEFAULT_ENTRY, ScriptFile};
use emit::UnitWriter;
use parse::{Declaration, ParsedModule};

/// Host-side script API compiled into every unit.
pub const SCRIPT_PRELUDE: &str = include_str!("../../assets/script_prelude.rs");

/// Symbol exported by every compiled unit.
pub const ENTRY_SYMBOL: &str = "rscript_entry";

/// Imports every unit starts with. Globs, so user imports of the same names
/// shadow them instead of clashing.
const HEADER_IMPORTS: &[&str] = &[
    "use std::collections::*;",
    "use crate::__rscript::prelude::*;",
];

const LINT_ALLOWS: &str = "#![allow(dead_code, unused_imports, unused_macros, unused_mut, unused_variables)]";

/// Errors raised while combining.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CombineError {
    /// No file matches the entry name.
    #[error("entry file '{entry}' not found among {available} submitted file(s)")]
    MissingEntry { entry: String, available: usize },

    /// Two files match the entry name, e.g. `Main.rs` and `main.rs`.
    #[error("both {first} and {second} match entry '{entry}'")]
    AmbiguousEntry {
        entry: String,
        first: String,
        second: String,
    },

    /// Two non-entry files declare the same referenced name.
    #[error("'{name}' is declared in both {first} and {second}")]
    DuplicateDeclaration {
        name: String,
        first: String,
        second: String,
    },

    /// A file failed to parse.
    #[error("{file}:{line}:{column}: {message}")]
    Syntax {
        file: String,
        line: usize,
        column: usize,
        message: String,
    },
}

impl CombineError {
    /// Compiler-style diagnostic line for this error.
    pub fn diagnostic(&self) -> String {
        match self {
            CombineError::Syntax {
                file,
                line,
                column,
                message,
            } => format!("{}:{}:{}: error: {}", file, line, column, message),
            other => format!("error: {}", other),
        }
    }
}

/// A declaration copied into the unit, for reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedItem {
    pub file: String,
    pub kind: DeclKind,
    pub name: String,
    pub line: usize,
}

/// What the combiner did, written next to `--emit` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CombineReport {
    pub entry: String,
    /// Names that resolved to at least one declaration, sorted.
    pub referenced: Vec<String>,
    pub included: Vec<IncludedItem>,
    pub imports: Vec<String>,
}

impl CombineReport {
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Entry: {}\n", self.entry));
        out.push_str(&format!("Referenced: {}\n", self.referenced.join(", ")));
        out.push_str("Included:\n");
        for item in &self.included {
            out.push_str(&format!(
                "  {}:{}  {} {}\n",
                item.file,
                item.line,
                item.kind.label(),
                item.name
            ));
        }
        out.push_str("Imports:\n");
        for import in &self.imports {
            out.push_str(&format!("  {}\n", import));
        }
        out
    }
}

/// The synthesized compilation unit.
#[derive(Debug, Clone)]
pub struct CombinedUnit {
    source: String,
    line_map: LineMap,
    report: CombineReport,
}

impl CombinedUnit {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line_map(&self) -> &LineMap {
        &self.line_map
    }

    pub fn report(&self) -> &CombineReport {
        &self.report
    }

    /// Name of the entry file this unit was built from.
    pub fn entry_file(&self) -> &str {
        &self.report.entry
    }
}

/// Merges script files around a named entry file.
#[derive(Debug, Clone)]
pub struct Combiner {
    entry: String,
}

impl Default for Combiner {
    fn default() -> Self {
        Self::new(DEFAULT_ENTRY)
    }
}

impl Combiner {
    pub fn new(entry: impl Into<String>) -> Self {
        Self {
            entry: entry.into(),
        }
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// The file whose stem matches the entry name.
    pub fn find_entry<'a>(&self, files: &'a [ScriptFile]) -> Result<&'a ScriptFile, CombineError> {
        let mut matches = files.iter().filter(|f| f.is_entry(&self.entry));
        let first = matches.next().ok_or_else(|| CombineError::MissingEntry {
            entry: self.entry.clone(),
            available: files.len(),
        })?;
        if let Some(second) = matches.next() {
            return Err(CombineError::AmbiguousEntry {
                entry: self.entry.clone(),
                first: first.name.clone(),
                second: second.name.clone(),
            });
        }
        Ok(first)
    }

    /// Build the unit. Output is byte-identical for identical input.
    pub fn combine(&self, files: &[ScriptFile]) -> Result<CombinedUnit, CombineError> {
        let entry_file = self.find_entry(files)?;
        let entry = parse::parse_entry(entry_file)?;

        let mut others: Vec<&ScriptFile> = files
            .iter()
            .filter(|f| !std::ptr::eq(*f, entry_file))
            .collect();
        others.sort_by(|a, b| a.name.cmp(&b.name));
        let modules = others
            .into_iter()
            .map(parse::parse_module)
            .collect::<Result<Vec<_>, _>>()?;

        let resolution = resolve(&entry.idents, &entry.declarations, &modules)?;

        let mut imports: BTreeMap<&str, (&str, usize)> = BTreeMap::new();
        for import in &entry.imports {
            imports
                .entry(import.text.as_str())
                .or_insert((entry_file.name.as_str(), import.line));
        }
        for (index, module) in modules.iter().enumerate() {
            if !resolution.included.iter().any(|(file, _)| *file == index) {
                continue;
            }
            for import in &module.imports {
                imports
                    .entry(import.text.as_str())
                    .or_insert((module.file.as_str(), import.line));
            }
        }

        let mut writer = UnitWriter::new();
        writer.line("// Generated by rscript. Do not edit.");
        writer.line(&format!("// Entry: {}", entry_file.name));
        writer.line(LINT_ALLOWS);
        writer.blank();
        for import in HEADER_IMPORTS {
            writer.line(import);
        }
        for (text, (file, line)) in &imports {
            writer.copied(text, file, *line);
        }
        writer.blank();

        writer.line("#[macro_use]");
        writer.line("mod __rscript {");
        writer.line(SCRIPT_PRELUDE);
        writer.line("}");
        writer.blank();

        // `macro_rules!` is only in scope after its definition, so every
        // included macro goes first.
        let mut included = Vec::new();
        for macros in [true, false] {
            let mut current_file = None;
            for &(file_index, decl_index) in &resolution.included {
                let module = &modules[file_index];
                let decl = &module.declarations[decl_index];
                if (decl.kind == DeclKind::Macro) != macros {
                    continue;
                }
                if current_file != Some(file_index) {
                    writer.line(&format!("// {}", module.file));
                    current_file = Some(file_index);
                }
                writer.copied(&decl.text, &module.file, decl.line);
                writer.blank();
                included.push(IncludedItem {
                    file: module.file.clone(),
                    kind: decl.kind,
                    name: decl.display_name(),
                    line: decl.line,
                });
            }

            let mut entry_decls = entry
                .declarations
                .iter()
                .filter(|decl| (decl.kind == DeclKind::Macro) == macros)
                .peekable();
            if entry_decls.peek().is_some() {
                writer.line(&format!("// {}", entry_file.name));
            }
            for decl in entry_decls {
                writer.copied(&decl.text, &entry_file.name, decl.line);
                writer.blank();
                included.push(IncludedItem {
                    file: entry_file.name.clone(),
                    kind: decl.kind,
                    name: decl.display_name(),
                    line: decl.line,
                });
            }
        }

        writer.line("fn execute(script: &Script) {");
        writer.line("let doc = script.document();");
        writer.copied(&entry.body, &entry_file.name, 1);
        writer.line("}");
        writer.blank();
        writer.line("#[no_mangle]");
        writer.line(&format!(
            "pub unsafe extern \"C\" fn {}(api: *const __rscript::HostApi) -> i32 {{",
            ENTRY_SYMBOL
        ));
        writer.line("    __rscript::run(api, execute)");
        writer.line("}");

        let (source, line_map) = writer.finish();
        let report = CombineReport {
            entry: entry_file.name.clone(),
            referenced: resolution.resolved.into_iter().collect(),
            included,
            imports: imports.keys().map(|s| s.to_string()).collect(),
        };
        tracing::debug!(
            entry = %report.entry,
            files = files.len(),
            declarations = report.included.len(),
            imports = report.imports.len(),
            "combined script"
        );

        Ok(CombinedUnit {
            source,
            line_map,
            report,
        })
    }
}

struct Resolution {
    /// `(module index, declaration index)` in file-name then source order.
    included: BTreeSet<(usize, usize)>,
    resolved: BTreeSet<String>,
}

/// Transitive closure of declarations reachable from the entry identifiers.
fn resolve(
    entry_idents: &[String],
    entry_declarations: &[Declaration],
    modules: &[ParsedModule],
) -> Result<Resolution, CombineError> {
    let entry_names: FxHashSet<&str> = entry_declarations
        .iter()
        .filter_map(|d| d.name.as_deref())
        .collect();

    let mut named: BTreeMap<&str, Vec<(usize, usize)>> = BTreeMap::new();
    let mut impls: BTreeMap<&str, Vec<(usize, usize)>> = BTreeMap::new();
    for (file_index, module) in modules.iter().enumerate() {
        for (decl_index, decl) in module.declarations.iter().enumerate() {
            let key = (file_index, decl_index);
            match (&decl.name, &decl.owner) {
                (Some(name), _) => named.entry(name.as_str()).or_default().push(key),
                (None, Some(owner)) => impls.entry(owner.as_str()).or_default().push(key),
                (None, None) => {}
            }
        }
    }

    let mut referenced: FxHashSet<&str> = entry_idents.iter().map(String::as_str).collect();
    // Reverse order so names are processed alphabetically.
    let mut pending: Vec<&str> = entry_idents.iter().rev().map(String::as_str).collect();
    let mut included = BTreeSet::new();
    let mut resolved = BTreeSet::new();

    while let Some(name) = pending.pop() {
        let mut hits: Vec<(usize, usize)> = Vec::new();
        if !entry_names.contains(name) {
            if let Some(decls) = named.get(name) {
                let first_file = decls[0].0;
                if let Some(other) = decls.iter().find(|(file, _)| *file != first_file) {
                    return Err(CombineError::DuplicateDeclaration {
                        name: name.to_string(),
                        first: modules[first_file].file.clone(),
                        second: modules[other.0].file.clone(),
                    });
                }
                hits.extend(decls);
            }
        }
        if let Some(decls) = impls.get(name) {
            hits.extend(decls);
        }

        for key in hits {
            resolved.insert(name.to_string());
            if !included.insert(key) {
                continue;
            }
            let decl = &modules[key.0].declarations[key.1];
            for ident in decl.idents.iter().rev() {
                if referenced.insert(ident.as_str()) {
                    pending.push(ident.as_str());
                }
            }
        }
    }

    Ok(Resolution { included, resolved })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, &str)]) -> Vec<ScriptFile> {
        pairs
            .iter()
            .map(|(name, content)| ScriptFile::new(*name, *content))
            .collect()
    }

    #[test]
    fn test_missing_entry() {
        let err = Combiner::default()
            .combine(&files(&[("Foo.rs", "struct Foo;")]))
            .unwrap_err();
        assert_eq!(
            err,
            CombineError::MissingEntry {
                entry: "Main".to_string(),
                available: 1
            }
        );
    }

    #[test]
    fn test_ambiguous_entry() {
        let err = Combiner::default()
            .combine(&files(&[("Main.rs", ""), ("main.rs", "")]))
            .unwrap_err();
        assert!(matches!(err, CombineError::AmbiguousEntry { .. }));
    }

    #[test]
    fn test_header_and_entry_symbol() {
        let unit = Combiner::default()
            .combine(&files(&[("Main.rs", "print(\"hi\");")]))
            .unwrap();
        let source = unit.source();
        assert_eq!(source.matches(ENTRY_SYMBOL).count(), 1);
        assert!(source.contains("mod __rscript {"));
        assert!(source.contains("fn execute(script: &Script) {"));
        assert!(source.contains("print(\"hi\");"));
    }

    #[test]
    fn test_unreferenced_files_are_left_out() {
        let unit = Combiner::default()
            .combine(&files(&[
                ("Main.rs", "let n = 1;"),
                ("Unused.rs", "use std::fmt;\nstruct Unused;"),
            ]))
            .unwrap();
        assert!(!unit.source().contains("struct Unused"));
        assert!(!unit.source().contains("use std::fmt;"));
        assert!(unit.report().included.is_empty());
    }

    #[test]
    fn test_syntax_error_in_support_file() {
        let err = Combiner::default()
            .combine(&files(&[("Main.rs", "let n = 1;"), ("Bad.rs", "struct {")]))
            .unwrap_err();
        match &err {
            CombineError::Syntax { file, line, .. } => {
                assert_eq!(file, "Bad.rs");
                assert_eq!(*line, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.diagnostic().starts_with("Bad.rs:1:"));
    }

    #[test]
    fn test_report_render() {
        let unit = Combiner::default()
            .combine(&files(&[
                ("Main.rs", "let a = Area::new(2.0);"),
                ("Area.rs", "pub struct Area(f64);\nimpl Area { pub fn new(v: f64) -> Self { Area(v) } }"),
            ]))
            .unwrap();
        let text = unit.report().render();
        assert!(text.contains("Entry: Main.rs"));
        assert!(text.contains("Area.rs:1  struct Area"));
        assert!(text.contains("Area.rs:2  impl Area"));
    }
}
