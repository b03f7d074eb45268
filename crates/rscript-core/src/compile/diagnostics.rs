//! Parsing rustc JSON diagnostics and mapping them back to script files.

use serde::Deserialize;

use crate::combine::LineMap;

/// File name reported for lines the combiner generated itself.
pub const GENERATED_FILE: &str = "<generated>";

/// A compiler diagnostic with its location in the submitted files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Error message
    pub message: String,

    /// Error code (e.g., "E0308")
    pub code: Option<String>,

    /// Severity level
    pub level: Level,

    /// Primary source location
    pub location: Option<Location>,

    /// Rendered error message (for display)
    pub rendered: Option<String>,
}

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Warning,
    Note,
    Help,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Error => "error",
            Level::Warning => "warning",
            Level::Note => "note",
            Level::Help => "help",
        }
    }
}

/// A location in one of the submitted files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: String,
    /// Line number (1-indexed)
    pub line: usize,
    /// Column number (1-indexed)
    pub column: usize,
}

#[derive(Debug, Deserialize)]
struct RustcDiagnostic {
    message: String,
    code: Option<RustcCode>,
    level: String,
    spans: Vec<RustcSpan>,
    rendered: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RustcCode {
    code: String,
}

#[derive(Debug, Deserialize)]
struct RustcSpan {
    file_name: String,
    line_start: usize,
    column_start: usize,
    is_primary: bool,
}

impl Diagnostic {
    /// A diagnostic without location, for failures outside rustc's output.
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            level: Level::Error,
            location: None,
            rendered: None,
        }
    }

    /// One-line form: `Main.rs:3:9: error[E0425]: cannot find value ...`.
    pub fn format_line(&self) -> String {
        let mut out = String::new();
        if let Some(loc) = &self.location {
            out.push_str(&format!("{}:{}:{}: ", loc.file, loc.line, loc.column));
        }
        out.push_str(self.level.as_str());
        if let Some(code) = &self.code {
            out.push_str(&format!("[{}]", code));
        }
        out.push_str(": ");
        out.push_str(&self.message);
        out
    }
}

/// Maps rustc diagnostics on the combined unit to script locations.
pub struct DiagnosticMapper<'a> {
    line_map: &'a LineMap,
    unit_file: &'a str,
}

impl<'a> DiagnosticMapper<'a> {
    pub fn new(line_map: &'a LineMap, unit_file: &'a str) -> Self {
        Self {
            line_map,
            unit_file,
        }
    }

    /// Parse rustc `--error-format=json` output, in compiler order.
    pub fn parse_rustc_output(&self, json_output: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        for line in json_output.lines() {
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<RustcDiagnostic>(line) {
                Ok(diagnostic) => {
                    if let Some(mapped) = self.map_diagnostic(&diagnostic) {
                        diagnostics.push(mapped);
                    }
                }
                Err(e) => {
                    let preview: String = line.chars().take(100).collect();
                    tracing::debug!("Failed to parse rustc JSON: {} (line: {})", e, preview);
                }
            }
        }

        diagnostics
    }

    /// Only the error-level diagnostics, minus rustc's closing summary.
    pub fn errors(&self, json_output: &str) -> Vec<Diagnostic> {
        self.parse_rustc_output(json_output)
            .into_iter()
            .filter(|d| d.level == Level::Error && !d.message.starts_with("aborting due to"))
            .collect()
    }

    fn map_diagnostic(&self, diagnostic: &RustcDiagnostic) -> Option<Diagnostic> {
        let level = match diagnostic.level.as_str() {
            "error" | "error: internal compiler error" => Level::Error,
            "warning" => Level::Warning,
            "note" => Level::Note,
            "help" => Level::Help,
            _ => return None,
        };

        let location = diagnostic
            .spans
            .iter()
            .find(|s| s.is_primary)
            .map(|span| self.map_location(span));

        Some(Diagnostic {
            message: diagnostic.message.clone(),
            code: diagnostic.code.as_ref().map(|c| c.code.clone()),
            level,
            location,
            rendered: diagnostic.rendered.clone(),
        })
    }

    fn map_location(&self, span: &RustcSpan) -> Location {
        let in_unit = std::path::Path::new(&span.file_name)
            .file_name()
            .is_some_and(|name| name == self.unit_file);
        if !in_unit {
            return Location {
                file: span.file_name.clone(),
                line: span.line_start,
                column: span.column_start,
            };
        }
        match self.line_map.lookup(span.line_start) {
            Some(source) => Location {
                file: source.file.to_string(),
                line: source.line,
                column: span.column_start,
            },
            None => Location {
                file: GENERATED_FILE.to_string(),
                line: span.line_start,
                column: span.column_start,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combine::Combiner;
    use crate::script::ScriptFile;

    fn unit_map() -> (LineMap, usize) {
        let unit = Combiner::default()
            .combine(&[ScriptFile::new("Main.rs", "let a = 1;\nlet b = missing;\n")])
            .unwrap();
        let line = unit
            .source()
            .lines()
            .position(|l| l == "let b = missing;")
            .unwrap()
            + 1;
        (unit.line_map().clone(), line)
    }

    fn error_json(line: usize) -> String {
        format!(
            r#"{{"message":"cannot find value `missing` in this scope","code":{{"code":"E0425","explanation":null}},"level":"error","spans":[{{"file_name":"/tmp/job/combined.rs","byte_start":0,"byte_end":1,"line_start":{line},"line_end":{line},"column_start":9,"column_end":16,"is_primary":true,"text":[],"label":"not found in this scope","suggested_replacement":null,"suggestion_applicability":null,"expansion":null}}],"children":[],"rendered":"error[E0425]: cannot find value `missing` in this scope"}}"#
        )
    }

    #[test]
    fn test_errors_map_to_script_lines() {
        let (map, line) = unit_map();
        let mut output = error_json(line);
        output.push('\n');
        output.push_str(r#"{"message":"unused variable: `a`","code":null,"level":"warning","spans":[],"children":[],"rendered":"warning"}"#);
        output.push('\n');
        output.push_str(r#"{"message":"aborting due to 1 previous error","code":null,"level":"error","spans":[],"children":[],"rendered":"error: aborting due to 1 previous error"}"#);
        output.push('\n');
        output.push_str(r#"{"message":"For more information about this error, try `rustc --explain E0425`.","code":null,"level":"failure-note","spans":[],"children":[],"rendered":""}"#);

        let mapper = DiagnosticMapper::new(&map, "combined.rs");
        assert_eq!(mapper.parse_rustc_output(&output).len(), 3);

        let errors = mapper.errors(&output);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].format_line(),
            "Main.rs:2:9: error[E0425]: cannot find value `missing` in this scope"
        );
    }

    #[test]
    fn test_generated_lines_are_marked() {
        let (map, _) = unit_map();
        let mapper = DiagnosticMapper::new(&map, "combined.rs");
        let errors = mapper.errors(&error_json(1));
        let location = errors[0].location.as_ref().unwrap();
        assert_eq!(location.file, GENERATED_FILE);
        assert_eq!(location.line, 1);
    }

    #[test]
    fn test_non_json_lines_are_ignored() {
        let map = LineMap::default();
        let mapper = DiagnosticMapper::new(&map, "combined.rs");
        assert!(mapper.parse_rustc_output("error: linker `cc` not found\n").is_empty());
    }

    #[test]
    fn test_simple_format() {
        assert_eq!(Diagnostic::simple("boom").format_line(), "error: boom");
    }
}
