//! Terminal output for results and errors.

use std::io::{self, IsTerminal, Write};

use rscript_core::{ExecutionResult, ResultKind};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const YELLOW: &str = "\x1b[33m";
pub const RED: &str = "\x1b[31m";

/// Whether stdout is a terminal that understands color codes.
pub fn use_color() -> bool {
    io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// A streamed line, printed while the script is still running.
pub fn print_streamed(line: &str) {
    let mut err = io::stderr().lock();
    let _ = writeln!(err, "{}", line);
}

/// Print the final result to stdout.
pub fn print_result(result: &ExecutionResult, color: bool) {
    let mut out = io::stdout().lock();
    let _ = writeln!(out, "{}", format_result(result, color));
    let _ = out.flush();
}

/// Text of the final result, colored when `color` is set.
pub fn format_result(result: &ExecutionResult, color: bool) -> String {
    let text = result.render();
    if !color || result.success() {
        return text;
    }
    let accent = match result.kind() {
        ResultKind::Busy | ResultKind::Timeout => YELLOW,
        _ => RED,
    };
    let mut lines = text.lines();
    let mut out = String::new();
    if let Some(headline) = lines.next() {
        out.push_str(&format!("{}{}{}{}", BOLD, accent, headline, RESET));
    }
    for detail in lines {
        out.push_str(&format!("\n{}{}{}", DIM, detail, RESET));
    }
    out
}

/// Print a local failure with an optional hint to stderr.
pub fn print_error(message: &str, hint: Option<&str>) {
    let mut err = io::stderr().lock();
    let _ = writeln!(err, "[ERROR] {}", message);
    if let Some(hint) = hint {
        let _ = writeln!(err, "  hint: {}", hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_failure_matches_render() {
        let result = ExecutionResult::runtime_error("boom", vec!["at Main.rs:3".to_string()]);
        assert_eq!(format_result(&result, false), result.render());
    }

    #[test]
    fn test_colored_failure_keeps_text() {
        let result = ExecutionResult::busy();
        let colored = format_result(&result, true);
        assert!(colored.starts_with(BOLD));
        assert!(colored.contains(YELLOW));
        assert!(colored.contains("Another script is already running"));
    }

    #[test]
    fn test_success_is_never_colored() {
        let result = ExecutionResult::completed(&["done".to_string()]);
        assert_eq!(format_result(&result, true), "done");
    }
}
