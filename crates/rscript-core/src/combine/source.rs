//! Byte-level access to source text through `proc_macro2` line/column spans.

use std::ops::Range;

use proc_macro2::{LineColumn, Span};

/// Source text with a line index.
///
/// `proc_macro2` reports 1-based lines and 0-based columns counted in chars;
/// this converts them to byte offsets into the original text.
pub(crate) struct SourceText<'a> {
    text: &'a str,
    line_starts: Vec<usize>,
}

impl<'a> SourceText<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(text.match_indices('\n').map(|(i, _)| i + 1));
        Self { text, line_starts }
    }

    pub fn text(&self) -> &'a str {
        self.text
    }

    fn line_bounds(&self, line: usize) -> Range<usize> {
        let index = line.saturating_sub(1).min(self.line_starts.len() - 1);
        let start = self.line_starts[index];
        let end = self
            .line_starts
            .get(index + 1)
            .copied()
            .unwrap_or(self.text.len());
        start..end
    }

    pub fn offset(&self, at: LineColumn) -> usize {
        let bounds = self.line_bounds(at.line);
        let line = &self.text[bounds.clone()];
        let within = line
            .char_indices()
            .nth(at.column)
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        bounds.start + within
    }

    pub fn range(&self, span: Span) -> Range<usize> {
        let start = self.offset(span.start());
        let end = self.offset(span.end()).max(start);
        start..end
    }

    /// Text of `span`, starting at the beginning of its first line when only
    /// whitespace precedes it there. Keeps columns of the copy aligned with
    /// the original.
    pub fn declaration_text(&self, span: Span) -> &'a str {
        let range = self.range(span);
        let line_start = self.line_bounds(span.start().line).start;
        let start = if self.text[line_start..range.start].trim().is_empty() {
            line_start
        } else {
            range.start
        };
        &self.text[start..range.end]
    }

    /// Copy of the text with every char in `ranges` replaced by a space.
    /// Line breaks survive, so line numbers are unchanged.
    pub fn blank_out(&self, ranges: &[Range<usize>]) -> String {
        let mut ranges = ranges.to_vec();
        ranges.sort_by_key(|r| r.start);

        let mut out = String::with_capacity(self.text.len());
        let mut cursor = 0;
        for range in ranges {
            if range.start < cursor {
                continue;
            }
            out.push_str(&self.text[cursor..range.start]);
            out.extend(self.text[range.clone()].chars().map(|c| match c {
                '\n' | '\r' => c,
                _ => ' ',
            }));
            cursor = range.end;
        }
        out.push_str(&self.text[cursor..]);
        out
    }
}
