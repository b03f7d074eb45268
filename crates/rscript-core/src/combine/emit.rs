//! Writing the combined unit while recording where each line came from.

/// A location in one of the submitted files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    pub file: &'a str,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    generated: usize,
    len: usize,
    file: String,
    original: usize,
}

/// Maps lines of the combined unit back to the submitted files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMap {
    segments: Vec<Segment>,
}

impl LineMap {
    /// Where generated line `line` (1-based) came from, if it was copied
    /// from a submitted file.
    pub fn lookup(&self, line: usize) -> Option<SourceLocation<'_>> {
        let index = self
            .segments
            .partition_point(|segment| segment.generated + segment.len <= line);
        let segment = self.segments.get(index)?;
        if line < segment.generated {
            return None;
        }
        Some(SourceLocation {
            file: &segment.file,
            line: segment.original + (line - segment.generated),
        })
    }

    /// Rewrite `name:line:col` references to the combined file inside
    /// free text (backtraces) into script locations.
    pub fn rewrite(&self, text: &str, unit_file: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(pos) = rest.find(unit_file) {
            let (before, after) = rest.split_at(pos);
            out.push_str(before);
            let tail = &after[unit_file.len()..];
            let digits: &str = tail
                .strip_prefix(':')
                .map(|t| {
                    let end = t.find(|c: char| !c.is_ascii_digit()).unwrap_or(t.len());
                    &t[..end]
                })
                .unwrap_or("");
            match digits.parse::<usize>().ok().and_then(|line| self.lookup(line)) {
                Some(location) => {
                    out.push_str(&format!("{}:{}", location.file, location.line));
                    rest = &tail[1 + digits.len()..];
                }
                None => {
                    out.push_str(unit_file);
                    rest = tail;
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Accumulates generated source line by line.
pub(crate) struct UnitWriter {
    text: String,
    next_line: usize,
    map: LineMap,
}

impl UnitWriter {
    pub fn new() -> Self {
        Self {
            text: String::new(),
            next_line: 1,
            map: LineMap::default(),
        }
    }

    fn push(&mut self, text: &str) -> usize {
        let text = text.strip_suffix('\n').unwrap_or(text);
        let lines = text.split('\n').count();
        self.text.push_str(text);
        self.text.push('\n');
        self.next_line += lines;
        lines
    }

    /// Generated text with no source origin.
    pub fn line(&mut self, text: &str) {
        self.push(text);
    }

    pub fn blank(&mut self) {
        self.push("");
    }

    /// Text copied from `file`, starting at `line` there.
    pub fn copied(&mut self, text: &str, file: &str, line: usize) {
        let generated = self.next_line;
        let len = self.push(text);
        self.map.segments.push(Segment {
            generated,
            len,
            file: file.to_string(),
            original: line,
        });
    }

    pub fn finish(self) -> (String, LineMap) {
        (self.text, self.map)
    }
}
