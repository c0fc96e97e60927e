//! Source files and locations
//!
//! A [`SourceFile`] owns the text of one compilation unit. Everything the
//! front-end produces points back into it through a [`SourceSpan`], a plain
//! `[begin, end)` byte range; the file turns an offset back into a
//! [`LineCol`] pair when a diagnostic needs rendering. The file is read-only
//! after construction, so the preprocessor, the scanner and the diagnostic
//! renderer can share it freely.

use std::fs;
use std::io;
use std::path::Path;

/// Byte-offset range `[begin, end)` into a source file
///
/// Carried by every token, IR node and diagnostic. A span holds no reference
/// to the file; text is looked up through [`SourceFile::slice`] on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceSpan {
    pub begin: usize,
    pub end: usize,
}

impl SourceSpan {
    pub fn new(begin: usize, end: usize) -> Self {
        debug_assert!(begin <= end);
        Self { begin, end }
    }

    /// Empty span at a single offset
    pub fn point(offset: usize) -> Self {
        Self {
            begin: offset,
            end: offset,
        }
    }

    /// Smallest span covering both inputs, e.g. a label plus its command
    pub fn join(self, other: SourceSpan) -> SourceSpan {
        SourceSpan {
            begin: self.begin.min(other.begin),
            end: self.end.max(other.end),
        }
    }
}

/// Line and column of an offset, both 1-indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

impl LineCol {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// The text of one compilation unit
#[derive(Debug)]
pub struct SourceFile {
    name: String,
    text: String,
    /// Byte offset of the first character of each line
    line_starts: Vec<usize>,
}

impl SourceFile {
    /// Create a source file from a name and its contents
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            name: name.into(),
            text,
            line_starts,
        }
    }

    /// Read a source file from disk
    pub fn load(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let text = String::from_utf8_lossy(&bytes).into_owned();
        Ok(Self::new(path.display().to_string(), text))
    }

    /// The file name used in diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The full source text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Total size in bytes
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Get the text covered by a span
    pub fn slice(&self, span: SourceSpan) -> &str {
        &self.text[span.begin..span.end]
    }

    /// Map a byte offset to its line and column
    pub fn locate(&self, offset: usize) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        LineCol::new(line as u32 + 1, (offset - self.line_starts[line]) as u32 + 1)
    }

    /// The text of a 1-indexed line, without its terminator
    pub fn line_text(&self, line: u32) -> &str {
        let i = (line as usize).saturating_sub(1);
        let start = self.line_starts.get(i).copied().unwrap_or(self.text.len());
        let end = self
            .line_starts
            .get(i + 1)
            .copied()
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end_matches(['\n', '\r'])
    }
}
