//! Preprocessor
//!
//! Presents a [`SourceFile`] as a stream of logical lines: comments removed,
//! `\r\n` folded, leading and trailing blanks trimmed. Block comments read as
//! a single space, and a physical newline inside one still terminates the
//! logical line, so line numbering downstream stays faithful. Comment
//! introducers inside string literals are inert.
//!
//! Every retained byte remembers its original file offset, so the scanner can
//! attach exact source spans to tokens even after elision.

use crate::source::{SourceFile, SourceSpan};
use std::ops::Range;
use thiserror::Error;

/// Preprocessing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PreprocessError {
    #[error("unterminated block comment")]
    UnterminatedComment { span: SourceSpan },
}

impl PreprocessError {
    pub fn span(&self) -> SourceSpan {
        match self {
            PreprocessError::UnterminatedComment { span } => *span,
        }
    }
}

/// One logical line
#[derive(Debug, Clone)]
pub struct Line {
    text: String,
    /// File offset of each byte in `text`
    offsets: Vec<usize>,
    /// File offset of the physical line start, for empty lines
    start: usize,
}

impl Line {
    /// The assembled line text
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Source-file span of the whole logical line
    pub fn span(&self) -> SourceSpan {
        match (self.offsets.first(), self.offsets.last()) {
            (Some(&first), Some(&last)) => SourceSpan::new(first, last + 1),
            _ => SourceSpan::point(self.start),
        }
    }

    /// Map a byte range of the line text to a source-file span
    pub fn span_of(&self, range: Range<usize>) -> SourceSpan {
        if range.start >= range.end || self.offsets.is_empty() {
            return self.end_span();
        }
        SourceSpan::new(self.offsets[range.start], self.offsets[range.end - 1] + 1)
    }

    /// Empty span just past the end of the line
    pub fn end_span(&self) -> SourceSpan {
        SourceSpan::point(self.span().end)
    }
}

/// Streams logical lines out of a source file
pub struct Preprocessor<'src> {
    source: &'src SourceFile,
    cursor: usize,
    /// Offset of an unclosed `/*`, carried across lines
    comment_open: Option<usize>,
}

impl<'src> Preprocessor<'src> {
    pub fn new(source: &'src SourceFile) -> Self {
        Self {
            source,
            cursor: 0,
            comment_open: None,
        }
    }

    pub fn source(&self) -> &'src SourceFile {
        self.source
    }

    /// Whether the stream is exhausted
    pub fn eof(&self) -> bool {
        self.cursor >= self.source.len() && self.comment_open.is_none()
    }

    /// Produce the next logical line, or `None` at end of input
    pub fn next_line(&mut self) -> Result<Option<Line>, PreprocessError> {
        let bytes = self.source.text().as_bytes();
        let len = bytes.len();

        if self.cursor >= len {
            if let Some(open) = self.comment_open.take() {
                return Err(PreprocessError::UnterminatedComment {
                    span: SourceSpan::new(open, open + 2),
                });
            }
            return Ok(None);
        }

        let line_start = self.cursor;
        let mut buf: Vec<u8> = Vec::new();
        let mut offsets: Vec<usize> = Vec::new();
        let mut in_quotes = false;
        let mut ended = false;

        while self.cursor < len && !ended {
            if self.comment_open.is_some() {
                match bytes[self.cursor] {
                    b'\n' => {
                        self.cursor += 1;
                        ended = true;
                    }
                    b'*' if self.cursor + 1 < len && bytes[self.cursor + 1] == b'/' => {
                        self.cursor += 2;
                        self.comment_open = None;
                    }
                    _ => self.cursor += 1,
                }
                continue;
            }

            match bytes[self.cursor] {
                b'\n' => {
                    self.cursor += 1;
                    ended = true;
                }
                b'\r' if self.cursor + 1 < len && bytes[self.cursor + 1] == b'\n' => {
                    self.cursor += 2;
                    ended = true;
                }
                b'"' => {
                    in_quotes = !in_quotes;
                    buf.push(b'"');
                    offsets.push(self.cursor);
                    self.cursor += 1;
                }
                b'/' if !in_quotes
                    && self.cursor + 1 < len
                    && bytes[self.cursor + 1] == b'/' =>
                {
                    while self.cursor < len && bytes[self.cursor] != b'\n' {
                        self.cursor += 1;
                    }
                }
                b'/' if !in_quotes
                    && self.cursor + 1 < len
                    && bytes[self.cursor + 1] == b'*' =>
                {
                    buf.push(b' ');
                    offsets.push(self.cursor);
                    self.comment_open = Some(self.cursor);
                    self.cursor += 2;
                }
                b => {
                    buf.push(b);
                    offsets.push(self.cursor);
                    self.cursor += 1;
                }
            }
        }

        if !ended && self.cursor >= len {
            if let Some(open) = self.comment_open.take() {
                return Err(PreprocessError::UnterminatedComment {
                    span: SourceSpan::new(open, open + 2),
                });
            }
        }

        // Trim blanks from both ends, keeping interior whitespace verbatim.
        let is_blank = |b: &u8| *b == b' ' || *b == b'\t';
        let head = buf.iter().take_while(|b| is_blank(b)).count();
        let tail = buf.iter().rev().take_while(|b| is_blank(b)).count();
        let kept = head..buf.len() - tail.min(buf.len() - head);
        offsets.drain(kept.end..);
        offsets.drain(..kept.start);
        let buf = buf[kept].to_vec();

        let text = String::from_utf8_lossy(&buf).into_owned();
        Ok(Some(Line {
            text,
            offsets,
            start: line_start,
        }))
    }
}
