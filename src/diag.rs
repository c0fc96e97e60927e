//! Diagnostics
//!
//! The front-end never prints on its own: every problem it finds is turned
//! into a [`Diagnostic`] and handed to a [`DiagnosticSink`]. The
//! [`ConsoleReporter`] renders `file:line:col: severity: message` with the
//! offending line and a caret; the [`CollectingSink`] buffers diagnostics for
//! tests and embedders. Sinks take `&self` so one sink can serve several
//! parsers; serialization across threads is the sink's own business.

use crate::source::{SourceFile, SourceSpan};
use std::cell::{Cell, RefCell};
use std::fmt;

/// How bad a diagnostic is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        write!(f, "{}", s)
    }
}

/// Which stage of the grammar a diagnostic belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagKind {
    /// Bad literal, unterminated string or comment, stray character
    Lexical,
    /// Token in a position the grammar forbids
    Token,
    /// Unbalanced or misplaced block constructs
    Structure,
    /// Bad AND/OR condition lists
    Condition,
    /// Invalid expression shapes and operand permutations
    Expression,
    /// Invariant violation; never caused by input
    Internal,
}

/// A single reported problem
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub kind: DiagKind,
    pub span: Option<SourceSpan>,
    pub message: String,
}

impl Diagnostic {
    pub fn error(kind: DiagKind, span: SourceSpan, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            kind,
            span: Some(span),
            message: message.into(),
        }
    }

    pub fn warning(kind: DiagKind, span: SourceSpan, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            kind,
            span: Some(span),
            message: message.into(),
        }
    }

    pub fn fatal(kind: DiagKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Fatal,
            kind,
            span: None,
            message: message.into(),
        }
    }
}

/// Receiver for diagnostics produced by the front-end
pub trait DiagnosticSink {
    fn report(&self, diag: Diagnostic);
}

/// Render a diagnostic against its source file
pub fn render(file: &SourceFile, diag: &Diagnostic) -> String {
    let mut out = String::new();
    match diag.span {
        Some(span) => {
            let pos = file.locate(span.begin);
            out.push_str(&format!(
                "{}:{}:{}: {}: {}",
                file.name(),
                pos.line,
                pos.column,
                diag.severity,
                diag.message
            ));
            let line = file.line_text(pos.line);
            if !line.is_empty() {
                out.push('\n');
                out.push_str(line);
                out.push('\n');
                // Tabs keep their width so the caret stays aligned.
                for c in line.chars().take(pos.column as usize - 1) {
                    out.push(if c == '\t' { '\t' } else { ' ' });
                }
                out.push('^');
            }
        }
        None => {
            out.push_str(&format!("{}: {}: {}", file.name(), diag.severity, diag.message));
        }
    }
    out
}

/// Prints diagnostics to stderr as they arrive and counts errors
pub struct ConsoleReporter<'src> {
    file: &'src SourceFile,
    errors: Cell<usize>,
    warnings: Cell<usize>,
}

impl<'src> ConsoleReporter<'src> {
    pub fn new(file: &'src SourceFile) -> Self {
        Self {
            file,
            errors: Cell::new(0),
            warnings: Cell::new(0),
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors.get()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings.get()
    }
}

impl DiagnosticSink for ConsoleReporter<'_> {
    fn report(&self, diag: Diagnostic) {
        match diag.severity {
            Severity::Warning => self.warnings.set(self.warnings.get() + 1),
            Severity::Error | Severity::Fatal => self.errors.set(self.errors.get() + 1),
        }
        eprintln!("{}", render(self.file, &diag));
    }
}

/// Buffers diagnostics instead of printing them
#[derive(Default)]
pub struct CollectingSink {
    diags: RefCell<Vec<Diagnostic>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_count(&self) -> usize {
        self.diags
            .borrow()
            .iter()
            .filter(|d| d.severity != Severity::Warning)
            .count()
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.diags.borrow_mut())
    }
}

impl DiagnosticSink for CollectingSink {
    fn report(&self, diag: Diagnostic) {
        self.diags.borrow_mut().push(diag);
    }
}
