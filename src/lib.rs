//! SCM Compiler Front-End
//!
//! `scmc` is the front-end of a compiler for the mission-scripting language
//! used by the classic GTA games. It turns `.sc` source text into a flat
//! intermediate representation of labels, commands and typed arguments, with
//! the language's syntactic sugar (assignment operators, increments,
//! ABS shortcuts, IF/WHILE/REPEAT blocks and brace scopes) lowered into the
//! command forms later passes consume.
//!
//! # Architecture
//!
//! ```text
//! Source Code (.sc)
//!       │
//!       ▼
//! ┌──────────────┐
//! │ Preprocessor │  → logical lines
//! └──────────────┘
//!       │
//!       ▼
//! ┌──────────────┐
//! │   Scanner    │  → tokens
//! └──────────────┘
//!       │
//!       ▼
//! ┌──────────────┐
//! │    Parser    │  → IR node sequences (arena-owned)
//! └──────────────┘
//! ```
//!
//! The pipeline is pull-based: the parser requests one statement's worth of
//! tokens at a time, and diagnostics flow synchronously into a
//! [`DiagnosticSink`](diag::DiagnosticSink). Semantic checking, symbol
//! tables and SCM bytecode emission live in later stages.

pub mod arena;
pub mod diag;
pub mod ir;
pub mod parser;
pub mod preproc;
pub mod scanner;
pub mod source;

// Re-exports for convenience
pub use arena::Arena;
pub use parser::{ParseFailure, Parser};
pub use preproc::Preprocessor;
pub use scanner::Scanner;
pub use source::{SourceFile, SourceSpan};

/// Compiler version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension for mission script source files
pub const FILE_EXTENSION: &str = "sc";
