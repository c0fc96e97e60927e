//! Intermediate representation
//!
//! The parser's only product: a flat sequence of [`IrNode`]s, each carrying
//! a label, a command, or both. Syntactic sugar is already lowered away at
//! this level — expressions have become command nodes, block constructs have
//! become header/closer command nodes bracketing their flattened bodies.
//! Later passes (symbol tables, code generation) consume the sequence in
//! source order.
//!
//! All nodes and strings borrow from the [`Arena`](crate::arena::Arena) that
//! the parser was given.

use crate::source::SourceSpan;
use std::fmt;

/// A label definition, canonicalized to uppercase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Label<'a> {
    pub name: &'a str,
    pub span: SourceSpan,
}

/// The payload of one command argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArgKind<'a> {
    Integer(i32),
    Float(f32),
    Identifier(&'a str),
    String(&'a str),
    Filename(&'a str),
}

/// A typed command argument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Arg<'a> {
    pub kind: ArgKind<'a>,
    pub span: SourceSpan,
}

impl<'a> Arg<'a> {
    pub fn new(kind: ArgKind<'a>, span: SourceSpan) -> Self {
        Self { kind, span }
    }

    pub fn as_integer(&self) -> Option<i32> {
        match self.kind {
            ArgKind::Integer(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self.kind {
            ArgKind::Float(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_identifier(&self) -> Option<&'a str> {
        match self.kind {
            ArgKind::Identifier(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&'a str> {
        match self.kind {
            ArgKind::String(contents) => Some(contents),
            _ => None,
        }
    }

    pub fn as_filename(&self) -> Option<&'a str> {
        match self.kind {
            ArgKind::Filename(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Arg<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ArgKind::Integer(value) => write!(f, "{}", value),
            ArgKind::Float(value) => write!(f, "{:?}", value),
            ArgKind::Identifier(name) => write!(f, "{}", name),
            ArgKind::String(contents) => write!(f, "\"{}\"", contents),
            ArgKind::Filename(name) => write!(f, "{}", name),
        }
    }
}

/// A named command with its arguments
///
/// `not_flag` is set only on commands in conditional slots prefixed by `NOT`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Command<'a> {
    pub name: &'a str,
    pub args: &'a [Arg<'a>],
    pub not_flag: bool,
    pub span: SourceSpan,
}

impl fmt::Display for Command<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.not_flag {
            write!(f, "NOT ")?;
        }
        write!(f, "{}", self.name)?;
        for arg in self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// One element of the parse result: a label, a command, or both
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IrNode<'a> {
    pub label: Option<&'a Label<'a>>,
    pub command: Option<&'a Command<'a>>,
    pub span: SourceSpan,
}

impl fmt::Display for IrNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.label, self.command) {
            (Some(label), Some(command)) => write!(f, "{}: {}", label.name, command),
            (Some(label), None) => write!(f, "{}:", label.name),
            (None, Some(command)) => write!(f, "{}", command),
            (None, None) => Ok(()),
        }
    }
}

/// The ordered node sequence produced for one statement
///
/// One node for a simple line, several for lowered expressions, the whole
/// flattened construct for blocks. Empty only for blank lines and end of
/// input.
#[derive(Debug, Default)]
pub struct NodeList<'a> {
    nodes: Vec<&'a IrNode<'a>>,
}

impl<'a> NodeList<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: &'a IrNode<'a>) {
        self.nodes.push(node);
    }

    /// Splice another sequence onto the end of this one
    pub fn extend(&mut self, other: NodeList<'a>) {
        self.nodes.extend(other.nodes);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&'a IrNode<'a>> {
        self.nodes.get(index).copied()
    }

    pub fn nodes(&self) -> &[&'a IrNode<'a>] {
        &self.nodes
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &'a IrNode<'a>> + '_ {
        self.nodes.iter().copied()
    }

    /// Whole-sequence span, when non-empty
    pub fn span(&self) -> Option<SourceSpan> {
        let first = self.nodes.first()?.span;
        let last = self.nodes.last()?.span;
        Some(first.join(last))
    }
}

impl<'a> From<Vec<&'a IrNode<'a>>> for NodeList<'a> {
    fn from(nodes: Vec<&'a IrNode<'a>>) -> Self {
        Self { nodes }
    }
}

impl<'a> IntoIterator for &NodeList<'a> {
    type Item = &'a IrNode<'a>;
    type IntoIter = std::vec::IntoIter<&'a IrNode<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.clone().into_iter()
    }
}
