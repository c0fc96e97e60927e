//! Scanner
//!
//! Turns one logical line at a time into tokens. The grammar is
//! line-terminated, so the scanner produces an [`Category::Eol`] token once
//! per line and only moves on when [`Scanner::advance_line`] is called.
//!
//! Tokenization is not context-free: a `-` glues onto a numeric lexeme only
//! when a digit or `.` follows it (`-432-10` is one lexeme, `1- -1` is
//! three), and filename arguments are scanned in a parser-directed mode
//! ([`Scanner::next_filename`]) where operator characters lose their meaning.
//! Word lexemes are canonicalized to ASCII uppercase; malformed numeric
//! lexemes fall back to `Word` and the parser decides whether the position
//! accepts them.

use crate::preproc::{Preprocessor, PreprocessError};
use crate::source::{SourceFile, SourceSpan};
use std::collections::VecDeque;
use std::fmt;
use thiserror::Error;

/// Scanner errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScanError {
    #[error("unterminated string literal")]
    UnterminatedString { span: SourceSpan },

    #[error("expected whitespace after string literal")]
    NoSeparator { span: SourceSpan },

    #[error("unterminated block comment")]
    UnterminatedComment { span: SourceSpan },
}

impl ScanError {
    pub fn span(&self) -> SourceSpan {
        match self {
            ScanError::UnterminatedString { span } => *span,
            ScanError::NoSeparator { span } => *span,
            ScanError::UnterminatedComment { span } => *span,
        }
    }
}

impl From<PreprocessError> for ScanError {
    fn from(err: PreprocessError) -> Self {
        match err {
            PreprocessError::UnterminatedComment { span } => {
                ScanError::UnterminatedComment { span }
            }
        }
    }
}

/// Lexical category of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Word,
    Integer,
    Float,
    String,

    Equal,
    EqualHash,
    PlusEqual,
    MinusEqual,
    StarEqual,
    SlashEqual,
    PlusEqualAt,
    MinusEqualAt,
    PlusPlus,
    MinusMinus,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Plus,
    Minus,
    Star,
    Slash,
    PlusAt,
    MinusAt,

    Eol,
}

impl Category {
    /// Whether this is one of the expression operators
    pub fn is_operator(self) -> bool {
        !matches!(
            self,
            Category::Word
                | Category::Integer
                | Category::Float
                | Category::String
                | Category::Eol
        )
    }

    /// The binary operators that may appear in `x = y OP z`
    pub fn is_binop(self) -> bool {
        matches!(
            self,
            Category::Plus
                | Category::Minus
                | Category::Star
                | Category::Slash
                | Category::PlusAt
                | Category::MinusAt
        )
    }

    /// The relational operators of condition slots, `=` excluded
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            Category::Less | Category::LessEqual | Category::Greater | Category::GreaterEqual
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Word => "word",
            Category::Integer => "integer literal",
            Category::Float => "float literal",
            Category::String => "string literal",
            Category::Equal => "=",
            Category::EqualHash => "=#",
            Category::PlusEqual => "+=",
            Category::MinusEqual => "-=",
            Category::StarEqual => "*=",
            Category::SlashEqual => "/=",
            Category::PlusEqualAt => "+=@",
            Category::MinusEqualAt => "-=@",
            Category::PlusPlus => "++",
            Category::MinusMinus => "--",
            Category::Less => "<",
            Category::LessEqual => "<=",
            Category::Greater => ">",
            Category::GreaterEqual => ">=",
            Category::Plus => "+",
            Category::Minus => "-",
            Category::Star => "*",
            Category::Slash => "/",
            Category::PlusAt => "+@",
            Category::MinusAt => "-@",
            Category::Eol => "end of line",
        };
        write!(f, "{}", s)
    }
}

/// A token with its canonical text and source span
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub category: Category,
    pub span: SourceSpan,
    /// Uppercased lexeme for words and numbers, raw contents for strings,
    /// the spelling for operators, empty for `Eol`
    pub text: String,
}

impl Token {
    pub fn new(category: Category, span: SourceSpan, text: impl Into<String>) -> Self {
        Self {
            category,
            span,
            text: text.into(),
        }
    }

    pub fn is_word(&self, word: &str) -> bool {
        self.category == Category::Word && self.text == word
    }
}

/// Tokenizes logical lines on demand
pub struct Scanner<'src> {
    preproc: Preprocessor<'src>,
    line: Option<crate::preproc::Line>,
    pos: usize,
    lookahead: VecDeque<Token>,
}

impl<'src> Scanner<'src> {
    pub fn new(preproc: Preprocessor<'src>) -> Self {
        Self {
            preproc,
            line: None,
            pos: 0,
            lookahead: VecDeque::new(),
        }
    }

    pub fn source(&self) -> &'src SourceFile {
        self.preproc.source()
    }

    /// True once every line has been consumed
    pub fn eof(&mut self) -> Result<bool, ScanError> {
        self.ensure_line()?;
        Ok(self.line.is_none())
    }

    /// Span of the current line, for anchoring line-level diagnostics
    pub fn line_span(&self) -> SourceSpan {
        match &self.line {
            Some(line) => line.span(),
            None => SourceSpan::point(self.source().len()),
        }
    }

    /// Consume and return the next token of the current line
    pub fn next_token(&mut self) -> Result<Token, ScanError> {
        if let Some(token) = self.lookahead.pop_front() {
            return Ok(token);
        }
        self.scan()
    }

    /// Peek the next token without consuming it
    pub fn peek(&mut self) -> Result<&Token, ScanError> {
        self.peek_nth(0)
    }

    /// Peek the nth token ahead (0 = next)
    pub fn peek_nth(&mut self, n: usize) -> Result<&Token, ScanError> {
        while self.lookahead.len() <= n {
            let token = self.scan()?;
            self.lookahead.push_back(token);
        }
        Ok(&self.lookahead[n])
    }

    /// Drop the rest of the current line and move to the next one
    pub fn advance_line(&mut self) {
        self.line = None;
        self.pos = 0;
        self.lookahead.clear();
    }

    /// Scan the next whitespace-delimited lexeme as a filename argument.
    ///
    /// Operator characters do not split the lexeme here, which is how names
    /// like `file-name.sc` stay whole. A leading `"` scans as an ordinary
    /// string literal so the caller can reject it with a precise message.
    pub fn next_filename(&mut self) -> Result<Token, ScanError> {
        debug_assert!(self.lookahead.is_empty(), "filename scan after lookahead");
        self.ensure_line()?;
        let line = match &self.line {
            Some(line) => line,
            None => return Ok(Token::new(Category::Eol, SourceSpan::point(self.source().len()), "")),
        };
        let bytes = line.text().as_bytes();
        let mut pos = self.pos;
        while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t') {
            pos += 1;
        }
        if pos >= bytes.len() {
            self.pos = pos;
            return Ok(Token::new(Category::Eol, line.end_span(), ""));
        }
        if bytes[pos] == b'"' {
            self.pos = pos;
            return self.scan();
        }
        let start = pos;
        while pos < bytes.len() && !matches!(bytes[pos], b' ' | b'\t' | b'"') {
            pos += 1;
        }
        let token = Token::new(
            Category::Word,
            line.span_of(start..pos),
            line.text()[start..pos].to_ascii_uppercase(),
        );
        self.pos = pos;
        Ok(token)
    }

    fn ensure_line(&mut self) -> Result<(), ScanError> {
        if self.line.is_none() {
            if let Some(line) = self.preproc.next_line()? {
                self.line = Some(line);
                self.pos = 0;
            }
        }
        Ok(())
    }

    fn scan(&mut self) -> Result<Token, ScanError> {
        self.ensure_line()?;
        let line = match &self.line {
            Some(line) => line,
            None => return Ok(Token::new(Category::Eol, SourceSpan::point(self.source().len()), "")),
        };
        let bytes = line.text().as_bytes();
        let mut pos = self.pos;

        while pos < bytes.len() && matches!(bytes[pos], b' ' | b'\t') {
            pos += 1;
        }
        if pos >= bytes.len() {
            self.pos = pos;
            return Ok(Token::new(Category::Eol, line.end_span(), ""));
        }

        let start = pos;
        let b = bytes[pos];

        // String literal; the byte after the closing quote must be a blank.
        if b == b'"' {
            let close = bytes[start + 1..].iter().position(|&c| c == b'"');
            let close = match close {
                Some(i) => start + 1 + i,
                None => {
                    self.pos = bytes.len();
                    return Err(ScanError::UnterminatedString {
                        span: line.span_of(start..bytes.len()),
                    });
                }
            };
            let after = close + 1;
            if after < bytes.len() && !matches!(bytes[after], b' ' | b'\t') {
                self.pos = bytes.len();
                return Err(ScanError::NoSeparator {
                    span: line.span_of(after..after + 1),
                });
            }
            let token = Token::new(
                Category::String,
                line.span_of(start..after),
                line.text()[start + 1..close].to_string(),
            );
            self.pos = after;
            return Ok(token);
        }

        // Operator, unless a `-` introduces a numeric lexeme.
        if is_operator_char(b) && !(b == b'-' && numeric_follows(bytes, pos + 1)) {
            let (len, category, spelling) = match_operator(&bytes[pos..]);
            let token = Token::new(category, line.span_of(pos..pos + len), spelling);
            self.pos = pos + len;
            return Ok(token);
        }

        // Word or numeric lexeme.
        let number_mode = b.is_ascii_digit() || b == b'.' || b == b'-';
        pos += 1;
        while pos < bytes.len() {
            let c = bytes[pos];
            if is_word_char(c) {
                pos += 1;
            } else if number_mode && c == b'-' && numeric_follows(bytes, pos + 1) {
                pos += 1;
            } else {
                break;
            }
        }
        let lexeme = &line.text()[start..pos];
        let category = if number_mode {
            if is_integer_lexeme(lexeme) {
                Category::Integer
            } else if is_float_lexeme(lexeme) {
                Category::Float
            } else {
                Category::Word
            }
        } else {
            Category::Word
        };
        let token = Token::new(category, line.span_of(start..pos), lexeme.to_ascii_uppercase());
        self.pos = pos;
        Ok(token)
    }
}

fn is_operator_char(b: u8) -> bool {
    matches!(b, b'+' | b'-' | b'*' | b'/' | b'=' | b'<' | b'>')
}

fn is_word_char(b: u8) -> bool {
    if b == b'"' || is_operator_char(b) {
        return false;
    }
    b.is_ascii_graphic() || b >= 0x80
}

fn numeric_follows(bytes: &[u8], i: usize) -> bool {
    i < bytes.len() && (bytes[i].is_ascii_digit() || bytes[i] == b'.')
}

fn match_operator(rest: &[u8]) -> (usize, Category, &'static str) {
    const OPERATORS: &[(&str, Category)] = &[
        ("+=@", Category::PlusEqualAt),
        ("-=@", Category::MinusEqualAt),
        ("+=", Category::PlusEqual),
        ("-=", Category::MinusEqual),
        ("*=", Category::StarEqual),
        ("/=", Category::SlashEqual),
        ("=#", Category::EqualHash),
        ("<=", Category::LessEqual),
        (">=", Category::GreaterEqual),
        ("++", Category::PlusPlus),
        ("--", Category::MinusMinus),
        ("+@", Category::PlusAt),
        ("-@", Category::MinusAt),
        ("=", Category::Equal),
        ("<", Category::Less),
        (">", Category::Greater),
        ("+", Category::Plus),
        ("-", Category::Minus),
        ("*", Category::Star),
        ("/", Category::Slash),
    ];
    for &(spelling, category) in OPERATORS {
        if rest.starts_with(spelling.as_bytes()) {
            return (spelling.len(), category, spelling);
        }
    }
    unreachable!("operator start byte with no operator match")
}

fn is_integer_lexeme(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Matches `D+ F`, `D+ '.' D*` and `'.' D+`, each optionally followed by an
/// `f`/`F` suffix or by a second `.` and digits. The extra fraction after a
/// second dot carries no value; [`float_value`] ignores it.
fn is_float_lexeme(s: &str) -> bool {
    let s = s.strip_prefix('-').unwrap_or(s).as_bytes();
    let mut i = 0;
    while i < s.len() && s[i].is_ascii_digit() {
        i += 1;
    }
    let int_digits = i;
    if i < s.len() && s[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < s.len() && s[i].is_ascii_digit() {
            i += 1;
        }
        if int_digits == 0 && i == frac_start {
            return false;
        }
    } else {
        return int_digits > 0
            && i < s.len()
            && matches!(s[i], b'f' | b'F')
            && i + 1 == s.len();
    }
    if i == s.len() {
        return true;
    }
    if matches!(s[i], b'f' | b'F') {
        return i + 1 == s.len();
    }
    if s[i] == b'.' {
        i += 1;
        while i < s.len() && s[i].is_ascii_digit() {
            i += 1;
        }
        if i == s.len() {
            return true;
        }
        if matches!(s[i], b'f' | b'F') {
            return i + 1 == s.len();
        }
    }
    false
}

/// Numeric value of a float lexeme: sign, integer part and first fraction
pub(crate) fn float_value(s: &str) -> f32 {
    let (neg, s) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let bytes = s.as_bytes();
    let mut i = 0;
    let mut repr = String::new();
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        repr.push(bytes[i] as char);
        i += 1;
    }
    if repr.is_empty() {
        repr.push('0');
    }
    repr.push('.');
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            repr.push(bytes[i] as char);
            i += 1;
        }
    }
    if repr.ends_with('.') {
        repr.push('0');
    }
    let value: f32 = repr.parse().unwrap_or(0.0);
    if neg {
        -value
    } else {
        value
    }
}
