//! Parser
//!
//! Recursive-descent statement parser over the scanner's token stream. Each
//! call to [`Parser::parse_statement`] yields the IR sequence for one source
//! construct: a single node for a plain command, two for a lowered compound
//! expression, the whole flattened body for a block construct. On failure the
//! diagnostic has already been reported to the sink and the scanner is left
//! on the offending line so the caller can resynchronize with
//! [`Parser::skip_current_line`].
//!
//! The grammar is context-sensitive at the line level: the same word can be
//! a label, a command name, or an expression operand depending on position,
//! so dispatch looks at the first two tokens of a line. Expression statements
//! win over block keywords (`WHILE = ENDWHILE` assigns to a variable named
//! `WHILE`), while the file-loading commands and mission directives are
//! matched before expression detection because their last argument needs the
//! scanner's filename mode.

use crate::arena::Arena;
use crate::diag::{DiagKind, Diagnostic, DiagnosticSink};
use crate::ir::{Arg, ArgKind, Command, IrNode, Label, NodeList};
use crate::scanner::{float_value, Category, ScanError, Scanner, Token};
use crate::source::{SourceFile, SourceSpan};
use thiserror::Error;

/// Failure signal of [`Parser::parse_statement`]
///
/// The diagnostic itself has already gone to the sink; this only tells the
/// caller how to proceed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseFailure {
    /// The statement is invalid; skip the line and keep parsing.
    #[error("invalid statement")]
    Statement,

    /// An internal invariant broke; abandon the file.
    #[error("parsing aborted")]
    Fatal,
}

pub type ParseResult<T> = Result<T, ParseFailure>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExprContext {
    /// Expression statement: `=` assigns, compound and ternary forms allowed
    Statement,
    /// Conditional slot: `=` compares, only relational forms allowed
    Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CondAxis {
    And,
    Or,
}

/// Words with structural meaning; rejected as condition commands
fn is_reserved_name(name: &str) -> bool {
    matches!(
        name,
        "NOT"
            | "AND"
            | "OR"
            | "IF"
            | "IFNOT"
            | "ELSE"
            | "ENDIF"
            | "WHILE"
            | "WHILENOT"
            | "ENDWHILE"
            | "REPEAT"
            | "ENDREPEAT"
            | "GOSUB_FILE"
            | "LAUNCH_MISSION"
            | "LOAD_AND_LAUNCH_MISSION"
            | "MISSION_START"
            | "MISSION_END"
            | "VAR_INT"
            | "VAR_FLOAT"
            | "LVAR_INT"
            | "LVAR_FLOAT"
            | "ABS"
            | "{"
            | "}"
    )
}

/// Directives consumed by the driver that owns the whole script file
fn is_directive_name(name: &str) -> bool {
    matches!(name, "MISSION_START" | "MISSION_END")
}

/// Commands whose last argument is a filename
fn is_file_command(name: &str) -> bool {
    matches!(name, "GOSUB_FILE" | "LAUNCH_MISSION" | "LOAD_AND_LAUNCH_MISSION")
}

/// Names that can never be the variable of an expression
fn is_expression_reserved(name: &str) -> bool {
    is_file_command(name) || is_directive_name(name)
}

/// Identifier arguments start with a letter or `$` and don't end with `:`
fn is_valid_identifier(name: &str) -> bool {
    matches!(name.as_bytes().first(), Some(b'A'..=b'Z') | Some(b'$')) && !name.ends_with(':')
}

/// Filenames end in `.SC` with at least one character in front
fn is_valid_filename(name: &str) -> bool {
    name.len() > 3 && name.ends_with(".SC")
}

/// The statement parser
pub struct Parser<'a, 'src, 'd> {
    scanner: Scanner<'src>,
    arena: &'a Arena,
    sink: &'d dyn DiagnosticSink,
    in_scope: bool,
}

impl<'a, 'src, 'd> Parser<'a, 'src, 'd> {
    pub fn new(scanner: Scanner<'src>, arena: &'a Arena, sink: &'d dyn DiagnosticSink) -> Self {
        Self {
            scanner,
            arena,
            sink,
            in_scope: false,
        }
    }

    pub fn source(&self) -> &'src SourceFile {
        self.scanner.source()
    }

    /// Whether the whole input has been consumed
    pub fn eof(&mut self) -> bool {
        match self.scanner.eof() {
            Ok(eof) => eof,
            Err(err) => {
                // The stream dies on a preprocessing error; report it once.
                self.report_scan_error(&err);
                true
            }
        }
    }

    /// Resynchronize after a failed statement
    pub fn skip_current_line(&mut self) {
        self.scanner.advance_line();
    }

    /// Parse the next statement into its IR sequence.
    ///
    /// Blank lines and end of input yield an empty sequence.
    pub fn parse_statement(&mut self) -> ParseResult<NodeList<'a>> {
        if self.at_eof()? {
            return Ok(NodeList::new());
        }
        let label = self.parse_label()?;
        self.parse_embedded_statement(label)
    }

    // ============ Statement dispatch ============

    fn parse_embedded_statement(
        &mut self,
        label: Option<&'a Label<'a>>,
    ) -> ParseResult<NodeList<'a>> {
        let first = self.peek(0)?;
        match first.category {
            Category::Eol => {
                self.next()?;
                self.scanner.advance_line();
                match label {
                    Some(label) => {
                        let node = self.arena.alloc(IrNode {
                            label: Some(label),
                            command: None,
                            span: label.span,
                        });
                        Ok(NodeList::from(vec![node]))
                    }
                    None => Ok(NodeList::new()),
                }
            }
            Category::String => Err(self.error(
                DiagKind::Token,
                first.span,
                "string literal cannot be used as a command name",
            )),
            Category::PlusPlus | Category::MinusMinus => {
                let commands = self.parse_expression(ExprContext::Statement, false)?;
                self.expect_line_end()?;
                Ok(self.lowered(label, commands))
            }
            Category::Word | Category::Integer | Category::Float => {
                let name = first.text.as_str();

                if name == "{" {
                    return self.parse_scope_block(label, first.span);
                }
                if name == "}" {
                    return Err(self.error(
                        DiagKind::Structure,
                        first.span,
                        "'}' without a matching '{'",
                    ));
                }
                if is_directive_name(name) {
                    return Err(self.error(
                        DiagKind::Token,
                        first.span,
                        format!("'{}' cannot be used here", name),
                    ));
                }
                if is_file_command(name) {
                    let command = self.parse_file_command()?;
                    self.expect_line_end()?;
                    return Ok(NodeList::from(vec![self.node_for(label, command)]));
                }

                // Expression statements win over keywords, so a line like
                // `WHILE = ENDWHILE` assigns to a variable named WHILE.
                if self.peek(1)?.category.is_operator() {
                    let commands = self.parse_expression(ExprContext::Statement, false)?;
                    self.expect_line_end()?;
                    return Ok(self.lowered(label, commands));
                }

                match name {
                    "IF" | "IFNOT" => self.parse_if_statement(label),
                    "WHILE" | "WHILENOT" => self.parse_while_statement(label),
                    "REPEAT" => self.parse_repeat_statement(label),
                    "ELSE" => Err(self.error(
                        DiagKind::Structure,
                        first.span,
                        "ELSE outside of an IF block",
                    )),
                    "ENDIF" => Err(self.error(
                        DiagKind::Structure,
                        first.span,
                        "ENDIF outside of an IF block",
                    )),
                    "ENDWHILE" => Err(self.error(
                        DiagKind::Structure,
                        first.span,
                        "ENDWHILE outside of a WHILE block",
                    )),
                    "ENDREPEAT" => Err(self.error(
                        DiagKind::Structure,
                        first.span,
                        "ENDREPEAT outside of a REPEAT block",
                    )),
                    "AND" | "OR" => Err(self.error(
                        DiagKind::Condition,
                        first.span,
                        format!("{} outside of a condition list", name),
                    )),
                    "NOT" => Err(self.error(
                        DiagKind::Condition,
                        first.span,
                        "NOT outside of a conditional slot",
                    )),
                    _ => {
                        let command = self.parse_command(false, false)?;
                        self.expect_line_end()?;
                        Ok(NodeList::from(vec![self.node_for(label, command)]))
                    }
                }
            }
            category => Err(self.error(
                DiagKind::Expression,
                first.span,
                format!("unexpected '{}' at the start of a statement", category),
            )),
        }
    }

    // ============ Labels ============

    fn parse_label(&mut self) -> ParseResult<Option<&'a Label<'a>>> {
        let candidate = {
            let token = self.peek(0)?;
            token.category == Category::Word && token.text.ends_with(':')
        };
        if !candidate {
            return Ok(None);
        }
        let token = self.next()?;
        let name = &token.text[..token.text.len() - 1];
        if !is_valid_identifier(name) {
            return Err(self.error(
                DiagKind::Token,
                token.span,
                format!("invalid label name '{}'", name),
            ));
        }
        let label = self.arena.alloc(Label {
            name: self.arena.alloc_str(name),
            span: token.span,
        });
        Ok(Some(label))
    }

    // ============ Commands ============

    fn parse_command(&mut self, if_line: bool, not_flag: bool) -> ParseResult<&'a Command<'a>> {
        let name_token = self.next()?;
        match name_token.category {
            Category::Word | Category::Integer | Category::Float => {}
            _ => {
                return Err(self.error(
                    DiagKind::Token,
                    name_token.span,
                    "expected a command name",
                ))
            }
        }

        let mut args: Vec<Arg<'a>> = Vec::new();
        let mut end = name_token.span;
        loop {
            let peeked = self.peek(0)?;
            if peeked.category == Category::Eol {
                break;
            }
            if if_line && peeked.is_word("GOTO") {
                break;
            }
            let token = self.next()?;
            end = token.span;
            args.push(self.argument(&token)?);
        }
        Ok(self.command(&name_token.text, args, not_flag, name_token.span.join(end)))
    }

    fn argument(&mut self, token: &Token) -> ParseResult<Arg<'a>> {
        match token.category {
            Category::Integer => Ok(Arg::new(
                ArgKind::Integer(self.integer_value(token)?),
                token.span,
            )),
            Category::Float => Ok(Arg::new(ArgKind::Float(float_value(&token.text)), token.span)),
            Category::String => Ok(Arg::new(
                ArgKind::String(self.arena.alloc_str(&token.text)),
                token.span,
            )),
            Category::Word => {
                if !is_valid_identifier(&token.text) {
                    return Err(self.invalid_word(token));
                }
                Ok(Arg::new(
                    ArgKind::Identifier(self.arena.alloc_str(&token.text)),
                    token.span,
                ))
            }
            _ => Err(self.error(
                DiagKind::Expression,
                token.span,
                format!("operator '{}' cannot appear in command arguments", token.category),
            )),
        }
    }

    /// A word that cannot be an identifier argument. Words that began like a
    /// number are malformed literals, not identifiers.
    fn invalid_word(&self, token: &Token) -> ParseFailure {
        if matches!(
            token.text.as_bytes().first(),
            Some(b'0'..=b'9') | Some(b'-') | Some(b'.')
        ) {
            self.error(
                DiagKind::Lexical,
                token.span,
                format!("invalid numeric literal '{}'", token.text),
            )
        } else {
            self.error(
                DiagKind::Token,
                token.span,
                format!("invalid identifier '{}'", token.text),
            )
        }
    }

    fn parse_file_command(&mut self) -> ParseResult<&'a Command<'a>> {
        let name_token = self.next()?;
        let mut args: Vec<Arg<'a>> = Vec::new();

        if name_token.text == "GOSUB_FILE" {
            let ident = self.next()?;
            if ident.category != Category::Word || !is_valid_identifier(&ident.text) {
                return Err(self.error(
                    DiagKind::Token,
                    ident.span,
                    "expected a label identifier",
                ));
            }
            args.push(Arg::new(
                ArgKind::Identifier(self.arena.alloc_str(&ident.text)),
                ident.span,
            ));
        }

        let file = self.next_filename()?;
        match file.category {
            Category::String => {
                return Err(self.error(
                    DiagKind::Token,
                    file.span,
                    "filename cannot be a string literal",
                ))
            }
            Category::Eol => {
                return Err(self.error(DiagKind::Token, file.span, "expected a filename"))
            }
            _ => {}
        }
        if !is_valid_filename(&file.text) {
            return Err(self.error(
                DiagKind::Token,
                file.span,
                format!("'{}' is not a filename ending in .SC", file.text),
            ));
        }
        args.push(Arg::new(
            ArgKind::Filename(self.arena.alloc_str(&file.text)),
            file.span,
        ));

        let span = name_token.span.join(file.span);
        Ok(self.command(&name_token.text, args, false, span))
    }

    // ============ Expressions ============

    fn parse_expression(
        &mut self,
        ctx: ExprContext,
        not_flag: bool,
    ) -> ParseResult<Vec<&'a Command<'a>>> {
        let first = self.peek(0)?;
        if matches!(first.category, Category::PlusPlus | Category::MinusMinus) {
            if ctx == ExprContext::Condition {
                return Err(self.error(
                    DiagKind::Expression,
                    first.span,
                    "increment is not allowed in a condition",
                ));
            }
            let op = self.next()?;
            let target_token = self.next()?;
            let target = self.expression_target(&target_token)?;
            let name = if op.category == Category::PlusPlus {
                "ADD_THING_TO_THING"
            } else {
                "SUB_THING_FROM_THING"
            };
            let one = Arg::new(ArgKind::Integer(1), op.span);
            let span = op.span.join(target_token.span);
            return Ok(vec![self.command(name, vec![target, one], false, span)]);
        }

        let lhs_token = self.next()?;
        let op = self.next()?;
        match op.category {
            Category::PlusPlus | Category::MinusMinus => {
                if ctx == ExprContext::Condition {
                    return Err(self.error(
                        DiagKind::Expression,
                        op.span,
                        "increment is not allowed in a condition",
                    ));
                }
                let target = self.expression_target(&lhs_token)?;
                let name = if op.category == Category::PlusPlus {
                    "ADD_THING_TO_THING"
                } else {
                    "SUB_THING_FROM_THING"
                };
                let one = Arg::new(ArgKind::Integer(1), op.span);
                let span = lhs_token.span.join(op.span);
                Ok(vec![self.command(name, vec![target, one], false, span)])
            }

            Category::Less | Category::LessEqual | Category::Greater | Category::GreaterEqual => {
                let lhs = self.operand_from(&lhs_token)?;
                let rhs_token = self.next()?;
                let rhs = self.operand_from(&rhs_token)?;
                // a < b and a <= b canonicalize to the greater-than forms
                // with the operands swapped.
                let name = match op.category {
                    Category::LessEqual | Category::GreaterEqual => {
                        "IS_THING_GREATER_OR_EQUAL_TO_THING"
                    }
                    _ => "IS_THING_GREATER_THAN_THING",
                };
                let (a, b) = match op.category {
                    Category::Less | Category::LessEqual => (rhs, lhs),
                    _ => (lhs, rhs),
                };
                let span = lhs_token.span.join(rhs_token.span);
                Ok(vec![self.command(name, vec![a, b], not_flag, span)])
            }

            Category::Equal if ctx == ExprContext::Condition => {
                let lhs = self.operand_from(&lhs_token)?;
                let rhs_token = self.next()?;
                let rhs = self.operand_from(&rhs_token)?;
                let span = lhs_token.span.join(rhs_token.span);
                Ok(vec![self.command(
                    "IS_THING_EQUAL_TO_THING",
                    vec![lhs, rhs],
                    not_flag,
                    span,
                )])
            }

            Category::Equal => {
                let target = self.expression_target(&lhs_token)?;

                if self.peek(0)?.is_word("ABS") {
                    self.next()?;
                    let operand_token = self.next()?;
                    let operand = self.operand_from(&operand_token)?;
                    let span = lhs_token.span.join(operand_token.span);
                    if same_identifier(&target, &operand) {
                        return Ok(vec![self.command("ABS", vec![target], false, span)]);
                    }
                    let set = self.command("SET", vec![target, operand], false, span);
                    let abs = self.command("ABS", vec![target], false, span);
                    return Ok(vec![set, abs]);
                }

                let rhs_token = self.next()?;
                let rhs = self.operand_from(&rhs_token)?;

                if self.peek(0)?.category.is_binop() {
                    let binop = self.next()?;
                    let rhs2_token = self.next()?;
                    let rhs2 = self.operand_from(&rhs2_token)?;
                    let name = match binop.category {
                        Category::Plus => "ADD_THING_TO_THING",
                        Category::Minus => "SUB_THING_FROM_THING",
                        Category::Star => "MULT_THING_BY_THING",
                        Category::Slash => "DIV_THING_BY_THING",
                        Category::PlusAt => "ADD_THING_TO_THING_TIMED",
                        _ => "SUB_THING_FROM_THING_TIMED",
                    };
                    let span = lhs_token.span.join(rhs2_token.span);
                    if same_identifier(&rhs, &target) {
                        // x = x OP z works in place.
                        return Ok(vec![self.command(name, vec![target, rhs2], false, span)]);
                    }
                    if same_identifier(&rhs2, &target) {
                        // x = y OP x only commutes for + and *.
                        if matches!(binop.category, Category::Plus | Category::Star) {
                            return Ok(vec![self.command(name, vec![target, rhs], false, span)]);
                        }
                        return Err(self.error(
                            DiagKind::Expression,
                            binop.span,
                            format!(
                                "'{}' cannot take its result variable as the right operand",
                                binop.category
                            ),
                        ));
                    }
                    let set = self.command(
                        "SET",
                        vec![target, rhs],
                        false,
                        lhs_token.span.join(rhs_token.span),
                    );
                    let op_cmd = self.command(name, vec![target, rhs2], false, span);
                    return Ok(vec![set, op_cmd]);
                }

                let span = lhs_token.span.join(rhs_token.span);
                let name = if same_identifier(&target, &rhs) { "CSET" } else { "SET" };
                Ok(vec![self.command(name, vec![target, rhs], false, span)])
            }

            Category::EqualHash
            | Category::PlusEqual
            | Category::MinusEqual
            | Category::StarEqual
            | Category::SlashEqual
            | Category::PlusEqualAt
            | Category::MinusEqualAt => {
                if ctx == ExprContext::Condition {
                    return Err(self.error(
                        DiagKind::Expression,
                        op.span,
                        "assignment is not allowed in a condition",
                    ));
                }
                let target = self.expression_target(&lhs_token)?;
                let rhs_token = self.next()?;
                let rhs = self.operand_from(&rhs_token)?;
                let name = match op.category {
                    Category::EqualHash => "CSET",
                    Category::PlusEqual => "ADD_THING_TO_THING",
                    Category::MinusEqual => "SUB_THING_FROM_THING",
                    Category::StarEqual => "MULT_THING_BY_THING",
                    Category::SlashEqual => "DIV_THING_BY_THING",
                    Category::PlusEqualAt => "ADD_THING_TO_THING_TIMED",
                    _ => "SUB_THING_FROM_THING_TIMED",
                };
                let span = lhs_token.span.join(rhs_token.span);
                Ok(vec![self.command(name, vec![target, rhs], false, span)])
            }

            Category::Plus
            | Category::Minus
            | Category::Star
            | Category::Slash
            | Category::PlusAt
            | Category::MinusAt => Err(self.error(
                DiagKind::Expression,
                op.span,
                "expression has no assignment target",
            )),

            _ => Err(self.error(
                DiagKind::Expression,
                op.span,
                format!("unexpected '{}' in expression", op.category),
            )),
        }
    }

    fn expression_target(&mut self, token: &Token) -> ParseResult<Arg<'a>> {
        if token.category != Category::Word || !is_valid_identifier(&token.text) {
            return Err(self.error(
                DiagKind::Expression,
                token.span,
                "expression target must be a variable",
            ));
        }
        if is_expression_reserved(&token.text) {
            return Err(self.error(
                DiagKind::Token,
                token.span,
                format!("'{}' cannot be used as a variable", token.text),
            ));
        }
        Ok(Arg::new(
            ArgKind::Identifier(self.arena.alloc_str(&token.text)),
            token.span,
        ))
    }

    fn operand_from(&mut self, token: &Token) -> ParseResult<Arg<'a>> {
        match token.category {
            Category::Word => {
                if !is_valid_identifier(&token.text) {
                    return Err(self.invalid_word(token));
                }
                Ok(Arg::new(
                    ArgKind::Identifier(self.arena.alloc_str(&token.text)),
                    token.span,
                ))
            }
            Category::Integer => Ok(Arg::new(
                ArgKind::Integer(self.integer_value(token)?),
                token.span,
            )),
            Category::Float => Ok(Arg::new(ArgKind::Float(float_value(&token.text)), token.span)),
            _ => Err(self.error(DiagKind::Expression, token.span, "expected an operand")),
        }
    }

    // ============ Conditions ============

    fn parse_condition_element(&mut self, if_line: bool) -> ParseResult<&'a Command<'a>> {
        let mut not_flag = false;
        if self.peek(0)?.is_word("NOT") {
            self.next()?;
            not_flag = true;
        }

        let first = self.peek(0)?;
        match first.category {
            Category::Eol => {
                Err(self.error(DiagKind::Condition, first.span, "expected a condition"))
            }
            Category::String => Err(self.error(
                DiagKind::Token,
                first.span,
                "string literal cannot be used as a condition",
            )),
            category if category.is_operator() => Err(self.error(
                DiagKind::Expression,
                first.span,
                format!("unexpected '{}' in a condition", category),
            )),
            _ => {
                if self.peek(1)?.category.is_operator() {
                    return self.single_condition_expression(not_flag);
                }
                if first.category == Category::Word && is_reserved_name(&first.text) {
                    return Err(self.error(
                        DiagKind::Condition,
                        first.span,
                        format!("'{}' cannot be used as a condition", first.text),
                    ));
                }
                self.parse_command(if_line, not_flag)
            }
        }
    }

    fn single_condition_expression(&mut self, not_flag: bool) -> ParseResult<&'a Command<'a>> {
        let span = self.scanner.line_span();
        let mut commands = self.parse_expression(ExprContext::Condition, not_flag)?;
        match (commands.pop(), commands.is_empty()) {
            (Some(command), true) => Ok(command),
            _ => Err(self.internal(span, "condition lowered to more than one command")),
        }
    }

    fn parse_condition_list(
        &mut self,
        first: &'a Command<'a>,
    ) -> ParseResult<(Vec<&'a Command<'a>>, i32)> {
        let mut conds = vec![first];
        let mut axis: Option<CondAxis> = None;
        loop {
            if self.at_eof()? {
                break;
            }
            let peeked = self.peek(0)?;
            let this_axis = if peeked.is_word("AND") {
                CondAxis::And
            } else if peeked.is_word("OR") {
                CondAxis::Or
            } else {
                break;
            };
            let keyword = self.next()?;
            match axis {
                None => axis = Some(this_axis),
                Some(previous) if previous != this_axis => {
                    return Err(self.error(
                        DiagKind::Condition,
                        keyword.span,
                        "cannot mix AND and OR in one condition list",
                    ))
                }
                Some(_) => {}
            }
            if self.peek(0)?.category == Category::Eol {
                return Err(self.error(
                    DiagKind::Condition,
                    keyword.span,
                    format!("expected a condition after {}", keyword.text),
                ));
            }
            let cond = self.parse_condition_element(false)?;
            self.expect_line_end()?;
            conds.push(cond);
            let over = match this_axis {
                CondAxis::And => conds.len() > 8,
                CondAxis::Or => conds.len() > 6,
            };
            if over {
                return Err(self.error(
                    DiagKind::Condition,
                    keyword.span,
                    format!(
                        "too many conditions in {} list",
                        if this_axis == CondAxis::And { "AND" } else { "OR" }
                    ),
                ));
            }
        }
        let count = match axis {
            None => 0,
            Some(CondAxis::And) => conds.len() as i32 - 1,
            Some(CondAxis::Or) => 20 + conds.len() as i32 - 1,
        };
        Ok((conds, count))
    }

    // ============ Blocks ============

    fn parse_if_statement(&mut self, label: Option<&'a Label<'a>>) -> ParseResult<NodeList<'a>> {
        let keyword = self.next()?;
        if self.peek(0)?.category == Category::Eol {
            return Err(self.error(
                DiagKind::Condition,
                keyword.span,
                format!("{} requires a condition", keyword.text),
            ));
        }
        let first_cond = self.parse_condition_element(true)?;

        // One-line form: IF cond GOTO label
        if self.peek(0)?.is_word("GOTO") {
            self.next()?;
            let target = self.next()?;
            if target.category != Category::Word || !is_valid_identifier(&target.text) {
                return Err(self.error(
                    DiagKind::Token,
                    target.span,
                    "expected a label after GOTO",
                ));
            }
            self.expect_line_end()?;
            let andor = self.command(
                "ANDOR",
                vec![Arg::new(ArgKind::Integer(0), keyword.span)],
                false,
                keyword.span,
            );
            let goto_name = if keyword.text == "IF" {
                "GOTO_IF_TRUE"
            } else {
                "GOTO_IF_FALSE"
            };
            let goto_cmd = self.command(
                goto_name,
                vec![Arg::new(
                    ArgKind::Identifier(self.arena.alloc_str(&target.text)),
                    target.span,
                )],
                false,
                target.span,
            );
            let mut list = NodeList::new();
            list.push(self.node_for(label, andor));
            list.push(self.node_for(None, first_cond));
            list.push(self.node_for(None, goto_cmd));
            return Ok(list);
        }

        self.expect_line_end()?;
        let (conds, count) = self.parse_condition_list(first_cond)?;
        let (body, closer, closer_kw) =
            self.parse_block_body(&["ELSE", "ENDIF"], "IF block without ENDIF")?;

        let header = self.command(
            &keyword.text,
            vec![Arg::new(ArgKind::Integer(count), keyword.span)],
            false,
            keyword.span,
        );
        let mut list = NodeList::new();
        list.push(self.node_for(label, header));
        for cond in conds {
            list.push(self.node_for(None, cond));
        }
        list.extend(body);
        list.push(closer);
        if closer_kw == "ELSE" {
            let (else_body, endif, _) =
                self.parse_block_body(&["ENDIF"], "IF block without ENDIF")?;
            list.extend(else_body);
            list.push(endif);
        }
        Ok(list)
    }

    fn parse_while_statement(&mut self, label: Option<&'a Label<'a>>) -> ParseResult<NodeList<'a>> {
        let keyword = self.next()?;
        if self.peek(0)?.category == Category::Eol {
            return Err(self.error(
                DiagKind::Condition,
                keyword.span,
                format!("{} requires a condition", keyword.text),
            ));
        }
        let first_cond = self.parse_condition_element(false)?;
        self.expect_line_end()?;
        let (conds, count) = self.parse_condition_list(first_cond)?;
        let (body, closer, _) =
            self.parse_block_body(&["ENDWHILE"], "WHILE block without ENDWHILE")?;

        let header = self.command(
            &keyword.text,
            vec![Arg::new(ArgKind::Integer(count), keyword.span)],
            false,
            keyword.span,
        );
        let mut list = NodeList::new();
        list.push(self.node_for(label, header));
        for cond in conds {
            list.push(self.node_for(None, cond));
        }
        list.extend(body);
        list.push(closer);
        Ok(list)
    }

    fn parse_repeat_statement(&mut self, label: Option<&'a Label<'a>>) -> ParseResult<NodeList<'a>> {
        let keyword = self.next()?;
        let count_token = self.next()?;
        if count_token.category != Category::Integer {
            return Err(self.error(
                DiagKind::Token,
                count_token.span,
                "REPEAT requires an integer count",
            ));
        }
        let count = self.integer_value(&count_token)?;
        let var_token = self.next()?;
        if var_token.category != Category::Word || !is_valid_identifier(&var_token.text) {
            return Err(self.error(
                DiagKind::Token,
                var_token.span,
                "REPEAT requires a counter variable",
            ));
        }
        self.expect_line_end()?;
        let (body, closer, _) =
            self.parse_block_body(&["ENDREPEAT"], "REPEAT block without ENDREPEAT")?;

        let header = self.command(
            &keyword.text,
            vec![
                Arg::new(ArgKind::Integer(count), count_token.span),
                Arg::new(
                    ArgKind::Identifier(self.arena.alloc_str(&var_token.text)),
                    var_token.span,
                ),
            ],
            false,
            keyword.span.join(var_token.span),
        );
        let mut list = NodeList::new();
        list.push(self.node_for(label, header));
        list.extend(body);
        list.push(closer);
        Ok(list)
    }

    fn parse_scope_block(
        &mut self,
        label: Option<&'a Label<'a>>,
        brace_span: SourceSpan,
    ) -> ParseResult<NodeList<'a>> {
        if let Some(label) = label {
            return Err(self.error(
                DiagKind::Structure,
                label.span,
                "'{' cannot carry a label",
            ));
        }
        if self.in_scope {
            return Err(self.error(
                DiagKind::Structure,
                brace_span,
                "scope blocks cannot be nested",
            ));
        }
        let brace = self.next()?;
        self.expect_line_end()?;

        self.in_scope = true;
        let body = self.parse_block_body(&["}"], "'{' without a matching '}'");
        self.in_scope = false;
        let (body, closer, _) = body?;

        let open = self.command("{", vec![], false, brace.span);
        let mut list = NodeList::new();
        list.push(self.node_for(None, open));
        list.extend(body);
        list.push(closer);
        Ok(list)
    }

    /// Parse statements until one of `closers` heads a line, splicing every
    /// sub-sequence in source order. The closer may carry a label.
    fn parse_block_body(
        &mut self,
        closers: &[&str],
        missing_msg: &str,
    ) -> ParseResult<(NodeList<'a>, &'a IrNode<'a>, String)> {
        let mut body = NodeList::new();
        loop {
            if self.at_eof()? {
                return Err(self.error(
                    DiagKind::Structure,
                    SourceSpan::point(self.source().len()),
                    missing_msg,
                ));
            }
            let label = self.parse_label()?;
            let peeked = self.peek(0)?;
            if peeked.category == Category::Word && closers.contains(&peeked.text.as_str()) {
                let keyword = self.next()?;
                self.expect_line_end()?;
                let command = self.command(&keyword.text, vec![], false, keyword.span);
                let closer = self.node_for(label, command);
                return Ok((body, closer, keyword.text));
            }
            let sub = self.parse_embedded_statement(label)?;
            body.extend(sub);
        }
    }

    // ============ Token plumbing ============

    fn next(&mut self) -> ParseResult<Token> {
        self.scanner.next_token().map_err(|err| {
            self.report_scan_error(&err);
            ParseFailure::Statement
        })
    }

    fn peek(&mut self, n: usize) -> ParseResult<Token> {
        let result = self.scanner.peek_nth(n).map(Token::clone);
        result.map_err(|err| {
            self.report_scan_error(&err);
            ParseFailure::Statement
        })
    }

    fn next_filename(&mut self) -> ParseResult<Token> {
        self.scanner.next_filename().map_err(|err| {
            self.report_scan_error(&err);
            ParseFailure::Statement
        })
    }

    fn at_eof(&mut self) -> ParseResult<bool> {
        match self.scanner.eof() {
            Ok(eof) => Ok(eof),
            Err(err) => {
                self.report_scan_error(&err);
                Err(ParseFailure::Statement)
            }
        }
    }

    fn expect_line_end(&mut self) -> ParseResult<()> {
        let token = self.next()?;
        if token.category != Category::Eol {
            return Err(self.error(DiagKind::Token, token.span, "expected end of line"));
        }
        self.scanner.advance_line();
        Ok(())
    }

    fn integer_value(&self, token: &Token) -> ParseResult<i32> {
        token.text.parse::<i32>().map_err(|_| {
            self.error(DiagKind::Lexical, token.span, "integer literal out of range")
        })
    }

    // ============ IR construction ============

    fn command(
        &self,
        name: &str,
        args: Vec<Arg<'a>>,
        not_flag: bool,
        span: SourceSpan,
    ) -> &'a Command<'a> {
        self.arena.alloc(Command {
            name: self.arena.alloc_str(name),
            args: self.arena.alloc_slice(&args),
            not_flag,
            span,
        })
    }

    fn node_for(&self, label: Option<&'a Label<'a>>, command: &'a Command<'a>) -> &'a IrNode<'a> {
        let span = match label {
            Some(label) => label.span.join(command.span),
            None => command.span,
        };
        self.arena.alloc(IrNode {
            label,
            command: Some(command),
            span,
        })
    }

    fn lowered(&self, label: Option<&'a Label<'a>>, commands: Vec<&'a Command<'a>>) -> NodeList<'a> {
        let mut list = NodeList::new();
        for (i, command) in commands.into_iter().enumerate() {
            list.push(self.node_for(if i == 0 { label } else { None }, command));
        }
        list
    }

    // ============ Diagnostics ============

    fn error(&self, kind: DiagKind, span: SourceSpan, message: impl Into<String>) -> ParseFailure {
        self.sink.report(Diagnostic::error(kind, span, message));
        ParseFailure::Statement
    }

    fn internal(&self, span: SourceSpan, message: impl Into<String>) -> ParseFailure {
        let mut diag = Diagnostic::fatal(DiagKind::Internal, message);
        diag.span = Some(span);
        self.sink.report(diag);
        ParseFailure::Fatal
    }

    fn report_scan_error(&self, err: &ScanError) {
        self.sink
            .report(Diagnostic::error(DiagKind::Lexical, err.span(), err.to_string()));
    }
}

fn same_identifier(a: &Arg<'_>, b: &Arg<'_>) -> bool {
    match (a.kind, b.kind) {
        (ArgKind::Identifier(x), ArgKind::Identifier(y)) => x == y,
        _ => false,
    }
}
