//! Parser for chip blocks
//!
//! A chip block looks like:
//!
//! ```text
//! #half_adder
//! IN a b
//! OUT s c
//! CON
//! c = and(a, b)
//! s = and(or(a, b), not(c))
//! END
//! ```
//!
//! `SIM` and `CLOCKED` marker lines may appear anywhere before `CON`.

use std::collections::HashSet;

use tracing::debug;

use crate::ast::{ChipDefinition, Expr, Feedback, Statement, Target};
use crate::context::{CompilationContext, Diagnostic};
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Lexer, Token};
use crate::signal::{Gate, SignalSpec, SignalValue};

/// Raw text of one `#name` ... `END` block
#[derive(Debug, Clone, PartialEq)]
pub struct ChipBlock {
    pub name: String,
    /// Line of the `#name` marker
    pub line: usize,
    pub text: String,
}

pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_skippable(line: &str) -> bool {
    line.is_empty() || line.starts_with("//")
}

/// Names declared by `#name` lines, in order
pub fn declared_names(source: &str) -> Vec<String> {
    source
        .lines()
        .filter_map(|line| line.trim().strip_prefix('#'))
        .map(|name| name.trim().to_string())
        .collect()
}

/// Split a buffer into chip blocks; any other non-blank text is an error
pub fn split_chip_blocks(source: &str) -> CompileResult<Vec<ChipBlock>> {
    let mut blocks = Vec::new();
    let mut open: Option<ChipBlock> = None;

    for (i, raw) in source.lines().enumerate() {
        let line_no = i + 1;
        let line = raw.trim();

        match open.as_mut() {
            None => {
                if is_skippable(line) {
                    continue;
                }
                let Some(name) = line.strip_prefix('#') else {
                    return Err(CompileError::malformed(
                        line_no,
                        format!("unexpected text outside a chip block: '{}'", line),
                    ));
                };
                let name = name.trim();
                if !is_identifier(name) {
                    return Err(CompileError::malformed(
                        line_no,
                        format!("invalid chip name '{}'", name),
                    ));
                }
                open = Some(ChipBlock {
                    name: name.to_string(),
                    line: line_no,
                    text: format!("{}\n", raw),
                });
            }
            Some(block) => {
                if line.starts_with('#') {
                    return Err(CompileError::malformed(
                        line_no,
                        format!("chip '{}' is missing its END marker", block.name),
                    ));
                }
                block.text.push_str(raw);
                block.text.push('\n');
                if line == "END" {
                    blocks.extend(open.take());
                }
            }
        }
    }

    match open {
        Some(block) => Err(CompileError::malformed(
            block.line,
            format!("chip '{}' is missing its END marker", block.name),
        )),
        None => Ok(blocks),
    }
}

/// Parser for a flat (preprocessed) source buffer
pub struct Parser<'source> {
    source: &'source str,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> Self {
        Self { source }
    }

    /// Parse every chip block, in order
    pub fn parse_program(&mut self, ctx: &mut CompilationContext) -> CompileResult<Vec<ChipDefinition>> {
        let mut chips = Vec::new();
        let mut seen = HashSet::new();

        for block in split_chip_blocks(self.source)? {
            if !seen.insert(block.name.clone()) {
                ctx.warn(Diagnostic::DuplicateChip {
                    name: block.name.clone(),
                    origin: format!("line {}", block.line),
                });
                continue;
            }

            let chip = parse_chip(&block)?;
            if chip.is_simulation_target {
                ctx.mark_simulation_target(&chip.name)?;
            }
            if chip.is_clocked {
                ctx.mark_clocked();
            }
            debug!(
                "Parsed chip '{}' ({} inputs, {} outputs, {} statements)",
                chip.name,
                chip.inputs.len(),
                chip.outputs.len(),
                chip.body.len()
            );
            chips.push(chip);
        }

        Ok(chips)
    }
}

/// Parse one block into a chip definition
pub fn parse_chip(block: &ChipBlock) -> CompileResult<ChipDefinition> {
    let mut chip = ChipDefinition::new(&block.name, block.line);
    let mut inputs: Option<Vec<InputToken>> = None;
    let mut outputs: Option<Vec<SignalSpec>> = None;
    let mut in_body = false;
    let mut saw_body = false;

    // First line is the `#name` marker
    for (i, raw) in block.text.lines().enumerate().skip(1) {
        let line_no = block.line + i;
        let line = raw.trim();
        if is_skippable(line) {
            continue;
        }

        if in_body {
            if line == "END" {
                in_body = false;
            } else {
                chip.body.push(parse_statement(&chip.name, line, line_no)?);
            }
            continue;
        }

        let (keyword, rest) = line
            .split_once(char::is_whitespace)
            .map(|(k, r)| (k, r.trim()))
            .unwrap_or((line, ""));

        match keyword {
            "IN" => {
                if inputs.is_some() {
                    return Err(CompileError::malformed(
                        line_no,
                        format!("chip '{}' declares IN twice", chip.name),
                    ));
                }
                inputs = Some(parse_signal_list(rest, line_no, true)?);
            }
            "OUT" => {
                if outputs.is_some() {
                    return Err(CompileError::malformed(
                        line_no,
                        format!("chip '{}' declares OUT twice", chip.name),
                    ));
                }
                let specs = parse_signal_list(rest, line_no, false)?
                    .into_iter()
                    .map(|token| token.spec)
                    .collect();
                outputs = Some(specs);
            }
            "SIM" if rest.is_empty() => chip.is_simulation_target = true,
            "CLOCKED" if rest.is_empty() => chip.is_clocked = true,
            "CON" if rest.is_empty() => {
                in_body = true;
                saw_body = true;
            }
            "END" => {
                return Err(CompileError::malformed(
                    line_no,
                    format!("chip '{}' has no CON section", chip.name),
                ));
            }
            _ => {
                return Err(CompileError::malformed(
                    line_no,
                    format!("unexpected line in header of chip '{}': '{}'", chip.name, line),
                ));
            }
        }
    }

    if !saw_body {
        return Err(CompileError::malformed(
            block.line,
            format!("chip '{}' has no CON section", chip.name),
        ));
    }
    let inputs = inputs.ok_or_else(|| {
        CompileError::malformed(block.line, format!("chip '{}' has no IN line", chip.name))
    })?;
    chip.outputs = outputs.ok_or_else(|| {
        CompileError::malformed(block.line, format!("chip '{}' has no OUT line", chip.name))
    })?;
    if chip.outputs.is_empty() {
        return Err(CompileError::malformed(
            block.line,
            format!("chip '{}' declares no outputs", chip.name),
        ));
    }

    for token in inputs {
        if let Some(output) = token.feedback_from {
            chip.feedback.push(Feedback {
                input: token.spec.name.clone(),
                output,
            });
        }
        chip.inputs.push(token.spec);
    }

    validate_interface(&chip)?;
    Ok(chip)
}

fn validate_interface(chip: &ChipDefinition) -> CompileResult<()> {
    let fail = |msg: String| Err(CompileError::malformed(chip.line, msg));

    let mut inputs = HashSet::new();
    for spec in &chip.inputs {
        if !inputs.insert(spec.name.as_str()) {
            return fail(format!("chip '{}' lists input '{}' twice", chip.name, spec.name));
        }
    }
    let mut outputs = HashSet::new();
    for spec in &chip.outputs {
        if !outputs.insert(spec.name.as_str()) {
            return fail(format!("chip '{}' lists output '{}' twice", chip.name, spec.name));
        }
        if inputs.contains(spec.name.as_str()) {
            return fail(format!(
                "chip '{}' uses '{}' as both input and output",
                chip.name, spec.name
            ));
        }
    }

    if !chip.feedback.is_empty() && !chip.is_simulation_target {
        return fail(format!(
            "chip '{}' declares feedback wiring but is not the simulation target",
            chip.name
        ));
    }
    for wire in &chip.feedback {
        let (Some(input), Some(output)) = (chip.input(&wire.input), chip.output(&wire.output)) else {
            return fail(format!(
                "feedback ({}|{}) in chip '{}' names an unknown output",
                wire.input, wire.output, chip.name
            ));
        };
        if input.shape != output.shape {
            return fail(format!(
                "feedback ({}|{}) in chip '{}' connects {} to {}",
                wire.input, wire.output, chip.name, output.shape, input.shape
            ));
        }
    }
    Ok(())
}

/// An entry of an `IN` list
struct InputToken {
    spec: SignalSpec,
    feedback_from: Option<String>,
}

/// Parse `a b[4] (q_in|q)`
fn parse_signal_list(text: &str, line: usize, allow_feedback: bool) -> CompileResult<Vec<InputToken>> {
    let tokens = Lexer::tokenize(text, line)?;
    let mut iter = tokens.into_iter().peekable();
    let mut specs = Vec::new();

    while let Some(token) = iter.next() {
        match token {
            Token::Ident(name) => {
                let spec = parse_signal_suffix(name, &mut iter, line)?;
                specs.push(InputToken {
                    spec,
                    feedback_from: None,
                });
            }
            Token::LParen if allow_feedback => {
                let input = match iter.next() {
                    Some(Token::Ident(name)) => parse_signal_suffix(name, &mut iter, line)?,
                    _ => {
                        return Err(CompileError::malformed(
                            line,
                            "expected an input name after '(' in feedback wiring",
                        ))
                    }
                };
                let output = match (iter.next(), iter.next(), iter.next()) {
                    (Some(Token::Pipe), Some(Token::Ident(output)), Some(Token::RParen)) => output,
                    _ => {
                        return Err(CompileError::malformed(
                            line,
                            format!("feedback wiring for '{}' must look like ({}|output)", input.name, input.name),
                        ))
                    }
                };
                check_signal_name(&output, line)?;
                specs.push(InputToken {
                    spec: input,
                    feedback_from: Some(output),
                });
            }
            other => {
                return Err(CompileError::malformed(
                    line,
                    format!("unexpected '{}' in signal list", other),
                ))
            }
        }
    }

    Ok(specs)
}

/// Parse the optional `[width]` after a signal name
fn parse_signal_suffix<I>(
    name: String,
    iter: &mut std::iter::Peekable<I>,
    line: usize,
) -> CompileResult<SignalSpec>
where
    I: Iterator<Item = Token>,
{
    check_signal_name(&name, line)?;
    if iter.peek() != Some(&Token::LBracket) {
        return Ok(SignalSpec::bit(name));
    }
    iter.next();
    match (iter.next(), iter.next()) {
        (Some(Token::Number(width)), Some(Token::RBracket)) => {
            if width == 0 {
                return Err(CompileError::malformed(
                    line,
                    format!("bus '{}' must be at least one line wide", name),
                ));
            }
            let width = usize::try_from(width).map_err(|_| {
                CompileError::malformed(line, format!("bus '{}' is too wide", name))
            })?;
            Ok(SignalSpec::bus(name, width))
        }
        _ => Err(CompileError::malformed(
            line,
            format!("unterminated bracket in signal '{}['", name),
        )),
    }
}

fn check_signal_name(name: &str, line: usize) -> CompileResult<()> {
    if name == "X" {
        return Err(CompileError::malformed(
            line,
            "'X' is the unknown literal and cannot name a signal",
        ));
    }
    Ok(())
}

/// Parse one body line
pub fn parse_statement(chip: &str, source: &str, line: usize) -> CompileResult<Statement> {
    let mut parser = StatementParser::new(chip, source, line)?;
    parser.parse_statement()
}

/// Recursive-descent parser for a single statement
struct StatementParser<'source> {
    lexer: Lexer<'source>,
    current: Option<Token>,
    chip: &'source str,
    line: usize,
}

impl<'source> StatementParser<'source> {
    fn new(chip: &'source str, source: &'source str, line: usize) -> CompileResult<Self> {
        let mut lexer = Lexer::new(source, line);
        let current = lexer.next().transpose()?;
        Ok(Self {
            lexer,
            current,
            chip,
            line,
        })
    }

    fn error(&self, msg: impl Into<String>) -> CompileError {
        CompileError::parse_error(self.chip, self.line, msg)
    }

    /// Advance to the next token
    fn advance(&mut self) -> CompileResult<Option<Token>> {
        let next = self.lexer.next().transpose()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        self.current.as_ref() == Some(expected)
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, expected: Token) -> CompileResult<()> {
        if self.check(&expected) {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}', found {}", expected, self.describe_current())))
        }
    }

    fn describe_current(&self) -> String {
        match &self.current {
            Some(tok) => format!("'{}'", tok),
            None => "end of line".to_string(),
        }
    }

    fn expect_ident(&mut self, what: &str) -> CompileResult<String> {
        match self.advance()? {
            Some(Token::Ident(name)) => Ok(name),
            Some(other) => Err(self.error(format!("expected {}, found '{}'", what, other))),
            None => Err(self.error(format!("expected {}, found end of line", what))),
        }
    }

    fn expect_index(&mut self) -> CompileResult<usize> {
        self.expect(Token::LBracket)?;
        let index = match self.advance()? {
            Some(Token::Number(n)) => usize::try_from(n).map_err(|_| self.error("index too large"))?,
            _ => return Err(self.error("expected a bus index")),
        };
        self.expect(Token::RBracket)?;
        Ok(index)
    }

    fn parse_statement(&mut self) -> CompileResult<Statement> {
        let mut targets = vec![self.parse_target()?];
        while self.check(&Token::Comma) {
            self.advance()?;
            targets.push(self.parse_target()?);
        }
        self.expect(Token::Equals)?;
        let value = self.parse_expr()?;
        if self.current.is_some() {
            return Err(self.error(format!("unexpected {} after expression", self.describe_current())));
        }
        Ok(Statement {
            targets,
            value,
            line: self.line,
        })
    }

    fn parse_target(&mut self) -> CompileResult<Target> {
        let name = self.expect_ident("an assignment target")?;
        if name == "X" {
            return Err(self.error("cannot assign to the literal X"));
        }
        if self.check(&Token::LBracket) {
            let index = self.expect_index()?;
            Ok(Target::element(name, index))
        } else {
            Ok(Target::whole(name))
        }
    }

    fn parse_expr(&mut self) -> CompileResult<Expr> {
        match self.advance()? {
            Some(Token::Number(n)) => match n {
                0 => Ok(Expr::Literal(SignalValue::Zero)),
                1 => Ok(Expr::Literal(SignalValue::One)),
                other => Err(self.error(format!("'{}' is not a logic literal (0, 1 or X)", other))),
            },
            Some(Token::Ident(name)) if name == "X" => Ok(Expr::Literal(SignalValue::Unknown)),
            Some(Token::Ident(name)) => {
                if self.check(&Token::LParen) {
                    let args = self.parse_args()?;
                    Ok(match Gate::from_name(&name) {
                        Some(gate) => Expr::Gate { gate, args },
                        None => Expr::Call { chip: name, args },
                    })
                } else if self.check(&Token::LBracket) {
                    let index = self.expect_index()?;
                    Ok(Expr::Element { name, index })
                } else {
                    Ok(Expr::Signal(name))
                }
            }
            Some(other) => Err(self.error(format!("unexpected '{}' in expression", other))),
            None => Err(self.error("missing expression after '='")),
        }
    }

    /// Parse call arguments: (arg1, arg2, ...)
    fn parse_args(&mut self) -> CompileResult<Vec<Expr>> {
        self.expect(Token::LParen)?;
        let mut args = Vec::new();
        if !self.check(&Token::RParen) {
            args.push(self.parse_expr()?);
            while self.check(&Token::Comma) {
                self.advance()?;
                args.push(self.parse_expr()?);
            }
        }
        self.expect(Token::RParen)?;
        Ok(args)
    }
}
