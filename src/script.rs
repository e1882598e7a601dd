//! Simulation scripts
//!
//! A script drives the simulation target. Unclocked scripts bind inputs and
//! call the chip explicitly:
//!
//! ```text
//! in a b
//! a = 1
//! b = 0
//! call
//! b = 1
//! call
//! ```
//!
//! Clocked scripts run for `dur` cycles. Top-level assignments set the
//! starting values; `t = N` guards form one if/else-if chain checked at
//! the start of every cycle:
//!
//! ```text
//! in d en
//! dur = 4
//! en = 1
//! t = 2 {
//!     d = 1
//! }
//! ```
//!
//! Parsing only checks the line syntax. [`SimulationScript::plan`] binds the
//! script to its target chip and produces the [`SimulationPlan`] that both the
//! Go driver and the in-process simulator run.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{ChipDefinition, Design};
use crate::codegen::is_go_reserved;
use crate::context::{CompilationContext, Diagnostic};
use crate::error::{CompileError, CompileResult};
use crate::lexer::{Lexer, Token};
use crate::parser::is_identifier;
use crate::signal::{Gate, SignalShape, SignalSpec, SignalValue, Value};

/// Words with a meaning of their own in scripts
const KEYWORDS: &[&str] = &["in", "call", "dur", "t", "X"];

/// Prefix of the names the generated driver declares for itself
pub const DRIVER_PREFIX: &str = "sim_";

/// Largest `dur` and guard cycle a script may use
pub const MAX_CYCLES: u64 = 1_000_000;

/// A syntactically valid script line
#[derive(Debug, Clone, PartialEq)]
pub enum DirectiveKind {
    /// `in a b c`
    Inputs(Vec<String>),
    /// `a = 1` or `d[2] = X`
    Assign {
        name: String,
        index: Option<usize>,
        value: SignalValue,
    },
    /// `call`
    Call,
    /// `dur = N`
    Duration(u64),
    /// `t = N { ... }`
    Guard { cycle: u64, body: Vec<Directive> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub line: usize,
    pub kind: DirectiveKind,
}

/// A parsed script, not yet bound to a chip
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SimulationScript {
    pub directives: Vec<Directive>,
}

/// One line of a script, before guard blocks are folded
enum ScriptLine {
    Directive(DirectiveKind),
    GuardOpen(u64),
    GuardClose,
}

fn parse_literal(token: &Token, line: usize) -> CompileResult<SignalValue> {
    match token {
        Token::Number(0) => Ok(SignalValue::Zero),
        Token::Number(1) => Ok(SignalValue::One),
        Token::Ident(name) if name == "X" => Ok(SignalValue::Unknown),
        other => Err(CompileError::script(
            line,
            format!("'{}' is not a logic literal (0, 1 or X)", other),
        )),
    }
}

fn check_cycles(n: u64, what: &str, line: usize) -> CompileResult<u64> {
    if n > MAX_CYCLES {
        return Err(CompileError::script(
            line,
            format!("{} {} exceeds the limit of {} cycles", what, n, MAX_CYCLES),
        ));
    }
    Ok(n)
}

fn parse_line(tokens: &[Token], line: usize) -> CompileResult<Option<ScriptLine>> {
    let kind = match tokens {
        [] => return Ok(None),
        [Token::Ident(kw)] if kw == "call" => DirectiveKind::Call,
        [Token::Ident(kw), names @ ..]
            if kw == "in" && names.iter().all(|t| matches!(t, Token::Ident(_))) =>
        {
            let names = names
                .iter()
                .filter_map(|t| match t {
                    Token::Ident(name) => Some(name.clone()),
                    _ => None,
                })
                .collect();
            DirectiveKind::Inputs(names)
        }
        [Token::Ident(kw), Token::Equals, Token::Number(n)] if kw == "dur" => {
            DirectiveKind::Duration(check_cycles(*n, "duration", line)?)
        }
        [Token::Ident(kw), Token::Equals, Token::Number(n)]
        | [Token::Ident(kw), Token::Equals, Token::Number(n), Token::LBrace]
            if kw == "t" =>
        {
            return Ok(Some(ScriptLine::GuardOpen(check_cycles(*n, "guard cycle", line)?)));
        }
        [Token::RBrace] => return Ok(Some(ScriptLine::GuardClose)),
        [Token::Ident(name), Token::Equals, value] => DirectiveKind::Assign {
            name: name.clone(),
            index: None,
            value: parse_literal(value, line)?,
        },
        [Token::Ident(name), Token::LBracket, Token::Number(i), Token::RBracket, Token::Equals, value] => {
            let index = usize::try_from(*i)
                .map_err(|_| CompileError::script(line, format!("index {} is too large", i)))?;
            DirectiveKind::Assign {
                name: name.clone(),
                index: Some(index),
                value: parse_literal(value, line)?,
            }
        }
        _ => {
            let text: Vec<String> = tokens.iter().map(ToString::to_string).collect();
            return Err(CompileError::script(
                line,
                format!("cannot understand '{}'", text.join(" ")),
            ));
        }
    };
    Ok(Some(ScriptLine::Directive(kind)))
}

impl SimulationScript {
    /// Parse script text
    pub fn parse(text: &str) -> CompileResult<Self> {
        let mut directives = Vec::new();
        // (line, cycle, body) of the guard being read
        let mut open: Option<(usize, u64, Vec<Directive>)> = None;

        for (i, raw) in text.lines().enumerate() {
            let line = i + 1;
            let tokens = Lexer::tokenize(raw, line).map_err(|e| match e {
                CompileError::Lexer { line, column, message } => {
                    CompileError::script(line, format!("column {}: {}", column, message))
                }
                other => other,
            })?;

            let Some(parsed) = parse_line(&tokens, line)? else {
                continue;
            };

            match parsed {
                ScriptLine::GuardOpen(_) if open.is_some() => {
                    return Err(CompileError::script(line, "guards cannot be nested"));
                }
                ScriptLine::GuardOpen(cycle) => open = Some((line, cycle, Vec::new())),
                ScriptLine::GuardClose => {
                    let (guard_line, cycle, body) = open
                        .take()
                        .ok_or_else(|| CompileError::script(line, "'}' without an open guard"))?;
                    directives.push(Directive {
                        line: guard_line,
                        kind: DirectiveKind::Guard { cycle, body },
                    });
                }
                ScriptLine::Directive(kind) => match open.as_mut() {
                    Some((_, _, body)) => body.push(Directive { line, kind }),
                    None => directives.push(Directive { line, kind }),
                },
            }
        }

        if let Some((guard_line, cycle, _)) = open {
            return Err(CompileError::script(
                guard_line,
                format!("guard 't = {}' is never closed with '}}'", cycle),
            ));
        }

        Ok(Self { directives })
    }

    /// True when the script holds no directives at all
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Bind the script to the simulation target
    pub fn plan(
        &self,
        design: &Design,
        target: &ChipDefinition,
        clocked: bool,
        ctx: &mut CompilationContext,
    ) -> CompileResult<SimulationPlan> {
        let mut binder = Binder::new(design, target);
        binder.declare_inputs(&self.directives)?;

        let mode = if clocked {
            binder.clocked(&self.directives, ctx)?
        } else {
            binder.unclocked(&self.directives, ctx)?
        };

        debug!(
            "Planned {} simulation of '{}' with inputs {:?}",
            if clocked { "clocked" } else { "unclocked" },
            target.name,
            binder.inputs.iter().map(|spec| spec.name.as_str()).collect::<Vec<_>>()
        );

        Ok(SimulationPlan {
            chip: target.name.clone(),
            inputs: binder.inputs,
            outputs: target.outputs.clone(),
            mode,
        })
    }
}

/// A resolved assignment to a script variable
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    /// `Some(i)` for a single bus line
    pub index: Option<usize>,
    /// Whole-variable assignments to a bus hold the broadcast bus value
    pub value: Value,
    pub line: usize,
}

/// A `t = N` block
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    pub cycle: u64,
    pub body: Vec<Assignment>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Assign(Assignment),
    Call,
}

/// Copies an output register into an input variable at the end of every cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackCopy {
    pub input: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanMode {
    Unclocked {
        steps: Vec<Step>,
    },
    Clocked {
        duration: u64,
        /// Runs once, before the first cycle
        setup: Vec<Assignment>,
        guards: Vec<Guard>,
        feedback: Vec<FeedbackCopy>,
    },
}

/// A script bound to its target chip
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlan {
    pub chip: String,
    /// Script variables in the chip's input order, with the matching shapes
    pub inputs: Vec<SignalSpec>,
    /// Output registers, named after the chip's outputs
    pub outputs: Vec<SignalSpec>,
    pub mode: PlanMode,
}

impl SimulationPlan {
    pub fn is_clocked(&self) -> bool {
        matches!(self.mode, PlanMode::Clocked { .. })
    }

    /// Number of `call` steps of an unclocked plan
    pub fn call_count(&self) -> usize {
        match &self.mode {
            PlanMode::Unclocked { steps } => steps.iter().filter(|s| matches!(s, Step::Call)).count(),
            PlanMode::Clocked { .. } => 0,
        }
    }
}

/// Resolves script names against the target chip
struct Binder<'a> {
    design: &'a Design,
    target: &'a ChipDefinition,
    inputs: Vec<SignalSpec>,
    shapes: HashMap<String, SignalShape>,
    /// Line of the `in` directive, if any
    declared_at: Option<usize>,
}

impl<'a> Binder<'a> {
    fn new(design: &'a Design, target: &'a ChipDefinition) -> Self {
        Self {
            design,
            target,
            inputs: Vec::new(),
            shapes: HashMap::new(),
            declared_at: None,
        }
    }

    fn check_variable_name(&self, name: &str, line: usize) -> CompileResult<()> {
        let clash = if KEYWORDS.contains(&name) {
            Some("is a script keyword")
        } else if Gate::from_name(name).is_some() {
            Some("names a built-in gate")
        } else if self.design.chip(name).is_some() {
            Some("names a chip")
        } else if self.target.output(name).is_some() {
            Some("names an output register of the simulated chip")
        } else if name.starts_with(DRIVER_PREFIX) {
            Some("uses the reserved 'sim_' prefix")
        } else if is_go_reserved(name) || !is_identifier(name) {
            Some("is not usable as a variable name")
        } else {
            None
        };
        match clash {
            Some(reason) => Err(CompileError::script(line, format!("'{}' {}", name, reason))),
            None => Ok(()),
        }
    }

    /// Find the single top-level `in` directive and bind its names
    fn declare_inputs(&mut self, directives: &[Directive]) -> CompileResult<()> {
        for directive in directives {
            match &directive.kind {
                DirectiveKind::Inputs(names) => {
                    if self.declared_at.is_some() {
                        return Err(CompileError::script(directive.line, "'in' declared more than once"));
                    }
                    self.bind_inputs(names, directive.line)?;
                    self.declared_at = Some(directive.line);
                }
                DirectiveKind::Guard { body, .. } => {
                    if let Some(inner) = body.iter().find(|d| matches!(d.kind, DirectiveKind::Inputs(_))) {
                        return Err(CompileError::script(inner.line, "'in' cannot appear inside a guard"));
                    }
                }
                _ => {}
            }
        }

        if self.declared_at.is_none() && !self.target.inputs.is_empty() {
            return Err(CompileError::script(
                1,
                format!(
                    "script must bind the {} input(s) of '{}' with an 'in' line",
                    self.target.inputs.len(),
                    self.target.name
                ),
            ));
        }
        Ok(())
    }

    fn bind_inputs(&mut self, names: &[String], line: usize) -> CompileResult<()> {
        if names.len() != self.target.inputs.len() {
            return Err(CompileError::script(
                line,
                format!(
                    "'in' lists {} name(s) but '{}' has {} input(s)",
                    names.len(),
                    self.target.name,
                    self.target.inputs.len()
                ),
            ));
        }
        let mut seen = HashSet::new();
        for (name, input) in names.iter().zip(&self.target.inputs) {
            self.check_variable_name(name, line)?;
            if !seen.insert(name.as_str()) {
                return Err(CompileError::script(line, format!("'{}' is listed twice", name)));
            }
            self.shapes.insert(name.clone(), input.shape);
            self.inputs.push(SignalSpec {
                name: name.clone(),
                shape: input.shape,
            });
        }
        Ok(())
    }

    fn resolve(&self, directive: &Directive) -> CompileResult<Assignment> {
        let line = directive.line;
        let DirectiveKind::Assign { name, index, value } = &directive.kind else {
            return Err(CompileError::script(line, "expected an assignment"));
        };

        let shape = self.shapes.get(name).copied().ok_or_else(|| {
            CompileError::script(line, format!("'{}' is not declared by the 'in' line", name))
        })?;
        if self.declared_at.is_some_and(|declared| declared > line) {
            return Err(CompileError::script(
                line,
                format!("'{}' is assigned before the 'in' line declares it", name),
            ));
        }

        let value = match (shape, index) {
            (SignalShape::Bit, None) => Value::Bit(*value),
            (SignalShape::Bus(width), None) => Value::Bus(vec![*value; width]),
            (SignalShape::Bus(width), Some(i)) if *i < width => Value::Bit(*value),
            (SignalShape::Bus(width), Some(i)) => {
                return Err(CompileError::script(
                    line,
                    format!("index {} is out of range for '{}' ({} lines)", i, name, width),
                ))
            }
            (SignalShape::Bit, Some(_)) => {
                return Err(CompileError::script(line, format!("'{}' is not a bus", name)));
            }
        };

        Ok(Assignment {
            name: name.clone(),
            index: *index,
            value,
            line,
        })
    }

    fn unclocked(&self, directives: &[Directive], ctx: &mut CompilationContext) -> CompileResult<PlanMode> {
        let mut steps = Vec::new();
        for directive in directives {
            match &directive.kind {
                DirectiveKind::Inputs(_) => {}
                DirectiveKind::Assign { .. } => steps.push(Step::Assign(self.resolve(directive)?)),
                DirectiveKind::Call => {
                    if self.declared_at.is_some_and(|declared| declared > directive.line) {
                        return Err(CompileError::script(directive.line, "'call' comes before the 'in' line"));
                    }
                    steps.push(Step::Call);
                }
                DirectiveKind::Duration(_) => {
                    return Err(CompileError::script(
                        directive.line,
                        "'dur' only applies to clocked simulations",
                    ));
                }
                DirectiveKind::Guard { .. } => {
                    return Err(CompileError::script(
                        directive.line,
                        "cycle guards only apply to clocked simulations",
                    ));
                }
            }
        }

        if !steps.iter().any(|step| matches!(step, Step::Call)) {
            ctx.warn(Diagnostic::NoCalls);
        }
        if !self.target.feedback.is_empty() {
            ctx.warn(Diagnostic::FeedbackIgnored {
                chip: self.target.name.clone(),
            });
        }
        Ok(PlanMode::Unclocked { steps })
    }

    fn clocked(&self, directives: &[Directive], ctx: &mut CompilationContext) -> CompileResult<PlanMode> {
        // `call` is checked first: it makes the whole script unusable
        for directive in directives {
            let nested = match &directive.kind {
                DirectiveKind::Guard { body, .. } => body.as_slice(),
                _ => std::slice::from_ref(directive),
            };
            if let Some(call) = nested.iter().find(|d| d.kind == DirectiveKind::Call) {
                return Err(CompileError::ClockedCallIncompatible { line: call.line });
            }
        }

        let mut duration = None;
        let mut setup = Vec::new();
        let mut guards: Vec<Guard> = Vec::new();

        for directive in directives {
            match &directive.kind {
                DirectiveKind::Inputs(_) | DirectiveKind::Call => {}
                DirectiveKind::Duration(n) => {
                    if duration.is_some() {
                        return Err(CompileError::DurationRedeclared { line: directive.line });
                    }
                    duration = Some(*n);
                }
                DirectiveKind::Assign { .. } => setup.push(self.resolve(directive)?),
                DirectiveKind::Guard { cycle, body } => {
                    let mut assignments = Vec::with_capacity(body.len());
                    for inner in body {
                        if let DirectiveKind::Duration(_) = inner.kind {
                            return Err(CompileError::script(inner.line, "'dur' cannot appear inside a guard"));
                        }
                        assignments.push(self.resolve(inner)?);
                    }
                    guards.push(Guard {
                        cycle: *cycle,
                        body: assignments,
                        line: directive.line,
                    });
                }
            }
        }

        let duration = duration.ok_or(CompileError::MissingDuration)?;

        let mut seen = HashSet::new();
        for guard in &guards {
            if !seen.insert(guard.cycle) || guard.cycle >= duration {
                ctx.warn(Diagnostic::UnreachableGuard {
                    line: guard.line,
                    cycle: guard.cycle,
                });
            }
        }

        let feedback = self
            .target
            .feedback
            .iter()
            .filter_map(|wire| {
                let position = self.target.inputs.iter().position(|spec| spec.name == wire.input)?;
                Some(FeedbackCopy {
                    input: self.inputs.get(position)?.name.clone(),
                    output: wire.output.clone(),
                })
            })
            .collect();

        Ok(PlanMode::Clocked {
            duration,
            setup,
            guards,
            feedback,
        })
    }
}
