//! Shape and ordering analysis for chip bodies
//!
//! Checks what the generated code relies on: every read refers to a signal
//! that already holds a value at that point of the straight-line body,
//! shapes agree across assignments and calls, and chips only call chips
//! defined before them.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::ast::{ChipDefinition, Design, Expr, Statement};
use crate::error::{CompileError, CompileResult};
use crate::signal::{Gate, SignalShape, SignalSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalKind {
    Input,
    Output,
    Local,
}

#[derive(Debug, Clone, Copy)]
struct SignalInfo {
    shape: SignalShape,
    kind: SignalKind,
    /// Whether a whole-signal read is valid at this point of the body
    readable: bool,
}

/// Analyzer for shape checking and local inference
pub struct Analyzer {
    /// Chips analyzed so far: name -> position
    defined: HashMap<String, usize>,
    /// Every chip name in the program, so signals cannot shadow them
    all_chips: HashSet<String>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            defined: HashMap::new(),
            all_chips: HashSet::new(),
        }
    }

    /// Analyze chips in order and produce the design
    pub fn analyze(&mut self, mut chips: Vec<ChipDefinition>) -> CompileResult<Design> {
        self.all_chips = chips.iter().map(|chip| chip.name.clone()).collect();

        for i in 0..chips.len() {
            if Gate::from_name(&chips[i].name).is_some() {
                return Err(CompileError::semantic(
                    &chips[i].name,
                    "chip name collides with a built-in gate",
                ));
            }
            let (earlier, rest) = chips.split_at_mut(i);
            let chip = &mut rest[0];
            let locals = ChipScope::new(self, earlier, chip)?.check_body()?;
            debug!("Analyzed chip '{}' ({} locals)", chip.name, locals.len());
            chip.locals = locals;
            self.defined.insert(chip.name.clone(), i);
        }

        Ok(Design::new(chips))
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// Signals visible inside one chip body
struct ChipScope<'a> {
    analyzer: &'a Analyzer,
    earlier: &'a [ChipDefinition],
    chip: &'a ChipDefinition,
    signals: HashMap<String, SignalInfo>,
    locals: Vec<SignalSpec>,
}

impl<'a> ChipScope<'a> {
    fn new(
        analyzer: &'a Analyzer,
        earlier: &'a [ChipDefinition],
        chip: &'a ChipDefinition,
    ) -> CompileResult<Self> {
        let mut scope = Self {
            analyzer,
            earlier,
            chip,
            signals: HashMap::new(),
            locals: Vec::new(),
        };

        for spec in &chip.inputs {
            scope.check_name(&spec.name)?;
            scope.signals.insert(
                spec.name.clone(),
                SignalInfo {
                    shape: spec.shape,
                    kind: SignalKind::Input,
                    readable: true,
                },
            );
        }
        for spec in &chip.outputs {
            scope.check_name(&spec.name)?;
            // Bus outputs start out all-unknown, bit outputs must be assigned first
            scope.signals.insert(
                spec.name.clone(),
                SignalInfo {
                    shape: spec.shape,
                    kind: SignalKind::Output,
                    readable: spec.is_bus(),
                },
            );
        }

        Ok(scope)
    }

    fn error(&self, msg: impl Into<String>) -> CompileError {
        CompileError::semantic(&self.chip.name, msg)
    }

    fn stmt_error(&self, stmt: &Statement, msg: impl std::fmt::Display) -> CompileError {
        self.error(format!("line {}: {}", stmt.line, msg))
    }

    fn check_name(&self, name: &str) -> CompileResult<()> {
        if Gate::from_name(name).is_some() {
            return Err(self.error(format!("signal '{}' shadows the '{}' gate", name, name)));
        }
        if self.analyzer.all_chips.contains(name) {
            return Err(self.error(format!("signal '{}' shadows the chip of the same name", name)));
        }
        Ok(())
    }

    fn check_body(mut self) -> CompileResult<Vec<SignalSpec>> {
        let chip = self.chip;
        for stmt in &chip.body {
            self.check_statement(stmt)?;
        }

        for spec in chip.bit_outputs() {
            let assigned = self.signals.get(&spec.name).is_some_and(|info| info.readable);
            if !assigned {
                return Err(self.error(format!("output '{}' is never assigned", spec.name)));
            }
        }

        Ok(self.locals)
    }

    fn check_statement(&mut self, stmt: &Statement) -> CompileResult<()> {
        let shapes = self.expr_shapes(&stmt.value, stmt)?;

        if shapes.len() != stmt.targets.len() {
            let msg = match &stmt.value {
                Expr::Call { chip, .. } => format!(
                    "'{}' returns {} value(s) but {} target(s) are assigned",
                    chip,
                    shapes.len(),
                    stmt.targets.len()
                ),
                _ => format!(
                    "{} targets need a chip call with {} outputs",
                    stmt.targets.len(),
                    stmt.targets.len()
                ),
            };
            return Err(self.stmt_error(stmt, msg));
        }

        let mut seen = HashSet::new();
        for target in &stmt.targets {
            if !seen.insert(target.to_string()) {
                return Err(self.stmt_error(stmt, format!("'{}' is assigned twice", target)));
            }
        }

        for (target, shape) in stmt.targets.iter().zip(shapes) {
            let existing = self.signals.get(&target.name).copied();

            match (target.index, existing) {
                (_, Some(info)) if info.kind == SignalKind::Input => {
                    return Err(self.stmt_error(stmt, format!("cannot assign to input '{}'", target.name)));
                }
                (None, Some(info)) => {
                    if info.shape != shape {
                        return Err(self.stmt_error(
                            stmt,
                            format!("'{}' is {} but is assigned a {}", target.name, info.shape, shape),
                        ));
                    }
                    if let Some(info) = self.signals.get_mut(&target.name) {
                        info.readable = true;
                    }
                }
                (None, None) => {
                    self.check_name(&target.name)?;
                    self.signals.insert(
                        target.name.clone(),
                        SignalInfo {
                            shape,
                            kind: SignalKind::Local,
                            readable: true,
                        },
                    );
                    self.locals.push(SignalSpec {
                        name: target.name.clone(),
                        shape,
                    });
                }
                (Some(index), Some(info)) => {
                    let SignalShape::Bus(width) = info.shape else {
                        return Err(self.stmt_error(stmt, format!("'{}' is not a bus", target.name)));
                    };
                    if index >= width {
                        return Err(self.stmt_error(
                            stmt,
                            format!("index {} is out of range for '{}' ({} lines)", index, target.name, width),
                        ));
                    }
                    if shape != SignalShape::Bit {
                        return Err(self.stmt_error(
                            stmt,
                            format!("'{}' is a single line but is assigned a {}", target, shape),
                        ));
                    }
                }
                (Some(_), None) => {
                    return Err(self.stmt_error(
                        stmt,
                        format!("bus '{}' must be declared before its lines are assigned", target.name),
                    ));
                }
            }
        }

        Ok(())
    }

    /// Shapes produced by an expression: one per value
    fn expr_shapes(&self, expr: &Expr, stmt: &Statement) -> CompileResult<Vec<SignalShape>> {
        match expr {
            Expr::Literal(_) => Ok(vec![SignalShape::Bit]),

            Expr::Signal(name) => {
                let info = self.lookup(name, stmt)?;
                if !info.readable {
                    return Err(self.stmt_error(
                        stmt,
                        format!("'{}' is read before it is assigned (statements run in order)", name),
                    ));
                }
                Ok(vec![info.shape])
            }

            Expr::Element { name, index } => {
                let info = self.lookup(name, stmt)?;
                match info.shape {
                    SignalShape::Bus(width) if *index < width => Ok(vec![SignalShape::Bit]),
                    SignalShape::Bus(width) => Err(self.stmt_error(
                        stmt,
                        format!("index {} is out of range for '{}' ({} lines)", index, name, width),
                    )),
                    SignalShape::Bit => Err(self.stmt_error(stmt, format!("'{}' is not a bus", name))),
                }
            }

            Expr::Gate { gate, args } => {
                if args.len() != gate.arity() {
                    return Err(self.stmt_error(
                        stmt,
                        format!("'{}' takes {} argument(s), got {}", gate.name(), gate.arity(), args.len()),
                    ));
                }
                for arg in args {
                    let shape = self.single_shape(arg, stmt)?;
                    if shape != SignalShape::Bit {
                        return Err(self.stmt_error(
                            stmt,
                            format!("'{}' works on single lines, got a {} in '{}'", gate.name(), shape, arg),
                        ));
                    }
                }
                Ok(vec![SignalShape::Bit])
            }

            Expr::Call { chip, args } => {
                let callee = self.callee(chip, stmt)?;
                if args.len() != callee.inputs.len() {
                    return Err(self.stmt_error(
                        stmt,
                        format!("'{}' takes {} input(s), got {}", chip, callee.inputs.len(), args.len()),
                    ));
                }
                for (arg, input) in args.iter().zip(&callee.inputs) {
                    let shape = self.single_shape(arg, stmt)?;
                    if shape != input.shape {
                        return Err(self.stmt_error(
                            stmt,
                            format!("input '{}' of '{}' is {}, got {}", input.name, chip, input.shape, shape),
                        ));
                    }
                }
                Ok(callee.outputs.iter().map(|spec| spec.shape).collect())
            }
        }
    }

    fn single_shape(&self, expr: &Expr, stmt: &Statement) -> CompileResult<SignalShape> {
        let shapes = self.expr_shapes(expr, stmt)?;
        match shapes.as_slice() {
            [shape] => Ok(*shape),
            _ => Err(self.stmt_error(
                stmt,
                format!("'{}' yields {} values where one is expected", expr, shapes.len()),
            )),
        }
    }

    fn lookup(&self, name: &str, stmt: &Statement) -> CompileResult<SignalInfo> {
        self.signals.get(name).copied().ok_or_else(|| {
            self.stmt_error(
                stmt,
                format!("'{}' is not defined (statements run in order; assign it before reading)", name),
            )
        })
    }

    fn callee(&self, name: &str, stmt: &Statement) -> CompileResult<&'a ChipDefinition> {
        if name == self.chip.name {
            return Err(self.stmt_error(stmt, format!("'{}' cannot call itself", name)));
        }
        match self.analyzer.defined.get(name) {
            Some(&i) => Ok(&self.earlier[i]),
            None if self.analyzer.all_chips.contains(name) => Err(self.stmt_error(
                stmt,
                format!("'{}' is used before it is defined", name),
            )),
            None => Err(self.stmt_error(stmt, format!("unknown chip '{}'", name))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CompilationContext;
    use crate::parser::Parser;

    fn analyze(source: &str) -> CompileResult<Design> {
        let mut ctx = CompilationContext::new();
        let chips = Parser::new(source).parse_program(&mut ctx)?;
        Analyzer::new().analyze(chips)
    }

    fn assert_semantic_error(source: &str, needle: &str) {
        match analyze(source) {
            Err(CompileError::Semantic { message, .. }) => {
                assert!(message.contains(needle), "'{}' does not mention '{}'", message, needle)
            }
            other => panic!("Expected semantic error, got {:?}", other),
        }
    }

    const HALF_ADDER: &str = "\
#half_adder
IN a b
OUT s c
CON
c = and(a, b)
s = and(or(a, b), not(c))
END
";

    #[test]
    fn test_locals_are_inferred() {
        let source = format!(
            "{}#full_adder\nIN a b cin\nOUT s cout\nCON\ns1, c1 = half_adder(a, b)\ns, c2 = half_adder(s1, cin)\ncout = or(c1, c2)\nEND\n",
            HALF_ADDER
        );
        let design = analyze(&source).unwrap();
        let full = design.chip("full_adder").unwrap();
        assert_eq!(
            full.locals,
            vec![SignalSpec::bit("s1"), SignalSpec::bit("c1"), SignalSpec::bit("c2")]
        );
        assert_eq!(design.position("full_adder"), Some(1));
    }

    #[test]
    fn test_bus_local_from_call() {
        let source = "\
#pass4
IN d[4]
OUT q[4]
CON
q = d
END
#top
IN d[4]
OUT y
CON
v = pass4(d)
y = v[3]
END
";
        let design = analyze(source).unwrap();
        assert_eq!(design.chip("top").unwrap().locals, vec![SignalSpec::bus("v", 4)]);
    }

    #[test]
    fn test_read_before_write() {
        assert_semantic_error(
            "#c\nIN a\nOUT y\nCON\ny = and(a, t)\nt = not(a)\nEND\n",
            "'t' is not defined",
        );
        assert_semantic_error("#c\nIN a\nOUT y z\nCON\nz = y\ny = a\nEND\n", "read before");
    }

    #[test]
    fn test_bus_output_may_be_read_before_write() {
        let design = analyze("#c\nIN a\nOUT q[2]\nCON\nq[1] = or(q[0], a)\nEND\n").unwrap();
        assert!(design.chip("c").unwrap().locals.is_empty());
    }

    #[test]
    fn test_unassigned_output() {
        assert_semantic_error("#c\nIN a\nOUT y z\nCON\ny = a\nEND\n", "'z' is never assigned");
    }

    #[test]
    fn test_gate_arity_and_shapes() {
        assert_semantic_error("#c\nIN a b\nOUT y\nCON\ny = not(a, b)\nEND\n", "takes 1");
        assert_semantic_error("#c\nIN d[2] b\nOUT y\nCON\ny = and(d, b)\nEND\n", "single lines");
        assert_semantic_error("#c\nIN d[2]\nOUT y\nCON\ny = d[2]\nEND\n", "out of range");
    }

    #[test]
    fn test_call_rules() {
        let later = format!("#top\nIN a b\nOUT y\nCON\ny, z = half_adder(a, b)\nEND\n{}", HALF_ADDER);
        assert_semantic_error(&later, "used before it is defined");

        let arity = format!("{}#top\nIN a\nOUT y\nCON\ny, z = half_adder(a)\nEND\n", HALF_ADDER);
        assert_semantic_error(&arity, "takes 2 input(s)");

        let targets = format!("{}#top\nIN a b\nOUT y\nCON\ny = half_adder(a, b)\nEND\n", HALF_ADDER);
        assert_semantic_error(&targets, "returns 2 value(s)");

        assert_semantic_error("#top\nIN a\nOUT y\nCON\ny = top(a)\nEND\n", "cannot call itself");
    }

    #[test]
    fn test_assignments_to_inputs_are_rejected() {
        assert_semantic_error("#c\nIN a\nOUT y\nCON\na = 1\ny = a\nEND\n", "cannot assign to input");
    }

    #[test]
    fn test_shadowing_is_rejected() {
        assert_semantic_error("#c\nIN and\nOUT y\nCON\ny = 1\nEND\n", "shadows the 'and' gate");
        let source = format!("{}#top\nIN a\nOUT y\nCON\nhalf_adder = a\ny = a\nEND\n", HALF_ADDER);
        assert_semantic_error(&source, "shadows the chip");
    }
}
