//! In-process simulator
//!
//! Interprets the analyzed design and a [`SimulationPlan`] with the same
//! semantics as the generated driver, producing the lines the Go program
//! would print (unclocked) or write to its report (clocked).

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::ast::{ChipDefinition, Design, Expr, Target};
use crate::error::{CompileError, CompileResult};
use crate::script::{Assignment, PlanMode, SimulationPlan, Step};
use crate::signal::{format_values, SignalValue, Value};

/// Last line of every clocked report
pub const REPORT_DELIMITER: &str = "---";

/// Result of running a plan
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationOutput {
    pub lines: Vec<String>,
    /// How many times the simulated chip was evaluated
    pub invocations: usize,
}

impl SimulationOutput {
    /// The lines as written by the driver, each newline-terminated
    pub fn text(&self) -> String {
        self.lines.iter().map(|line| format!("{}\n", line)).collect()
    }
}

pub struct Simulator<'d> {
    design: &'d Design,
}

impl<'d> Simulator<'d> {
    pub fn new(design: &'d Design) -> Self {
        Self { design }
    }

    /// Evaluate one chip for the given inputs, in declared order
    pub fn evaluate(&self, chip: &ChipDefinition, inputs: &[Value]) -> CompileResult<Vec<Value>> {
        if inputs.len() != chip.inputs.len() {
            return Err(CompileError::simulation(format!(
                "'{}' takes {} input(s), got {}",
                chip.name,
                chip.inputs.len(),
                inputs.len()
            )));
        }

        let mut env: HashMap<&str, Value> = HashMap::new();
        for (spec, value) in chip.inputs.iter().zip(inputs) {
            if value.shape() != spec.shape {
                return Err(CompileError::simulation(format!(
                    "input '{}' of '{}' is {}, got {}",
                    spec.name,
                    chip.name,
                    spec.shape,
                    value.shape()
                )));
            }
            env.insert(&spec.name, value.clone());
        }
        for spec in chip.bus_outputs() {
            env.insert(&spec.name, Value::unknown(spec.shape));
        }

        for stmt in &chip.body {
            let values = self.eval(&env, &stmt.value)?;
            for (target, value) in stmt.targets.iter().zip(values) {
                trace!("{}: {} = {}", chip.name, target, value);
                assign(&mut env, target, value)?;
            }
        }

        chip.outputs
            .iter()
            .map(|spec| {
                env.get(spec.name.as_str()).cloned().ok_or_else(|| {
                    CompileError::simulation(format!("output '{}' of '{}' was never assigned", spec.name, chip.name))
                })
            })
            .collect()
    }

    fn eval(&self, env: &HashMap<&str, Value>, expr: &Expr) -> CompileResult<Vec<Value>> {
        match expr {
            Expr::Literal(value) => Ok(vec![Value::Bit(*value)]),
            Expr::Signal(name) => env
                .get(name.as_str())
                .cloned()
                .map(|value| vec![value])
                .ok_or_else(|| CompileError::simulation(format!("'{}' has no value", name))),
            Expr::Element { name, index } => match env.get(name.as_str()) {
                Some(Value::Bus(lines)) => lines
                    .get(*index)
                    .map(|line| vec![Value::Bit(*line)])
                    .ok_or_else(|| CompileError::simulation(format!("index {} is out of range for '{}'", index, name))),
                _ => Err(CompileError::simulation(format!("'{}' is not a bus with a value", name))),
            },
            Expr::Gate { gate, args } => {
                let args = args
                    .iter()
                    .map(|arg| match self.eval_single(env, arg)? {
                        Value::Bit(value) => Ok(value),
                        Value::Bus(_) => Err(CompileError::simulation(format!(
                            "'{}' received a bus in '{}'",
                            gate.name(),
                            arg
                        ))),
                    })
                    .collect::<CompileResult<Vec<SignalValue>>>()?;
                Ok(vec![Value::Bit(gate.apply(&args))])
            }
            Expr::Call { chip, args } => {
                let callee = self
                    .design
                    .chip(chip)
                    .ok_or_else(|| CompileError::simulation(format!("unknown chip '{}'", chip)))?;
                let args = args
                    .iter()
                    .map(|arg| self.eval_single(env, arg))
                    .collect::<CompileResult<Vec<_>>>()?;
                self.evaluate(callee, &args)
            }
        }
    }

    fn eval_single(&self, env: &HashMap<&str, Value>, expr: &Expr) -> CompileResult<Value> {
        let mut values = self.eval(env, expr)?;
        match values.len() {
            1 => Ok(values.remove(0)),
            n => Err(CompileError::simulation(format!(
                "'{}' yields {} values where one is expected",
                expr, n
            ))),
        }
    }

    /// Run a plan against its target chip
    pub fn run(&self, plan: &SimulationPlan) -> CompileResult<SimulationOutput> {
        let target = self
            .design
            .chip(&plan.chip)
            .ok_or_else(|| CompileError::simulation(format!("unknown chip '{}'", plan.chip)))?;

        let mut registers = Registers::new(plan);
        let mut outputs: Vec<Value> = plan.outputs.iter().map(|spec| Value::unknown(spec.shape)).collect();
        let mut lines = Vec::new();
        let mut invocations = 0;

        match &plan.mode {
            PlanMode::Unclocked { steps } => {
                for step in steps {
                    match step {
                        Step::Assign(assignment) => registers.apply(assignment)?,
                        Step::Call => {
                            outputs = self.evaluate(target, &registers.inputs(plan)?)?;
                            invocations += 1;
                            lines.push(format_values(&outputs));
                        }
                    }
                }
            }
            PlanMode::Clocked {
                duration,
                setup,
                guards,
                feedback,
            } => {
                for assignment in setup {
                    registers.apply(assignment)?;
                }
                let mut previous = registers.inputs(plan)?;

                for t in 0..*duration {
                    if let Some(guard) = guards.iter().find(|guard| guard.cycle == t) {
                        for assignment in &guard.body {
                            registers.apply(assignment)?;
                        }
                    }

                    let current = registers.inputs(plan)?;
                    if t == 0 || current != previous {
                        outputs = self.evaluate(target, &current)?;
                        invocations += 1;
                    }
                    previous = current;

                    for copy in feedback {
                        let position = plan
                            .outputs
                            .iter()
                            .position(|spec| spec.name == copy.output)
                            .ok_or_else(|| CompileError::simulation(format!("unknown output '{}'", copy.output)))?;
                        registers.values.insert(copy.input.clone(), outputs[position].clone());
                    }

                    lines.push(format!("t={} {}", t, format_values(&outputs)));
                }
                lines.push(REPORT_DELIMITER.to_string());
            }
        }

        debug!("Simulated '{}': {} evaluation(s)", target.name, invocations);
        Ok(SimulationOutput { lines, invocations })
    }
}

fn assign<'c>(env: &mut HashMap<&'c str, Value>, target: &'c Target, value: Value) -> CompileResult<()> {
    match target.index {
        None => {
            env.insert(&target.name, value);
            Ok(())
        }
        Some(index) => set_line(env.get_mut(target.name.as_str()), &target.name, index, value),
    }
}

fn set_line(slot: Option<&mut Value>, name: &str, index: usize, value: Value) -> CompileResult<()> {
    match (slot, value) {
        (Some(Value::Bus(lines)), Value::Bit(bit)) if index < lines.len() => {
            lines[index] = bit;
            Ok(())
        }
        _ => Err(CompileError::simulation(format!("cannot assign line {} of '{}'", index, name))),
    }
}

/// Script variables of a running plan
struct Registers {
    values: HashMap<String, Value>,
}

impl Registers {
    fn new(plan: &SimulationPlan) -> Self {
        let values = plan
            .inputs
            .iter()
            .map(|spec| (spec.name.clone(), Value::unknown(spec.shape)))
            .collect();
        Self { values }
    }

    fn apply(&mut self, assignment: &Assignment) -> CompileResult<()> {
        match assignment.index {
            None => {
                self.values.insert(assignment.name.clone(), assignment.value.clone());
                Ok(())
            }
            Some(index) => set_line(
                self.values.get_mut(&assignment.name),
                &assignment.name,
                index,
                assignment.value.clone(),
            ),
        }
    }

    /// Current values in the chip's input order
    fn inputs(&self, plan: &SimulationPlan) -> CompileResult<Vec<Value>> {
        plan.inputs
            .iter()
            .map(|spec| {
                self.values
                    .get(&spec.name)
                    .cloned()
                    .ok_or_else(|| CompileError::simulation(format!("'{}' has no value", spec.name)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::context::CompilationContext;
    use crate::parser::Parser;
    use crate::script::SimulationScript;
    use pretty_assertions::assert_eq;
    use SignalValue::*;

    const AND2: &str = "#and2\nSIM\nIN a b\nOUT y\nCON\ny = and(a, b)\nEND\n";

    fn design(source: &str) -> Design {
        let mut ctx = CompilationContext::new();
        let chips = Parser::new(source).parse_program(&mut ctx).unwrap();
        Analyzer::new().analyze(chips).unwrap()
    }

    fn run(source: &str, script: &str, clocked: bool) -> SimulationOutput {
        let design = design(source);
        let target = design.simulation_target().unwrap();
        let mut ctx = CompilationContext::new();
        let plan = SimulationScript::parse(script)
            .unwrap()
            .plan(&design, target, clocked, &mut ctx)
            .unwrap();
        Simulator::new(&design).run(&plan).unwrap()
    }

    #[test]
    fn test_evaluate_half_adder() {
        let design = design(
            "#half_adder\nIN a b\nOUT s c\nCON\nc = and(a, b)\ns = and(or(a, b), not(c))\nEND\n",
        );
        let chip = design.chip("half_adder").unwrap();
        let sim = Simulator::new(&design);
        assert_eq!(
            sim.evaluate(chip, &[Value::Bit(One), Value::Bit(One)]).unwrap(),
            vec![Value::Bit(Zero), Value::Bit(One)]
        );
        assert_eq!(
            sim.evaluate(chip, &[Value::Bit(One), Value::Bit(Unknown)]).unwrap(),
            vec![Value::Bit(Unknown), Value::Bit(Unknown)]
        );
    }

    #[test]
    fn test_nested_calls_and_buses() {
        let source = "\
#swap
IN d[2]
OUT q[2]
CON
q[0] = d[1]
q[1] = d[0]
END
#top
IN d[2]
OUT q[2] hi
CON
q = swap(d)
hi = q[0]
END
";
        let design = design(source);
        let sim = Simulator::new(&design);
        let outputs = sim
            .evaluate(design.chip("top").unwrap(), &[Value::Bus(vec![Zero, One])])
            .unwrap();
        assert_eq!(format_values(&outputs), "[1 0] 1");
    }

    #[test]
    fn test_unclocked_and_chip() {
        let output = run(AND2, "in a b\na = 1\nb = 0\ncall\nb = 1\ncall\n", false);
        assert_eq!(output.lines, vec!["0", "1"]);
        assert_eq!(output.invocations, 2);
    }

    #[test]
    fn test_stable_inputs_evaluate_once() {
        let output = run(AND2, "in a b\ndur = 3\na = 1\nb = 1\n", true);
        assert_eq!(output.lines, vec!["t=0 1", "t=1 1", "t=2 1", "---"]);
        assert_eq!(output.invocations, 1);
        assert_eq!(output.text(), "t=0 1\nt=1 1\nt=2 1\n---\n");
    }

    #[test]
    fn test_guards_change_inputs() {
        let output = run(AND2, "in a b\ndur = 4\na = 1\nb = 0\nt = 2 {\nb = 1\n}\n", true);
        assert_eq!(output.lines, vec!["t=0 0", "t=1 0", "t=2 1", "t=3 1", "---"]);
        assert_eq!(output.invocations, 2);
    }

    #[test]
    fn test_feedback_has_one_cycle_delay() {
        let source = "#toggle\nSIM\nCLOCKED\nIN en (fb|q)\nOUT q\nCON\nq = and(en, not(fb))\nEND\n";
        let output = run(source, "in en fb\ndur = 4\nen = 1\nfb = 0\n", true);
        assert_eq!(output.lines, vec!["t=0 1", "t=1 0", "t=2 1", "t=3 0", "---"]);
        assert_eq!(output.invocations, 4);
    }

    #[test]
    fn test_zero_duration_report() {
        let output = run(AND2, "in a b\ndur = 0\n", true);
        assert_eq!(output.text(), "---\n");
        assert_eq!(output.invocations, 0);
    }

    #[test]
    fn test_evaluate_rejects_wrong_arity() {
        let design = design(AND2);
        let err = Simulator::new(&design)
            .evaluate(design.chip("and2").unwrap(), &[Value::Bit(One)])
            .unwrap_err();
        assert!(matches!(err, CompileError::Simulation { .. }));
    }
}
