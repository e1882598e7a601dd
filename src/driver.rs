//! Go `main` synthesis for the simulation target
//!
//! Unclocked plans print one line per `call`. Clocked plans run a fixed
//! number of cycles, re-evaluate the chip only when an input changed since
//! the previous cycle, and write the accumulated report to a file.

use tracing::debug;

use crate::ast::{ChipDefinition, Design};
use crate::codegen::{call_args, go_string_literal, go_value, GoProgram, GoWriter};
use crate::error::{CompileError, CompileResult};
use crate::script::{Assignment, Guard, PlanMode, SimulationPlan, Step, DRIVER_PREFIX};
use crate::signal::Value;

/// The synthesized `func main` and the imports it needs
#[derive(Debug, Clone, PartialEq)]
pub struct Driver {
    pub imports: Vec<&'static str>,
    pub main: String,
}

impl Driver {
    /// Replace the program's placeholder `main`
    pub fn attach_to(self, program: &mut GoProgram) {
        program.imports = self.imports;
        program.main = self.main;
    }
}

/// Synthesizes the driver for one simulation plan
pub struct DriverSynthesizer<'a> {
    design: &'a Design,
    plan: &'a SimulationPlan,
}

impl<'a> DriverSynthesizer<'a> {
    pub fn new(design: &'a Design, plan: &'a SimulationPlan) -> Self {
        Self { design, plan }
    }

    pub fn synthesize(&self, report_destination: Option<&str>) -> CompileResult<Driver> {
        let mut targets = self.design.chips.iter().filter(|chip| chip.is_simulation_target);
        let target = match (targets.next(), targets.next()) {
            (Some(first), Some(second)) => {
                return Err(CompileError::DuplicateSimulationTarget {
                    first: first.name.clone(),
                    second: second.name.clone(),
                })
            }
            (Some(target), None) if target.name == self.plan.chip => target,
            _ => {
                return Err(CompileError::codegen(format!(
                    "'{}' is not the simulation target",
                    self.plan.chip
                )))
            }
        };

        let driver = match &self.plan.mode {
            PlanMode::Unclocked { steps } => self.unclocked(target, steps),
            PlanMode::Clocked {
                duration,
                setup,
                guards,
                feedback,
            } => {
                let destination = report_destination.ok_or_else(|| CompileError::MissingOutputDestination {
                    chip: target.name.clone(),
                })?;
                let mut w = GoWriter::new();
                w.open("func main() {");
                self.declare_registers(&mut w);
                w.line(format!("{}report := \"\"", DRIVER_PREFIX));
                for assignment in setup {
                    w.line(assignment_line(assignment));
                }
                for input in &self.plan.inputs {
                    w.line(format!("{}prev_{} := {}", DRIVER_PREFIX, input.name, input.name));
                }

                w.open(format!(
                    "for {p}t := 0; {p}t < {}; {p}t++ {{",
                    duration,
                    p = DRIVER_PREFIX
                ));
                self.guard_chain(&mut w, guards);

                let mut changed = vec![format!("{}t == 0", DRIVER_PREFIX)];
                changed.extend(
                    self.plan
                        .inputs
                        .iter()
                        .map(|input| format!("{} != {}prev_{}", input.name, DRIVER_PREFIX, input.name)),
                );
                w.open(format!("if {} {{", changed.join(" || ")));
                w.line(self.call_line(target));
                w.close("}");

                for input in &self.plan.inputs {
                    w.line(format!("{}prev_{} = {}", DRIVER_PREFIX, input.name, input.name));
                }
                for copy in feedback {
                    w.line(format!("{} = {}", copy.input, copy.output));
                }
                w.line(format!(
                    "{p}report += fmt.Sprintln(fmt.Sprint(\"t=\", {p}t), {})",
                    self.output_names(),
                    p = DRIVER_PREFIX
                ));
                w.close("}");

                w.line(format!("{}report += \"---\\n\"", DRIVER_PREFIX));
                w.open(format!(
                    "if err := os.WriteFile({}, []byte({}report), 0644); err != nil {{",
                    go_string_literal(destination),
                    DRIVER_PREFIX
                ));
                w.line("fmt.Fprintln(os.Stderr, err)");
                w.line("os.Exit(1)");
                w.close("}");
                w.close("}");

                Driver {
                    imports: vec!["fmt", "os"],
                    main: w.finish(),
                }
            }
        };

        debug!("Synthesized driver for '{}'", target.name);
        Ok(driver)
    }

    fn unclocked(&self, target: &ChipDefinition, steps: &[Step]) -> Driver {
        if !steps.iter().any(|step| matches!(step, Step::Call)) {
            return Driver {
                imports: Vec::new(),
                main: "func main() {}\n".to_string(),
            };
        }

        let mut w = GoWriter::new();
        w.open("func main() {");
        self.declare_registers(&mut w);
        for step in steps {
            match step {
                Step::Assign(assignment) => w.line(assignment_line(assignment)),
                Step::Call => {
                    w.line(self.call_line(target));
                    w.line(format!("fmt.Println({})", self.output_names()));
                }
            }
        }
        w.close("}");

        Driver {
            imports: vec!["fmt"],
            main: w.finish(),
        }
    }

    /// Input variables and output registers, all unknown
    fn declare_registers(&self, w: &mut GoWriter) {
        for spec in self.plan.inputs.iter().chain(&self.plan.outputs) {
            w.line(format!("{} := {}", spec.name, go_value(&Value::unknown(spec.shape))));
        }
    }

    fn guard_chain(&self, w: &mut GoWriter, guards: &[Guard]) {
        for (i, guard) in guards.iter().enumerate() {
            let condition = format!("{}t == {}", DRIVER_PREFIX, guard.cycle);
            if i == 0 {
                w.open(format!("if {} {{", condition));
            } else {
                w.reopen(format!("}} else if {} {{", condition));
            }
            for assignment in &guard.body {
                w.line(assignment_line(assignment));
            }
        }
        if !guards.is_empty() {
            w.close("}");
        }
    }

    fn call_line(&self, target: &ChipDefinition) -> String {
        let args: Vec<String> = self.plan.inputs.iter().map(|spec| spec.name.clone()).collect();
        format!("{} = {}({})", self.output_names(), target.name, call_args(target, &args))
    }

    fn output_names(&self) -> String {
        self.plan
            .outputs
            .iter()
            .map(|spec| spec.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn assignment_line(assignment: &Assignment) -> String {
    match assignment.index {
        Some(index) => format!("{}[{}] = {}", assignment.name, index, go_value(&assignment.value)),
        None => format!("{} = {}", assignment.name, go_value(&assignment.value)),
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

    const AND2: &str = "#and2\nSIM\nIN a b\nOUT y\nCON\ny = and(a, b)\nEND\n";
    const TOGGLE: &str = "\
#toggle
SIM
CLOCKED
IN en d[2] (fb|q)
OUT q
CON
q = or(and(en, not(fb)), d[1])
END
";

    fn synthesize(source: &str, script: &str, clocked: bool, destination: Option<&str>) -> CompileResult<Driver> {
        let mut ctx = CompilationContext::new();
        let chips = Parser::new(source).parse_program(&mut ctx)?;
        let design = Analyzer::new().analyze(chips)?;
        let target = design.simulation_target().unwrap();
        let plan = SimulationScript::parse(script)?.plan(&design, target, clocked, &mut ctx)?;
        DriverSynthesizer::new(&design, &plan).synthesize(destination)
    }

    #[test]
    fn test_unclocked_driver() {
        let driver = synthesize(AND2, "in a b\na = 1\nb = 0\ncall\nb = 1\ncall\n", false, None).unwrap();
        let expected = "\
func main() {
\ta := \"X\"
\tb := \"X\"
\ty := \"X\"
\ta = \"1\"
\tb = \"0\"
\ty = and2(a, b)
\tfmt.Println(y)
\tb = \"1\"
\ty = and2(a, b)
\tfmt.Println(y)
}
";
        assert_eq!(driver.main, expected);
        assert_eq!(driver.imports, vec!["fmt"]);
    }

    #[test]
    fn test_unclocked_without_calls_is_empty() {
        let driver = synthesize(AND2, "in a b\na = 1\n", false, None).unwrap();
        assert_eq!(driver.main, "func main() {}\n");
        assert!(driver.imports.is_empty());
    }

    #[test]
    fn test_clocked_driver() {
        let script = "in e b f\ndur = 4\ne = 1\nb = 0\nt = 1 {\nb[1] = 1\n}\nt = 2 {\nb = 0\n}\n";
        let driver = synthesize(TOGGLE, script, true, Some("out.txt")).unwrap();
        let expected = "\
func main() {
\te := \"X\"
\tb := [2]string{\"X\", \"X\"}
\tf := \"X\"
\tq := \"X\"
\tsim_report := \"\"
\te = \"1\"
\tb = [2]string{\"0\", \"0\"}
\tsim_prev_e := e
\tsim_prev_b := b
\tsim_prev_f := f
\tfor sim_t := 0; sim_t < 4; sim_t++ {
\t\tif sim_t == 1 {
\t\t\tb[1] = \"1\"
\t\t} else if sim_t == 2 {
\t\t\tb = [2]string{\"0\", \"0\"}
\t\t}
\t\tif sim_t == 0 || e != sim_prev_e || b != sim_prev_b || f != sim_prev_f {
\t\t\tq = toggle(e, f, b)
\t\t}
\t\tsim_prev_e = e
\t\tsim_prev_b = b
\t\tsim_prev_f = f
\t\tf = q
\t\tsim_report += fmt.Sprintln(fmt.Sprint(\"t=\", sim_t), q)
\t}
\tsim_report += \"---\\n\"
\tif err := os.WriteFile(\"out.txt\", []byte(sim_report), 0644); err != nil {
\t\tfmt.Fprintln(os.Stderr, err)
\t\tos.Exit(1)
\t}
}
";
        assert_eq!(driver.main, expected);
        assert_eq!(driver.imports, vec!["fmt", "os"]);
    }

    #[test]
    fn test_clocked_driver_needs_destination() {
        let err = synthesize(TOGGLE, "in e b f\ndur = 1\n", true, None).unwrap_err();
        assert!(matches!(err, CompileError::MissingOutputDestination { chip } if chip == "toggle"));
    }

    #[test]
    fn test_attach_replaces_placeholder_main() {
        let mut program = GoProgram {
            imports: Vec::new(),
            functions: String::new(),
            main: "func main() {}\n".to_string(),
        };
        let driver = synthesize(AND2, "in a b\ncall\n", false, None).unwrap();
        driver.attach_to(&mut program);
        assert_eq!(program.imports, vec!["fmt"]);
        assert!(program.main.contains("fmt.Println(y)"));
    }
}
