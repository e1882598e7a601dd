//! HDL to Go Compiler
//!
//! This library compiles a small chip description language into Go. Every
//! chip becomes a Go function over tri-state values; a chip marked `SIM` can
//! additionally be driven by a simulation script, which adds a `func main`
//! to the program and, for clocked simulations, a report of every cycle.
//!
//! # Example
//!
//! ```rust
//! use hdl_to_go::{compile_source, CompilerConfig, MemorySource};
//!
//! let source = "#and2\nSIM\nIN a b\nOUT y\nCON\ny = and(a, b)\nEND\n";
//! let loader = MemorySource::new().with("and2.tst", "in a b\na = 1\nb = 1\ncall\n");
//! let config = CompilerConfig::with_script("and2.tst");
//!
//! let compilation = compile_source(source, &config, &loader).unwrap();
//! assert!(compilation.program.contains("func and2(a string, b string) (string)"));
//! assert_eq!(compilation.transcript, vec!["1"]);
//! ```

pub mod analyzer;
pub mod ast;
pub mod codegen;
pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod preprocess;
pub mod script;
pub mod signal;
pub mod simulator;
pub mod source;

pub use analyzer::Analyzer;
pub use ast::*;
pub use codegen::{CodeGenerator, GoProgram};
pub use config::{ClockPolicy, CompilerConfig, RunMode, DEFAULT_PROGRAM_DESTINATION};
pub use context::{CompilationContext, Diagnostic};
pub use driver::DriverSynthesizer;
pub use error::{CompileError, CompileResult};
pub use parser::Parser;
pub use preprocess::Preprocessor;
pub use script::{SimulationPlan, SimulationScript};
pub use signal::{Gate, SignalShape, SignalSpec, SignalValue, Value};
pub use simulator::{SimulationOutput, Simulator};
pub use source::{FsSink, FsSource, MemorySink, MemorySource, Sink, SourceLoader};

use tracing::info;

/// The clocked simulation report and where it goes
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub destination: String,
    pub text: String,
}

/// Everything one successful compilation produced
#[derive(Debug, Clone)]
pub struct Compilation {
    pub design: Design,
    /// The complete Go program
    pub program: String,
    /// Only present for clocked simulations
    pub report: Option<Report>,
    /// Lines the program prints for an unclocked simulation
    pub transcript: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile the named source
pub fn compile(source_name: &str, config: &CompilerConfig, loader: &dyn SourceLoader) -> CompileResult<Compilation> {
    let source = loader.load(source_name)?;
    compile_source(&source, config, loader)
}

/// Compile source text; includes and the script are resolved through `loader`
pub fn compile_source(source: &str, config: &CompilerConfig, loader: &dyn SourceLoader) -> CompileResult<Compilation> {
    let mut ctx = CompilationContext::new();

    // Expand include blocks into one flat buffer
    let flat = Preprocessor::new(loader).resolve(source, &mut ctx)?;

    // Parse chip blocks
    let chips = Parser::new(&flat).parse_program(&mut ctx)?;

    // Check shapes and statement order
    let design = Analyzer::new().analyze(chips)?;

    // Generate chip functions
    let mut program = CodeGenerator::new().generate(&design)?;

    let mut report = None;
    let mut transcript = Vec::new();

    match (ctx.simulation_target().map(str::to_string), &config.run_mode) {
        (_, RunMode::Stdin) => ctx.warn(Diagnostic::StdinNotReady),
        (None, RunMode::Script(_)) => ctx.warn(Diagnostic::NothingToSimulate),
        (Some(chip), RunMode::None) => ctx.warn(Diagnostic::NoScript { chip }),
        (None, RunMode::None) => {}
        (Some(chip), RunMode::Script(script_name)) => {
            let target = design
                .chip(&chip)
                .ok_or_else(|| CompileError::codegen(format!("simulation target '{}' was not analyzed", chip)))?;
            let script = load_script(loader, script_name)?;

            let clocked = ctx.clocked_mode(config.clock_policy, target.is_clocked);
            let plan = script.plan(&design, target, clocked, &mut ctx)?;
            if !clocked && config.report_destination.is_some() {
                ctx.warn(Diagnostic::ReportIgnored);
            }

            DriverSynthesizer::new(&design, &plan)
                .synthesize(config.report_destination.as_deref())?
                .attach_to(&mut program);

            let output = Simulator::new(&design).run(&plan)?;
            match (&config.report_destination, clocked) {
                (Some(destination), true) => {
                    report = Some(Report {
                        destination: destination.clone(),
                        text: output.text(),
                    })
                }
                _ => transcript = output.lines,
            }
        }
    }

    info!(
        "Compiled {} chip(s), {} diagnostic(s)",
        design.chips.len(),
        ctx.diagnostics().len()
    );

    Ok(Compilation {
        design,
        program: program.render(),
        report,
        transcript,
        diagnostics: ctx.into_diagnostics(),
    })
}

fn load_script(loader: &dyn SourceLoader, name: &str) -> CompileResult<SimulationScript> {
    let text = loader.load(name).map_err(|e| match e {
        CompileError::SourceNotFound { name } => CompileError::ScriptNotFound { name },
        other => other,
    })?;

    let script = SimulationScript::parse(&text)?;
    if script.is_empty() {
        return Err(CompileError::EmptyScript { name: name.to_string() });
    }
    Ok(script)
}

/// Write the program and, when present, the report
pub fn write_artifacts(compilation: &Compilation, config: &CompilerConfig, sink: &mut dyn Sink) -> CompileResult<()> {
    sink.write(&config.program_destination, &compilation.program)?;
    if let Some(report) = &compilation.report {
        sink.write(&report.destination, &report.text)?;
    }
    Ok(())
}

/// Compile and write in one step; nothing is written unless compilation succeeds
pub fn build(
    source_name: &str,
    config: &CompilerConfig,
    loader: &dyn SourceLoader,
    sink: &mut dyn Sink,
) -> CompileResult<Compilation> {
    let compilation = compile(source_name, config, loader)?;
    write_artifacts(&compilation, config, sink)?;
    Ok(compilation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GATES: &str = "\
#and2
IN a b
OUT y
CON
y = and(a, b)
END
#or2
IN a b
OUT y
CON
y = or(a, b)
END
";

    const COUNTER_BIT: &str = "\
[
gates.hdl
]
#flip
SIM
CLOCKED
IN en (fb|q)
OUT q
CON
q = or2(and2(en, not(fb)), and2(not(en), fb))
END
";

    fn loader() -> MemorySource {
        MemorySource::new()
            .with("gates.hdl", GATES)
            .with("flip.hdl", COUNTER_BIT)
            .with("flip.tst", "in en fb\ndur = 4\nfb = 0\nen = 1\nt = 2 {\nen = 0\n}\n")
    }

    #[test]
    fn test_compile_without_script() {
        let config = CompilerConfig::default();
        let compilation = compile("gates.hdl", &config, &loader()).unwrap();
        assert!(compilation.program.contains("func and2(a string, b string) (string) {"));
        assert!(compilation.program.ends_with("func main() {}\n"));
        assert!(compilation.report.is_none());
        assert!(compilation.diagnostics.is_empty());
    }

    #[test]
    fn test_clocked_pipeline_writes_both_artifacts() {
        let config = CompilerConfig::with_script("flip.tst").report_to("flip.out");
        let mut sink = MemorySink::new();
        let compilation = build("flip.hdl", &config, &loader(), &mut sink).unwrap();

        assert_eq!(sink.written.len(), 2);
        assert_eq!(sink.get("main.go"), Some(compilation.program.as_str()));
        assert_eq!(
            sink.get("flip.out"),
            Some("t=0 1\nt=1 0\nt=2 0\nt=3 0\n---\n")
        );
        assert!(compilation.program.contains("import (\n\t\"fmt\"\n\t\"os\"\n)"));
        assert!(compilation.program.contains("os.WriteFile(\"flip.out\""));
    }

    #[test]
    fn test_clocked_without_destination_writes_nothing() {
        let config = CompilerConfig::with_script("flip.tst");
        let mut sink = MemorySink::new();
        let err = build("flip.hdl", &config, &loader(), &mut sink).unwrap_err();
        assert!(matches!(err, CompileError::MissingOutputDestination { .. }));
        assert!(sink.written.is_empty());
    }

    #[test]
    fn test_two_simulation_targets_write_nothing() {
        let source = "#a\nSIM\nIN x\nOUT y\nCON\ny = x\nEND\n#b\nSIM\nIN x\nOUT y\nCON\ny = x\nEND\n";
        let loader = MemorySource::new().with("two.hdl", source);
        let mut sink = MemorySink::new();
        let err = build("two.hdl", &CompilerConfig::default(), &loader, &mut sink).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateSimulationTarget { .. }));
        assert!(sink.written.is_empty());
    }

    #[test]
    fn test_driver_names_cannot_be_shadowed() {
        let source = "#reg\nSIM\nCLOCKED\nIN a\nOUT sim_report\nCON\nsim_report = a\nEND\n";
        let loader = MemorySource::new()
            .with("reg.hdl", source)
            .with("reg.tst", "in a\ndur = 2\na = 1\n");
        let config = CompilerConfig::with_script("reg.tst").report_to("reg.out");
        let mut sink = MemorySink::new();
        let err = build("reg.hdl", &config, &loader, &mut sink).unwrap_err();
        assert!(matches!(err, CompileError::CodeGen { .. }));
        assert!(sink.written.is_empty());

        let source = "#sim_t\nIN a\nOUT y\nCON\ny = a\nEND\n#top\nSIM\nCLOCKED\nIN a\nOUT y\nCON\ny = sim_t(a)\nEND\n";
        let loader = MemorySource::new().with("top.tst", "in a\ndur = 2\na = 1\n");
        let err = compile_source(source, &config, &loader).unwrap_err();
        assert!(matches!(err, CompileError::CodeGen { message } if message.contains("sim_t")));
    }

    #[test]
    fn test_duplicate_include_is_reported() {
        let source = "[\ngates.hdl\ngates.hdl\n]\n";
        let compilation = compile_source(source, &CompilerConfig::default(), &loader()).unwrap();
        assert_eq!(compilation.design.chips.len(), 2);
        assert_eq!(
            compilation.diagnostics,
            vec![
                Diagnostic::DuplicateChip {
                    name: "and2".to_string(),
                    origin: "gates.hdl".to_string()
                },
                Diagnostic::DuplicateChip {
                    name: "or2".to_string(),
                    origin: "gates.hdl".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_unclocked_transcript() {
        let source = "[\ngates.hdl\n]\n#top\nSIM\nIN a b\nOUT y z\nCON\ny = and2(a, b)\nz = or2(a, b)\nEND\n";
        let loader = loader().with("top.tst", "in a b\na = 1\nb = 0\ncall\nb = X\ncall\n");
        let config = CompilerConfig::with_script("top.tst").report_to("ignored.txt");
        let compilation = compile_source(source, &config, &loader).unwrap();
        assert_eq!(compilation.transcript, vec!["0 1", "X 1"]);
        assert!(compilation.report.is_none());
        assert_eq!(compilation.diagnostics, vec![Diagnostic::ReportIgnored]);
    }

    #[test]
    fn test_script_errors() {
        let source = "#and2\nSIM\nIN a b\nOUT y\nCON\ny = and(a, b)\nEND\n";
        let loader = MemorySource::new().with("blank.tst", "\n  // nothing here\n");

        let err = compile_source(source, &CompilerConfig::with_script("missing.tst"), &loader).unwrap_err();
        assert!(matches!(err, CompileError::ScriptNotFound { name } if name == "missing.tst"));

        let err = compile_source(source, &CompilerConfig::with_script("blank.tst"), &loader).unwrap_err();
        assert!(matches!(err, CompileError::EmptyScript { .. }));

        let clocked = "#tick\nSIM\nCLOCKED\nIN a\nOUT y\nCON\ny = a\nEND\n";
        let loader = MemorySource::new().with("long.tst", "in a\ndur = 9223372036854775808\na = 1\n");
        let config = CompilerConfig::with_script("long.tst").report_to("long.out");
        let err = compile_source(clocked, &config, &loader).unwrap_err();
        assert!(matches!(err, CompileError::Script { line: 2, .. }));
    }

    #[test]
    fn test_run_mode_diagnostics() {
        let sim = "#and2\nSIM\nIN a b\nOUT y\nCON\ny = and(a, b)\nEND\n";
        let loader = MemorySource::new().with("s.tst", "in a b\ncall\n");

        let compilation = compile_source(sim, &CompilerConfig::default(), &loader).unwrap();
        assert_eq!(
            compilation.diagnostics,
            vec![Diagnostic::NoScript {
                chip: "and2".to_string()
            }]
        );

        let compilation = compile_source(sim, &CompilerConfig::new(RunMode::Stdin), &loader).unwrap();
        assert_eq!(compilation.diagnostics, vec![Diagnostic::StdinNotReady]);

        let compilation = compile_source(GATES, &CompilerConfig::with_script("s.tst"), &loader).unwrap();
        assert_eq!(compilation.diagnostics, vec![Diagnostic::NothingToSimulate]);
    }

    #[test]
    fn test_clock_policy_any_chip() {
        // The target itself is not clocked, but another chip is
        let source = "#tick\nCLOCKED\nIN a\nOUT y\nCON\ny = a\nEND\n#and2\nSIM\nIN a b\nOUT y\nCON\ny = and(a, b)\nEND\n";
        let loader = MemorySource::new()
            .with("u.tst", "in a b\na = 1\nb = 1\ncall\n")
            .with("c.tst", "in a b\ndur = 2\na = 1\nb = 1\n");

        let compilation = compile_source(source, &CompilerConfig::with_script("u.tst"), &loader).unwrap();
        assert_eq!(compilation.transcript, vec!["1"]);
        assert!(compilation.diagnostics.iter().any(|d| matches!(d, Diagnostic::ClockPolicyMismatch { .. })));

        let config = CompilerConfig::with_script("c.tst")
            .report_to("out.txt")
            .clock_policy(ClockPolicy::AnyChip);
        let compilation = compile_source(source, &config, &loader).unwrap();
        assert_eq!(compilation.report.unwrap().text, "t=0 1\nt=1 1\n---\n");
    }
}
