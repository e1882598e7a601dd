//! HDL to Go Compiler CLI
//!
//! Usage:
//!   hdl2go adder.hdl
//!   hdl2go adder.hdl -s adder.tst
//!   hdl2go counter.hdl --script counter.tst -o counter.out
//!   hdl2go adder.hdl --emit-ir

use clap::Parser as ClapParser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use hdl_to_go::{
    compile, write_artifacts, ClockPolicy, Compilation, CompilerConfig, FsSink, FsSource, RunMode,
    DEFAULT_PROGRAM_DESTINATION,
};

#[derive(ClapParser, Debug)]
#[command(name = "hdl2go")]
#[command(author = "HDL Team")]
#[command(version = "0.1.0")]
#[command(about = "Compiles chip descriptions to Go, with an optional simulation driver")]
struct Args {
    /// HDL source to compile
    #[arg(value_name = "SOURCE")]
    source: String,

    /// Drive the simulation target with this script
    #[arg(short = 's', long = "script", conflicts_with = "stdin")]
    script: Option<String>,

    /// Drive the simulation target from standard input
    #[arg(short = 'i', long = "stdin")]
    stdin: bool,

    /// Where a clocked simulation writes its report
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Where the generated Go program is written
    #[arg(long = "program", default_value = DEFAULT_PROGRAM_DESTINATION)]
    program: String,

    /// Directory that sources, includes and scripts are resolved against
    #[arg(short = 'I', long = "include-dir")]
    include_dir: Option<String>,

    /// Which CLOCKED markers select the clocked simulation (target, any-chip)
    #[arg(long = "clock-policy", default_value = "target", value_parser = parse_clock_policy)]
    clock_policy: ClockPolicy,

    /// Print the analyzed design as JSON
    #[arg(long = "emit-ir")]
    emit_ir: bool,

    /// Verbose output (repeat for more detail)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_clock_policy(s: &str) -> Result<ClockPolicy, String> {
    s.parse()
}

/// RUST_LOG wins when set and valid; otherwise -v picks the level
fn log_filter(rust_log: Option<String>, verbose: u8) -> EnvFilter {
    if let Some(directives) = rust_log {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }
    // Diagnostics are printed separately, so logging stays quiet unless asked for
    let level = match verbose {
        0 => "error",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    EnvFilter::new(level)
}

fn main() {
    let args = Args::parse();

    let filter = log_filter(std::env::var("RUST_LOG").ok(), args.verbose);
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let run_mode = if args.stdin {
        RunMode::Stdin
    } else if let Some(script) = &args.script {
        RunMode::Script(script.clone())
    } else {
        RunMode::None
    };

    let mut config = CompilerConfig::new(run_mode).clock_policy(args.clock_policy);
    config.program_destination = args.program.clone();
    config.report_destination = args.output.clone();

    if args.verbose > 0 {
        println!("{}", "HDL to Go Compiler".bold().blue());
        println!("{}", "=".repeat(35));
        println!();
        println!("{}: {}", "Source".green(), args.source);
        if let Some(script) = &args.script {
            println!("{}: {}", "Script".green(), script);
        }
        println!();
    }

    let loader = match &args.include_dir {
        Some(dir) => FsSource::with_base(dir),
        None => FsSource::new(),
    };

    let compilation = match compile(&args.source, &config, &loader) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}: {}", "Compilation error".red(), e);
            std::process::exit(1);
        }
    };

    for diagnostic in &compilation.diagnostics {
        eprintln!("{}: {}", "Warning".yellow(), diagnostic);
    }

    if args.emit_ir {
        match compilation.design.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{}: Failed to serialize to JSON: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
    }

    if let Err(e) = write_artifacts(&compilation, &config, &mut FsSink) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }

    print_summary(&compilation, &config, args.verbose > 0);
}

fn print_summary(compilation: &Compilation, config: &CompilerConfig, verbose: bool) {
    println!("{}", "Compilation Results".bold().green());
    println!("{}", "=".repeat(50));
    println!("{}: {}", "Chips".cyan(), compilation.design.chips.len());
    println!("{}: {}", "Program".cyan(), config.program_destination);

    if let Some(target) = compilation.design.simulation_target() {
        let kind = if compilation.report.is_some() { "clocked" } else { "unclocked" };
        println!("{}: {} ({})", "Simulation target".cyan(), target.name, kind);
    }
    if let Some(report) = &compilation.report {
        println!(
            "{}: {} ({} lines)",
            "Report".cyan(),
            report.destination,
            report.text.lines().count()
        );
    }

    if verbose {
        println!();
        println!("{}", "Chip Interfaces".bold().yellow());
        println!("{}", "-".repeat(50));
        for chip in &compilation.design.chips {
            let inputs: Vec<String> = chip.inputs.iter().map(ToString::to_string).collect();
            let outputs: Vec<String> = chip.outputs.iter().map(ToString::to_string).collect();
            println!(
                "  {} ({}) -> ({}), {} statement(s)",
                chip.name.bold(),
                inputs.join(", "),
                outputs.join(", "),
                chip.body.len()
            );
        }
    }

    if !compilation.transcript.is_empty() {
        println!();
        println!("{}", "Simulation".bold().yellow());
        println!("{}", "-".repeat(50));
        for line in &compilation.transcript {
            println!("{}", line);
        }
    }
}
