//! Example: Half and Full Adders
//!
//! Compiles a half adder and a full adder built from two half adders,
//! then drives the full adder through every input combination.
//!
//! Run with: cargo run --example half_adder

use hdl_to_go::{compile_source, Analyzer, CodeGenerator, CompilationContext, CompilerConfig, MemorySource, Parser};

const ADDERS: &str = "\
// Sum and carry of two bits
#half_adder
IN a b
OUT s c
CON
c = and(a, b)
s = and(or(a, b), not(c))
END

#full_adder
SIM
IN a b cin
OUT s cout
CON
s1, c1 = half_adder(a, b)
s, c2 = half_adder(s1, cin)
cout = or(c1, c2)
END
";

const SCRIPT: &str = "\
in a b cin
a = 0
b = 0
cin = 0
call
cin = 1
call
b = 1
call
a = 1
call
";

fn main() {
    println!("=== Half/Full Adder Example ===\n");

    // Example 1: the stages by hand
    println!("Example 1: Parse, analyze and generate");
    let mut ctx = CompilationContext::new();
    let chips = Parser::new(ADDERS).parse_program(&mut ctx).unwrap();
    let design = Analyzer::new().analyze(chips).unwrap();

    for chip in &design.chips {
        let locals: Vec<String> = chip.locals.iter().map(ToString::to_string).collect();
        println!("  {}: locals [{}]", chip.name, locals.join(", "));
    }

    let program = CodeGenerator::new().generate(&design).unwrap();
    println!("\nGenerated functions:\n");
    println!("{}", program.functions);

    // Example 2: the whole pipeline with a script
    println!("Example 2: Scripted simulation");
    let loader = MemorySource::new().with("full_adder.tst", SCRIPT);
    let config = CompilerConfig::with_script("full_adder.tst");
    let compilation = compile_source(ADDERS, &config, &loader).unwrap();

    println!("  a b cin -> s cout");
    let inputs = ["0 0 0", "0 0 1", "0 1 1", "1 1 1"];
    for (input, output) in inputs.iter().zip(&compilation.transcript) {
        println!("  {}   -> {}", input, output);
    }

    println!("\nGenerated main:\n");
    let main_start = compilation.program.find("func main()").unwrap_or(0);
    println!("{}", &compilation.program[main_start..]);
}
