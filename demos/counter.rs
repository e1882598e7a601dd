//! Example: Clocked Toggle Counter
//!
//! A two-bit counter whose state is fed back from its own outputs. The
//! clocked simulation re-evaluates the chip only when an input changed and
//! writes one report line per cycle.
//!
//! Run with: cargo run --example counter

use hdl_to_go::{build, CompilerConfig, MemorySink, MemorySource};

const COUNTER: &str = "\
#counter2
SIM
CLOCKED
IN en (q0_in|q0) (q1_in|q1)
OUT q0 q1
CON
q0 = or(and(en, not(q0_in)), and(not(en), q0_in))
carry = and(en, q0_in)
q1 = or(and(carry, not(q1_in)), and(not(carry), q1_in))
END
";

const SCRIPT: &str = "\
in en lo hi
dur = 8
en = 1
lo = 0
hi = 0
// hold the count for two cycles
t = 4 {
    en = 0
}
t = 6 {
    en = 1
}
";

fn main() {
    println!("=== Clocked Counter Example ===\n");

    let loader = MemorySource::new()
        .with("counter.hdl", COUNTER)
        .with("counter.tst", SCRIPT);
    let config = CompilerConfig::with_script("counter.tst").report_to("counter.out");
    let mut sink = MemorySink::new();

    let compilation = match build("counter.hdl", &config, &loader, &mut sink) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Compilation failed: {}", e);
            std::process::exit(1);
        }
    };

    for diagnostic in &compilation.diagnostics {
        println!("warning: {}", diagnostic);
    }

    for (name, text) in &sink.written {
        println!("--- {} ({} bytes) ---", name, text.len());
    }

    println!("\nReport (q0 q1 per cycle):");
    if let Some(text) = sink.get("counter.out") {
        print!("{}", text);
    }
}
