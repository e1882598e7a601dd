//! Example: Include Blocks
//!
//! Builds a design from a small gate library spread over several sources.
//! The same chip reached through two include paths is loaded only once and
//! reported as a warning.
//!
//! Run with: cargo run --example library_includes

use hdl_to_go::{compile, CompilerConfig, MemorySource};

const BASIC: &str = "\
#nand2
IN a b
OUT y
CON
y = not(and(a, b))
END
";

const XOR: &str = "\
[
basic.hdl
]
#xor2
IN a b
OUT y
CON
n = nand2(a, b)
y = and(or(a, b), n)
END
";

const MUX: &str = "\
[
basic.hdl
]
#mux2
IN s d0 d1
OUT y
CON
y = nand2(nand2(d0, not(s)), nand2(d1, s))
END
";

const TOP: &str = "\
[
xor.hdl
mux.hdl
]
#parity_select
SIM
IN s a b
OUT p
CON
x = xor2(a, b)
p = mux2(s, x, a)
END
";

fn main() {
    println!("=== Include Block Example ===\n");

    let loader = MemorySource::new()
        .with("basic.hdl", BASIC)
        .with("xor.hdl", XOR)
        .with("mux.hdl", MUX)
        .with("top.hdl", TOP)
        .with("top.tst", "in s a b\ns = 0\na = 1\nb = 0\ncall\n");

    let config = CompilerConfig::with_script("top.tst");
    let compilation = compile("top.hdl", &config, &loader).unwrap();

    let names: Vec<&str> = compilation.design.chips.iter().map(|c| c.name.as_str()).collect();
    println!("Chips in load order: {}", names.join(", "));
    for diagnostic in &compilation.diagnostics {
        println!("warning: {}", diagnostic);
    }
    println!("Simulation output: {:?}", compilation.transcript);

    // A cycle between sources is rejected before any chip is parsed
    println!("\nExample 2: Include cycle");
    let cyclic = MemorySource::new()
        .with("a.hdl", "[\nb.hdl\n]\n")
        .with("b.hdl", "[\na.hdl\n]\n");
    match compile("a.hdl", &CompilerConfig::default(), &cyclic) {
        Ok(_) => println!("  unexpectedly compiled"),
        Err(e) => println!("  {}", e),
    }
}
