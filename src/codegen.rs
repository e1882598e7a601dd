//! Go code generator
//!
//! Every chip becomes a Go function over the string values "0", "1" and "X".
//! Bit signals are `string`, buses are `[w]string`. Parameters list bit
//! inputs first, then bus inputs; results follow the declared output order.

use std::collections::HashSet;

use tracing::debug;

use crate::ast::{ChipDefinition, Design, Expr, Statement};
use crate::error::{CompileError, CompileResult};
use crate::script::DRIVER_PREFIX;
use crate::signal::{SignalShape, SignalValue, Value};

/// Go keywords, predeclared identifiers and names the generated program uses itself
const RESERVED: &[&str] = &[
    "break", "case", "chan", "const", "continue", "default", "defer", "else", "fallthrough",
    "for", "func", "go", "goto", "if", "import", "interface", "map", "package", "range",
    "return", "select", "struct", "switch", "type", "var", "any", "append", "bool", "byte",
    "cap", "clear", "close", "comparable", "complex", "complex64", "complex128", "copy",
    "delete", "error", "false", "float32", "float64", "imag", "int", "int8", "int16", "int32",
    "int64", "iota", "len", "make", "max", "min", "new", "nil", "panic", "print", "println",
    "real", "recover", "rune", "string", "true", "uint", "uint8", "uint16", "uint32", "uint64",
    "uintptr", "main", "init", "fmt", "os", "_",
];

const PRELUDE: &str = r#"func not(a string) string {
	switch a {
	case "0":
		return "1"
	case "1":
		return "0"
	}
	return "X"
}

func and(a, b string) string {
	if a == "0" || b == "0" {
		return "0"
	}
	if a == "1" && b == "1" {
		return "1"
	}
	return "X"
}

func or(a, b string) string {
	if a == "1" || b == "1" {
		return "1"
	}
	if a == "0" && b == "0" {
		return "0"
	}
	return "X"
}
"#;

pub fn is_go_reserved(name: &str) -> bool {
    RESERVED.contains(&name)
}

/// Reject names Go would not accept as a plain identifier in our output
pub fn check_go_identifier(name: &str, what: &str) -> CompileResult<()> {
    if is_go_reserved(name) {
        return Err(CompileError::codegen(format!(
            "{} '{}' is reserved in the generated Go program",
            what, name
        )));
    }
    if name.starts_with(DRIVER_PREFIX) {
        return Err(CompileError::codegen(format!(
            "{} '{}' uses the '{}' prefix reserved for the simulation driver",
            what, name, DRIVER_PREFIX
        )));
    }
    Ok(())
}

pub fn go_type(shape: SignalShape) -> String {
    match shape {
        SignalShape::Bit => "string".to_string(),
        SignalShape::Bus(width) => format!("[{}]string", width),
    }
}

pub fn go_literal(value: SignalValue) -> String {
    format!("\"{}\"", value)
}

/// Composite literal for a runtime value
pub fn go_value(value: &Value) -> String {
    match value {
        Value::Bit(v) => go_literal(*v),
        Value::Bus(lines) => {
            let items: Vec<String> = lines.iter().map(|v| go_literal(*v)).collect();
            format!("[{}]string{{{}}}", lines.len(), items.join(", "))
        }
    }
}

/// Quote arbitrary text as a Go interpreted string literal
pub fn go_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Arguments of a call, reordered into the callee's parameter order
pub fn call_args(callee: &ChipDefinition, args: &[String]) -> String {
    callee
        .parameter_order()
        .into_iter()
        .filter_map(|i| args.get(i).map(String::as_str))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Indentation-aware line buffer
#[derive(Debug, Default)]
pub struct GoWriter {
    buf: String,
    depth: usize,
}

impl GoWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.buf.push('\t');
        }
        self.buf.push_str(text.as_ref());
        self.buf.push('\n');
    }

    /// Write a line ending in `{` and indent what follows
    pub fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.depth += 1;
    }

    /// Dedent and write the closing line
    pub fn close(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    /// Write a line such as `} else {` between two indented blocks
    pub fn reopen(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
        self.depth += 1;
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// A generated Go program, kept in parts until the driver is attached
#[derive(Debug, Clone, PartialEq)]
pub struct GoProgram {
    pub imports: Vec<&'static str>,
    /// Gate prelude and chip functions
    pub functions: String,
    /// The complete `func main` declaration
    pub main: String,
}

impl GoProgram {
    pub fn render(&self) -> String {
        let mut out = String::from("// Code generated by hdl2go. DO NOT EDIT.\n\npackage main\n\n");
        match self.imports.as_slice() {
            [] => {}
            [single] => out.push_str(&format!("import \"{}\"\n\n", single)),
            many => {
                out.push_str("import (\n");
                for import in many {
                    out.push_str(&format!("\t\"{}\"\n", import));
                }
                out.push_str(")\n\n");
            }
        }
        out.push_str(&self.functions);
        out.push('\n');
        out.push_str(&self.main);
        out
    }
}

/// Code generator for chip functions
pub struct CodeGenerator {
    function_counter: usize,
}

impl CodeGenerator {
    pub fn new() -> Self {
        Self { function_counter: 0 }
    }

    /// Generate the gate prelude and one function per chip, with an empty main
    pub fn generate(&mut self, design: &Design) -> CompileResult<GoProgram> {
        let mut functions = String::from(PRELUDE);

        for chip in &design.chips {
            functions.push('\n');
            functions.push_str(&self.generate_chip(design, chip)?);
        }

        debug!("Generated {} chip function(s)", self.function_counter);
        Ok(GoProgram {
            imports: Vec::new(),
            functions,
            main: "func main() {}\n".to_string(),
        })
    }

    fn generate_chip(&mut self, design: &Design, chip: &ChipDefinition) -> CompileResult<String> {
        check_go_identifier(&chip.name, "chip name")?;
        for spec in chip.inputs.iter().chain(&chip.outputs).chain(&chip.locals) {
            check_go_identifier(&spec.name, &format!("signal in chip '{}'", chip.name))?;
        }

        let params: Vec<String> = chip
            .parameter_order()
            .into_iter()
            .map(|i| format!("{} {}", chip.inputs[i].name, go_type(chip.inputs[i].shape)))
            .collect();
        let results: Vec<String> = chip.outputs.iter().map(|spec| go_type(spec.shape)).collect();

        let mut w = GoWriter::new();
        w.open(format!(
            "func {}({}) ({}) {{",
            chip.name,
            params.join(", "),
            results.join(", ")
        ));

        let mut declared: HashSet<&str> = chip.inputs.iter().map(|spec| spec.name.as_str()).collect();
        for spec in chip.bus_outputs() {
            w.line(format!("{} := {}", spec.name, go_value(&Value::unknown(spec.shape))));
            declared.insert(&spec.name);
        }

        for stmt in &chip.body {
            self.emit_statement(&mut w, design, chip, stmt, &mut declared)?;
        }

        let mut read = HashSet::new();
        for stmt in &chip.body {
            stmt.value.for_each_read(&mut |name| {
                read.insert(name.to_string());
            });
        }
        for local in &chip.locals {
            if !read.contains(&local.name) {
                w.line(format!("_ = {}", local.name));
            }
        }

        let names: Vec<&str> = chip.outputs.iter().map(|spec| spec.name.as_str()).collect();
        w.line(format!("return {}", names.join(", ")));
        w.close("}");

        self.function_counter += 1;
        Ok(w.finish())
    }

    fn emit_statement<'c>(
        &self,
        w: &mut GoWriter,
        design: &Design,
        chip: &'c ChipDefinition,
        stmt: &'c Statement,
        declared: &mut HashSet<&'c str>,
    ) -> CompileResult<()> {
        let value = self.emit_expr(design, &stmt.value)?;
        let lhs: Vec<String> = stmt.targets.iter().map(ToString::to_string).collect();

        let fresh: Vec<&str> = stmt
            .targets
            .iter()
            .filter(|t| t.index.is_none() && !declared.contains(t.name.as_str()))
            .map(|t| t.name.as_str())
            .collect();

        if !fresh.is_empty() && fresh.len() == stmt.targets.len() {
            w.line(format!("{} := {}", lhs.join(", "), value));
        } else {
            for name in &fresh {
                let shape = chip
                    .output(name)
                    .or_else(|| chip.locals.iter().find(|spec| spec.name == *name))
                    .map(|spec| spec.shape)
                    .ok_or_else(|| {
                        CompileError::codegen(format!("'{}' in chip '{}' has no known shape", name, chip.name))
                    })?;
                w.line(format!("var {} {}", name, go_type(shape)));
            }
            w.line(format!("{} = {}", lhs.join(", "), value));
        }

        declared.extend(fresh);
        Ok(())
    }

    fn emit_expr(&self, design: &Design, expr: &Expr) -> CompileResult<String> {
        match expr {
            Expr::Literal(value) => Ok(go_literal(*value)),
            Expr::Signal(name) => Ok(name.clone()),
            Expr::Element { name, index } => Ok(format!("{}[{}]", name, index)),
            Expr::Gate { gate, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.emit_expr(design, arg))
                    .collect::<CompileResult<Vec<_>>>()?;
                Ok(format!("{}({})", gate.name(), args.join(", ")))
            }
            Expr::Call { chip, args } => {
                let callee = design
                    .chip(chip)
                    .ok_or_else(|| CompileError::codegen(format!("call to unknown chip '{}'", chip)))?;
                let args = args
                    .iter()
                    .map(|arg| self.emit_expr(design, arg))
                    .collect::<CompileResult<Vec<_>>>()?;
                Ok(format!("{}({})", chip, call_args(callee, &args)))
            }
        }
    }
}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::Analyzer;
    use crate::context::CompilationContext;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn generate(source: &str) -> CompileResult<GoProgram> {
        let mut ctx = CompilationContext::new();
        let chips = Parser::new(source).parse_program(&mut ctx)?;
        let design = Analyzer::new().analyze(chips)?;
        CodeGenerator::new().generate(&design)
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
    fn test_half_adder_function() {
        let program = generate(HALF_ADDER).unwrap();
        let expected = "\
func half_adder(a string, b string) (string, string) {
\tc := and(a, b)
\ts := and(or(a, b), not(c))
\treturn s, c
}
";
        assert!(program.functions.starts_with(PRELUDE));
        assert_eq!(&program.functions[PRELUDE.len() + 1..], expected);
    }

    #[test]
    fn test_multi_target_and_unread_locals() {
        let source = format!(
            "{}#top\nIN a b\nOUT s\nCON\ns, carry = half_adder(a, b)\nEND\n",
            HALF_ADDER
        );
        let program = generate(&source).unwrap();
        assert!(program.functions.contains(
            "func top(a string, b string) (string) {\n\ts, carry := half_adder(a, b)\n\t_ = carry\n\treturn s\n}\n"
        ));
    }

    #[test]
    fn test_partially_declared_targets() {
        let source = format!(
            "{}#top\nIN a b\nOUT s c\nCON\nc = 0\ns, c = half_adder(a, b)\nEND\n",
            HALF_ADDER
        );
        let program = generate(&source).unwrap();
        assert!(program
            .functions
            .contains("\tc := \"0\"\n\tvar s string\n\ts, c = half_adder(a, b)\n"));
    }

    #[test]
    fn test_bus_parameters_come_after_bits() {
        let source = "\
#sel
IN d[2] s
OUT y q[2]
CON
y = and(d[0], s)
q[1] = d[1]
END
#top
IN a[2] b
OUT y
CON
y, v = sel(a, b)
END
";
        let program = generate(source).unwrap();
        let expected_sel = "\
func sel(s string, d [2]string) (string, [2]string) {
\tq := [2]string{\"X\", \"X\"}
\ty := and(d[0], s)
\tq[1] = d[1]
\treturn y, q
}
";
        assert!(program.functions.contains(expected_sel), "{}", program.functions);
        assert!(program.functions.contains("y, v := sel(b, a)"));
    }

    #[test]
    fn test_signature_arity_matches_interface() {
        let source = "#wide\nIN a b c d[3]\nOUT x y[2] z\nCON\nx = a\nz = b\nEND\n";
        let program = generate(source).unwrap();
        let signature = program
            .functions
            .lines()
            .find(|line| line.starts_with("func wide("))
            .unwrap();
        let (params, results) = signature.split_once(") (").unwrap();
        assert_eq!(params.matches(',').count() + 1, 4);
        assert_eq!(results.matches(',').count() + 1, 3);
    }

    #[test]
    fn test_reserved_names_are_rejected() {
        let err = generate("#len\nIN a\nOUT y\nCON\ny = a\nEND\n").unwrap_err();
        assert!(matches!(err, CompileError::CodeGen { .. }));
        let err = generate("#c\nIN string\nOUT y\nCON\ny = string\nEND\n").unwrap_err();
        assert!(matches!(err, CompileError::CodeGen { .. }));
    }

    #[test]
    fn test_driver_prefix_is_reserved() {
        let err = generate("#sim_t\nIN a\nOUT y\nCON\ny = a\nEND\n").unwrap_err();
        assert!(matches!(err, CompileError::CodeGen { message } if message.contains("chip name 'sim_t'")));
        let err = generate("#reg\nIN a\nOUT sim_report\nCON\nsim_report = a\nEND\n").unwrap_err();
        assert!(matches!(err, CompileError::CodeGen { message } if message.contains("'sim_report'")));
        let err = generate("#c\nIN a\nOUT y\nCON\nsim_prev_a = not(a)\ny = sim_prev_a\nEND\n").unwrap_err();
        assert!(matches!(err, CompileError::CodeGen { .. }));
    }

    #[test]
    fn test_render_without_driver() {
        let program = generate(HALF_ADDER).unwrap();
        let text = program.render();
        assert!(text.starts_with("// Code generated by hdl2go. DO NOT EDIT.\n\npackage main\n\nfunc not("));
        assert!(text.ends_with("func main() {}\n"));
    }

    #[test]
    fn test_render_imports() {
        let program = GoProgram {
            imports: vec!["fmt", "os"],
            functions: String::new(),
            main: String::new(),
        };
        assert!(program.render().contains("import (\n\t\"fmt\"\n\t\"os\"\n)\n"));
    }

    #[test]
    fn test_go_string_literal() {
        assert_eq!(go_string_literal("out.txt"), "\"out.txt\"");
        assert_eq!(go_string_literal("a\"b\\c"), "\"a\\\"b\\\\c\"");
    }
}
