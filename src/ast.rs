//! Intermediate representation for chip definitions
//!
//! A chip body is straight-line code: statements run in the order they are
//! written and nothing is reordered by dependency. Reading a signal before
//! the statement that writes it is rejected by the analyzer rather than
//! silently scheduled.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::signal::{Gate, SignalSpec, SignalValue};

/// Expression on the right-hand side of a statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// `0`, `1` or `X`
    Literal(SignalValue),

    /// Whole signal reference: `a`
    Signal(String),

    /// Single line of a bus: `d[2]`
    Element { name: String, index: usize },

    /// Primitive gate: `and(a, b)`
    Gate { gate: Gate, args: Vec<Expr> },

    /// Call to another chip: `half_adder(a, b)`
    Call { chip: String, args: Vec<Expr> },
}

impl Expr {
    /// Visit every signal name this expression reads
    pub fn for_each_read<F: FnMut(&str)>(&self, f: &mut F) {
        match self {
            Expr::Literal(_) => {}
            Expr::Signal(name) | Expr::Element { name, .. } => f(name),
            Expr::Gate { args, .. } | Expr::Call { args, .. } => {
                for arg in args {
                    arg.for_each_read(f);
                }
            }
        }
    }
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(value) => write!(f, "{}", value),
            Expr::Signal(name) => write!(f, "{}", name),
            Expr::Element { name, index } => write!(f, "{}[{}]", name, index),
            Expr::Gate { gate, args } => write_call(f, gate.name(), args),
            Expr::Call { chip, args } => write_call(f, chip, args),
        }
    }
}

fn write_call(f: &mut std::fmt::Formatter<'_>, name: &str, args: &[Expr]) -> std::fmt::Result {
    write!(f, "{}(", name)?;
    for (i, arg) in args.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", arg)?;
    }
    write!(f, ")")
}

/// Left-hand side of an assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    /// `Some(i)` for a single bus line `name[i]`
    pub index: Option<usize>,
}

impl Target {
    pub fn whole(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: None,
        }
    }

    pub fn element(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index: Some(index),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]", self.name, index),
            None => write!(f, "{}", self.name),
        }
    }
}

/// `targets = value`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub targets: Vec<Target>,
    pub value: Expr,
    /// Line in the flat source buffer
    pub line: usize,
}

/// An input wired from one of the same chip's outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub input: String,
    pub output: String,
}

/// A parsed chip: the unit of compilation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChipDefinition {
    pub name: String,
    /// Declared order is the calling convention
    pub inputs: Vec<SignalSpec>,
    pub outputs: Vec<SignalSpec>,
    pub feedback: Vec<Feedback>,
    pub body: Vec<Statement>,
    pub is_simulation_target: bool,
    pub is_clocked: bool,
    /// Body-local signals, filled in by the analyzer
    #[serde(default)]
    pub locals: Vec<SignalSpec>,
    /// Line of the `#name` marker in the flat source buffer
    pub line: usize,
}

impl ChipDefinition {
    pub fn new(name: impl Into<String>, line: usize) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            feedback: Vec::new(),
            body: Vec::new(),
            is_simulation_target: false,
            is_clocked: false,
            locals: Vec::new(),
            line,
        }
    }

    pub fn input(&self, name: &str) -> Option<&SignalSpec> {
        self.inputs.iter().find(|s| s.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&SignalSpec> {
        self.outputs.iter().find(|s| s.name == name)
    }

    pub fn bus_outputs(&self) -> impl Iterator<Item = &SignalSpec> {
        self.outputs.iter().filter(|s| s.is_bus())
    }

    pub fn bit_outputs(&self) -> impl Iterator<Item = &SignalSpec> {
        self.outputs.iter().filter(|s| !s.is_bus())
    }

    /// Positions of the inputs in generated-parameter order: bit inputs first,
    /// then bus inputs, each group in declared order
    pub fn parameter_order(&self) -> Vec<usize> {
        let bits = self.inputs.iter().enumerate().filter(|(_, s)| !s.is_bus());
        let buses = self.inputs.iter().enumerate().filter(|(_, s)| s.is_bus());
        bits.chain(buses).map(|(i, _)| i).collect()
    }
}

/// An analyzed program: chips in declaration order plus a name index
#[derive(Debug, Clone, Serialize)]
pub struct Design {
    pub chips: Vec<ChipDefinition>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl Design {
    pub fn new(chips: Vec<ChipDefinition>) -> Self {
        let index = chips
            .iter()
            .enumerate()
            .map(|(i, chip)| (chip.name.clone(), i))
            .collect();
        Self { chips, index }
    }

    pub fn chip(&self, name: &str) -> Option<&ChipDefinition> {
        self.index.get(name).map(|&i| &self.chips[i])
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn simulation_target(&self) -> Option<&ChipDefinition> {
        self.chips.iter().find(|chip| chip.is_simulation_target)
    }

    /// Export the IR as JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_order_puts_bits_first() {
        let mut chip = ChipDefinition::new("mux", 1);
        chip.inputs = vec![
            SignalSpec::bus("d", 4),
            SignalSpec::bit("s0"),
            SignalSpec::bus("e", 2),
            SignalSpec::bit("s1"),
        ];
        assert_eq!(chip.parameter_order(), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_expr_display() {
        let expr = Expr::Gate {
            gate: Gate::And,
            args: vec![
                Expr::Signal("t".to_string()),
                Expr::Gate {
                    gate: Gate::Not,
                    args: vec![Expr::Element {
                        name: "c".to_string(),
                        index: 1,
                    }],
                },
            ],
        };
        assert_eq!(expr.to_string(), "and(t, not(c[1]))");
    }

    #[test]
    fn test_for_each_read() {
        let expr = Expr::Call {
            chip: "ha".to_string(),
            args: vec![Expr::Signal("a".to_string()), Expr::Literal(SignalValue::One)],
        };
        let mut reads = Vec::new();
        expr.for_each_read(&mut |name| reads.push(name.to_string()));
        assert_eq!(reads, vec!["a"]);
    }
}
