//! Signal model: the tri-state value domain, the three primitive gates and
//! the bit/bus shapes every other stage works with.

use serde::{Deserialize, Serialize};

/// A tri-state logic level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SignalValue {
    Zero,
    One,
    #[default]
    Unknown,
}

impl SignalValue {
    /// Parse the literal spelling used by both the HDL and the script language
    pub fn from_literal(text: &str) -> Option<Self> {
        match text {
            "0" => Some(SignalValue::Zero),
            "1" => Some(SignalValue::One),
            "X" => Some(SignalValue::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalValue::Zero => "0",
            SignalValue::One => "1",
            SignalValue::Unknown => "X",
        }
    }

    pub fn not(self) -> Self {
        match self {
            SignalValue::Zero => SignalValue::One,
            SignalValue::One => SignalValue::Zero,
            SignalValue::Unknown => SignalValue::Unknown,
        }
    }

    /// `Zero` dominates; `One` only when both sides are `One`
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (SignalValue::Zero, _) | (_, SignalValue::Zero) => SignalValue::Zero,
            (SignalValue::One, SignalValue::One) => SignalValue::One,
            _ => SignalValue::Unknown,
        }
    }

    /// `One` dominates; `Zero` only when both sides are `Zero`
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (SignalValue::One, _) | (_, SignalValue::One) => SignalValue::One,
            (SignalValue::Zero, SignalValue::Zero) => SignalValue::Zero,
            _ => SignalValue::Unknown,
        }
    }
}

impl std::fmt::Display for SignalValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the three built-in gates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gate {
    Not,
    And,
    Or,
}

impl Gate {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "not" => Some(Gate::Not),
            "and" => Some(Gate::And),
            "or" => Some(Gate::Or),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Gate::Not => "not",
            Gate::And => "and",
            Gate::Or => "or",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Gate::Not => 1,
            Gate::And | Gate::Or => 2,
        }
    }

    /// Apply the gate; callers guarantee `args.len() == self.arity()`
    pub fn apply(&self, args: &[SignalValue]) -> SignalValue {
        match (self, args) {
            (Gate::Not, [a]) => a.not(),
            (Gate::And, [a, b]) => a.and(*b),
            (Gate::Or, [a, b]) => a.or(*b),
            _ => SignalValue::Unknown,
        }
    }
}

/// Shape of a signal: a single line or a fixed-width bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalShape {
    Bit,
    Bus(usize),
}

impl SignalShape {
    pub fn is_bus(&self) -> bool {
        matches!(self, SignalShape::Bus(_))
    }

    pub fn width(&self) -> usize {
        match self {
            SignalShape::Bit => 1,
            SignalShape::Bus(width) => *width,
        }
    }
}

impl std::fmt::Display for SignalShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalShape::Bit => write!(f, "bit"),
            SignalShape::Bus(width) => write!(f, "bus[{}]", width),
        }
    }
}

/// A named, shaped signal in a chip's interface or body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub name: String,
    pub shape: SignalShape,
}

impl SignalSpec {
    pub fn bit(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shape: SignalShape::Bit,
        }
    }

    pub fn bus(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            shape: SignalShape::Bus(width),
        }
    }

    pub fn is_bus(&self) -> bool {
        self.shape.is_bus()
    }
}

impl std::fmt::Display for SignalSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.shape {
            SignalShape::Bit => write!(f, "{}", self.name),
            SignalShape::Bus(width) => write!(f, "{}[{}]", self.name, width),
        }
    }
}

/// A runtime value held by a signal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bit(SignalValue),
    Bus(Vec<SignalValue>),
}

impl Value {
    /// The all-unknown value of a shape
    pub fn unknown(shape: SignalShape) -> Self {
        match shape {
            SignalShape::Bit => Value::Bit(SignalValue::Unknown),
            SignalShape::Bus(width) => Value::Bus(vec![SignalValue::Unknown; width]),
        }
    }

    pub fn shape(&self) -> SignalShape {
        match self {
            Value::Bit(_) => SignalShape::Bit,
            Value::Bus(lines) => SignalShape::Bus(lines.len()),
        }
    }
}

/// Matches Go's `fmt` rendering of `string` and `[N]string` operands
impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Bit(value) => write!(f, "{}", value),
            Value::Bus(lines) => {
                let rendered: Vec<&str> = lines.iter().map(SignalValue::as_str).collect();
                write!(f, "[{}]", rendered.join(" "))
            }
        }
    }
}

/// Render a list of values the way `fmt.Println(a, b, ...)` joins its operands
pub fn format_values(values: &[Value]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
