//! State shared by the pipeline stages for the length of one compilation

use std::collections::HashSet;

use tracing::warn;

use crate::config::ClockPolicy;
use crate::error::{CompileError, CompileResult};

/// A recoverable condition reported while compiling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A chip with this name was already defined; the later definition was dropped
    DuplicateChip { name: String, origin: String },
    /// A script was supplied but no chip is marked `SIM`
    NothingToSimulate,
    /// A chip is marked `SIM` but no script drives it
    NoScript { chip: String },
    /// The stdin run mode is not available
    StdinNotReady,
    /// The two clock policies would pick different driver branches
    ClockPolicyMismatch { target_clocked: bool, any_clocked: bool },
    /// An unclocked script never calls the chip
    NoCalls,
    /// Feedback wiring only takes effect in clocked simulations
    FeedbackIgnored { chip: String },
    /// A report destination was given for an unclocked run
    ReportIgnored,
    /// A cycle guard repeats an earlier one or lies past the last cycle
    UnreachableGuard { line: usize, cycle: u64 },
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::DuplicateChip { name, origin } => {
                write!(f, "preventing double loading of '{}' from '{}'", name, origin)
            }
            Diagnostic::NothingToSimulate => write!(f, "script given but nothing to simulate"),
            Diagnostic::NoScript { chip } => {
                write!(f, "'{}' is marked SIM but no script was given", chip)
            }
            Diagnostic::StdinNotReady => write!(f, "stdin run mode: feature not ready yet"),
            Diagnostic::ClockPolicyMismatch {
                target_clocked,
                any_clocked,
            } => write!(
                f,
                "simulation target clocked = {}, but some chip clocked = {}; \
                 use --clock-policy any-chip for the legacy behavior",
                target_clocked, any_clocked
            ),
            Diagnostic::NoCalls => write!(f, "script never calls the simulated chip"),
            Diagnostic::FeedbackIgnored { chip } => write!(
                f,
                "feedback wiring on '{}' is ignored in an unclocked simulation",
                chip
            ),
            Diagnostic::ReportIgnored => {
                write!(f, "output destination ignored: simulation is not clocked")
            }
            Diagnostic::UnreachableGuard { line, cycle } => {
                write!(f, "guard 't = {}' at script line {} never runs", cycle, line)
            }
        }
    }
}

/// Process-wide facts of one compilation, threaded through every stage
#[derive(Debug, Default)]
pub struct CompilationContext {
    defined: HashSet<String>,
    simulation_target: Option<String>,
    any_clocked: bool,
    diagnostics: Vec<Diagnostic>,
}

impl CompilationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chip name; returns `false` if it was already defined
    pub fn define_chip(&mut self, name: &str) -> bool {
        self.defined.insert(name.to_string())
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defined.contains(name)
    }

    /// Mark a chip as the simulation target; a second target is fatal
    pub fn mark_simulation_target(&mut self, chip: &str) -> CompileResult<()> {
        match &self.simulation_target {
            Some(first) => Err(CompileError::DuplicateSimulationTarget {
                first: first.clone(),
                second: chip.to_string(),
            }),
            None => {
                self.simulation_target = Some(chip.to_string());
                Ok(())
            }
        }
    }

    pub fn simulation_target(&self) -> Option<&str> {
        self.simulation_target.as_deref()
    }

    pub fn mark_clocked(&mut self) {
        self.any_clocked = true;
    }

    pub fn any_clocked(&self) -> bool {
        self.any_clocked
    }

    /// Decide whether the driver runs the clocked branch
    pub fn clocked_mode(&mut self, policy: ClockPolicy, target_clocked: bool) -> bool {
        if target_clocked != self.any_clocked {
            self.warn(Diagnostic::ClockPolicyMismatch {
                target_clocked,
                any_clocked: self.any_clocked,
            });
        }
        match policy {
            ClockPolicy::Target => target_clocked,
            ClockPolicy::AnyChip => self.any_clocked,
        }
    }

    /// Record a recoverable diagnostic and log it
    pub fn warn(&mut self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
