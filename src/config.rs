//! Compiler configuration

/// Name the generated program is written to unless configured otherwise
pub const DEFAULT_PROGRAM_DESTINATION: &str = "main.go";

/// How the simulation target is driven
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunMode {
    /// No driver: the program only defines the chip functions
    #[default]
    None,
    /// Drive the target from the named script source
    Script(String),
    /// Interactive input; accepted but not implemented
    Stdin,
}

/// Which chips decide that the simulation runs in clocked mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockPolicy {
    /// Only the simulation target's own `CLOCKED` marker counts
    #[default]
    Target,
    /// A `CLOCKED` marker on any chip switches the whole program to clocked mode
    AnyChip,
}

impl std::str::FromStr for ClockPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "target" => Ok(ClockPolicy::Target),
            "any-chip" => Ok(ClockPolicy::AnyChip),
            other => Err(format!(
                "Invalid clock policy '{}', expected 'target' or 'any-chip'",
                other
            )),
        }
    }
}

/// Configuration for one compilation run
#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// Where the generated Go program is written
    pub program_destination: String,
    pub run_mode: RunMode,
    /// Where the clocked simulation report is written; required in clocked mode
    pub report_destination: Option<String>,
    pub clock_policy: ClockPolicy,
}

impl CompilerConfig {
    pub fn new(run_mode: RunMode) -> Self {
        Self {
            run_mode,
            ..Self::default()
        }
    }

    pub fn with_script(script: impl Into<String>) -> Self {
        Self::new(RunMode::Script(script.into()))
    }

    pub fn report_to(mut self, destination: impl Into<String>) -> Self {
        self.report_destination = Some(destination.into());
        self
    }

    pub fn clock_policy(mut self, policy: ClockPolicy) -> Self {
        self.clock_policy = policy;
        self
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program_destination: DEFAULT_PROGRAM_DESTINATION.to_string(),
            run_mode: RunMode::None,
            report_destination: None,
            clock_policy: ClockPolicy::Target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CompilerConfig::default();
        assert_eq!(config.program_destination, "main.go");
        assert_eq!(config.run_mode, RunMode::None);
        assert_eq!(config.clock_policy, ClockPolicy::Target);
    }

    #[test]
    fn test_builder() {
        let config = CompilerConfig::with_script("adder.tst")
            .report_to("out.txt")
            .clock_policy(ClockPolicy::AnyChip);
        assert_eq!(config.run_mode, RunMode::Script("adder.tst".to_string()));
        assert_eq!(config.report_destination.as_deref(), Some("out.txt"));
        assert_eq!(config.clock_policy, ClockPolicy::AnyChip);
    }

    #[test]
    fn test_parse_clock_policy() {
        assert_eq!("any-chip".parse::<ClockPolicy>(), Ok(ClockPolicy::AnyChip));
        assert!("sometimes".parse::<ClockPolicy>().is_err());
    }
}
