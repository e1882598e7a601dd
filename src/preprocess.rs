//! Preprocessor that expands include blocks into one flat buffer
//!
//! An include block sits at the head of a buffer, before any chip:
//!
//! ```text
//! [
//! gates.hdl
//! adders.hdl
//! ]
//! ```
//!
//! Every chip found in the listed sources is placed ahead of the remaining
//! buffer unless a chip of the same name is already defined, in which case the
//! later definition is dropped with a warning.

use std::collections::HashSet;

use tracing::debug;

use crate::context::{CompilationContext, Diagnostic};
use crate::error::{CompileError, CompileResult};
use crate::parser::{declared_names, split_chip_blocks};
use crate::source::SourceLoader;

/// An include block split off the head of a buffer
#[derive(Debug, Clone, PartialEq)]
struct IncludeBlock {
    identifiers: Vec<String>,
    /// The buffer with the block removed
    rest: String,
}

/// Find the include block at the head of `source`, if any
fn take_include_block(source: &str) -> CompileResult<Option<IncludeBlock>> {
    let lines: Vec<&str> = source.lines().collect();

    let Some(open) = lines
        .iter()
        .position(|line| !is_blank(line))
        .filter(|&i| lines[i].trim() == "[")
    else {
        return Ok(None);
    };

    let close = lines[open + 1..]
        .iter()
        .position(|line| line.trim() == "]")
        .map(|offset| open + 1 + offset)
        .ok_or_else(|| CompileError::MalformedInclude {
            line: open + 1,
            message: "include block has no closing ']'".to_string(),
        })?;

    let identifiers = lines[open + 1..close]
        .iter()
        .map(|line| line.trim())
        .filter(|line| !is_blank(line))
        .map(str::to_string)
        .collect();

    let mut rest = lines[close + 1..].join("\n");
    if source.ends_with('\n') {
        rest.push('\n');
    }

    Ok(Some(IncludeBlock { identifiers, rest }))
}

fn is_blank(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || line.starts_with("//")
}

/// Resolves include blocks through a [`SourceLoader`]
pub struct Preprocessor<'a> {
    loader: &'a dyn SourceLoader,
    /// Sources currently being expanded, outermost first
    stack: Vec<String>,
}

impl<'a> Preprocessor<'a> {
    pub fn new(loader: &'a dyn SourceLoader) -> Self {
        Self {
            loader,
            stack: Vec::new(),
        }
    }

    /// Produce the flat buffer for `source`
    ///
    /// A buffer without an include block is returned unchanged.
    pub fn resolve(&mut self, source: &str, ctx: &mut CompilationContext) -> CompileResult<String> {
        let Some(mut include) = take_include_block(source)? else {
            return Ok(source.to_string());
        };

        // The buffer's own chips win over anything it includes
        for name in declared_names(source) {
            ctx.define_chip(&name);
        }

        let mut kept = String::new();
        loop {
            for identifier in &include.identifiers {
                let expanded = self.expand(identifier, ctx)?;
                for block in split_chip_blocks(&expanded)? {
                    if ctx.define_chip(&block.name) {
                        kept.push_str(&block.text);
                    } else {
                        ctx.warn(Diagnostic::DuplicateChip {
                            name: block.name,
                            origin: identifier.clone(),
                        });
                    }
                }
            }

            match take_include_block(&include.rest)? {
                Some(next) => include = next,
                None => return Ok(format!("{}{}", kept, include.rest)),
            }
        }
    }

    /// Load one source and inline its own includes
    ///
    /// As at the top level, the source's own chips win over the chips it
    /// includes. Duplicates between sibling sources are left for `resolve`.
    fn expand(&mut self, identifier: &str, ctx: &mut CompilationContext) -> CompileResult<String> {
        if self.stack.iter().any(|open| open == identifier) {
            let mut chain = self.stack.clone();
            chain.push(identifier.to_string());
            return Err(CompileError::IncludeCycle {
                chain: chain.join(" -> "),
            });
        }

        debug!("Loading include '{}'", identifier);
        let text = self.loader.load(identifier)?;
        let own: HashSet<String> = declared_names(&text).into_iter().collect();

        self.stack.push(identifier.to_string());
        let mut expanded = String::new();
        let mut buffer = text;
        while let Some(include) = take_include_block(&buffer)? {
            for inner in &include.identifiers {
                for block in split_chip_blocks(&self.expand(inner, ctx)?)? {
                    if own.contains(&block.name) {
                        ctx.warn(Diagnostic::DuplicateChip {
                            name: block.name,
                            origin: inner.clone(),
                        });
                    } else {
                        expanded.push_str(&block.text);
                    }
                }
            }
            buffer = include.rest;
        }
        expanded.push_str(&buffer);
        if !expanded.ends_with('\n') {
            expanded.push('\n');
        }
        self.stack.pop();

        Ok(expanded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    const AND2: &str = "#and2\nIN a b\nOUT y\nCON\ny = and(a, b)\nEND\n";
    const OR2: &str = "#or2\nIN a b\nOUT y\nCON\ny = or(a, b)\nEND\n";

    fn resolve(loader: &MemorySource, source: &str) -> CompileResult<(String, CompilationContext)> {
        let mut ctx = CompilationContext::new();
        let flat = Preprocessor::new(loader).resolve(source, &mut ctx)?;
        Ok((flat, ctx))
    }

    #[test]
    fn test_no_include_block_is_identity() {
        let loader = MemorySource::new();
        let source = "// just a chip\n#and2\nIN a b\nOUT y\nCON\ny = and(a, b)\nEND";
        let (flat, ctx) = resolve(&loader, source).unwrap();
        assert_eq!(flat, source);
        assert!(ctx.diagnostics().is_empty());
    }

    #[test]
    fn test_include_prepends_chips() {
        let loader = MemorySource::new().with("gates.hdl", format!("{}{}", AND2, OR2));
        let source = "[\ngates.hdl\n]\n#top\nIN a\nOUT y\nCON\ny = and2(a, a)\nEND\n";
        let (flat, _) = resolve(&loader, source).unwrap();
        assert_eq!(declared_names(&flat), vec!["and2", "or2", "top"]);
    }

    #[test]
    fn test_duplicate_include_is_dropped_with_diagnostic() {
        let loader = MemorySource::new()
            .with("a.hdl", AND2)
            .with("b.hdl", AND2.replace("and(a, b)", "or(a, b)"));
        let source = "[\na.hdl\nb.hdl\n]\n";
        let (flat, ctx) = resolve(&loader, source).unwrap();
        assert_eq!(declared_names(&flat), vec!["and2"]);
        assert!(flat.contains("y = and(a, b)"));
        assert_eq!(
            ctx.diagnostics(),
            &[Diagnostic::DuplicateChip {
                name: "and2".to_string(),
                origin: "b.hdl".to_string()
            }]
        );
    }

    #[test]
    fn test_own_chip_wins_over_include() {
        let loader = MemorySource::new().with("gates.hdl", AND2);
        let source = format!("[\ngates.hdl\n]\n{}", AND2.replace("and(a, b)", "not(a)"));
        let (flat, ctx) = resolve(&loader, &source).unwrap();
        assert_eq!(declared_names(&flat), vec!["and2"]);
        assert!(flat.contains("not(a)"));
        assert_eq!(ctx.diagnostics().len(), 1);
    }

    #[test]
    fn test_nested_includes_are_deduplicated() {
        let loader = MemorySource::new()
            .with("gates.hdl", AND2)
            .with("left.hdl", format!("[\ngates.hdl\n]\n{}", OR2))
            .with("right.hdl", "[\ngates.hdl\n]\n");
        let source = "[\nleft.hdl\nright.hdl\n]\n";
        let (flat, ctx) = resolve(&loader, source).unwrap();
        assert_eq!(declared_names(&flat), vec!["and2", "or2"]);
        assert_eq!(ctx.diagnostics().len(), 1);
    }

    #[test]
    fn test_nested_own_chip_wins_over_its_include() {
        let local_and = AND2.replace("and(a, b)", "not(a)");
        let loader = MemorySource::new()
            .with("gates.hdl", format!("{}{}", AND2, OR2))
            .with("left.hdl", format!("[\ngates.hdl\n]\n{}", local_and));
        let (flat, ctx) = resolve(&loader, "[\nleft.hdl\n]\n").unwrap();
        assert_eq!(declared_names(&flat), vec!["or2", "and2"]);
        assert!(flat.contains("not(a)"));
        assert!(!flat.contains("and(a, b)"));
        assert_eq!(
            ctx.diagnostics(),
            &[Diagnostic::DuplicateChip {
                name: "and2".to_string(),
                origin: "gates.hdl".to_string()
            }]
        );
    }

    #[test]
    fn test_consecutive_include_blocks() {
        let loader = MemorySource::new().with("a.hdl", AND2).with("o.hdl", OR2);
        let source = "[\na.hdl\n]\n[\no.hdl\n]\n";
        let (flat, _) = resolve(&loader, source).unwrap();
        assert_eq!(declared_names(&flat), vec!["and2", "or2"]);
    }

    #[test]
    fn test_include_cycle() {
        let loader = MemorySource::new()
            .with("a.hdl", "[\nb.hdl\n]\n")
            .with("b.hdl", "[\na.hdl\n]\n");
        let err = resolve(&loader, "[\na.hdl\n]\n").unwrap_err();
        assert!(matches!(err, CompileError::IncludeCycle { chain } if chain == "a.hdl -> b.hdl -> a.hdl"));
    }

    #[test]
    fn test_unclosed_include_block() {
        let loader = MemorySource::new();
        let err = resolve(&loader, "[\ngates.hdl\n#top\n").unwrap_err();
        assert!(matches!(err, CompileError::MalformedInclude { line: 1, .. }));
    }

    #[test]
    fn test_missing_include_source() {
        let loader = MemorySource::new();
        let err = resolve(&loader, "[\ngates.hdl\n]\n").unwrap_err();
        assert!(matches!(err, CompileError::SourceNotFound { name } if name == "gates.hdl"));
    }
}
