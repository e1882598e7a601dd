//! Source loaders and artifact sinks: the compiler's only contact with the
//! outside world

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{CompileError, CompileResult};

/// Resolves a source identifier to its raw text
pub trait SourceLoader {
    fn load(&self, name: &str) -> CompileResult<String>;
}

/// Receives the finished artifacts
pub trait Sink {
    fn write(&mut self, name: &str, text: &str) -> CompileResult<()>;
}

/// Loads sources from the filesystem, relative names resolved against a base directory
#[derive(Debug, Clone, Default)]
pub struct FsSource {
    base: Option<PathBuf>,
}

impl FsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base(base: impl Into<PathBuf>) -> Self {
        Self {
            base: Some(base.into()),
        }
    }

    fn resolve(&self, name: &str) -> PathBuf {
        let path = Path::new(name);
        match &self.base {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl SourceLoader for FsSource {
    fn load(&self, name: &str) -> CompileResult<String> {
        fs::read_to_string(self.resolve(name)).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CompileError::SourceNotFound {
                name: name.to_string(),
            },
            _ => CompileError::Io {
                name: name.to_string(),
                source: e,
            },
        })
    }
}

/// Writes artifacts to the filesystem
#[derive(Debug, Clone, Default)]
pub struct FsSink;

impl Sink for FsSink {
    fn write(&mut self, name: &str, text: &str) -> CompileResult<()> {
        fs::write(name, text).map_err(|e| CompileError::Io {
            name: name.to_string(),
            source: e,
        })
    }
}

/// In-memory sources, keyed by identifier
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(name, text);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, text: impl Into<String>) {
        self.files.insert(name.into(), text.into());
    }
}

impl SourceLoader for MemorySource {
    fn load(&self, name: &str) -> CompileResult<String> {
        self.files
            .get(name)
            .cloned()
            .ok_or_else(|| CompileError::SourceNotFound {
                name: name.to_string(),
            })
    }
}

/// Collects written artifacts in memory, in write order
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    pub written: Vec<(String, String)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.written
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, text)| text.as_str())
    }
}

impl Sink for MemorySink {
    fn write(&mut self, name: &str, text: &str) -> CompileResult<()> {
        self.written.push((name.to_string(), text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source() {
        let source = MemorySource::new().with("gates.hdl", "#g");
        assert_eq!(source.load("gates.hdl").unwrap(), "#g");
        assert!(matches!(
            source.load("missing.hdl"),
            Err(CompileError::SourceNotFound { .. })
        ));
    }

    #[test]
    fn test_fs_source_missing_file() {
        let source = FsSource::with_base(std::env::temp_dir());
        let err = source.load("definitely-not-here-4c1e.hdl").unwrap_err();
        assert!(matches!(err, CompileError::SourceNotFound { name } if name == "definitely-not-here-4c1e.hdl"));
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let mut sink = MemorySink::new();
        sink.write("main.go", "package main").unwrap();
        sink.write("out.txt", "t=0 1").unwrap();
        assert_eq!(sink.written.len(), 2);
        assert_eq!(sink.get("out.txt"), Some("t=0 1"));
    }
}
