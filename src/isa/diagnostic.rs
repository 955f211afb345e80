//! Source-located diagnostics for `.enc` ingestion.

use std::fmt;
use std::path::{Path, PathBuf};

/// Ingestion stage that rejected the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticPhase {
    Lexer,
    Parser,
    /// Cross-record checks: duplicate files, field widths, alias targets.
    Resolution,
}

/// 1-indexed line and column inside a spec file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(path: impl AsRef<Path>, line: usize, column: usize) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path.display(), self.line, self.column)
    }
}

#[derive(Debug, Clone)]
pub struct IsaDiagnostic {
    pub phase: DiagnosticPhase,
    /// Dotted identifier such as `parser.width`, stable across message rewording.
    pub code: &'static str,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl IsaDiagnostic {
    pub fn new(
        phase: DiagnosticPhase,
        code: &'static str,
        message: impl Into<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        Self {
            phase,
            code,
            message: message.into(),
            location,
        }
    }
}

impl fmt::Display for IsaDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}: {}", self.code, self.message),
            None => write!(f, "<unknown>: {}: {}", self.code, self.message),
        }
    }
}
