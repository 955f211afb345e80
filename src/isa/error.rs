use thiserror::Error;

use crate::isa::bit::Bit;
use crate::isa::diagnostic::{DiagnosticPhase, IsaDiagnostic};

/// Represents any failure raised while ingesting encodings, partitioning them, or emitting
/// decoders.
#[derive(Debug, Error)]
pub enum IsaError {
    /// A bit-value token is not one of `x`, `0`, `1`, `(0)`, `(1)`.
    #[error("unknown bit value '{0}'")]
    Format(String),
    /// An encoding contradicts a bit its set claims is shared by every member.
    #[error("encoding '{encoding}' has {found} at position {position}, set requires {expected}")]
    InvariantViolation {
        encoding: String,
        position: u8,
        expected: Bit,
        found: String,
    },
    #[error("bit position {0} is already shared by every member of this set")]
    AlreadyShared(u8),
    #[error("bit position {position} is outside the {width}-bit word")]
    Index { position: usize, width: usize },
    #[error("encoding '{encoding}' spans {width} bits, expected 32")]
    Width { encoding: String, width: usize },
    #[error("field '{field}' of encoding '{encoding}' is {width} bits wide but lists {listed} values")]
    PatternWidth {
        encoding: String,
        field: String,
        width: usize,
        listed: usize,
    },
    #[error("instruction '{from}' references unknown instruction file '{target}'")]
    UnknownInstruction { from: String, target: String },
    #[error("instruction file '{0}' is declared twice")]
    DuplicateInstruction(String),
    #[error("{} leaf(s) could not be disambiguated: {}", .0.len(), .0.join("; "))]
    Ambiguous(Vec<String>),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{phase:?} produced {} issue(s):\n{}", .diagnostics.len(), render_diagnostics(.diagnostics))]
    Diagnostics {
        phase: DiagnosticPhase,
        diagnostics: Vec<IsaDiagnostic>,
    },
}

impl IsaError {
    pub(crate) fn diagnostic(diagnostic: IsaDiagnostic) -> Self {
        IsaError::Diagnostics {
            phase: diagnostic.phase,
            diagnostics: vec![diagnostic],
        }
    }
}

fn render_diagnostics(diagnostics: &[IsaDiagnostic]) -> String {
    diagnostics
        .iter()
        .map(|diag| format!("  - {diag}"))
        .collect::<Vec<_>>()
        .join("\n")
}
