//! Human-readable listing of a decode forest.

use std::fmt::{self, Write};

use crate::isa::tree::{DecodeForest, Leaf, LeafKind};

/// Renders every leaf, singletons first, then the ambiguous ones with their kind.
pub fn leaf_report(forest: &DecodeForest<'_>) -> String {
    let mut out = String::new();
    let _ = write_leaf_report(&mut out, forest);
    out
}

pub fn write_leaf_report<W: Write>(out: &mut W, forest: &DecodeForest<'_>) -> fmt::Result {
    let mut leaves: Vec<&Leaf<'_>> = forest.leaves().iter().collect();
    leaves.sort_by_key(|leaf| leaf.kind);

    for leaf in leaves {
        if leaf.kind != LeafKind::Singleton {
            writeln!(out, "[{:?}]", leaf.kind)?;
        }
        writeln!(out, "{}", leaf.set)?;
    }
    let ambiguous = forest.leaves().iter().filter(|leaf| leaf.is_ambiguous()).count();
    writeln!(out, "{} leaves, {} ambiguous", forest.len(), ambiguous)
}
