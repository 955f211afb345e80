//! Generator configuration shared by the library entry points and the CLI.

use crate::isa::error::IsaError;
use crate::isa::instruction::InstructionTable;
use crate::isa::set::{EncodingsSet, SharedBits};
use crate::isa::tree::{DEFAULT_DEPTH_CAP, DecodeForest, TreeBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Recursion levels the tree builder explores before tagging a leaf as exhausted.
    pub depth_cap: usize,
    /// Feed alias encodings into the builder alongside canonical ones.
    pub include_aliases: bool,
    /// Turn ambiguous leaves into an [`IsaError::Ambiguous`] failure.
    pub reject_ambiguous: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            depth_cap: DEFAULT_DEPTH_CAP,
            include_aliases: false,
            reject_ambiguous: false,
        }
    }
}

impl GeneratorConfig {
    /// Partitions the encoding universe of `table` under this configuration.
    pub fn build_forest<'a>(&self, table: &'a InstructionTable) -> Result<DecodeForest<'a>, IsaError> {
        let root = EncodingsSet::new(table.encodings(self.include_aliases), SharedBits::EMPTY)?;
        let forest = TreeBuilder::new(self.depth_cap).build(root)?;
        if self.reject_ambiguous {
            let ambiguities = forest.ambiguities();
            if !ambiguities.is_empty() {
                return Err(IsaError::Ambiguous(
                    ambiguities.iter().map(ToString::to_string).collect(),
                ));
            }
        }
        Ok(forest)
    }
}
