//! Encoding model and decision-tree construction.

pub mod bit;
pub mod builder;
pub mod diagnostic;
pub mod encoding;
pub mod error;
pub mod instruction;
pub mod ranges;
pub mod set;
pub mod tree;

pub use bit::{Bit, BitPattern, BitValue};
pub use builder::TableBuilder;
pub use encoding::{BitField, Encoding, EncodingId, FieldSpec};
pub use error::IsaError;
pub use instruction::{Alias, Instruction, InstructionId, InstructionTable};
pub use ranges::{RangeClause, RangeExpr, RangeTest};
pub use set::{EncodingsSet, SharedBits};
pub use tree::{Ambiguity, DecodeForest, Leaf, LeafKind, TreeBuilder};
