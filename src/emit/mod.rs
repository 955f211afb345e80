//! Consumers of a decode forest: runtime tables, generated source and reports.

pub mod control_flow;
pub mod report;
pub mod rust;
pub mod table;

pub use control_flow::{BranchFlags, BranchInfo, BranchKind, ControlFlowTable};
pub use report::{leaf_report, write_leaf_report};
pub use rust::{emit_rust, write_rust};
pub use table::{DecodeEntry, DecodeMatch, DecodeTable, Disassembly, Operand};
