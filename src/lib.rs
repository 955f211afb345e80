//! Decoder generation for fixed-width instruction sets.
//!
//! The pipeline ingests per-instruction bit diagrams, partitions the encoding universe into a
//! forest of uniquely identifying bit tests, and emits those tests either as a runtime
//! [`DecodeTable`](emit::DecodeTable) or as generated Rust source.

pub mod config;
pub mod emit;
pub mod isa;
pub mod loader;
pub mod query;
