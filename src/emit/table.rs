//! Runtime form of a decode forest, plus helpers for decoding and disassembly.

use std::fmt;
use std::fmt::Write as _;

use log::info;
use sha2::{Digest, Sha256};

use crate::config::GeneratorConfig;
use crate::isa::encoding::{Encoding, EncodingId};
use crate::isa::error::IsaError;
use crate::isa::instruction::{Instruction, InstructionTable};
use crate::isa::ranges::{RangeExpr, compact};
use crate::isa::set::SharedBits;
use crate::isa::tree::{DecodeForest, Leaf, LeafKind};

use super::control_flow::{BranchInfo, ControlFlowTable};

/// Bytes per instruction word.
pub const WORD_BYTES: usize = 4;

/// One leaf of the forest, ready for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeEntry {
    pub kind: LeafKind,
    pub shared: SharedBits,
    pub ranges: RangeExpr,
    /// Candidates, most specific first.
    pub members: Vec<EncodingId>,
}

impl DecodeEntry {
    /// Number of bits the entry tests.
    pub fn specificity(&self) -> u32 {
        self.shared.len() as u32
    }

    pub fn is_ambiguous(&self) -> bool {
        self.kind != LeafKind::Singleton
    }

    pub fn matches(&self, word: u32) -> bool {
        self.ranges.matches(word)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub name: String,
    pub value: u32,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:#x}", self.name, self.value)
    }
}

#[derive(Debug, Clone)]
pub struct DecodeMatch<'t> {
    pub instruction: &'t Instruction,
    pub encoding: &'t Encoding,
    pub operands: Vec<Operand>,
    /// The word hit a leaf that could not be narrowed to one encoding.
    pub ambiguous: bool,
    pub branch: Option<BranchInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disassembly {
    pub address: u64,
    pub opcode: u32,
    pub mnemonic: String,
    pub encoding: Option<String>,
    pub operands: Vec<String>,
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}: {:08x}  {}", self.address, self.opcode, self.mnemonic)?;
        if !self.operands.is_empty() {
            write!(f, " {}", self.operands.join(", "))?;
        }
        if let Some(encoding) = &self.encoding {
            write!(f, "  ; {encoding}")?;
        }
        Ok(())
    }
}

pub struct DecodeTable<'t> {
    table: &'t InstructionTable,
    entries: Vec<DecodeEntry>,
    control_flow: ControlFlowTable,
}

impl<'t> DecodeTable<'t> {
    /// Runs the tree builder over `table` and converts the resulting leaves.
    pub fn build(table: &'t InstructionTable, config: &GeneratorConfig) -> Result<Self, IsaError> {
        let forest = config.build_forest(table)?;
        let decoder = Self::from_forest(table, &forest);
        info!(
            "decode table holds {} entries ({} ambiguous)",
            decoder.entries.len(),
            decoder.entries.iter().filter(|entry| entry.is_ambiguous()).count()
        );
        Ok(decoder)
    }

    /// Converts `forest` into entries ordered by descending specificity.
    pub fn from_forest(table: &'t InstructionTable, forest: &DecodeForest<'_>) -> Self {
        let mut entries: Vec<DecodeEntry> = forest
            .leaves()
            .iter()
            .map(|leaf| {
                let shared = runtime_shared(leaf);
                DecodeEntry {
                    kind: leaf.kind,
                    shared,
                    ranges: compact(shared),
                    members: leaf
                        .set
                        .encodings_by_increasing_unbound()
                        .into_iter()
                        .map(Encoding::id)
                        .collect(),
                }
            })
            .collect();
        entries.sort_by(|a, b| b.specificity().cmp(&a.specificity()));
        Self {
            table,
            entries,
            control_flow: ControlFlowTable::a64(),
        }
    }

    pub fn with_control_flow(mut self, control_flow: ControlFlowTable) -> Self {
        self.control_flow = control_flow;
        self
    }

    pub fn entries(&self) -> &[DecodeEntry] {
        &self.entries
    }

    pub fn table(&self) -> &'t InstructionTable {
        self.table
    }

    pub fn control_flow(&self) -> &ControlFlowTable {
        &self.control_flow
    }

    /// Identifies `word`, preferring the most specific matching entry. Inside an ambiguous
    /// entry the most specific member whose bound bits agree with `word` wins.
    pub fn decode(&self, word: u32) -> Option<DecodeMatch<'t>> {
        self.entries
            .iter()
            .filter(|entry| entry.matches(word))
            .find_map(|entry| {
                let encoding = entry
                    .members
                    .iter()
                    .map(|id| self.table.encoding(*id))
                    .find(|encoding| encoding.matches(word))?;
                Some(self.make_match(encoding, word, entry.is_ambiguous()))
            })
    }

    fn make_match(&self, encoding: &'t Encoding, word: u32, ambiguous: bool) -> DecodeMatch<'t> {
        let instruction = self.table.instruction_of(encoding);
        DecodeMatch {
            instruction,
            encoding,
            operands: encoding
                .operands()
                .map(|field| Operand {
                    name: field.name.clone(),
                    value: field.extract(word),
                })
                .collect(),
            ambiguous,
            branch: self.control_flow.get(instruction.key()),
        }
    }

    /// Disassembles little-endian words assuming an implicit base address of zero.
    pub fn disassemble(&self, bytes: &[u8]) -> Vec<Disassembly> {
        self.disassemble_from(bytes, 0)
    }

    /// Disassembles little-endian words and annotates them with `base_address` offsets.
    /// A trailing partial word is ignored.
    pub fn disassemble_from(&self, bytes: &[u8], base_address: u64) -> Vec<Disassembly> {
        bytes
            .chunks_exact(WORD_BYTES)
            .enumerate()
            .map(|(idx, chunk)| {
                let address = base_address + (idx * WORD_BYTES) as u64;
                let opcode = chunk
                    .iter()
                    .enumerate()
                    .fold(0u32, |acc, (shift, byte)| acc | ((*byte as u32) << (shift * 8)));
                match self.decode(opcode) {
                    Some(found) => Disassembly {
                        address,
                        opcode,
                        mnemonic: found.instruction.mnemonic.clone(),
                        encoding: Some(found.encoding.name().to_string()),
                        operands: found.operands.iter().map(ToString::to_string).collect(),
                    },
                    None => Disassembly {
                        address,
                        opcode,
                        mnemonic: "unknown".into(),
                        encoding: None,
                        operands: vec![format!("0x{opcode:08X}")],
                    },
                }
            })
            .collect()
    }

    /// Canonical text of every entry, one line each, sorted so that it does not depend on the
    /// order instructions were loaded in.
    pub fn canonical_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .map(|entry| {
                let mut names: Vec<&str> = entry
                    .members
                    .iter()
                    .map(|id| self.table.encoding(*id).name())
                    .collect();
                names.sort_unstable();
                format!(
                    "{:08x}/{:08x} {:?} {}",
                    entry.shared.mask(),
                    entry.shared.value(),
                    entry.kind,
                    names.join(",")
                )
            })
            .collect();
        lines.sort();
        lines
    }

    /// SHA-256 over [`DecodeTable::canonical_lines`].
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for line in self.canonical_lines() {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().into()
    }

    pub fn fingerprint_hex(&self) -> String {
        self.fingerprint()
            .iter()
            .fold(String::with_capacity(64), |mut out, byte| {
                let _ = write!(out, "{byte:02x}");
                out
            })
    }
}

/// Bits a word must carry to reach `leaf` at run time. Singletons were already
/// tightened to their strictly bound bits; ambiguous leaves still carry the
/// `(0)`/`(1)` positions of their members, which conforming words may violate.
fn runtime_shared(leaf: &Leaf<'_>) -> SharedBits {
    let shared = leaf.set.shared_bits();
    if !leaf.is_ambiguous() {
        return shared;
    }
    let unpredictable = leaf
        .set
        .encodings()
        .fold(0, |mask, encoding| mask | encoding.unpredictable_mask());
    shared.without(unpredictable)
}
