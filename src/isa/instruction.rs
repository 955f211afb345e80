//! Instruction records and the table that owns every ingested encoding.
//!
//! Encodings reference their owning instruction by [`InstructionId`] only; the table is the
//! single owner of both.

use ahash::AHashMap;

use super::encoding::{Encoding, EncodingId};
use super::error::IsaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstructionId(pub u32);

impl InstructionId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Alias relationship as listed by the source documents, before and after resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alias {
    Canonical {
        alias_files: Vec<String>,
        aliases: Vec<InstructionId>,
    },
    AliasOf {
        target_file: String,
        target: Option<InstructionId>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub id: InstructionId,
    /// Section heading, e.g. `ADD (immediate)`.
    pub name: String,
    /// Source document the record was read from; alias references use it as a key.
    pub file_name: String,
    /// Stable identifier used to key integrator metadata.
    pub spec_id: Option<String>,
    pub mnemonic: String,
    pub alias: Alias,
    pub encodings: Vec<EncodingId>,
}

impl Instruction {
    pub fn is_alias(&self) -> bool {
        matches!(self.alias, Alias::AliasOf { .. })
    }

    /// Key used for integrator tables: the spec id, falling back to the file name.
    pub fn key(&self) -> &str {
        self.spec_id.as_deref().unwrap_or(&self.file_name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstructionTable {
    instructions: Vec<Instruction>,
    encodings: Vec<Encoding>,
    by_file: AHashMap<String, InstructionId>,
}

impl InstructionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn next_instruction_id(&self) -> InstructionId {
        InstructionId(self.instructions.len() as u32)
    }

    pub fn next_encoding_id(&self) -> EncodingId {
        EncodingId(self.encodings.len() as u32)
    }

    /// Registers an instruction and the encodings built for it. Encoding ids must have been
    /// allocated through [`InstructionTable::next_encoding_id`] in order. File names key alias
    /// references, so a second record with the same file name is rejected.
    pub fn push(
        &mut self,
        mut instruction: Instruction,
        encodings: Vec<Encoding>,
    ) -> Result<InstructionId, IsaError> {
        if self.by_file.contains_key(&instruction.file_name) {
            return Err(IsaError::DuplicateInstruction(instruction.file_name));
        }
        let id = self.next_instruction_id();
        instruction.id = id;
        instruction.encodings = encodings.iter().map(Encoding::id).collect();
        self.by_file.insert(instruction.file_name.clone(), id);
        self.instructions.push(instruction);
        self.encodings.extend(encodings);
        Ok(id)
    }

    pub fn instruction(&self, id: InstructionId) -> &Instruction {
        &self.instructions[id.index()]
    }

    pub fn encoding(&self, id: EncodingId) -> &Encoding {
        &self.encodings[id.index()]
    }

    pub fn instruction_of(&self, encoding: &Encoding) -> &Instruction {
        self.instruction(encoding.instruction())
    }

    pub fn by_file(&self, file_name: &str) -> Option<&Instruction> {
        self.by_file.get(file_name).map(|id| self.instruction(*id))
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn all_encodings(&self) -> impl Iterator<Item = &Encoding> {
        self.encodings.iter()
    }

    /// The universe handed to the tree builder.
    pub fn encodings(&self, include_aliases: bool) -> impl Iterator<Item = &Encoding> {
        self.encodings
            .iter()
            .filter(move |enc| include_aliases || !self.instruction_of(enc).is_alias())
    }

    /// Converts file-name alias references into instruction ids.
    pub fn resolve_aliases(&mut self) -> Result<(), IsaError> {
        let by_file = &self.by_file;
        for instruction in &mut self.instructions {
            let from = &instruction.file_name;
            let lookup = |target: &String| {
                by_file
                    .get(target)
                    .copied()
                    .ok_or_else(|| IsaError::UnknownInstruction {
                        from: from.clone(),
                        target: target.clone(),
                    })
            };
            match &mut instruction.alias {
                Alias::Canonical {
                    alias_files,
                    aliases,
                } => {
                    *aliases = alias_files.iter().map(lookup).collect::<Result<_, _>>()?;
                }
                Alias::AliasOf {
                    target_file,
                    target,
                } => {
                    *target = Some(lookup(target_file)?);
                }
            }
        }
        Ok(())
    }
}
