//! Helpers for constructing an [`InstructionTable`] programmatically without routing through
//! the `.enc` loader.

use super::bit::parse_pattern;
use super::encoding::{Encoding, EncodingId, FieldSpec};
use super::error::IsaError;
use super::instruction::{Alias, Instruction, InstructionId, InstructionTable};

/// Convenience wrapper for assembling instruction tables in memory.
#[derive(Default)]
pub struct TableBuilder {
    table: InstructionTable,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begins a canonical instruction record; call [`InstructionBuilder::finish`] to push it.
    pub fn instruction(
        &mut self,
        file_name: impl Into<String>,
        name: impl Into<String>,
    ) -> InstructionBuilder<'_> {
        self.record(file_name.into(), name.into(), Alias::Canonical {
            alias_files: Vec::new(),
            aliases: Vec::new(),
        })
    }

    /// Begins an alias record pointing at `target_file`.
    pub fn alias(
        &mut self,
        file_name: impl Into<String>,
        name: impl Into<String>,
        target_file: impl Into<String>,
    ) -> InstructionBuilder<'_> {
        self.record(file_name.into(), name.into(), Alias::AliasOf {
            target_file: target_file.into(),
            target: None,
        })
    }

    fn record(&mut self, file_name: String, name: String, alias: Alias) -> InstructionBuilder<'_> {
        let mnemonic = name
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        let id = self.table.next_instruction_id();
        InstructionBuilder {
            builder: self,
            instruction: Instruction {
                id,
                name,
                file_name,
                spec_id: None,
                mnemonic,
                alias,
                encodings: Vec::new(),
            },
            encodings: Vec::new(),
            error: None,
        }
    }

    /// Resolves alias references and returns the assembled table.
    pub fn build(mut self) -> Result<InstructionTable, IsaError> {
        self.table.resolve_aliases()?;
        Ok(self.table)
    }
}

pub struct InstructionBuilder<'b> {
    builder: &'b mut TableBuilder,
    instruction: Instruction,
    encodings: Vec<Encoding>,
    error: Option<IsaError>,
}

impl InstructionBuilder<'_> {
    pub fn mnemonic(mut self, mnemonic: impl Into<String>) -> Self {
        self.instruction.mnemonic = mnemonic.into();
        self
    }

    pub fn spec_id(mut self, spec_id: impl Into<String>) -> Self {
        self.instruction.spec_id = Some(spec_id.into());
        self
    }

    pub fn alias_file(mut self, file_name: impl Into<String>) -> Self {
        if let Alias::Canonical { alias_files, .. } = &mut self.instruction.alias {
            alias_files.push(file_name.into());
        }
        self
    }

    /// Adds an encoding from already parsed fields.
    pub fn encoding_fields(
        self,
        name: impl Into<String>,
        instruction_set: impl Into<String>,
        fields: impl IntoIterator<Item = FieldSpec>,
    ) -> Self {
        self.encoding_declared(name, instruction_set, None, fields)
    }

    /// Adds an encoding together with its pseudocode name, as read from a spec file.
    pub fn encoding_declared(
        mut self,
        name: impl Into<String>,
        instruction_set: impl Into<String>,
        psname: Option<&str>,
        fields: impl IntoIterator<Item = FieldSpec>,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        let id = self.next_encoding_id();
        match Encoding::new(id, self.instruction.id, name, fields) {
            Ok(encoding) => {
                let encoding = encoding.with_instruction_set(instruction_set);
                self.encodings.push(match psname {
                    Some(psname) => encoding.with_psname(psname),
                    None => encoding,
                });
            }
            Err(err) => self.error = Some(err),
        }
        self
    }

    /// Adds an encoding described in the compact `name:width[=pattern|!=pattern]` notation,
    /// one box per whitespace-separated token (e.g. `sf:1 _:6=100010 imm12:12`).
    pub fn encoding(
        mut self,
        name: impl Into<String>,
        instruction_set: impl Into<String>,
        boxes: &str,
    ) -> Self {
        match parse_boxes(boxes) {
            Ok(fields) => self.encoding_fields(name, instruction_set, fields),
            Err(err) => {
                self.error.get_or_insert(err);
                self
            }
        }
    }

    fn next_encoding_id(&self) -> EncodingId {
        let base = self.builder.table.next_encoding_id();
        EncodingId(base.0 + self.encodings.len() as u32)
    }

    /// Pushes the instruction and its encodings into the table.
    pub fn finish(self) -> Result<InstructionId, IsaError> {
        if let Some(err) = self.error {
            return Err(err);
        }
        self.builder.table.push(self.instruction, self.encodings)
    }
}

/// Parses the compact box notation used by [`InstructionBuilder::encoding`].
pub fn parse_boxes(boxes: &str) -> Result<Vec<FieldSpec>, IsaError> {
    boxes.split_whitespace().map(parse_box).collect()
}

fn parse_box(token: &str) -> Result<FieldSpec, IsaError> {
    let malformed = || IsaError::Format(token.to_string());
    let (name, rest) = token.split_once(':').ok_or_else(malformed)?;
    let (width, pattern, inverted) = if let Some((width, pattern)) = rest.split_once("!=") {
        (width, Some(pattern), true)
    } else if let Some((width, pattern)) = rest.split_once('=') {
        (width, Some(pattern), false)
    } else {
        (rest, None, false)
    };
    let width: usize = width.parse().map_err(|_| malformed())?;
    let pattern = pattern.map(parse_pattern).transpose()?;
    Ok(FieldSpec {
        name: name.to_string(),
        width,
        pattern,
        inverted,
    })
}
