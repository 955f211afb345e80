//! Fixed-width encodings assembled from diagram boxes.
//!
//! Positions are numbered from the left: position 0 is the most significant bit of the word
//! (machine bit 31). Field spans (`high_bit`/`low_bit`) use machine numbering, LSB = 0, so
//! operands can be extracted from a raw word directly.

use std::collections::BTreeMap;
use std::fmt;

use smallvec::SmallVec;

use super::bit::{BitPattern, BitValue, render_pattern};
use super::error::IsaError;
use super::instruction::InstructionId;

pub const WORD_BITS: usize = 32;

/// Name carried by boxes that do not describe an operand.
pub const UNNAMED_FIELD: &str = "_";

/// Single-bit mask selecting `position` (left-numbered) inside a word. Positions past the
/// end of the word select nothing.
pub fn position_mask(position: u8) -> u32 {
    (1u32 << (WORD_BITS - 1)).checked_shr(position as u32).unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EncodingId(pub u32);

impl EncodingId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Unplaced description of one diagram box, as produced by ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub width: usize,
    /// Listed values, most significant first. `None` leaves the whole field unbound.
    pub pattern: Option<BitPattern>,
    pub inverted: bool,
}

impl FieldSpec {
    pub fn unbound(name: impl Into<String>, width: usize) -> Self {
        Self {
            name: name.into(),
            width,
            pattern: None,
            inverted: false,
        }
    }

    pub fn fixed(name: impl Into<String>, pattern: BitPattern) -> Self {
        Self {
            name: name.into(),
            width: pattern.len(),
            pattern: Some(pattern),
            inverted: false,
        }
    }

    /// A field whose listed pattern is forbidden rather than required (`!= 1111`).
    pub fn inverted(name: impl Into<String>, pattern: BitPattern) -> Self {
        Self {
            inverted: true,
            ..Self::fixed(name, pattern)
        }
    }
}

/// A contiguous, placed span of an encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitField {
    pub name: String,
    pub high_bit: u8,
    pub low_bit: u8,
    pub values: BitPattern,
    pub inverted: bool,
}

impl BitField {
    pub fn width(&self) -> usize {
        (self.high_bit - self.low_bit) as usize + 1
    }

    pub fn is_named(&self) -> bool {
        self.name != UNNAMED_FIELD
    }

    /// Named field that still carries information once the encoding is identified.
    pub fn is_operand(&self) -> bool {
        self.is_named() && (self.inverted || self.values.iter().any(|value| !value.is_bound()))
    }

    /// Mask covering the field inside a word.
    pub fn mask(&self) -> u32 {
        let ones = if self.width() >= WORD_BITS {
            u32::MAX
        } else {
            (1u32 << self.width()) - 1
        };
        ones << self.low_bit
    }

    /// Reads the operand value carried by this field.
    pub fn extract(&self, word: u32) -> u32 {
        (word & self.mask()) >> self.low_bit
    }
}

impl fmt::Display for BitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.inverted {
            f.write_str("!")?;
        }
        f.write_str(&render_pattern(&self.values))
    }
}

/// One fixed-width bit diagram of an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoding {
    id: EncodingId,
    instruction: InstructionId,
    name: String,
    instruction_set: String,
    psname: Option<String>,
    fields: SmallVec<[BitField; 8]>,
    bits: [BitValue; WORD_BITS],
}

impl Encoding {
    /// Places `fields` left to right starting at machine bit 31.
    pub fn new(
        id: EncodingId,
        instruction: InstructionId,
        name: impl Into<String>,
        fields: impl IntoIterator<Item = FieldSpec>,
    ) -> Result<Self, IsaError> {
        let name = name.into();
        let fields: Vec<FieldSpec> = fields.into_iter().collect();
        let width = fields
            .iter()
            .fold(0usize, |total, field| total.saturating_add(field.width));
        if width != WORD_BITS || fields.iter().any(|field| field.width == 0) {
            return Err(IsaError::Width {
                encoding: name,
                width,
            });
        }

        let mut placed = SmallVec::new();
        let mut bits = [BitValue::Unbound; WORD_BITS];
        let mut position = 0usize;
        for spec in fields {
            let values = match spec.pattern {
                Some(values) if values.len() != spec.width => {
                    return Err(IsaError::PatternWidth {
                        encoding: name,
                        field: spec.name,
                        width: spec.width,
                        listed: values.len(),
                    });
                }
                Some(values) => values,
                None => std::iter::repeat_n(BitValue::Unbound, spec.width).collect(),
            };
            if !spec.inverted {
                bits[position..position + spec.width].copy_from_slice(&values);
            }
            let high_bit = (WORD_BITS - 1 - position) as u8;
            let low_bit = (WORD_BITS - position - spec.width) as u8;
            placed.push(BitField {
                name: spec.name,
                high_bit,
                low_bit,
                values,
                inverted: spec.inverted,
            });
            position += spec.width;
        }

        Ok(Self {
            id,
            instruction,
            name,
            instruction_set: String::new(),
            psname: None,
            fields: placed,
            bits,
        })
    }

    pub fn with_instruction_set(mut self, instruction_set: impl Into<String>) -> Self {
        self.instruction_set = instruction_set.into();
        self
    }

    pub fn with_psname(mut self, psname: impl Into<String>) -> Self {
        self.psname = Some(psname.into());
        self
    }

    pub fn id(&self) -> EncodingId {
        self.id
    }

    pub fn instruction(&self) -> InstructionId {
        self.instruction
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instruction_set(&self) -> &str {
        &self.instruction_set
    }

    pub fn psname(&self) -> Option<&str> {
        self.psname.as_deref()
    }

    pub fn fields(&self) -> &[BitField] {
        &self.fields
    }

    /// Value at a left-numbered position. Inverted fields read as unbound.
    pub fn get_bit(&self, position: usize) -> Result<BitValue, IsaError> {
        self.bits.get(position).copied().ok_or(IsaError::Index {
            position,
            width: WORD_BITS,
        })
    }

    /// Values for positions `lower..upper`.
    pub fn get_bit_range(&self, lower: usize, upper: usize) -> Result<Vec<BitValue>, IsaError> {
        (lower..upper).map(|position| self.get_bit(position)).collect()
    }

    pub(crate) fn bit_at(&self, position: u8) -> BitValue {
        self.bits[position as usize]
    }

    pub(crate) fn bits(&self) -> &[BitValue; WORD_BITS] {
        &self.bits
    }

    pub fn unbound_count(&self) -> usize {
        self.bits.iter().filter(|value| value.is_unbound()).count()
    }

    /// Operand fields, i.e. every box except the unnamed ones.
    pub fn named_fields(&self) -> impl Iterator<Item = &BitField> {
        self.fields.iter().filter(|field| field.is_named())
    }

    pub fn operands(&self) -> impl Iterator<Item = &BitField> {
        self.fields.iter().filter(|field| field.is_operand())
    }

    pub fn field(&self, name: &str) -> Option<&BitField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Mask of strictly bound bits in machine numbering.
    pub fn bound_mask(&self) -> u32 {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_bound())
            .fold(0, |mask, (position, _)| mask | position_mask(position as u8))
    }

    /// Values of the strictly bound bits, aligned with [`Encoding::bound_mask`].
    pub fn bound_value(&self) -> u32 {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(position, value)| match value {
                BitValue::Bound(bit) => Some((position, bit.as_u32())),
                _ => None,
            })
            .fold(0, |acc, (position, bit)| {
                acc | (bit * position_mask(position as u8))
            })
    }

    /// Mask of the `(0)`/`(1)` positions, which a conforming word may violate.
    pub fn unpredictable_mask(&self) -> u32 {
        self.bits
            .iter()
            .enumerate()
            .filter(|(_, value)| matches!(value, BitValue::Unpredictable(_)))
            .fold(0, |mask, (position, _)| mask | position_mask(position as u8))
    }

    /// Whether `word` agrees with every strictly bound bit.
    pub fn matches(&self, word: u32) -> bool {
        word & self.bound_mask() == self.bound_value()
    }

    /// Histogram of maximal unbound runs, keyed by run length.
    pub fn size_of_unbound_runs(&self) -> BTreeMap<usize, usize> {
        let mut runs = BTreeMap::new();
        let mut current = 0usize;
        for value in &self.bits {
            if value.is_unbound() {
                current += 1;
            } else if current > 0 {
                *runs.entry(current).or_insert(0) += 1;
                current = 0;
            }
        }
        if current > 0 {
            *runs.entry(current).or_insert(0) += 1;
        }
        runs
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, field) in self.fields.iter().enumerate() {
            if idx > 0 {
                f.write_str(":")?;
            }
            write!(f, "{field}")?;
        }
        Ok(())
    }
}
