//! Generates a standalone Rust decoder module from a [`DecodeTable`].

use std::collections::BTreeSet;
use std::fmt::{self, Write};

use ahash::AHashMap;

use crate::isa::encoding::{Encoding, EncodingId};
use crate::isa::ranges::RangeExpr;

use super::control_flow::BranchKind;
use super::table::{DecodeEntry, DecodeTable};

/// Converts any string into a valid Rust identifier by replacing invalid characters with `_`.
pub fn sanitize_identifier(text: &str) -> String {
    let mut ident: String = text
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|ch: char| ch.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

/// Renders the decoder module as a string.
pub fn emit_rust(decoder: &DecodeTable<'_>) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_rust(&mut out, decoder);
    out
}

pub fn write_rust<W: Write>(out: &mut W, decoder: &DecodeTable<'_>) -> fmt::Result {
    let names = OpcodeNames::new(decoder);
    writeln!(out, "// @generated by decodegen. Do not edit.")?;
    writeln!(out, "// fingerprint: {}", decoder.fingerprint_hex())?;
    writeln!(out)?;
    write_opcode_enum(out, decoder, &names)?;
    writeln!(out)?;
    write_branch_types(out)?;
    writeln!(out)?;
    write_decode_fn(out, decoder, &names)?;
    writeln!(out)?;
    write_branch_info_fn(out, decoder, &names)?;
    Ok(())
}

/// Variant names for every encoding reachable from the table, in id order.
struct OpcodeNames<'t> {
    ordered: Vec<(&'t Encoding, String)>,
    by_id: AHashMap<EncodingId, usize>,
}

impl<'t> OpcodeNames<'t> {
    fn new(decoder: &DecodeTable<'t>) -> Self {
        let ids: BTreeSet<EncodingId> = decoder
            .entries()
            .iter()
            .flat_map(|entry| entry.members.iter().copied())
            .collect();
        let mut taken = BTreeSet::new();
        let mut ordered = Vec::with_capacity(ids.len());
        let mut by_id = AHashMap::new();
        for id in ids {
            let encoding = decoder.table().encoding(id);
            let mut name = sanitize_identifier(encoding.name());
            if !taken.insert(name.clone()) {
                name = format!("{name}_{}", id.0);
                taken.insert(name.clone());
            }
            by_id.insert(id, ordered.len());
            ordered.push((encoding, name));
        }
        Self { ordered, by_id }
    }

    fn get(&self, id: EncodingId) -> &str {
        self.by_id
            .get(&id)
            .map(|idx| self.ordered[*idx].1.as_str())
            .unwrap_or("_")
    }
}

fn write_opcode_enum<W: Write>(
    out: &mut W,
    decoder: &DecodeTable<'_>,
    names: &OpcodeNames<'_>,
) -> fmt::Result {
    writeln!(out, "#[allow(non_camel_case_types)]")?;
    writeln!(out, "#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]")?;
    writeln!(out, "pub enum Opcode {{")?;
    for (_, name) in &names.ordered {
        writeln!(out, "    {name},")?;
    }
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "impl Opcode {{")?;
    writeln!(out, "    pub fn mnemonic(self) -> &'static str {{")?;
    writeln!(out, "        match self {{")?;
    for (encoding, name) in &names.ordered {
        let instruction = decoder.table().instruction_of(encoding);
        writeln!(out, "            Opcode::{name} => {:?},", instruction.mnemonic)?;
    }
    writeln!(out, "        }}")?;
    writeln!(out, "    }}")?;
    writeln!(out)?;
    writeln!(out, "    /// Operand fields as `(name, high_bit, low_bit)`.")?;
    writeln!(out, "    pub fn fields(self) -> &'static [(&'static str, u8, u8)] {{")?;
    writeln!(out, "        match self {{")?;
    for (encoding, name) in &names.ordered {
        let fields: Vec<String> = encoding
            .operands()
            .map(|field| format!("({:?}, {}, {})", field.name, field.high_bit, field.low_bit))
            .collect();
        writeln!(out, "            Opcode::{name} => &[{}],", fields.join(", "))?;
    }
    writeln!(out, "        }}")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")
}

fn write_branch_types<W: Write>(out: &mut W) -> fmt::Result {
    writeln!(out, "#[derive(Clone, Copy, Debug, PartialEq, Eq)]")?;
    writeln!(out, "pub enum BranchKind {{")?;
    writeln!(out, "    Direct,")?;
    writeln!(out, "    Indirect,")?;
    writeln!(out, "}}")?;
    writeln!(out)?;
    writeln!(out, "#[derive(Clone, Copy, Debug, PartialEq, Eq)]")?;
    writeln!(out, "pub struct BranchInfo {{")?;
    writeln!(out, "    pub kind: BranchKind,")?;
    writeln!(out, "    pub predicated: bool,")?;
    writeln!(out, "    pub has_target: bool,")?;
    writeln!(out, "}}")
}

/// Renders a range expression as a boolean over `word`.
pub fn condition(ranges: &RangeExpr) -> String {
    if ranges.is_empty() {
        return "true".into();
    }
    let clauses: Vec<String> = ranges
        .clauses()
        .iter()
        .map(|clause| {
            let tests: Vec<String> = clause
                .alternatives()
                .iter()
                .map(|test| format!("word & {:#010x} == {:#010x}", test.mask(), test.expected()))
                .collect();
            if tests.len() == 1 {
                tests.join("")
            } else {
                format!("({})", tests.join(" || "))
            }
        })
        .collect();
    clauses.join(" && ")
}

fn write_decode_fn<W: Write>(
    out: &mut W,
    decoder: &DecodeTable<'_>,
    names: &OpcodeNames<'_>,
) -> fmt::Result {
    writeln!(out, "/// Identifies `word`, trying the most specific tests first.")?;
    writeln!(out, "pub fn decode(word: u32) -> Option<Opcode> {{")?;
    for entry in decoder.entries() {
        write_entry(out, decoder, names, entry)?;
    }
    writeln!(out, "    None")?;
    writeln!(out, "}}")
}

fn write_entry<W: Write>(
    out: &mut W,
    decoder: &DecodeTable<'_>,
    names: &OpcodeNames<'_>,
    entry: &DecodeEntry,
) -> fmt::Result {
    if entry.is_ambiguous() {
        let candidates: Vec<&str> = entry.members.iter().map(|id| names.get(*id)).collect();
        writeln!(
            out,
            "    // {:?}: {}",
            entry.kind,
            candidates.join(", ")
        )?;
    }
    writeln!(out, "    if {} {{", condition(&entry.ranges))?;
    if entry.is_ambiguous() {
        for id in &entry.members {
            let encoding = decoder.table().encoding(*id);
            writeln!(
                out,
                "        if word & {:#010x} == {:#010x} {{",
                encoding.bound_mask(),
                encoding.bound_value()
            )?;
            writeln!(out, "            return Some(Opcode::{});", names.get(*id))?;
            writeln!(out, "        }}")?;
        }
    } else if let Some(id) = entry.members.first() {
        writeln!(out, "        return Some(Opcode::{});", names.get(*id))?;
    }
    writeln!(out, "    }}")
}

fn write_branch_info_fn<W: Write>(
    out: &mut W,
    decoder: &DecodeTable<'_>,
    names: &OpcodeNames<'_>,
) -> fmt::Result {
    writeln!(out, "pub fn branch_info(opcode: Opcode) -> Option<BranchInfo> {{")?;
    writeln!(out, "    match opcode {{")?;
    for (encoding, name) in &names.ordered {
        let instruction = decoder.table().instruction_of(encoding);
        let Some(info) = decoder.control_flow().get(instruction.key()) else {
            continue;
        };
        let kind = match info.kind {
            BranchKind::Direct => "Direct",
            BranchKind::Indirect => "Indirect",
        };
        writeln!(
            out,
            "        Opcode::{name} => Some(BranchInfo {{ kind: BranchKind::{kind}, predicated: {}, has_target: {} }}),",
            info.is_predicated(),
            info.has_target()
        )?;
    }
    writeln!(out, "        #[allow(unreachable_patterns)]")?;
    writeln!(out, "        _ => None,")?;
    writeln!(out, "    }}")?;
    writeln!(out, "}}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorConfig;
    use crate::isa::builder::TableBuilder;
    use crate::isa::instruction::InstructionTable;

    fn table() -> InstructionTable {
        let mut builder = TableBuilder::new();
        builder
            .instruction("b_uncond.xml", "B")
            .spec_id("op_aarch64_a64_b_uncond_b_only_branch_imm")
            .encoding("B_only_branch_imm", "A64", "op:1=0 _:5=00101 imm26:26")
            .finish()
            .expect("b");
        builder
            .instruction("hint.xml", "HINT")
            .encoding("HINT_HM_hints", "A64", "_:20=11010101000000110010 CRm:4 op2:3 _:5=11111")
            .finish()
            .expect("hint");
        builder
            .instruction("nop.xml", "NOP")
            .encoding("NOP_HI_hints", "A64", "_:20=11010101000000110010 _:4=0000 _:3=000 _:5=11111")
            .finish()
            .expect("nop");
        builder.build().expect("table")
    }

    #[test]
    fn sanitizes_identifiers() {
        assert_eq!(sanitize_identifier("B.cond"), "B_cond");
        assert_eq!(sanitize_identifier("MOV (to/from SP)"), "MOV__to_from_SP_");
        assert_eq!(sanitize_identifier("32bit"), "_32bit");
        assert_eq!(sanitize_identifier(""), "_");
    }

    #[test]
    fn renders_range_conditions() {
        let table = table();
        let decoder = DecodeTable::build(&table, &GeneratorConfig::default()).expect("decoder");
        let b = decoder
            .entries()
            .iter()
            .find(|entry| !entry.is_ambiguous())
            .expect("b entry");
        assert_eq!(condition(&b.ranges), "word & 0xfc000000 == 0x14000000");
        assert_eq!(condition(&RangeExpr::default()), "true");
    }

    #[test]
    fn emits_a_complete_module() {
        let table = table();
        let decoder = DecodeTable::build(&table, &GeneratorConfig::default()).expect("decoder");
        let source = emit_rust(&decoder);

        assert!(source.starts_with("// @generated by decodegen"));
        assert!(source.contains(&format!("// fingerprint: {}", decoder.fingerprint_hex())));
        assert!(source.contains("pub enum Opcode {\n    B_only_branch_imm,\n    HINT_HM_hints,\n    NOP_HI_hints,\n}"));
        assert!(source.contains("Opcode::B_only_branch_imm => &[(\"imm26\", 25, 0)],"));
        assert!(source.contains("Opcode::NOP_HI_hints => &[],"));
        assert!(source.contains("// Irreducible: NOP_HI_hints, HINT_HM_hints"));
        assert!(source.contains("if word & 0xffffffff == 0xd503201f {"));
        assert!(source.contains(
            "Opcode::B_only_branch_imm => Some(BranchInfo { kind: BranchKind::Direct, predicated: false, has_target: true }),"
        ));
        assert!(source.trim_end().ends_with('}'));
    }

    #[test]
    fn colliding_names_get_unique_variants() {
        let mut builder = TableBuilder::new();
        builder
            .instruction("a.xml", "A")
            .encoding("X.1", "A64", "_:1=0 imm:31")
            .finish()
            .expect("a");
        builder
            .instruction("b.xml", "B")
            .encoding("X_1", "A64", "_:1=1 imm:31")
            .finish()
            .expect("b");
        let table = builder.build().expect("table");
        let decoder = DecodeTable::build(&table, &GeneratorConfig::default()).expect("decoder");
        let source = emit_rust(&decoder);
        assert!(source.contains("    X_1,\n    X_1_1,\n"), "{source}");
    }
}
