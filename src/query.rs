//! Filters over a loaded instruction table.

use std::fmt::{self, Write};

use crate::isa::instruction::{Instruction, InstructionTable};

/// Conjunctive instruction filters; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionQuery {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub mnemonic: Option<String>,
    pub encoding_count: Option<usize>,
    pub include_aliases: bool,
}

impl InstructionQuery {
    /// Mnemonics are listed in upper case; a lowercase letter usually means a typo.
    pub fn mnemonic_looks_wrong(&self) -> bool {
        self.mnemonic
            .as_deref()
            .is_some_and(|mnemonic| mnemonic.chars().any(|ch| ch.is_lowercase()))
    }

    pub fn matches(&self, instruction: &Instruction) -> bool {
        (self.include_aliases || !instruction.is_alias())
            && self.name.as_deref().is_none_or(|name| instruction.name == name)
            && self
                .file_name
                .as_deref()
                .is_none_or(|file| instruction.file_name == file)
            && self
                .mnemonic
                .as_deref()
                .is_none_or(|mnemonic| instruction.mnemonic == mnemonic)
            && self
                .encoding_count
                .is_none_or(|count| instruction.encodings.len() == count)
    }

    pub fn run<'t>(&self, table: &'t InstructionTable) -> Vec<&'t Instruction> {
        table
            .instructions()
            .filter(|instruction| self.matches(instruction))
            .collect()
    }

    /// Multi-line description of one result.
    pub fn describe(&self, table: &InstructionTable, instruction: &Instruction) -> String {
        let mut out = String::new();
        let _ = self.write_description(&mut out, table, instruction);
        out
    }

    pub fn write_description<W: Write>(
        &self,
        out: &mut W,
        table: &InstructionTable,
        instruction: &Instruction,
    ) -> fmt::Result {
        writeln!(out, "--- {} ---", instruction.name)?;
        writeln!(out, "   Filename: {}", instruction.file_name)?;
        writeln!(out, "   Mnemonic: {}", instruction.mnemonic)?;
        if self.include_aliases {
            writeln!(out, "   Is Alias: {}", instruction.is_alias())?;
        }
        writeln!(out, "   Encodings:")?;
        for id in &instruction.encodings {
            let encoding = table.encoding(*id);
            writeln!(out, "     {} {}", encoding.name(), encoding)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::builder::TableBuilder;

    fn table() -> InstructionTable {
        let mut builder = TableBuilder::new();
        builder
            .instruction("cbz.xml", "CBZ")
            .alias_file("nop_cbz.xml")
            .encoding("CBZ_32_compbranch", "A64", "sf:1=0 _:6=011010 op:1=0 imm19:19 Rt:5")
            .encoding("CBZ_64_compbranch", "A64", "sf:1=1 _:6=011010 op:1=0 imm19:19 Rt:5")
            .finish()
            .expect("cbz");
        builder
            .instruction("cbnz.xml", "CBNZ")
            .encoding("CBNZ_32_compbranch", "A64", "sf:1=0 _:6=011010 op:1=1 imm19:19 Rt:5")
            .encoding("CBNZ_64_compbranch", "A64", "sf:1=1 _:6=011010 op:1=1 imm19:19 Rt:5")
            .finish()
            .expect("cbnz");
        builder
            .alias("nop_cbz.xml", "NOP", "cbz.xml")
            .encoding("NOP_alias", "A64", "_:32=11010101000000110010000000011111")
            .finish()
            .expect("alias");
        builder.build().expect("table")
    }

    fn names(found: &[&Instruction]) -> Vec<String> {
        found.iter().map(|instruction| instruction.name.clone()).collect()
    }

    #[test]
    fn empty_query_lists_canonical_instructions() {
        let table = table();
        assert_eq!(names(&InstructionQuery::default().run(&table)), ["CBZ", "CBNZ"]);
        let with_aliases = InstructionQuery {
            include_aliases: true,
            ..Default::default()
        };
        assert_eq!(with_aliases.run(&table).len(), 3);
    }

    #[test]
    fn filters_are_conjunctive() {
        let table = table();
        let query = InstructionQuery {
            mnemonic: Some("CBNZ".into()),
            encoding_count: Some(2),
            ..Default::default()
        };
        assert_eq!(names(&query.run(&table)), ["CBNZ"]);

        let query = InstructionQuery {
            file_name: Some("cbz.xml".into()),
            encoding_count: Some(1),
            ..Default::default()
        };
        assert!(query.run(&table).is_empty());

        let query = InstructionQuery {
            name: Some("NOP".into()),
            include_aliases: true,
            ..Default::default()
        };
        assert_eq!(names(&query.run(&table)), ["NOP"]);
    }

    #[test]
    fn flags_lowercase_mnemonics() {
        let query = InstructionQuery {
            mnemonic: Some("cbz".into()),
            ..Default::default()
        };
        assert!(query.mnemonic_looks_wrong());
        assert!(!InstructionQuery::default().mnemonic_looks_wrong());
        let table = table();
        assert!(query.run(&table).is_empty());
    }

    #[test]
    fn describes_results() {
        let table = table();
        let query = InstructionQuery {
            include_aliases: true,
            ..Default::default()
        };
        let cbz = table.by_file("cbz.xml").expect("cbz");
        let text = query.describe(&table, cbz);
        assert!(text.starts_with("--- CBZ ---\n"));
        assert!(text.contains("   Is Alias: false\n"));
        assert!(text.contains("     CBZ_64_compbranch 1:011010:0:xxxxxxxxxxxxxxxxxxx:xxxxx\n"), "{text}");
    }
}
