//! Branch metadata attached to decoded instructions.

use std::fmt;

use ahash::AHashMap;
use bitflags::bitflags;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// Destination is encoded in the instruction.
    Direct,
    /// Destination comes from a register or from saved state.
    Indirect,
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct BranchFlags: u8 {
        /// Taken only when a condition holds.
        const PREDICATED = 0b0001;
        /// The target can be computed from the instruction word alone.
        const HAS_TARGET = 0b0010;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BranchInfo {
    pub kind: BranchKind,
    pub flags: BranchFlags,
}

impl BranchInfo {
    pub const fn new(kind: BranchKind, flags: BranchFlags) -> Self {
        Self { kind, flags }
    }

    pub fn is_predicated(&self) -> bool {
        self.flags.contains(BranchFlags::PREDICATED)
    }

    pub fn has_target(&self) -> bool {
        self.flags.contains(BranchFlags::HAS_TARGET)
    }
}

impl fmt::Display for BranchInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BranchKind::Direct => "direct",
            BranchKind::Indirect => "indirect",
        };
        f.write_str(kind)?;
        if self.is_predicated() {
            f.write_str(", predicated")?;
        }
        if self.has_target() {
            f.write_str(", target")?;
        }
        Ok(())
    }
}

const A64_BRANCHES: &[(&str, BranchKind, BranchFlags)] = &[
    (
        "op_aarch64_a64_b_uncond_b_only_branch_imm",
        BranchKind::Direct,
        BranchFlags::HAS_TARGET,
    ),
    (
        "op_aarch64_a64_b_cond_b_only_condbranch",
        BranchKind::Indirect,
        BranchFlags::PREDICATED,
    ),
    ("op_aarch64_a64_br_br_64_branch_reg", BranchKind::Indirect, BranchFlags::empty()),
    (
        "op_aarch64_a64_cbz_br19",
        BranchKind::Direct,
        BranchFlags::PREDICATED.union(BranchFlags::HAS_TARGET),
    ),
    ("op_aarch64_a64_drps_drps_64e_branch_reg", BranchKind::Indirect, BranchFlags::empty()),
    ("op_aarch64_a64_eret_eret_64e_branch_reg", BranchKind::Indirect, BranchFlags::empty()),
    ("op_aarch64_a64_ret_ret_64r_branch_reg", BranchKind::Indirect, BranchFlags::empty()),
    (
        "op_aarch64_a64_tbz_tbz_only_testbranch",
        BranchKind::Direct,
        BranchFlags::PREDICATED,
    ),
];

/// Branch metadata keyed by instruction key (spec id, or file name when no id is declared).
#[derive(Clone, Debug, Default)]
pub struct ControlFlowTable {
    entries: AHashMap<String, BranchInfo>,
}

impl ControlFlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The A64 branch instructions known to the generator.
    pub fn a64() -> Self {
        let mut table = Self::new();
        for (key, kind, flags) in A64_BRANCHES {
            table.insert(*key, BranchInfo::new(*kind, *flags));
        }
        table
    }

    pub fn insert(&mut self, key: impl Into<String>, info: BranchInfo) -> Option<BranchInfo> {
        self.entries.insert(key.into(), info)
    }

    pub fn get(&self, key: &str) -> Option<BranchInfo> {
        self.entries.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, BranchInfo)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(key, info)| (key.as_str(), *info))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a64_defaults_cover_every_branch_class() {
        let table = ControlFlowTable::a64();
        assert_eq!(table.len(), 8);

        let b = table.get("op_aarch64_a64_b_uncond_b_only_branch_imm").expect("b");
        assert_eq!(b.kind, BranchKind::Direct);
        assert!(b.has_target() && !b.is_predicated());

        let cbz = table.get("op_aarch64_a64_cbz_br19").expect("cbz");
        assert!(cbz.has_target() && cbz.is_predicated());

        let ret = table.get("op_aarch64_a64_ret_ret_64r_branch_reg").expect("ret");
        assert_eq!(ret, BranchInfo::new(BranchKind::Indirect, BranchFlags::empty()));

        let b_cond = table.get("op_aarch64_a64_b_cond_b_only_condbranch").expect("b.cond");
        assert!(b_cond.is_predicated());

        assert!(table.get("op_aarch64_a64_add_addsub_imm").is_none());
    }

    #[test]
    fn iterates_in_key_order() {
        let table = ControlFlowTable::a64();
        let keys: Vec<&str> = table.iter().map(|(key, _)| key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn integrators_can_extend_the_table() {
        let mut table = ControlFlowTable::a64();
        let blr = BranchInfo::new(BranchKind::Indirect, BranchFlags::empty());
        assert!(table.insert("op_aarch64_a64_blr_blr_64_branch_reg", blr).is_none());
        assert_eq!(table.get("op_aarch64_a64_blr_blr_64_branch_reg"), Some(blr));
        assert_eq!(blr.to_string(), "indirect");
        let cbz = table.get("op_aarch64_a64_cbz_br19").expect("cbz");
        assert_eq!(cbz.to_string(), "direct, predicated, target");
    }
}
