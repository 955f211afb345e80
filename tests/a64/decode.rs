use std::path::PathBuf;

use hex_literal::hex;

use decodegen::config::GeneratorConfig;
use decodegen::emit::{BranchKind, DecodeTable, emit_rust, leaf_report};
use decodegen::isa::{InstructionTable, IsaError, LeafKind};
use decodegen::loader::{SpecLoader, load_path};
use decodegen::query::InstructionQuery;

fn defs() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("defs/a64")
}

fn load() -> InstructionTable {
    load_path(&defs()).expect("load a64 defs")
}

fn with_aliases() -> GeneratorConfig {
    GeneratorConfig {
        include_aliases: true,
        ..Default::default()
    }
}

#[test]
fn loads_every_record() {
    let table = load();
    assert_eq!(table.len(), 20);
    assert_eq!(table.encodings(false).count(), 21);
    assert_eq!(table.encodings(true).count(), 26);

    let mov = table.by_file("mov_add_addsub_imm.xml").expect("mov");
    assert!(mov.is_alias());
    assert_eq!(mov.mnemonic, "MOV");
}

#[test]
fn canonical_forest_has_one_irreducible_leaf() {
    let table = load();
    let forest = GeneratorConfig::default().build_forest(&table).expect("forest");
    assert_eq!(forest.len(), 20);

    let ambiguous: Vec<_> = forest.leaves().iter().filter(|leaf| leaf.is_ambiguous()).collect();
    assert_eq!(ambiguous.len(), 1);
    assert_eq!(ambiguous[0].kind, LeafKind::Irreducible);
    assert_eq!(ambiguous[0].set.len(), 2);
    assert_eq!(ambiguous[0].set.shared_bits().len(), 25);

    let report = leaf_report(&forest);
    assert!(report.ends_with("20 leaves, 1 ambiguous\n"), "{report}");
}

#[test]
fn aliases_overlap_their_targets() {
    let table = load();
    let forest = with_aliases().build_forest(&table).expect("forest");
    assert_eq!(forest.len(), 20);
    assert_eq!(forest.ambiguities().len(), 6);

    let strict = GeneratorConfig {
        reject_ambiguous: true,
        ..with_aliases()
    };
    match strict.build_forest(&table) {
        Err(IsaError::Ambiguous(leaves)) => assert_eq!(leaves.len(), 6),
        other => panic!("expected ambiguity failure, got {:?}", other.map(|forest| forest.len())),
    }
}

#[test]
fn decodes_a64_words() {
    let table = load();
    let decoder = DecodeTable::build(&table, &GeneratorConfig::default()).expect("decoder");

    let cases = [
        (0x9100_0420, "ADD"),
        (0x9100_03E0, "ADD"),
        (0xD100_0420, "SUB"),
        (0xB100_0420, "ADDS"),
        (0xD280_0540, "MOVZ"),
        (0x1400_0010, "B"),
        (0x9400_0010, "BL"),
        (0x5400_0040, "B.cond"),
        (0xB400_0040, "CBZ"),
        (0x3600_0040, "TBZ"),
        (0xD61F_0020, "BR"),
        (0xD65F_03C0, "RET"),
        (0xD69F_03E0, "ERET"),
        (0xD6BF_03E0, "DRPS"),
        (0xD37F_F800, "UBFM"),
    ];
    for (word, mnemonic) in cases {
        let found = decoder
            .decode(word)
            .unwrap_or_else(|| panic!("{word:#010x} should decode"));
        assert_eq!(found.instruction.mnemonic, mnemonic, "{word:#010x}");
        assert!(!found.ambiguous, "{word:#010x}");
    }

    assert!(decoder.decode(0x0000_0000).is_none());
    assert!(decoder.decode(0xFFFF_FFFF).is_none());

    let add = decoder.decode(0x9100_0420).expect("add");
    assert_eq!(add.encoding.name(), "ADD_64_addsub_imm");
    let operands: Vec<String> = add.operands.iter().map(ToString::to_string).collect();
    assert_eq!(operands, ["sh=0x0", "imm12=0x1", "Rn=0x1", "Rd=0x0"]);

    let ubfm = decoder.decode(0xD37F_F800).expect("ubfm");
    assert_eq!(ubfm.encoding.name(), "UBFM_64M_bitfield");
}

#[test]
fn hint_space_prefers_nop() {
    let table = load();
    let decoder = DecodeTable::build(&table, &GeneratorConfig::default()).expect("decoder");

    let nop = decoder.decode(0xD503_201F).expect("nop");
    assert_eq!(nop.instruction.mnemonic, "NOP");
    assert!(nop.ambiguous);

    let hint = decoder.decode(0xD503_203F).expect("hint");
    assert_eq!(hint.instruction.mnemonic, "HINT");
    assert!(hint.ambiguous);
}

#[test]
fn aliases_win_when_included() {
    let table = load();
    let decoder = DecodeTable::build(&table, &with_aliases()).expect("decoder");

    let mov = decoder.decode(0x9100_03E0).expect("mov");
    assert_eq!(mov.instruction.mnemonic, "MOV");
    assert!(mov.ambiguous);

    let cmn = decoder.decode(0xB100_043F).expect("cmn");
    assert_eq!(cmn.instruction.mnemonic, "CMN");

    let add = decoder.decode(0x9100_0420).expect("add");
    assert_eq!(add.instruction.mnemonic, "ADD");
    assert!(add.ambiguous);
}

#[test]
fn attaches_branch_metadata() {
    let table = load();
    let decoder = DecodeTable::build(&table, &GeneratorConfig::default()).expect("decoder");

    let b = decoder.decode(0x1400_0010).and_then(|found| found.branch).expect("b");
    assert_eq!(b.kind, BranchKind::Direct);
    assert!(b.has_target());
    assert!(!b.is_predicated());

    let ret = decoder.decode(0xD65F_03C0).and_then(|found| found.branch).expect("ret");
    assert_eq!(ret.kind, BranchKind::Indirect);
    assert!(!ret.has_target());

    let cbz = decoder.decode(0xB400_0040).and_then(|found| found.branch).expect("cbz");
    assert!(cbz.is_predicated());
    assert!(cbz.has_target());

    let b_cond = decoder.decode(0x5400_0040).and_then(|found| found.branch).expect("b.cond");
    assert_eq!(b_cond.kind, BranchKind::Indirect);
    assert!(b_cond.is_predicated());

    assert!(decoder.decode(0x9100_0420).and_then(|found| found.branch).is_none());
}

#[test]
fn disassembles_little_endian_stream() {
    let table = load();
    let decoder = DecodeTable::build(&table, &GeneratorConfig::default()).expect("decoder");

    let stream = hex!(
        "20 04 00 91"
        "10 00 00 14"
        "1f 20 03 d5"
        "00 00 00 00"
        "c0 03 5f d6"
        "40 00"
    );
    let listing = decoder.disassemble_from(&stream, 0x4000);
    assert_eq!(listing.len(), 5, "trailing half word is dropped");

    if std::env::var_os("SHOW_DISASM").is_some() {
        for line in &listing {
            eprintln!("{line}");
        }
    }

    let mnemonics: Vec<&str> = listing.iter().map(|line| line.mnemonic.as_str()).collect();
    assert_eq!(mnemonics, ["ADD", "B", "NOP", "unknown", "RET"]);
    assert_eq!(listing[1].address, 0x4004);
    assert_eq!(listing[1].operands, ["imm26=0x10"]);
    assert_eq!(listing[3].operands, ["0x00000000"]);
    assert_eq!(listing[3].encoding, None);
    assert_eq!(listing[4].address, 0x4010);
}

#[test]
fn fingerprint_ignores_load_order() {
    let table = load();
    let decoder = DecodeTable::build(&table, &GeneratorConfig::default()).expect("decoder");

    let mut reversed = SpecLoader::new();
    for file in ["system.enc", "branch.enc", "base.enc"] {
        reversed.add_file(&defs().join(file)).expect("add file");
    }
    let reversed = reversed.finish().expect("reversed table");
    let other = DecodeTable::build(&reversed, &GeneratorConfig::default()).expect("decoder");

    assert_eq!(decoder.fingerprint(), other.fingerprint());
    assert_eq!(decoder.fingerprint_hex().len(), 64);

    let aliased = DecodeTable::build(&table, &with_aliases()).expect("decoder");
    assert_ne!(decoder.fingerprint(), aliased.fingerprint());
}

#[test]
fn generates_rust_decoder() {
    let table = load();
    let decoder = DecodeTable::build(&table, &GeneratorConfig::default()).expect("decoder");
    let source = emit_rust(&decoder);

    assert!(source.starts_with("// @generated by decodegen. Do not edit.\n"));
    assert!(source.contains(&format!("// fingerprint: {}", decoder.fingerprint_hex())));
    assert!(source.contains("pub enum Opcode"));
    assert!(source.contains("word & 0xfc000000 == 0x14000000"), "B test missing");
    assert!(source.contains("pub fn branch_info"));
}

#[test]
fn queries_loaded_defs() {
    let table = load();

    let branches = InstructionQuery {
        file_name: Some("cbz.xml".into()),
        ..Default::default()
    };
    let found = branches.run(&table);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "CBZ");

    let pairs = InstructionQuery {
        encoding_count: Some(2),
        ..Default::default()
    };
    let names: Vec<&str> = pairs.run(&table).iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["ADD (immediate)", "ADDS (immediate)", "SUB (immediate)", "UBFM"]);
}
