//! Loading pipeline that parses `.enc` or XML files and assembles an instruction table.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::isa::builder::TableBuilder;
use crate::isa::diagnostic::{DiagnosticPhase, IsaDiagnostic};
use crate::isa::error::IsaError;
use crate::isa::instruction::InstructionTable;

use super::parser::{InstructionDecl, RecordKind, SpecDocument, parse_str};
use super::xml::{is_xml_dir, read_xml_dir, read_xml_file};

/// File extension recognised when loading a directory.
pub const SPEC_EXTENSION: &str = "enc";
pub const XML_EXTENSION: &str = "xml";

#[derive(Default)]
pub struct SpecLoader {
    documents: Vec<SpecDocument>,
}

impl SpecLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the records of an in-memory source. `path` is only used for diagnostics.
    pub fn add_str(&mut self, path: impl Into<PathBuf>, src: &str) -> Result<&mut Self, IsaError> {
        let doc = parse_str(path.into(), src)?;
        debug!("parsed {} records from {}", doc.records.len(), doc.path.display());
        self.documents.push(doc);
        Ok(self)
    }

    pub fn add_file(&mut self, path: &Path) -> Result<&mut Self, IsaError> {
        let src = fs::read_to_string(path)?;
        self.add_str(path, &src)
    }

    /// Queues every `*.enc` file directly inside `dir`, in file-name order.
    pub fn add_dir(&mut self, dir: &Path) -> Result<&mut Self, IsaError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && has_extension(&path, SPEC_EXTENSION) {
                paths.push(path);
            } else {
                debug!("skipping {}", path.display());
            }
        }
        if paths.is_empty() {
            warn!("no .{SPEC_EXTENSION} files found in {}", dir.display());
        }
        paths.sort();
        for path in paths {
            self.add_file(&path)?;
        }
        Ok(self)
    }

    /// Queues one XML `instructionsection` file, referred to by its file name.
    pub fn add_xml_file(&mut self, path: &Path) -> Result<&mut Self, IsaError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        self.documents.push(read_xml_file(path, file_name)?);
        Ok(self)
    }

    /// Queues every instruction file listed by the XML index documents of `dir`.
    pub fn add_xml_dir(&mut self, dir: &Path) -> Result<&mut Self, IsaError> {
        let documents = read_xml_dir(dir)?;
        debug!("read {} XML instruction files from {}", documents.len(), dir.display());
        self.documents.extend(documents);
        Ok(self)
    }

    /// Loads a single file, or every spec file of a directory. Directories holding an
    /// `index.xml` and files ending in `.xml` are read as vendor XML.
    pub fn add_path(&mut self, path: &Path) -> Result<&mut Self, IsaError> {
        if path.is_dir() && is_xml_dir(path) {
            self.add_xml_dir(path)
        } else if path.is_dir() {
            self.add_dir(path)
        } else if has_extension(path, XML_EXTENSION) {
            self.add_xml_file(path)
        } else {
            self.add_file(path)
        }
    }

    /// Builds the instruction table from every queued document and resolves aliases.
    pub fn finish(&mut self) -> Result<InstructionTable, IsaError> {
        let documents = std::mem::take(&mut self.documents);
        let mut builder = TableBuilder::new();
        let mut seen = ahash::AHashMap::new();
        for doc in &documents {
            for record in &doc.records {
                if let Some(previous) = seen.insert(record.file_name.clone(), &record.span) {
                    return Err(IsaError::diagnostic(IsaDiagnostic::new(
                        DiagnosticPhase::Resolution,
                        "resolve.duplicate",
                        format!(
                            "instruction file '{}' already declared at {}:{}",
                            record.file_name,
                            previous.path.display(),
                            previous.line
                        ),
                        Some(record.span.clone()),
                    )));
                }
                push_record(&mut builder, record)?;
            }
        }
        let table = builder.build()?;
        info!(
            "loaded {} instructions with {} encodings",
            table.len(),
            table.all_encodings().count()
        );
        Ok(table)
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn push_record(builder: &mut TableBuilder, record: &InstructionDecl) -> Result<(), IsaError> {
    if record.encodings.is_empty() {
        warn!("instruction '{}' declares no encodings", record.file_name);
    }
    let mut instruction = match &record.kind {
        RecordKind::Canonical { alias_files } => alias_files.iter().fold(
            builder.instruction(&record.file_name, &record.heading),
            |instruction, file| instruction.alias_file(file),
        ),
        RecordKind::AliasOf { target_file } => {
            builder.alias(&record.file_name, &record.heading, target_file)
        }
    };
    if let Some(mnemonic) = &record.mnemonic {
        instruction = instruction.mnemonic(mnemonic);
    }
    if let Some(spec_id) = &record.spec_id {
        instruction = instruction.spec_id(spec_id);
    }
    for encoding in &record.encodings {
        instruction = instruction.encoding_declared(
            &encoding.name,
            encoding.instruction_set.as_deref().unwrap_or_default(),
            encoding.psname.as_deref(),
            encoding.fields.iter().cloned(),
        );
    }
    instruction.finish().map_err(|err| locate(err, record))?;
    Ok(())
}

/// Attaches the record location to encoding construction failures.
fn locate(err: IsaError, record: &InstructionDecl) -> IsaError {
    match err {
        err @ (IsaError::Width { .. } | IsaError::PatternWidth { .. }) => {
            IsaError::diagnostic(IsaDiagnostic::new(
                DiagnosticPhase::Resolution,
                "resolve.width",
                err.to_string(),
                Some(record.span.clone()),
            ))
        }
        other => other,
    }
}

/// Loads a table from one source string.
pub fn load_str(src: &str) -> Result<InstructionTable, IsaError> {
    SpecLoader::new().add_str("<memory>", src)?.finish()
}

/// Loads a table from a file or a directory of `.enc` files.
pub fn load_path(path: &Path) -> Result<InstructionTable, IsaError> {
    SpecLoader::new().add_path(path)?.finish()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;
    use crate::isa::instruction::Alias;

    const ADD: &str = r#"
        instruction add_addsub_imm.xml "ADD (immediate)" id=ADD_addsub_imm {
            encoding ADD_64_addsub_imm iset=A64 {
                sf:1=1 op:1=0 S:1=0 _:6=100010 sh:1 imm12:12 Rn:5 Rd:5
            }
        }
    "#;

    const MOV: &str = r#"
        alias mov_add_addsub_imm.xml "MOV (to/from SP)" mnemonic=MOV of=add_addsub_imm.xml {
            encoding MOV_ADD_64_addsub_imm iset=A64 {
                sf:1=1 op:1=0 S:1=0 _:6=100010 sh:1=0 imm12:12=000000000000 Rn:5 Rd:5
            }
        }
    "#;

    #[test]
    fn loads_records_from_a_string() {
        let table = load_str(ADD).expect("load");
        assert_eq!(table.len(), 1);
        let add = table.by_file("add_addsub_imm.xml").expect("add");
        assert_eq!(add.mnemonic, "ADD");
        assert_eq!(add.key(), "ADD_addsub_imm");
        let enc = table.encoding(add.encodings[0]);
        assert_eq!(enc.instruction_set(), "A64");
        assert!(enc.matches(0x9100_0420));
    }

    #[test]
    fn loads_directories_in_file_name_order() {
        let dir = tempdir().expect("tempdir");
        fs::write(dir.path().join("b_alias.enc"), MOV).expect("write mov");
        fs::write(dir.path().join("a_base.enc"), ADD).expect("write add");
        fs::write(dir.path().join("notes.txt"), "not a spec").expect("write notes");

        let table = load_path(dir.path()).expect("load");
        assert_eq!(table.len(), 2);
        let add = table.by_file("add_addsub_imm.xml").expect("add");
        let mov = table.by_file("mov_add_addsub_imm.xml").expect("mov");
        assert_eq!(add.id.0, 0, "a_base.enc is read first");
        assert_eq!(
            mov.alias,
            Alias::AliasOf {
                target_file: "add_addsub_imm.xml".into(),
                target: Some(add.id),
            }
        );
        assert_eq!(table.encodings(false).count(), 1);
    }

    #[test]
    fn loads_a_single_file() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("add.enc");
        fs::write(&path, ADD).expect("write");
        let table = load_path(&path).expect("load");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn missing_files_are_io_errors() {
        let dir = tempdir().expect("tempdir");
        let err = load_path(&dir.path().join("absent.enc")).unwrap_err();
        assert!(matches!(err, IsaError::Io(_)));
    }

    #[test]
    fn dangling_alias_targets_fail_resolution() {
        let err = load_str(MOV).unwrap_err();
        assert!(matches!(err, IsaError::UnknownInstruction { .. }));
    }

    #[test]
    fn duplicate_files_are_rejected() {
        let mut loader = SpecLoader::new();
        loader.add_str("one.enc", ADD).expect("first");
        loader.add_str("two.enc", ADD).expect("second");
        let err = loader.finish().unwrap_err();
        let text = err.to_string();
        assert!(text.contains("resolve.duplicate"), "{text}");
        assert!(text.contains("one.enc:2"), "{text}");
    }

    #[test]
    fn width_errors_carry_the_record_location() {
        let err = load_str(
            "instruction short.xml \"SHORT\" {\n  encoding SHORT { imm:31 }\n}\n",
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("resolve.width"), "{text}");
        assert!(text.contains("spans 31 bits"), "{text}");
        assert!(text.contains("<memory>:1:1"), "{text}");
    }

    const ADD_XML: &str = r#"<instructionsection id="ADD_addsub_imm" type="instruction">
  <docvars><docvar key="mnemonic" value="ADD"/></docvars>
  <heading>ADD (immediate)</heading>
  <alias_list><aliasref aliasfile="mov_add_addsub_imm.xml"/></alias_list>
  <iclass id="ADD_addsub_imm_iclass" isa="A64">
    <regdiagram form="32" psname="ADD_addsub_imm">
      <box hibit="31" name="sf"><c></c></box>
      <box hibit="30" width="8"><c>0</c><c>0</c><c>1</c><c>0</c><c>0</c><c>0</c><c>1</c><c>0</c></box>
      <box hibit="22" name="sh"><c></c></box>
      <box hibit="21" width="12" name="imm12"><c colspan="12"></c></box>
      <box hibit="9" width="5" name="Rn"><c colspan="5"></c></box>
      <box hibit="4" width="5" name="Rd"><c colspan="5"></c></box>
    </regdiagram>
  </iclass>
</instructionsection>"#;

    const MOV_XML: &str = r#"<instructionsection id="MOV_add_addsub_imm" type="alias">
  <docvars><docvar key="mnemonic" value="MOV"/></docvars>
  <heading>MOV (to/from SP)</heading>
  <aliasto refiform="add_addsub_imm.xml"/>
  <iclass id="MOV_add_addsub_imm_iclass" isa="A64">
    <regdiagram form="32">
      <box hibit="31" width="10"><c colspan="10">1001000100</c></box>
      <box hibit="21" width="12" name="imm12"><c colspan="12">000000000000</c></box>
      <box hibit="9" width="5" name="Rn"><c colspan="5"></c></box>
      <box hibit="4" width="5" name="Rd"><c colspan="5"></c></box>
    </regdiagram>
  </iclass>
</instructionsection>"#;

    #[test]
    fn loads_xml_directories_through_their_index() {
        let dir = tempdir().expect("tempdir");
        fs::write(
            dir.path().join("index.xml"),
            r#"<alphaindex><iforms>
                 <iform iformfile="add_addsub_imm.xml">ADD</iform>
                 <iform iformfile="mov_add_addsub_imm.xml">MOV</iform>
               </iforms></alphaindex>"#,
        )
        .expect("write index");
        fs::write(dir.path().join("add_addsub_imm.xml"), ADD_XML).expect("write add");
        fs::write(dir.path().join("mov_add_addsub_imm.xml"), MOV_XML).expect("write mov");
        fs::write(dir.path().join("unlisted.xml"), "<not-read/>").expect("write unlisted");

        let table = load_path(dir.path()).expect("load");
        assert_eq!(table.len(), 2);
        let add = table.by_file("add_addsub_imm.xml").expect("add");
        let mov = table.by_file("mov_add_addsub_imm.xml").expect("mov");
        assert_eq!(add.mnemonic, "ADD");
        assert_eq!(mov.mnemonic, "MOV");
        assert_eq!(
            mov.alias,
            Alias::AliasOf {
                target_file: "add_addsub_imm.xml".into(),
                target: Some(add.id),
            }
        );
        let enc = table.encoding(add.encodings[0]);
        assert_eq!(enc.psname(), Some("ADD_addsub_imm"));
        assert!(enc.matches(0x9100_0420));
        assert!(enc.matches(0x1100_0420));
        assert!(table.encoding(mov.encodings[0]).matches(0x9100_03E0));
    }

    #[test]
    fn loads_single_xml_files() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("add_addsub_imm.xml");
        let standalone = ADD_XML.replace(
            r#"<alias_list><aliasref aliasfile="mov_add_addsub_imm.xml"/></alias_list>"#,
            "",
        );
        fs::write(&path, standalone).expect("write");
        let table = load_path(&path).expect("load");
        assert!(table.by_file("add_addsub_imm.xml").is_some());
    }

    #[test]
    fn xml_width_errors_carry_the_section_location() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("add_addsub_imm.xml");
        let short = ADD_XML.replace(
            r#"<box hibit="4" width="5" name="Rd"><c colspan="5"></c></box>"#,
            "",
        );
        fs::write(&path, short).expect("write");
        let err = SpecLoader::new()
            .add_xml_file(&path)
            .expect("parse")
            .finish()
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("resolve.width"), "{text}");
        assert!(text.contains("add_addsub_imm.xml:1:1"), "{text}");
    }

    #[test]
    fn overflowing_widths_are_width_errors() {
        let err = load_str(
            "instruction a.xml \"A\" { encoding A { a:18446744073709551615 b:33 } }",
        )
        .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("resolve.width"), "{text}");
    }
}
