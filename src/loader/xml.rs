//! Ingestion of vendor XML instruction descriptions.
//!
//! A directory is described by `index.xml` (and `fpsimdindex.xml` where present), whose
//! `iform` elements name one `instructionsection` file each. Every file becomes a single
//! [`InstructionDecl`], so XML and `.enc` sources share the same table assembly.

use std::fs;
use std::path::Path;

use log::{debug, warn};
use roxmltree::{Document, Node};

use crate::isa::bit::parse_pattern;
use crate::isa::diagnostic::{DiagnosticPhase, IsaDiagnostic, SourceLocation};
use crate::isa::encoding::{FieldSpec, UNNAMED_FIELD, WORD_BITS};
use crate::isa::error::IsaError;

use super::parser::{EncodingDecl, InstructionDecl, RecordKind, SpecDocument};

/// Index documents read from an XML directory, in load order.
pub const INDEX_FILES: [&str; 2] = ["index.xml", "fpsimdindex.xml"];

/// `regdiagram` form of 16-bit Thumb encodings. Their boxes are numbered in the upper
/// halfword and land in the lower one, under an unbound `_:16` pad.
const T16_FORM: &str = "16";
const T16_BITS: i64 = 16;

/// Whether `dir` holds at least one index document.
pub fn is_xml_dir(dir: &Path) -> bool {
    INDEX_FILES.iter().any(|index| dir.join(index).is_file())
}

/// Instruction file names listed by an index document, in document order.
pub fn index_entries(path: &Path, src: &str) -> Result<Vec<String>, IsaError> {
    let doc = parse_document(path, src)?;
    Ok(doc
        .descendants()
        .filter(|node| node.has_tag_name("iform"))
        .filter_map(|node| node.attribute("iformfile"))
        .map(str::to_string)
        .collect())
}

/// Reads every instruction file listed by the index documents of `dir`.
pub fn read_xml_dir(dir: &Path) -> Result<Vec<SpecDocument>, IsaError> {
    let mut files = Vec::new();
    for index in INDEX_FILES {
        let path = dir.join(index);
        if !path.is_file() {
            warn!("{} has no {index}", dir.display());
            continue;
        }
        let entries = index_entries(&path, &fs::read_to_string(&path)?)?;
        debug!("{} lists {} instruction files", path.display(), entries.len());
        files.extend(entries);
    }
    files
        .iter()
        .map(|file| read_xml_file(&dir.join(file), file))
        .collect()
}

/// Reads one `instructionsection` file. `file_name` is how other records refer to it.
pub fn read_xml_file(path: &Path, file_name: &str) -> Result<SpecDocument, IsaError> {
    let src = fs::read_to_string(path)?;
    parse_xml_str(path, file_name, &src)
}

pub fn parse_xml_str(path: &Path, file_name: &str, src: &str) -> Result<SpecDocument, IsaError> {
    let doc = parse_document(path, src)?;
    let record = XmlReader { path, doc: &doc }.instruction(file_name)?;
    Ok(SpecDocument {
        path: path.to_path_buf(),
        records: vec![record],
    })
}

fn parse_document<'i>(path: &Path, src: &'i str) -> Result<Document<'i>, IsaError> {
    Document::parse(src).map_err(|err| {
        let pos = err.pos();
        IsaError::diagnostic(IsaDiagnostic::new(
            DiagnosticPhase::Parser,
            "xml.syntax",
            err.to_string(),
            Some(SourceLocation::new(path, pos.row as usize, pos.col as usize)),
        ))
    })
}

struct XmlReader<'a, 'i> {
    path: &'a Path,
    doc: &'a Document<'i>,
}

impl<'a, 'i> XmlReader<'a, 'i> {
    fn instruction(&self, file_name: &str) -> Result<InstructionDecl, IsaError> {
        let section = self.required(self.doc.root(), "instructionsection")?;
        let heading = self
            .required(section, "heading")
            .and_then(|node| self.text(node))?
            .to_string();
        let spec_id = section.attribute("id").map(str::to_string);
        let mnemonic = docvar(section, "mnemonic")
            .or(section.attribute("id"))
            .map(str::to_string);

        let kind = if section.attribute("type") == Some("alias") {
            let target = self.required(section, "aliasto")?;
            RecordKind::AliasOf {
                target_file: self.attribute(target, "refiform")?.to_string(),
            }
        } else {
            let alias_files = descendant(section, "alias_list")
                .map(|list| {
                    list.descendants()
                        .filter(|node| node.has_tag_name("aliasref"))
                        .filter_map(|node| node.attribute("aliasfile"))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            RecordKind::Canonical { alias_files }
        };

        let encodings = section
            .descendants()
            .filter(|node| node.has_tag_name("iclass"))
            .map(|iclass| self.encoding(iclass))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(InstructionDecl {
            file_name: file_name.to_string(),
            heading,
            mnemonic,
            spec_id,
            kind,
            encodings,
            span: self.location(section),
        })
    }

    fn encoding(&self, iclass: Node<'a, 'i>) -> Result<EncodingDecl, IsaError> {
        let name = self.attribute(iclass, "id")?.to_string();
        let diagram = self.required(iclass, "regdiagram")?;
        let t16 = diagram.attribute("form") == Some(T16_FORM);

        let mut fields = Vec::new();
        let mut expected = WORD_BITS as i64 - 1;
        if t16 {
            fields.push(FieldSpec::unbound(UNNAMED_FIELD, T16_BITS as usize));
            expected -= T16_BITS;
        }
        for node in diagram.descendants().filter(|node| node.has_tag_name("box")) {
            let (high_bit, field) = self.field(node, t16)?;
            if high_bit != expected {
                return Err(self.error(
                    node,
                    "xml.hibit",
                    format!(
                        "box '{}' of '{name}' starts at bit {high_bit}, expected {expected}",
                        field.name
                    ),
                ));
            }
            expected -= field.width as i64;
            fields.push(field);
        }

        Ok(EncodingDecl {
            instruction_set: Some(if t16 {
                "T16".to_string()
            } else {
                iclass.attribute("isa").unwrap_or_default().to_string()
            }),
            psname: diagram
                .attribute("psname")
                .filter(|psname| !psname.is_empty())
                .map(str::to_string),
            name,
            fields,
            span: self.location(iclass),
        })
    }

    /// One diagram box and its adjusted high bit.
    fn field(&self, node: Node<'a, 'i>, t16: bool) -> Result<(i64, FieldSpec), IsaError> {
        let high_bit: i64 = self.number(node, "hibit")?;
        let high_bit = if t16 { high_bit - T16_BITS } else { high_bit };
        let width = match node.attribute("width") {
            Some(_) => self.number(node, "width")?,
            None => 1,
        };
        let name = node.attribute("name").unwrap_or(UNNAMED_FIELD);

        let mut listed = String::new();
        let mut inverted = false;
        for cell in node.children().filter(|child| child.has_tag_name("c")) {
            let text = cell.text().map(str::trim).unwrap_or_default();
            if let Some(forbidden) = text.strip_prefix("!=") {
                inverted = true;
                listed.push_str(forbidden.trim());
            } else if text.is_empty() {
                let span = match cell.attribute("colspan") {
                    Some(_) => self.number(cell, "colspan")?,
                    None => 1,
                };
                listed.extend(std::iter::repeat_n('x', span));
            } else {
                listed.push_str(text);
            }
        }
        let pattern = if listed.is_empty() {
            None
        } else {
            Some(parse_pattern(&listed).map_err(|err| self.error(node, "xml.bit", err.to_string()))?)
        };

        Ok((
            high_bit,
            FieldSpec {
                name: name.to_string(),
                width,
                pattern,
                inverted,
            },
        ))
    }

    fn required(&self, node: Node<'a, 'i>, tag: &str) -> Result<Node<'a, 'i>, IsaError> {
        descendant(node, tag)
            .ok_or_else(|| self.error(node, "xml.missing", format!("missing <{tag}> element")))
    }

    fn attribute(&self, node: Node<'a, 'i>, name: &str) -> Result<&'a str, IsaError> {
        node.attribute(name).ok_or_else(|| {
            self.error(
                node,
                "xml.missing",
                format!("<{}> has no '{name}' attribute", node.tag_name().name()),
            )
        })
    }

    fn number<T: std::str::FromStr>(&self, node: Node<'a, 'i>, name: &str) -> Result<T, IsaError> {
        let raw = self.attribute(node, name)?;
        raw.trim().parse().map_err(|_| {
            self.error(node, "xml.number", format!("'{name}' is not a number: '{raw}'"))
        })
    }

    fn text(&self, node: Node<'a, 'i>) -> Result<&'a str, IsaError> {
        node.text()
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                self.error(
                    node,
                    "xml.missing",
                    format!("<{}> is empty", node.tag_name().name()),
                )
            })
    }

    fn location(&self, node: Node<'_, '_>) -> SourceLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        SourceLocation::new(self.path, pos.row as usize, pos.col as usize)
    }

    fn error(&self, node: Node<'_, '_>, code: &'static str, message: String) -> IsaError {
        IsaError::diagnostic(IsaDiagnostic::new(
            DiagnosticPhase::Parser,
            code,
            message,
            Some(self.location(node)),
        ))
    }
}

fn descendant<'a, 'i>(node: Node<'a, 'i>, tag: &str) -> Option<Node<'a, 'i>> {
    node.descendants().find(|child| child.has_tag_name(tag))
}

/// Value of the first `<docvar key=...>` under `section`.
fn docvar<'a>(section: Node<'a, '_>, key: &str) -> Option<&'a str> {
    descendant(section, "docvars")?
        .children()
        .filter(|node| node.has_tag_name("docvar"))
        .find(|node| node.attribute("key") == Some(key))
        .and_then(|node| node.attribute("value"))
}
