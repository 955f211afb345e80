//! Recursive descent parser that turns lexer tokens into [`SpecDocument`] records.

use std::path::PathBuf;

use crate::isa::bit::parse_pattern;
use crate::isa::diagnostic::{DiagnosticPhase, IsaDiagnostic, SourceLocation};
use crate::isa::encoding::FieldSpec;
use crate::isa::error::IsaError;

use super::lexer::{Lexer, Token, TokenKind};

/// One parsed `.enc` file.
#[derive(Debug, Clone, PartialEq)]
pub struct SpecDocument {
    pub path: PathBuf,
    pub records: Vec<InstructionDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
    Canonical { alias_files: Vec<String> },
    AliasOf { target_file: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct InstructionDecl {
    pub file_name: String,
    pub heading: String,
    pub mnemonic: Option<String>,
    pub spec_id: Option<String>,
    pub kind: RecordKind,
    pub encodings: Vec<EncodingDecl>,
    pub span: SourceLocation,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EncodingDecl {
    pub name: String,
    pub instruction_set: Option<String>,
    pub psname: Option<String>,
    pub fields: Vec<FieldSpec>,
    pub span: SourceLocation,
}

pub struct Parser<'src> {
    lexer: Lexer<'src>,
    peeked: Option<Token>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str, path: PathBuf) -> Self {
        Self {
            lexer: Lexer::new(source, path),
            peeked: None,
        }
    }

    pub fn parse_document(&mut self) -> Result<SpecDocument, IsaError> {
        let mut records = Vec::new();
        while !self.check(TokenKind::EOF)? {
            records.push(self.parse_record()?);
        }
        Ok(SpecDocument {
            path: self.lexer.path().to_path_buf(),
            records,
        })
    }

    fn parse_record(&mut self) -> Result<InstructionDecl, IsaError> {
        let keyword = self.expect(TokenKind::Identifier, "'instruction' or 'alias'")?;
        let is_alias = match keyword.lexeme.as_str() {
            "instruction" => false,
            "alias" => true,
            other => {
                return Err(self.error_at(
                    &keyword,
                    "parser.record",
                    format!("expected 'instruction' or 'alias', found '{other}'"),
                ));
            }
        };
        let span = self.span_of(&keyword);
        let file_name = self.expect(TokenKind::Identifier, "instruction file name")?.lexeme;
        let heading = self.expect(TokenKind::String, "quoted instruction heading")?.lexeme;

        let mut mnemonic = None;
        let mut spec_id = None;
        let mut target_file = None;
        while !self.check(TokenKind::LBrace)? {
            let (key, value) = self.parse_attribute()?;
            match key.lexeme.as_str() {
                "mnemonic" => mnemonic = Some(value),
                "id" => spec_id = Some(value),
                "of" if is_alias => target_file = Some(value),
                other => {
                    return Err(self.error_at(
                        &key,
                        "parser.attribute",
                        format!("unknown instruction attribute '{other}'"),
                    ));
                }
            }
        }
        let open = self.expect(TokenKind::LBrace, "'{' to open the instruction body")?;

        let kind = if is_alias {
            let target_file = target_file.ok_or_else(|| {
                self.error_at(&open, "parser.alias-target", "alias record requires of=<file>")
            })?;
            RecordKind::AliasOf { target_file }
        } else {
            RecordKind::Canonical {
                alias_files: self.parse_alias_list()?,
            }
        };

        let mut encodings = Vec::new();
        loop {
            if self.check(TokenKind::RBrace)? {
                self.consume()?;
                break;
            }
            let token = self.expect(TokenKind::Identifier, "'encoding' or '}'")?;
            if token.lexeme != "encoding" {
                return Err(self.error_at(
                    &token,
                    "parser.encoding",
                    format!("expected 'encoding', found '{}'", token.lexeme),
                ));
            }
            encodings.push(self.parse_encoding(&token)?);
        }

        Ok(InstructionDecl {
            file_name,
            heading,
            mnemonic,
            spec_id,
            kind,
            encodings,
            span,
        })
    }

    fn parse_alias_list(&mut self) -> Result<Vec<String>, IsaError> {
        let mut files = Vec::new();
        if self.peek()?.kind != TokenKind::Identifier || self.peek()?.lexeme != "aliases" {
            return Ok(files);
        }
        self.consume()?;
        while self.check(TokenKind::Identifier)? && self.peek()?.lexeme != "encoding" {
            files.push(self.consume()?.lexeme);
        }
        Ok(files)
    }

    fn parse_encoding(&mut self, keyword: &Token) -> Result<EncodingDecl, IsaError> {
        let name = self.expect(TokenKind::Identifier, "encoding name")?.lexeme;
        let mut instruction_set = None;
        let mut psname = None;
        while !self.check(TokenKind::LBrace)? {
            let (key, value) = self.parse_attribute()?;
            match key.lexeme.as_str() {
                "iset" => instruction_set = Some(value),
                "psname" => psname = Some(value),
                other => {
                    return Err(self.error_at(
                        &key,
                        "parser.attribute",
                        format!("unknown encoding attribute '{other}'"),
                    ));
                }
            }
        }
        self.expect(TokenKind::LBrace, "'{' to open the field list")?;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace)? {
            fields.push(self.parse_field()?);
        }
        self.consume()?;
        Ok(EncodingDecl {
            name,
            instruction_set,
            psname,
            fields,
            span: self.span_of(keyword),
        })
    }

    fn parse_field(&mut self) -> Result<FieldSpec, IsaError> {
        let name = self.expect(TokenKind::Identifier, "field name")?.lexeme;
        self.expect(TokenKind::Colon, "':' after field name")?;
        let width_token = self.expect(TokenKind::Number, "field width")?;
        let width = width_token.lexeme.parse::<usize>().map_err(|err| {
            self.error_at(
                &width_token,
                "parser.width",
                format!("invalid field width '{}': {err}", width_token.lexeme),
            )
        })?;

        let inverted = match self.peek()?.kind {
            TokenKind::Equals => false,
            TokenKind::NotEquals => true,
            _ => return Ok(FieldSpec::unbound(name, width)),
        };
        self.consume()?;
        let pattern_token = self.lexer.next_pattern()?;
        let pattern = parse_pattern(&pattern_token.lexeme).map_err(|err| {
            self.error_at(&pattern_token, "parser.pattern", err.to_string())
        })?;
        Ok(FieldSpec {
            name,
            width,
            pattern: Some(pattern),
            inverted,
        })
    }

    fn parse_attribute(&mut self) -> Result<(Token, String), IsaError> {
        let key = self.expect(TokenKind::Identifier, "attribute name or '{'")?;
        self.expect(TokenKind::Equals, "'=' after attribute name")?;
        let value = self.consume()?;
        match value.kind {
            TokenKind::Identifier | TokenKind::String | TokenKind::Number => Ok((key, value.lexeme)),
            _ => Err(self.error_at(
                &value,
                "parser.attribute-value",
                format!("attribute '{}' requires a value", key.lexeme),
            )),
        }
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, IsaError> {
        let token = self.consume()?;
        if token.kind == kind {
            Ok(token)
        } else {
            let found = if token.kind == TokenKind::EOF {
                "end of file".to_string()
            } else {
                format!("'{}'", token.lexeme)
            };
            Err(self.error_at(&token, "parser.expected", format!("expected {context}, found {found}")))
        }
    }

    fn check(&mut self, kind: TokenKind) -> Result<bool, IsaError> {
        Ok(self.peek()?.kind == kind)
    }

    fn peek(&mut self) -> Result<&Token, IsaError> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        Ok(self.peeked.insert(token))
    }

    fn consume(&mut self) -> Result<Token, IsaError> {
        if let Some(token) = self.peeked.take() {
            return Ok(token);
        }
        self.lexer.next_token()
    }

    fn span_of(&self, token: &Token) -> SourceLocation {
        SourceLocation::new(self.lexer.path(), token.line, token.column)
    }

    fn error_at(&self, token: &Token, code: &'static str, message: impl Into<String>) -> IsaError {
        IsaError::diagnostic(IsaDiagnostic::new(
            DiagnosticPhase::Parser,
            code,
            message,
            Some(self.span_of(token)),
        ))
    }
}

/// Convenience helper used by the loader when parsing files without needing to hold onto the
/// parser instance.
pub fn parse_str(path: PathBuf, src: &str) -> Result<SpecDocument, IsaError> {
    Parser::new(src, path).parse_document()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isa::bit::{Bit, BitValue};

    fn parse(src: &str) -> Result<SpecDocument, IsaError> {
        parse_str(PathBuf::from("<test>"), src)
    }

    const UBFM: &str = r#"
        # Unsigned bitfield move and its shift alias.
        instruction ubfm.xml "UBFM" id=UBFM_bitfield {
            aliases lsl_ubfm.xml lsr_ubfm.xml
            encoding UBFM_64M_bitfield iset=A64 psname="aarch64/instrs/integer/bitfield" {
                sf:1=1 opc:2=10 _:6=100110 N:1=1 immr:6 imms:6 Rn:5 Rd:5
            }
        }

        alias lsl_ubfm.xml "LSL (immediate)" mnemonic=LSL of=ubfm.xml {
            encoding LSL_UBFM_64M_bitfield {
                sf:1=1 opc:2=10 _:6=100110 N:1=1 immr:6 imms:6!=111111 Rn:5 Rd:5
            }
        }
    "#;

    #[test]
    fn parses_canonical_and_alias_records() {
        let doc = parse(UBFM).expect("parse");
        assert_eq!(doc.records.len(), 2);

        let ubfm = &doc.records[0];
        assert_eq!(ubfm.file_name, "ubfm.xml");
        assert_eq!(ubfm.heading, "UBFM");
        assert_eq!(ubfm.spec_id.as_deref(), Some("UBFM_bitfield"));
        assert_eq!(
            ubfm.kind,
            RecordKind::Canonical {
                alias_files: vec!["lsl_ubfm.xml".into(), "lsr_ubfm.xml".into()],
            }
        );
        let enc = &ubfm.encodings[0];
        assert_eq!(enc.instruction_set.as_deref(), Some("A64"));
        assert_eq!(enc.psname.as_deref(), Some("aarch64/instrs/integer/bitfield"));
        assert_eq!(enc.fields.len(), 8);
        assert_eq!(enc.fields.iter().map(|f| f.width).sum::<usize>(), 32);
        assert_eq!(enc.span.line, 5);

        let lsl = &doc.records[1];
        assert_eq!(lsl.mnemonic.as_deref(), Some("LSL"));
        assert_eq!(
            lsl.kind,
            RecordKind::AliasOf {
                target_file: "ubfm.xml".into()
            }
        );
        let imms = &lsl.encodings[0].fields[5];
        assert!(imms.inverted);
        assert_eq!(imms.pattern.as_ref().map(|p| p.len()), Some(6));
    }

    #[test]
    fn parses_unpredictable_patterns() {
        let doc = parse(
            r#"instruction hint.xml "HINT" {
                encoding HINT_HM_hints { _:20=11010101000000110010 CRm:4 op2:3 _:5=11111 }
            }
            instruction nop.xml "NOP" {
                encoding NOP_HI_hints { _:20=11010101000000110010 _:4=0000 _:3=000 _:5=1(1)111 }
            }"#,
        )
        .expect("parse");
        let nop = &doc.records[1].encodings[0];
        let last = nop.fields[3].pattern.as_ref().expect("pattern");
        assert_eq!(last[1], BitValue::Unpredictable(Bit::One));
        assert!(matches!(doc.records[0].kind, RecordKind::Canonical { ref alias_files } if alias_files.is_empty()));
    }

    #[test]
    fn empty_document_has_no_records() {
        let doc = parse("# nothing here\n").expect("parse");
        assert!(doc.records.is_empty());
    }

    #[test]
    fn alias_without_target_is_rejected() {
        let err = parse(r#"alias mov.xml "MOV" { }"#).unwrap_err();
        assert!(err.to_string().contains("parser.alias-target"), "{err}");
    }

    #[test]
    fn unknown_attributes_are_located() {
        let err = parse("instruction a.xml \"A\" colour=red { }").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("unknown instruction attribute 'colour'"), "{text}");
        assert!(text.contains("<test>:1:23"), "{text}");
    }

    #[test]
    fn reports_malformed_fields() {
        let err = parse("instruction a.xml \"A\" { encoding A { Rd 5 } }").unwrap_err();
        assert!(err.to_string().contains("expected ':' after field name"), "{err}");

        let err = parse("instruction a.xml \"A\" { encoding A { op:2=(1 } }").unwrap_err();
        assert!(err.to_string().contains("parser.pattern"), "{err}");

        let err = parse("instruction a.xml \"A\" { encoding A { op:2 ").unwrap_err();
        assert!(err.to_string().contains("found end of file"), "{err}");
    }

    #[test]
    fn rejects_unknown_record_keywords() {
        let err = parse("opcode a.xml \"A\" { }").unwrap_err();
        assert!(err.to_string().contains("expected 'instruction' or 'alias'"), "{err}");
    }
}
