//! Encoding spec loading helpers (lexer, parser, XML reader, table assembly).

pub mod lexer;
pub mod loader;
pub mod parser;
pub mod xml;

pub use lexer::{Lexer, Token, TokenKind};
pub use loader::{SpecLoader, load_path, load_str};
pub use parser::{Parser, SpecDocument, parse_str};
pub use xml::{parse_xml_str, read_xml_dir, read_xml_file};
