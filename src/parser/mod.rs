//! Ruby test-source parsing
//!
//! Sources are parsed with `lib-ruby-parser` and narrowed into the small
//! [`Node`] tree: class and `describe` nesting, blocks, calls,
//! `begin`/`rescue`/`ensure` and conditionals keep their shape, everything
//! else becomes an opaque expression node.

pub mod ast;
mod lower;

pub use ast::{BeginClauses, Node, NodeKind, Span};

use lib_ruby_parser::{Parser, ParserOptions};

use crate::common::{Error, Result};
use lower::Lowerer;

/// Parse a source file into a statement sequence
///
/// The first syntax error is reported; warnings are ignored.
pub fn parse(source: &str) -> Result<Node> {
    let options = ParserOptions {
        buffer_name: "(test source)".to_string(),
        ..Default::default()
    };
    let result = Parser::new(source.as_bytes().to_vec(), options).do_parse();
    let lowerer = Lowerer::new(source);

    if let Some(diagnostic) = result.diagnostics.iter().find(|d| d.is_error()) {
        let (line, column) = lowerer.position(diagnostic.loc.begin);
        return Err(Error::parse(line, column, diagnostic.render_message()));
    }

    Ok(lowerer.program(result.ast.as_deref()))
}
