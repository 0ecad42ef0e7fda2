//! blockml authoring language.
//!
//! Templates are written in an indentation-structured statement language.
//! This crate turns source text into a [`Module`] syntax tree and prints
//! trees back to source, which is how compiled units are cached on disk.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod printer;

pub use ast::*;
pub use error::{ErrorCode, ParseError, ParseResult};
pub use parser::{parse_expression, parse_module};
pub use printer::{print_expr, print_module};

/// Parse template source into a module.
pub fn parse(source: &str) -> ParseResult<Module> {
    parse_module(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_page() {
        let source = r#"with Element(doctype="html"):
    with html():
        with body():
            h1("Hello")
            for name in names:
                p(name)
"#;
        let module = parse(source).unwrap();
        assert_eq!(module.body.len(), 1);
        assert!(matches!(module.body[0].kind, StmtKind::With { .. }));
    }

    #[test]
    fn test_parse_empty_source() {
        assert!(parse("").unwrap().body.is_empty());
        assert!(parse("# only a comment\n\n").unwrap().body.is_empty());
    }
}
