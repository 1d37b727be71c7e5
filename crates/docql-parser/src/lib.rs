//! docql expression parser using Winnow
//!
//! Reads the canonical text produced by `Expression`'s `Display` impl, along
//! with the looser hand-written forms (bare identifiers, single-quoted
//! strings, `<>`, `SOME`). Tokens come from small winnow parsers; the grammar
//! is recursive descent with precedence climbing for operators.
//!
//! ```ignore
//! let e = docql_parser::parse_expression("any v in xs satisfies v > 2 end")?;
//! assert_eq!(e.to_string(), "any `v` in `xs` satisfies (2 < `v`) end");
//! ```

mod lexer;
mod parser;

pub use lexer::{Token, TokenKind, tokenize};

use docql_diagnostics::Result;
use docql_expr::Expression;
use parser::Parser;

/// Parse a single expression; trailing input is an error
pub fn parse_expression(source: &str) -> Result<Expression> {
    let mut parser = Parser::new(source)?;
    let expr = parser.expression()?;
    parser.expect_end()?;
    log::trace!("parsed {source:?} as {expr}");
    Ok(expr)
}

/// Parse a comma-separated list, such as the keys of an index definition
pub fn parse_expressions(source: &str) -> Result<Vec<Expression>> {
    let mut parser = Parser::new(source)?;
    let mut exprs = Vec::new();
    if parser.at_end() {
        return Ok(exprs);
    }
    loop {
        exprs.push(parser.expression()?);
        if !parser.eat_comma() {
            break;
        }
    }
    parser.expect_end()?;
    Ok(exprs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docql_diagnostics::DQL0001;

    #[test]
    fn test_parse_expressions() {
        let keys = parse_expressions("d.a, all array t for t in d.tags end").unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].to_string(), "(`d`.`a`)");
        assert!(keys[1].as_all().is_some());
        assert!(parse_expressions("").unwrap().is_empty());
    }

    #[test]
    fn test_trailing_input_rejected() {
        let err = parse_expression("a b").unwrap_err();
        assert_eq!(err.code(), DQL0001);
        assert_eq!(err.location().map(|l| l.offset), Some(2));
    }
}
