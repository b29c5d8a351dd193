//! Hand-written recursive-descent parser for the tsql dialect.
//!
//! Grammar is expressed with the backtracking combinators in
//! [`combinators`]; [`expr`] builds the operator-precedence expression
//! chain and [`statements`] builds the top-level statement forms.

pub mod combinators;
pub mod expr;
pub mod statements;

use crate::ast::Statement;
use crate::error::ParseError;
use crate::scanner::Scanner;

/// Parses one statement out of `sql`, failing if any input remains other
/// than trailing whitespace.
///
/// Mirrors the wire-level contract: a [`ParseError::NoMatch`] means no
/// statement form matched at all ("invalid tsql program"), while
/// [`ParseError::At`] means a statement was recognized and committed to but
/// then failed partway through ("parse error at character N, parsed: ...").
pub fn parse_statement(sql: &str) -> Result<Statement, ParseError> {
    let mut scanner = Scanner::new(sql);
    let stmt = statements::parse_statement(&mut scanner)?;
    combinators::skip_ws(&mut scanner);
    if scanner.peek().kind != crate::lexer::TokenKind::Eof {
        return Err(ParseError::At {
            position: scanner.pos(),
            committed: scanner.committed().to_string(),
        });
    }
    Ok(stmt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Statement;

    #[test]
    fn trailing_garbage_after_a_valid_statement_is_an_error() {
        let err = parse_statement("SELECT * FROM foo bar baz qux").unwrap_err();
        assert!(matches!(err, ParseError::At { .. }));
    }

    #[test]
    fn whitespace_only_input_is_no_match() {
        let err = parse_statement("   ").unwrap_err();
        assert!(matches!(err, ParseError::NoMatch));
    }

    #[test]
    fn full_program_round_trips() {
        let stmt = parse_statement("SELECT name, age FROM users WHERE age >= 18").unwrap();
        assert!(matches!(stmt, Statement::Select(_)));
    }
}
