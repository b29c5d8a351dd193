//! Statement-level recursive-descent parsers.

use crate::ast::{
    ColumnDefinition, CreateTableStatement, FromItem, InsertStatement, SelectColumn,
    SelectStatement, Statement,
};
use crate::error::ParseError;
use crate::lexer::TokenKind;
use crate::parser::combinators::*;
use crate::parser::expr::parse_expression;
use crate::scanner::Scanner;

/// Tries each statement parser in turn; the first that matches wins.
pub fn parse_statement(s: &mut Scanner) -> std::result::Result<Statement, ParseError> {
    let parsers: &[&dyn Fn(&mut Scanner) -> PResult<Statement>] = &[
        &(|s: &mut Scanner| parse_create_table(s).map(|o| o.map(Statement::CreateTable))),
        &(|s: &mut Scanner| parse_insert(s).map(|o| o.map(Statement::Insert))),
        &(|s: &mut Scanner| parse_select(s).map(|o| o.map(Statement::Select))),
        &(|s: &mut Scanner| parse_keyword_only(s, TokenKind::Begin, Statement::Begin)),
        &(|s: &mut Scanner| parse_keyword_only(s, TokenKind::Commit, Statement::Commit)),
        &(|s: &mut Scanner| parse_keyword_only(s, TokenKind::Rollback, Statement::Rollback)),
    ];
    match one_of(s, parsers)? {
        Some(stmt) => Ok(stmt),
        None => Err(ParseError::NoMatch),
    }
}

fn parse_keyword_only(
    s: &mut Scanner,
    kind: TokenKind,
    stmt: Statement,
) -> PResult<Statement> {
    all(s, |s| Ok(token(s, kind).map(|_| stmt.clone())))
}

fn parse_ident_token(s: &mut Scanner) -> PResult<String> {
    Ok(token(s, TokenKind::Identifier).map(|t| t.text))
}

// ---- CREATE TABLE ----------------------------------------------------

fn parse_column_definition(s: &mut Scanner) -> PResult<ColumnDefinition> {
    all(s, |s| {
        let Some(name) = parse_ident_token(s)? else {
            return Ok(None);
        };
        let Some(sql_type) = parse_ident_token(s)? else {
            return Err(ParseError::At {
                position: s.pos(),
                committed: s.committed().to_string(),
            });
        };
        let mut primary_key = false;
        if token(s, TokenKind::PrimaryKey).is_some() {
            // `KEY` has no token kind of its own; accept it by text.
            if text(s, "KEY").is_none() {
                return Err(ParseError::At {
                    position: s.pos(),
                    committed: "PRIMARY KEY".to_string(),
                });
            }
            primary_key = true;
        }
        Ok(Some(ColumnDefinition {
            name,
            sql_type,
            offset: 0,
            primary_key,
            default_value: None,
        }))
    })
}

fn parse_create_table(s: &mut Scanner) -> PResult<CreateTableStatement> {
    let start_tok_pos = s.mark();
    all(s, |s| {
        if token(s, TokenKind::Create).is_none() {
            return Ok(None);
        }
        committed(s, "CREATE TABLE", |s| {
            required_token(s, TokenKind::Table)?;
            let if_not_exists = optional(s, |s| {
                all(s, |s| {
                    if token(s, TokenKind::If).is_none() {
                        return Ok(None);
                    }
                    required_token(s, TokenKind::Not)?;
                    required_token(s, TokenKind::Exists)?;
                    Ok(Some(()))
                })
            })?
            .is_some();

            let name = required_token(s, TokenKind::Identifier)?.text;
            required_token(s, TokenKind::OpenParen)?;
            let Some(mut columns) = separated_by1(s, TokenKind::Comma, parse_column_definition)?
            else {
                return Err(ParseError::At {
                    position: s.pos(),
                    committed: s.committed().to_string(),
                });
            };
            required_token(s, TokenKind::CloseParen)?;

            for (i, col) in columns.iter_mut().enumerate() {
                col.offset = i;
            }

            let end = s.mark();
            let raw_text = s.range(start_tok_pos, end).to_string();

            Ok(Some(CreateTableStatement {
                name,
                if_not_exists,
                columns,
                raw_text,
            }))
        })
    })
}

// ---- INSERT -----------------------------------------------------------

fn parse_select_column(s: &mut Scanner) -> PResult<SelectColumn> {
    if token(s, TokenKind::Asterisk).is_some() {
        return Ok(Some(SelectColumn::Star));
    }
    Ok(parse_ident_token(s)?.map(SelectColumn::Name))
}

fn parse_insert(s: &mut Scanner) -> PResult<InsertStatement> {
    all(s, |s| {
        if token(s, TokenKind::Insert).is_none() {
            return Ok(None);
        }
        committed(s, "INSERT INTO", |s| {
            required_token(s, TokenKind::Into)?;
            let table = required_token(s, TokenKind::Identifier)?.text;

            required_token(s, TokenKind::OpenParen)?;
            let Some(columns) = separated_by1(s, TokenKind::Comma, parse_ident_token)? else {
                return Err(ParseError::At {
                    position: s.pos(),
                    committed: s.committed().to_string(),
                });
            };
            required_token(s, TokenKind::CloseParen)?;

            required_token(s, TokenKind::Values)?;
            required_token(s, TokenKind::OpenParen)?;
            let Some(exprs) = separated_by1(s, TokenKind::Comma, parse_expression)? else {
                return Err(ParseError::At {
                    position: s.pos(),
                    committed: s.committed().to_string(),
                });
            };
            required_token(s, TokenKind::CloseParen)?;

            if columns.len() != exprs.len() {
                return Err(ParseError::InsertArityMismatch);
            }

            let returning = optional(s, |s| {
                all(s, |s| {
                    if token(s, TokenKind::Returning).is_none() {
                        return Ok(None);
                    }
                    let Some(cols) = separated_by1(s, TokenKind::Comma, parse_select_column)?
                    else {
                        return Err(ParseError::At {
                            position: s.pos(),
                            committed: s.committed().to_string(),
                        });
                    };
                    Ok(Some(cols))
                })
            })?
            .unwrap_or_default();

            Ok(Some(InsertStatement {
                table,
                values: columns.into_iter().zip(exprs).collect(),
                returning,
            }))
        })
    })
}

// ---- SELECT -------------------------------------------------------------

fn parse_from_item(s: &mut Scanner) -> PResult<FromItem> {
    all(s, |s| {
        let Some(name) = parse_ident_token(s)? else {
            return Ok(None);
        };
        let alias = parse_ident_token(s)?;
        Ok(Some(FromItem { name, alias }))
    })
}

fn parse_select(s: &mut Scanner) -> PResult<SelectStatement> {
    all(s, |s| {
        if token(s, TokenKind::Select).is_none() {
            return Ok(None);
        }
        committed(s, "SELECT", |s| {
            let Some(columns) = separated_by1(s, TokenKind::Comma, parse_select_column)? else {
                return Err(ParseError::At {
                    position: s.pos(),
                    committed: s.committed().to_string(),
                });
            };

            required_token(s, TokenKind::From)?;
            let Some(from) = separated_by1(s, TokenKind::Comma, parse_from_item)? else {
                return Err(ParseError::At {
                    position: s.pos(),
                    committed: s.committed().to_string(),
                });
            };

            let filter = optional(s, |s| {
                all(s, |s| {
                    if token(s, TokenKind::Where).is_none() {
                        return Ok(None);
                    }
                    let Some(expr) = parse_expression(s)? else {
                        return Err(ParseError::At {
                            position: s.pos(),
                            committed: s.committed().to_string(),
                        });
                    };
                    Ok(Some(expr))
                })
            })?;

            Ok(Some(SelectStatement {
                from,
                columns,
                filter,
            }))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expression, LiteralKind};
    use rstest::rstest;

    fn parse(sql: &str) -> Statement {
        let mut s = Scanner::new(sql);
        parse_statement(&mut s).unwrap()
    }

    #[test]
    fn create_table_preserves_raw_text() {
        let stmt = parse("CREATE TABLE foo (name text, age int)");
        match stmt {
            Statement::CreateTable(ct) => {
                assert_eq!(ct.name, "foo");
                assert_eq!(ct.columns.len(), 2);
                assert_eq!(ct.columns[0].name, "name");
                assert_eq!(ct.columns[1].offset, 1);
                assert_eq!(ct.raw_text, "CREATE TABLE foo (name text, age int)");
            }
            other => panic!("expected CreateTable, got {other:?}"),
        }
    }

    #[test]
    fn create_table_if_not_exists() {
        let stmt = parse("CREATE TABLE IF NOT EXISTS foo (a int)");
        match stmt {
            Statement::CreateTable(ct) => assert!(ct.if_not_exists),
            other => panic!("expected CreateTable, got {other:?}"),
        }
    }

    #[test]
    fn create_table_primary_key_column() {
        let stmt = parse("CREATE TABLE foo (id int PRIMARY KEY, name text)");
        match stmt {
            Statement::CreateTable(ct) => {
                assert!(ct.columns[0].primary_key);
                assert!(!ct.columns[1].primary_key);
            }
            other => panic!("expected CreateTable, got {other:?}"),
        }
    }

    #[test]
    fn insert_with_values_and_returning() {
        let stmt = parse("INSERT INTO foo (name) VALUES ('bar') RETURNING name");
        match stmt {
            Statement::Insert(ins) => {
                assert_eq!(ins.table, "foo");
                assert_eq!(ins.values.len(), 1);
                assert_eq!(ins.values[0].0, "name");
                assert_eq!(
                    ins.values[0].1,
                    Expression::BasicLiteral {
                        text: "bar".into(),
                        kind: LiteralKind::String
                    }
                );
                assert_eq!(ins.returning, vec![SelectColumn::Name("name".into())]);
            }
            other => panic!("expected Insert, got {other:?}"),
        }
    }

    #[test]
    fn insert_arity_mismatch_is_an_error() {
        let mut s = Scanner::new("INSERT INTO foo (a, b) VALUES (1)");
        let err = parse_statement(&mut s).unwrap_err();
        assert!(matches!(err, ParseError::InsertArityMismatch));
    }

    #[test]
    fn select_star_with_where() {
        let stmt = parse("SELECT * FROM foo WHERE name = 'bar'");
        match stmt {
            Statement::Select(sel) => {
                assert_eq!(sel.columns, vec![SelectColumn::Star]);
                assert_eq!(sel.from, vec![FromItem { name: "foo".into(), alias: None }]);
                assert!(sel.filter.is_some());
            }
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[test]
    fn select_multiple_tables_with_alias() {
        let stmt = parse("SELECT a FROM foo f, bar");
        match stmt {
            Statement::Select(sel) => {
                assert_eq!(sel.from.len(), 2);
                assert_eq!(sel.from[0].alias, Some("f".to_string()));
                assert_eq!(sel.from[1].alias, None);
            }
            other => panic!("expected Select, got {other:?}"),
        }
    }

    #[rstest]
    #[case("BEGIN", Statement::Begin)]
    #[case("COMMIT", Statement::Commit)]
    #[case("ROLLBACK", Statement::Rollback)]
    fn begin_commit_rollback(#[case] sql: &str, #[case] expected: Statement) {
        assert_eq!(parse(sql), expected);
    }

    #[test]
    fn garbage_is_no_match() {
        let mut s = Scanner::new("SELEKT * FROM foo");
        let err = parse_statement(&mut s).unwrap_err();
        assert!(matches!(err, ParseError::NoMatch));
    }

    #[test]
    fn mutates_and_returns_rows_predicates() {
        assert!(parse("CREATE TABLE t (a int)").mutates());
        assert!(!parse("CREATE TABLE t (a int)").returns_rows());
        assert!(parse("INSERT INTO t (a) VALUES (1)").mutates());
        assert!(!parse("INSERT INTO t (a) VALUES (1)").returns_rows());
        assert!(parse("INSERT INTO t (a) VALUES (1) RETURNING a").returns_rows());
        assert!(!parse("SELECT * FROM t").mutates());
        assert!(parse("SELECT * FROM t").returns_rows());
    }
}
