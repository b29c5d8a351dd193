//! Expression grammar: `logical → comparison → sum → mult → term`, all
//! left-associative, eliminating left recursion via `chainl`.

use crate::ast::{BinaryOperator, Expression, LiteralKind};
use crate::error::ParseError;
use crate::lexer::TokenKind;
use crate::parser::combinators::*;
use crate::scanner::Scanner;

fn make(op: BinaryOperator) -> fn(Box<Expression>, Box<Expression>) -> Expression {
    match op {
        BinaryOperator::Add => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::Add,
            right: r,
        },
        BinaryOperator::Sub => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::Sub,
            right: r,
        },
        BinaryOperator::Mul => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::Mul,
            right: r,
        },
        BinaryOperator::Div => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::Div,
            right: r,
        },
        BinaryOperator::Eq => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::Eq,
            right: r,
        },
        BinaryOperator::NotEq => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::NotEq,
            right: r,
        },
        BinaryOperator::Lt => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::Lt,
            right: r,
        },
        BinaryOperator::LtEq => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::LtEq,
            right: r,
        },
        BinaryOperator::Gt => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::Gt,
            right: r,
        },
        BinaryOperator::GtEq => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::GtEq,
            right: r,
        },
        BinaryOperator::And => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::And,
            right: r,
        },
        BinaryOperator::Or => |l, r| Expression::BinaryOp {
            left: l,
            op: BinaryOperator::Or,
            right: r,
        },
    }
}

pub fn parse_expression(s: &mut Scanner) -> PResult<Expression> {
    parse_logical(s)
}

fn parse_logical(s: &mut Scanner) -> PResult<Expression> {
    chainl(
        s,
        &parse_comparison,
        &[
            (TokenKind::And, make(BinaryOperator::And)),
            (TokenKind::Or, make(BinaryOperator::Or)),
        ],
    )
}

fn parse_comparison(s: &mut Scanner) -> PResult<Expression> {
    chainl(
        s,
        &parse_sum,
        &[
            (TokenKind::Eq, make(BinaryOperator::Eq)),
            (TokenKind::NotEq, make(BinaryOperator::NotEq)),
            (TokenKind::LtEq, make(BinaryOperator::LtEq)),
            (TokenKind::GtEq, make(BinaryOperator::GtEq)),
            (TokenKind::Lt, make(BinaryOperator::Lt)),
            (TokenKind::Gt, make(BinaryOperator::Gt)),
        ],
    )
}

fn parse_sum(s: &mut Scanner) -> PResult<Expression> {
    chainl(
        s,
        &parse_mult,
        &[
            (TokenKind::Plus, make(BinaryOperator::Add)),
            (TokenKind::Minus, make(BinaryOperator::Sub)),
        ],
    )
}

fn parse_mult(s: &mut Scanner) -> PResult<Expression> {
    chainl(
        s,
        &parse_term,
        &[
            (TokenKind::Asterisk, make(BinaryOperator::Mul)),
            (TokenKind::Slash, make(BinaryOperator::Div)),
        ],
    )
}

fn parse_term(s: &mut Scanner) -> PResult<Expression> {
    one_of(
        s,
        &[&parse_parenthesized, &parse_literal, &parse_ident],
    )
}

fn parse_parenthesized(s: &mut Scanner) -> PResult<Expression> {
    all(s, |s| {
        if token(s, TokenKind::OpenParen).is_none() {
            return Ok(None);
        }
        let expr = lazy(parse_expression)(s)?;
        let Some(expr) = expr else {
            return Err(ParseError::At {
                position: s.pos(),
                committed: s.committed().to_string(),
            });
        };
        required_token(s, TokenKind::CloseParen)?;
        Ok(Some(expr))
    })
}

fn parse_literal(s: &mut Scanner) -> PResult<Expression> {
    let mark = s.mark();
    skip_ws(s);
    let tok = s.peek().clone();
    let Some(kind) = LiteralKind::from_token_kind(tok.kind) else {
        s.reset_to(mark);
        return Ok(None);
    };
    s.next();
    Ok(Some(Expression::BasicLiteral {
        text: tok.text,
        kind,
    }))
}

fn parse_ident(s: &mut Scanner) -> PResult<Expression> {
    match token(s, TokenKind::Identifier) {
        Some(tok) => Ok(Some(Expression::Ident { name: tok.text })),
        None => Ok(None),
    }
}
