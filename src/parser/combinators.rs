//! Backtracking parser combinator primitives over a [`Scanner`].
//!
//! A combinator returns `Ok(Some(value))` on success, `Ok(None)` on a
//! recoverable non-match (the caller is free to try another alternative and
//! must restore the scanner position itself), and `Err(_)` on a hard
//! failure that should propagate all the way up to `ParseStatement` — used
//! once a rule has been [`committed`] to.

use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};
use crate::scanner::Scanner;

pub type PResult<T> = std::result::Result<Option<T>, ParseError>;

fn hard_error(s: &Scanner) -> ParseError {
    ParseError::At {
        position: s.peek().position,
        committed: s.committed().to_string(),
    }
}

/// Skip zero or more whitespace tokens.
pub fn skip_ws(s: &mut Scanner) {
    while s.peek().kind == TokenKind::Whitespace {
        s.next();
    }
}

/// Match one token of the given kind, skipping leading whitespace first.
pub fn token(s: &mut Scanner, kind: TokenKind) -> Option<Token> {
    let mark = s.mark();
    skip_ws(s);
    if s.peek().kind == kind {
        Some(s.next())
    } else {
        s.reset_to(mark);
        None
    }
}

/// Like [`token`], but turns a non-match into a hard failure. Used after a
/// grammar rule has committed to a particular production.
pub fn required_token(s: &mut Scanner, kind: TokenKind) -> std::result::Result<Token, ParseError> {
    token(s, kind).ok_or_else(|| hard_error(s))
}

/// Case-insensitive match of one token's text (used for multi-word keywords
/// like the second half of `PRIMARY KEY`, which the lexer does not fuse).
pub fn text(s: &mut Scanner, literal: &str) -> Option<Token> {
    let mark = s.mark();
    skip_ws(s);
    if s.peek().text.eq_ignore_ascii_case(literal) {
        Some(s.next())
    } else {
        s.reset_to(mark);
        None
    }
}

/// All-or-nothing: run `f`; on `Ok(None)` restore the scanner position so a
/// sibling alternative can be attempted from the same point.
pub fn all<T>(s: &mut Scanner, f: impl FnOnce(&mut Scanner) -> PResult<T>) -> PResult<T> {
    let mark = s.mark();
    match f(s)? {
        Some(v) => Ok(Some(v)),
        None => {
            s.reset_to(mark);
            Ok(None)
        }
    }
}

/// First alternative that matches wins; the scanner is restored between
/// attempts. A hard error from any alternative aborts immediately.
pub fn one_of<T>(
    s: &mut Scanner,
    parsers: &[&dyn Fn(&mut Scanner) -> PResult<T>],
) -> PResult<T> {
    let mark = s.mark();
    for p in parsers {
        s.reset_to(mark);
        if let Some(v) = p(s)? {
            return Ok(Some(v));
        }
    }
    s.reset_to(mark);
    Ok(None)
}

/// Always succeeds; restores the scanner on inner failure and returns `None`.
pub fn optional<T>(s: &mut Scanner, f: impl FnOnce(&mut Scanner) -> PResult<T>) -> std::result::Result<Option<T>, ParseError> {
    let mark = s.mark();
    match f(s)? {
        Some(v) => Ok(Some(v)),
        None => {
            s.reset_to(mark);
            Ok(None)
        }
    }
}

/// Greedy repetition; always succeeds, possibly with an empty vector.
pub fn zero_or_more<T>(
    s: &mut Scanner,
    mut f: impl FnMut(&mut Scanner) -> PResult<T>,
) -> std::result::Result<Vec<T>, ParseError> {
    let mut out = Vec::new();
    loop {
        let mark = s.mark();
        match f(s)? {
            Some(v) => out.push(v),
            None => {
                s.reset_to(mark);
                break;
            }
        }
    }
    Ok(out)
}

/// One or more `p` separated by `sep`.
pub fn separated_by1<T>(
    s: &mut Scanner,
    sep: TokenKind,
    mut p: impl FnMut(&mut Scanner) -> PResult<T>,
) -> PResult<Vec<T>> {
    let mark = s.mark();
    let Some(first) = p(s)? else {
        s.reset_to(mark);
        return Ok(None);
    };
    let mut out = vec![first];
    loop {
        let loop_mark = s.mark();
        if token(s, sep).is_none() {
            s.reset_to(loop_mark);
            break;
        }
        match p(s)? {
            Some(v) => out.push(v),
            None => return Err(hard_error(s)),
        }
    }
    Ok(Some(out))
}

/// Left-associative binary-operator folding: `operand (op operand)*`,
/// eliminating left recursion in the expression grammar.
pub fn chainl<T>(
    s: &mut Scanner,
    operand: &impl Fn(&mut Scanner) -> PResult<T>,
    ops: &[(TokenKind, fn(Box<T>, Box<T>) -> T)],
) -> PResult<T> {
    let mark = s.mark();
    let Some(mut left) = operand(s)? else {
        s.reset_to(mark);
        return Ok(None);
    };
    loop {
        let loop_mark = s.mark();
        let mut matched = None;
        for (kind, make) in ops {
            if token(s, *kind).is_some() {
                matched = Some(*make);
                break;
            }
        }
        let Some(make) = matched else {
            s.reset_to(loop_mark);
            break;
        };
        match operand(s)? {
            Some(right) => {
                left = make(Box::new(left), Box::new(right));
            }
            None => return Err(hard_error(s)),
        }
    }
    Ok(Some(left))
}

/// Defers construction of a parser so mutually recursive grammar rules (such
/// as `expr → term → '(' expr ')'`) can refer to each other.
pub fn lazy<'a, T>(
    thunk: impl Fn(&mut Scanner) -> PResult<T> + 'a,
) -> Box<dyn Fn(&mut Scanner) -> PResult<T> + 'a> {
    Box::new(thunk)
}

/// Record a diagnostic label for the rule being entered, without affecting
/// backtracking.
pub fn committed<T>(
    s: &mut Scanner,
    label: &str,
    f: impl FnOnce(&mut Scanner) -> PResult<T>,
) -> PResult<T> {
    s.commit(label);
    f(s)
}
