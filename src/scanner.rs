//! A backtrackable cursor over a token buffer.
//!
//! The scanner owns the whole token buffer up front (the lexer never runs
//! again once [`Scanner::new`] returns), so `mark`/`reset`/`range` are all
//! O(1) index manipulations rather than re-lexing.

use crate::lexer::{Lexer, Token, TokenKind};

pub struct Scanner<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    committed: Option<String>,
}

impl<'a> Scanner<'a> {
    pub fn new(text: &'a str) -> Self {
        let tokens = Lexer::tokenize(text);
        Self {
            text,
            tokens,
            pos: 0,
            committed: None,
        }
    }

    /// The original input text this scanner was built from.
    pub fn text(&self) -> &str {
        self.text
    }

    /// Current token index.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// The token at the cursor, without advancing. Never moves past the
    /// final `Eof` token.
    pub fn peek(&self) -> &Token {
        let idx = self.pos.min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    /// The token at the cursor, advancing by one unless already at `Eof`.
    pub fn next(&mut self) -> Token {
        let tok = self.peek().clone();
        if tok.kind != TokenKind::Eof {
            self.pos += 1;
        }
        tok
    }

    /// Snapshot the current position; call the returned closure-equivalent
    /// (`Scanner::reset_to`) to rewind on a failed parse attempt.
    pub fn mark(&self) -> usize {
        self.pos
    }

    /// Rewind to a previously taken mark.
    pub fn reset_to(&mut self, mark: usize) {
        self.pos = mark;
    }

    /// Rewind all the way to the start of the token stream.
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// The raw source text spanning token indices `[from, to)`.
    pub fn range(&self, from: usize, to: usize) -> &str {
        if from >= to || from >= self.tokens.len() {
            return "";
        }
        let start = self.tokens[from].position;
        let end = self
            .tokens
            .get(to)
            .map(|t| t.position)
            .unwrap_or(self.text.len());
        self.text[start..end].trim_end()
    }

    /// Record a diagnostic label for the most recently entered grammar rule.
    /// Does not affect backtracking; used only to build error messages.
    pub fn commit(&mut self, label: &str) {
        self.committed = Some(label.to_string());
    }

    /// The most recent label passed to [`Scanner::commit`].
    pub fn committed(&self) -> &str {
        self.committed.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_and_reset_round_trip() {
        let mut s = Scanner::new("SELECT * FROM foo");
        let _ = s.next(); // SELECT
        let mark = s.mark();
        let _ = s.next(); // whitespace
        let _ = s.next(); // *
        s.reset_to(mark);
        assert_eq!(s.peek().kind, TokenKind::Whitespace);
    }

    #[test]
    fn never_advances_past_eof() {
        let mut s = Scanner::new("");
        for _ in 0..5 {
            let tok = s.next();
            assert_eq!(tok.kind, TokenKind::Eof);
        }
    }

    #[test]
    fn range_returns_original_text_slice() {
        let mut s = Scanner::new("CREATE TABLE foo (a int)");
        let start = s.mark();
        for _ in 0..9 {
            s.next();
        }
        let end = s.mark();
        assert_eq!(s.range(start, end), "CREATE TABLE foo (a int)");
    }
}
