//! Lexer for macro-language expressions.
//!
//! Word operators (`is`, `neq`, `gt`, `gte`, `lt`, `lte`, `and`, `or`,
//! `not`, `to`) lex as keyword tokens and are exactly equivalent to their
//! symbolic forms. The lexer tracks paren depth so that `>>` at depth 0
//! terminates the expression (the macro close delimiter) instead of being
//! misread as two comparisons.

use super::ast::Span;

/// A single token with its span.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // ── Literals ───────────────────────────────────────────────────
    Int(i64),
    Float(f64),
    /// Quoted string, quotes stripped, escapes resolved.
    Str(String),

    // ── Identifiers / keywords ─────────────────────────────────────
    Ident(String),
    /// `$name` story variable.
    Var(String),

    KwIs,   // `is` → ==
    KwNeq,  // `neq` → !=
    KwGt,   // `gt` → >
    KwGte,  // `gte` → >=
    KwLt,   // `lt` → <
    KwLte,  // `lte` → <=
    KwAnd,  // `and`
    KwOr,   // `or`
    KwNot,  // `not`
    KwTo,   // `to` → =
    KwTrue,
    KwFalse,

    // ── Punctuation / operators ────────────────────────────────────
    LParen,
    RParen,
    Comma,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    EqEq,      // ==
    NotEq,     // !=
    Less,      // <
    LessEq,    // <=
    Greater,   // >
    GreaterEq, // >=

    Eq,      // =
    PlusEq,  // +=
    MinusEq, // -=
    StarEq,  // *=
    SlashEq, // /=

    /// End of expression (`>>` at depth 0, or end of input).
    Eof,
}

/// Lexer over an expression slice. `base_offset` is added to all spans so
/// they refer to the surrounding passage source.
pub struct ExprLexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    base_offset: usize,
    depth: i32,
    done: bool,
    peeked: Option<Token>,
}

impl<'a> ExprLexer<'a> {
    pub fn new(src: &'a str, base_offset: usize) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            base_offset,
            depth: 0,
            done: false,
            peeked: None,
        }
    }

    /// The full slice this lexer was built over (for error context).
    pub fn source(&self) -> &'a str {
        self.src
    }

    /// Peek at the next token without consuming it.
    pub fn peek(&mut self) -> &Token {
        if self.peeked.is_none() {
            self.peeked = Some(self.next_token());
        }
        self.peeked.as_ref().unwrap()
    }

    /// Consume and return the next token.
    pub fn next_tok(&mut self) -> Token {
        if let Some(tok) = self.peeked.take() {
            tok
        } else {
            self.next_token()
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn ch(&self) -> u8 {
        self.bytes[self.pos]
    }

    fn ch_at(&self, offset: usize) -> u8 {
        let i = self.pos + offset;
        if i < self.bytes.len() {
            self.bytes[i]
        } else {
            0
        }
    }

    fn skip_whitespace(&mut self) {
        while !self.at_end() {
            match self.ch() {
                b' ' | b'\t' | b'\r' | b'\n' => self.pos += 1,
                _ => break,
            }
        }
    }

    fn span(&self, start: usize) -> Span {
        Span::new(self.base_offset + start, self.base_offset + self.pos)
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            span: self.span(start),
        }
    }

    fn next_token(&mut self) -> Token {
        if self.done {
            return Token {
                kind: TokenKind::Eof,
                span: Span::empty(self.base_offset + self.pos),
            };
        }

        self.skip_whitespace();

        if self.at_end() {
            self.done = true;
            return Token {
                kind: TokenKind::Eof,
                span: Span::empty(self.base_offset + self.pos),
            };
        }

        let start = self.pos;
        let c = self.ch();

        match c {
            // `>>` at depth 0 terminates the expression.
            b'>' if self.ch_at(1) == b'>' && self.depth <= 0 => {
                self.done = true;
                Token {
                    kind: TokenKind::Eof,
                    span: Span::empty(self.base_offset + self.pos),
                }
            }

            b'"' | b'\'' => self.scan_string(),
            b'0'..=b'9' => self.scan_number(),
            b'.' if self.ch_at(1).is_ascii_digit() => self.scan_number(),
            b'$' => self.scan_var(),
            _ if is_ident_start(c) => self.scan_ident_or_keyword(),

            b'(' => {
                self.pos += 1;
                self.depth += 1;
                self.token(TokenKind::LParen, start)
            }
            b')' => {
                self.pos += 1;
                self.depth -= 1;
                self.token(TokenKind::RParen, start)
            }
            b',' => {
                self.pos += 1;
                self.token(TokenKind::Comma, start)
            }

            b'+' => {
                self.pos += 1;
                if !self.at_end() && self.ch() == b'=' {
                    self.pos += 1;
                    self.token(TokenKind::PlusEq, start)
                } else {
                    self.token(TokenKind::Plus, start)
                }
            }
            b'-' => {
                self.pos += 1;
                if !self.at_end() && self.ch() == b'=' {
                    self.pos += 1;
                    self.token(TokenKind::MinusEq, start)
                } else {
                    self.token(TokenKind::Minus, start)
                }
            }
            b'*' => {
                self.pos += 1;
                if !self.at_end() && self.ch() == b'=' {
                    self.pos += 1;
                    self.token(TokenKind::StarEq, start)
                } else {
                    self.token(TokenKind::Star, start)
                }
            }
            b'/' => {
                self.pos += 1;
                if !self.at_end() && self.ch() == b'=' {
                    self.pos += 1;
                    self.token(TokenKind::SlashEq, start)
                } else {
                    self.token(TokenKind::Slash, start)
                }
            }
            b'%' => {
                self.pos += 1;
                self.token(TokenKind::Percent, start)
            }
            b'=' => {
                self.pos += 1;
                if !self.at_end() && self.ch() == b'=' {
                    self.pos += 1;
                    self.token(TokenKind::EqEq, start)
                } else {
                    self.token(TokenKind::Eq, start)
                }
            }
            b'!' => {
                self.pos += 1;
                if !self.at_end() && self.ch() == b'=' {
                    self.pos += 1;
                    self.token(TokenKind::NotEq, start)
                } else {
                    // Bare `!` is not in the grammar; skip it.
                    self.next_token()
                }
            }
            b'<' => {
                self.pos += 1;
                if !self.at_end() && self.ch() == b'=' {
                    self.pos += 1;
                    self.token(TokenKind::LessEq, start)
                } else {
                    self.token(TokenKind::Less, start)
                }
            }
            b'>' => {
                self.pos += 1;
                if !self.at_end() && self.ch() == b'=' {
                    self.pos += 1;
                    self.token(TokenKind::GreaterEq, start)
                } else {
                    self.token(TokenKind::Greater, start)
                }
            }

            _ => {
                // Unknown character: skip it.
                self.pos += 1;
                self.next_token()
            }
        }
    }

    fn scan_string(&mut self) -> Token {
        let start = self.pos;
        let quote = self.ch();
        self.pos += 1;
        let mut s = String::new();
        while !self.at_end() {
            let c = self.ch();
            self.pos += 1;
            if c == quote {
                return self.token(TokenKind::Str(s), start);
            }
            if c == b'\\' && !self.at_end() {
                let esc = self.ch();
                self.pos += 1;
                match esc {
                    b'n' => s.push('\n'),
                    b't' => s.push('\t'),
                    b'\\' => s.push('\\'),
                    b'\'' => s.push('\''),
                    b'"' => s.push('"'),
                    _ => {
                        s.push('\\');
                        s.push(esc as char);
                    }
                }
            } else {
                s.push(c as char);
            }
        }
        // Unterminated string: return what we have.
        self.token(TokenKind::Str(s), start)
    }

    fn scan_number(&mut self) -> Token {
        let start = self.pos;
        while !self.at_end() && self.ch().is_ascii_digit() {
            self.pos += 1;
        }
        let mut is_float = false;
        if !self.at_end() && self.ch() == b'.' && self.ch_at(1).is_ascii_digit() {
            is_float = true;
            self.pos += 1;
            while !self.at_end() && self.ch().is_ascii_digit() {
                self.pos += 1;
            }
        }
        let text = &self.src[start..self.pos];
        if is_float {
            let v = text.parse::<f64>().unwrap_or(0.0);
            self.token(TokenKind::Float(v), start)
        } else {
            match text.parse::<i64>() {
                Ok(v) => self.token(TokenKind::Int(v), start),
                Err(_) => {
                    let v = text.parse::<f64>().unwrap_or(0.0);
                    self.token(TokenKind::Float(v), start)
                }
            }
        }
    }

    fn scan_var(&mut self) -> Token {
        let start = self.pos;
        self.pos += 1; // skip $
        let name_start = self.pos;
        while !self.at_end() && is_ident_continue(self.ch()) {
            self.pos += 1;
        }
        let name = self.src[name_start..self.pos].to_string();
        self.token(TokenKind::Var(name), start)
    }

    fn scan_ident_or_keyword(&mut self) -> Token {
        let start = self.pos;
        while !self.at_end() && is_ident_continue(self.ch()) {
            self.pos += 1;
        }
        let word = &self.src[start..self.pos];
        let kind = match word {
            "is" => TokenKind::KwIs,
            "neq" => TokenKind::KwNeq,
            "gt" => TokenKind::KwGt,
            "gte" => TokenKind::KwGte,
            "lt" => TokenKind::KwLt,
            "lte" => TokenKind::KwLte,
            "and" => TokenKind::KwAnd,
            "or" => TokenKind::KwOr,
            "not" => TokenKind::KwNot,
            "to" => TokenKind::KwTo,
            "true" => TokenKind::KwTrue,
            "false" => TokenKind::KwFalse,
            _ => TokenKind::Ident(word.to_string()),
        };
        self.token(kind, start)
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_ident_continue(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(src: &str) -> Vec<TokenKind> {
        let mut lex = ExprLexer::new(src, 0);
        let mut tokens = Vec::new();
        loop {
            let tok = lex.next_tok();
            if tok.kind == TokenKind::Eof {
                break;
            }
            tokens.push(tok.kind);
        }
        tokens
    }

    #[test]
    fn integers_and_floats() {
        assert_eq!(tokenize("42"), vec![TokenKind::Int(42)]);
        assert_eq!(tokenize("3.25"), vec![TokenKind::Float(3.25)]);
    }

    #[test]
    fn strings_both_quotes() {
        assert_eq!(tokenize("\"hello\""), vec![TokenKind::Str("hello".into())]);
        assert_eq!(tokenize("'world'"), vec![TokenKind::Str("world".into())]);
    }

    #[test]
    fn string_escapes() {
        assert_eq!(tokenize(r#""a\nb""#), vec![TokenKind::Str("a\nb".into())]);
    }

    #[test]
    fn variables() {
        assert_eq!(tokenize("$HEALTH"), vec![TokenKind::Var("HEALTH".into())]);
        assert_eq!(
            tokenize("$player_name"),
            vec![TokenKind::Var("player_name".into())]
        );
    }

    #[test]
    fn word_operators() {
        assert_eq!(
            tokenize("is neq gt gte lt lte and or not to"),
            vec![
                TokenKind::KwIs,
                TokenKind::KwNeq,
                TokenKind::KwGt,
                TokenKind::KwGte,
                TokenKind::KwLt,
                TokenKind::KwLte,
                TokenKind::KwAnd,
                TokenKind::KwOr,
                TokenKind::KwNot,
                TokenKind::KwTo,
            ]
        );
    }

    #[test]
    fn word_operator_needs_boundary() {
        // `gte` inside an identifier must not lex as the operator.
        assert_eq!(
            tokenize("gteish"),
            vec![TokenKind::Ident("gteish".into())]
        );
    }

    #[test]
    fn symbolic_operators() {
        assert_eq!(
            tokenize("+ - * / % == != < <= > >="),
            vec![
                TokenKind::Plus,
                TokenKind::Minus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::EqEq,
                TokenKind::NotEq,
                TokenKind::Less,
                TokenKind::LessEq,
                TokenKind::Greater,
                TokenKind::GreaterEq,
            ]
        );
    }

    #[test]
    fn assignment_operators() {
        assert_eq!(
            tokenize("= += -= *= /="),
            vec![
                TokenKind::Eq,
                TokenKind::PlusEq,
                TokenKind::MinusEq,
                TokenKind::StarEq,
                TokenKind::SlashEq,
            ]
        );
    }

    #[test]
    fn double_gt_terminates_at_depth_zero() {
        assert_eq!(tokenize("$x >> more"), vec![TokenKind::Var("x".into())]);
    }

    #[test]
    fn gt_inside_parens_is_comparison() {
        assert_eq!(
            tokenize("($x > 1)"),
            vec![
                TokenKind::LParen,
                TokenKind::Var("x".into()),
                TokenKind::Greater,
                TokenKind::Int(1),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn call_tokens() {
        assert_eq!(
            tokenize("random(1, 6)"),
            vec![
                TokenKind::Ident("random".into()),
                TokenKind::LParen,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Int(6),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn complex_expression() {
        assert_eq!(
            tokenize("$HEALTH gte ($MAX / 5) * 4"),
            vec![
                TokenKind::Var("HEALTH".into()),
                TokenKind::KwGte,
                TokenKind::LParen,
                TokenKind::Var("MAX".into()),
                TokenKind::Slash,
                TokenKind::Int(5),
                TokenKind::RParen,
                TokenKind::Star,
                TokenKind::Int(4),
            ]
        );
    }
}
