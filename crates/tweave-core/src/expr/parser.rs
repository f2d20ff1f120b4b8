//! Pratt parser for macro-language expressions.
//!
//! Precedence levels (low to high):
//!  1. logical `or`
//!  2. logical `and`
//!  3. logical `not` (prefix; binds looser than comparison, so
//!     `not $x is 1` reads as `not ($x is 1)`)
//!  4. comparison (`is`/`==`, `neq`/`!=`, `gt`/`>`, `gte`/`>=`,
//!     `lt`/`<`, `lte`/`<=`)
//!  5. additive (`+`, `-`)
//!  6. multiplicative (`*`, `/`, `%`)
//!  7. unary `-`
//!  8. primary (literal, `$NAME`, function call, parenthesized)
//!
//! Malformed input never aborts: the parser yields an `Error` node and the
//! evaluator turns it into integer zero plus an error record.

use super::ast::*;
use super::lexer::{ExprLexer, TokenKind};

/// Binding powers (left, right). Higher binds tighter.
#[derive(Debug, Clone, Copy)]
struct Bp(u8, u8);

const BP_OR: Bp = Bp(1, 2);
const BP_AND: Bp = Bp(3, 4);
const BP_NOT_R: u8 = 5;
const BP_CMP: Bp = Bp(7, 8);
const BP_ADD: Bp = Bp(9, 10);
const BP_MUL: Bp = Bp(11, 12);
const BP_NEG_R: u8 = 13;

/// Parse a full expression, consuming the lexer to EOF. Trailing tokens
/// after a complete expression are malformed input and yield an `Error`
/// node.
pub fn parse_expr(lexer: &mut ExprLexer<'_>) -> Expr {
    let expr = parse_bp(lexer, 0);
    if lexer.peek().kind != TokenKind::Eof {
        let span = Span::new(expr.span.start, lexer.peek().span.end);
        return Expr {
            kind: ExprKind::Error(format!(
                "trailing input after expression in `{}`",
                lexer.source().trim()
            )),
            span,
        };
    }
    expr
}

/// Parse a `<<set>>` body: `$NAME op EXPR` where op is `=`, `to`, `+=`,
/// `-=`, `*=`, or `/=`.
pub fn parse_assignment(lexer: &mut ExprLexer<'_>) -> Result<Assignment, String> {
    let target = lexer.next_tok();
    let name = match target.kind {
        TokenKind::Var(name) if !name.is_empty() => name,
        _ => {
            return Err(format!(
                "expected $variable in assignment, got `{}`",
                lexer.source().trim()
            ))
        }
    };

    let op_tok = lexer.next_tok();
    let op = match op_tok.kind {
        TokenKind::Eq | TokenKind::KwTo => AssignOp::Set,
        TokenKind::PlusEq => AssignOp::Add,
        TokenKind::MinusEq => AssignOp::Sub,
        TokenKind::StarEq => AssignOp::Mul,
        TokenKind::SlashEq => AssignOp::Div,
        _ => {
            return Err(format!(
                "expected assignment operator after ${name} in `{}`",
                lexer.source().trim()
            ))
        }
    };

    let value = parse_expr(lexer);
    Ok(Assignment { name, op, value })
}

fn parse_bp(lexer: &mut ExprLexer<'_>, min_bp: u8) -> Expr {
    let mut lhs = parse_prefix(lexer);

    loop {
        let tok = lexer.peek();
        let Some((bp, op)) = infix_bp(&tok.kind) else {
            break;
        };
        if bp.0 < min_bp {
            break;
        }

        lexer.next_tok();
        let rhs = parse_bp(lexer, bp.1);
        let span = Span::new(lhs.span.start, rhs.span.end);
        lhs = Expr {
            kind: ExprKind::Binary {
                op,
                left: Box::new(lhs),
                right: Box::new(rhs),
            },
            span,
        };
    }

    lhs
}

fn infix_bp(kind: &TokenKind) -> Option<(Bp, BinaryOp)> {
    Some(match kind {
        TokenKind::KwOr => (BP_OR, BinaryOp::Or),
        TokenKind::KwAnd => (BP_AND, BinaryOp::And),

        TokenKind::EqEq | TokenKind::KwIs => (BP_CMP, BinaryOp::Eq),
        TokenKind::NotEq | TokenKind::KwNeq => (BP_CMP, BinaryOp::Neq),
        TokenKind::Less | TokenKind::KwLt => (BP_CMP, BinaryOp::Lt),
        TokenKind::LessEq | TokenKind::KwLte => (BP_CMP, BinaryOp::Lte),
        TokenKind::Greater | TokenKind::KwGt => (BP_CMP, BinaryOp::Gt),
        TokenKind::GreaterEq | TokenKind::KwGte => (BP_CMP, BinaryOp::Gte),

        TokenKind::Plus => (BP_ADD, BinaryOp::Add),
        TokenKind::Minus => (BP_ADD, BinaryOp::Sub),

        TokenKind::Star => (BP_MUL, BinaryOp::Mul),
        TokenKind::Slash => (BP_MUL, BinaryOp::Div),
        TokenKind::Percent => (BP_MUL, BinaryOp::Mod),

        _ => return None,
    })
}

fn parse_prefix(lexer: &mut ExprLexer<'_>) -> Expr {
    let tok = lexer.next_tok();
    let start = tok.span.start;

    match tok.kind {
        TokenKind::Int(v) => Expr {
            kind: ExprKind::Int(v),
            span: tok.span,
        },
        TokenKind::Float(v) => Expr {
            kind: ExprKind::Float(v),
            span: tok.span,
        },
        TokenKind::Str(s) => Expr {
            kind: ExprKind::Str(s),
            span: tok.span,
        },
        TokenKind::KwTrue => Expr {
            kind: ExprKind::Bool(true),
            span: tok.span,
        },
        TokenKind::KwFalse => Expr {
            kind: ExprKind::Bool(false),
            span: tok.span,
        },
        TokenKind::Var(name) => Expr {
            kind: ExprKind::Var(name),
            span: tok.span,
        },

        TokenKind::Ident(name) => {
            if lexer.peek().kind == TokenKind::LParen {
                lexer.next_tok(); // consume (
                let args = parse_call_args(lexer);
                let end = if lexer.peek().kind == TokenKind::RParen {
                    lexer.next_tok().span.end
                } else {
                    lexer.peek().span.end
                };
                Expr {
                    kind: ExprKind::Call { name, args },
                    span: Span::new(start, end),
                }
            } else {
                Expr {
                    kind: ExprKind::Ident(name),
                    span: tok.span,
                }
            }
        }

        TokenKind::LParen => {
            let inner = parse_bp(lexer, 0);
            let end = if lexer.peek().kind == TokenKind::RParen {
                lexer.next_tok().span.end
            } else {
                inner.span.end
            };
            Expr {
                kind: ExprKind::Paren(Box::new(inner)),
                span: Span::new(start, end),
            }
        }

        TokenKind::KwNot => {
            let operand = parse_bp(lexer, BP_NOT_R);
            let span = Span::new(start, operand.span.end);
            Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            }
        }
        TokenKind::Minus => {
            let operand = parse_bp(lexer, BP_NEG_R);
            let span = Span::new(start, operand.span.end);
            Expr {
                kind: ExprKind::Unary {
                    op: UnaryOp::Neg,
                    operand: Box::new(operand),
                },
                span,
            }
        }
        TokenKind::Plus => {
            // Unary plus is a no-op; parse through to the operand.
            parse_bp(lexer, BP_NEG_R)
        }

        TokenKind::Eof => Expr {
            kind: ExprKind::Error(format!(
                "unexpected end of expression in `{}`",
                lexer.source().trim()
            )),
            span: tok.span,
        },
        other => Expr {
            kind: ExprKind::Error(format!(
                "unexpected `{other:?}` in `{}`",
                lexer.source().trim()
            )),
            span: tok.span,
        },
    }
}

fn parse_call_args(lexer: &mut ExprLexer<'_>) -> Vec<Expr> {
    let mut args = Vec::new();
    if lexer.peek().kind == TokenKind::RParen {
        return args;
    }
    args.push(parse_bp(lexer, 0));
    while lexer.peek().kind == TokenKind::Comma {
        lexer.next_tok();
        args.push(parse_bp(lexer, 0));
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Expr {
        let mut lexer = ExprLexer::new(src, 0);
        parse_expr(&mut lexer)
    }

    fn parse_assign(src: &str) -> Assignment {
        let mut lexer = ExprLexer::new(src, 0);
        parse_assignment(&mut lexer).expect("assignment should parse")
    }

    #[test]
    fn literal_forms() {
        assert!(matches!(parse("42").kind, ExprKind::Int(42)));
        assert!(matches!(parse("2.5").kind, ExprKind::Float(_)));
        assert!(matches!(parse("true").kind, ExprKind::Bool(true)));
        assert!(matches!(parse("\"hi\"").kind, ExprKind::Str(ref s) if s == "hi"));
    }

    #[test]
    fn variable_reference() {
        assert!(matches!(parse("$HEALTH").kind, ExprKind::Var(ref s) if s == "HEALTH"));
    }

    #[test]
    fn mul_binds_tighter_than_add() {
        let e = parse("1 + 2 * 3");
        let ExprKind::Binary { op, right, .. } = e.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            right.kind,
            ExprKind::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn word_aliases_desugar() {
        assert!(matches!(
            parse("$x is 5").kind,
            ExprKind::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
        assert!(matches!(
            parse("$x gte 10").kind,
            ExprKind::Binary {
                op: BinaryOp::Gte,
                ..
            }
        ));
        assert!(matches!(
            parse("$x neq 0").kind,
            ExprKind::Binary {
                op: BinaryOp::Neq,
                ..
            }
        ));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let e = parse("$a and $b or $c");
        let ExprKind::Binary { op, left, .. } = e.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Or);
        assert!(matches!(
            left.kind,
            ExprKind::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }

    #[test]
    fn not_binds_looser_than_comparison() {
        let e = parse("not $x is 1");
        let ExprKind::Unary { op, operand } = e.kind else {
            panic!("expected unary");
        };
        assert_eq!(op, UnaryOp::Not);
        assert!(matches!(
            operand.kind,
            ExprKind::Binary {
                op: BinaryOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn not_stops_at_and() {
        // `not $a and $b` is `(not $a) and $b`.
        let e = parse("not $a and $b");
        assert!(matches!(
            e.kind,
            ExprKind::Binary {
                op: BinaryOp::And,
                ..
            }
        ));
    }

    #[test]
    fn unary_minus() {
        let e = parse("-$x + 1");
        let ExprKind::Binary { op, left, .. } = e.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Add);
        assert!(matches!(
            left.kind,
            ExprKind::Unary {
                op: UnaryOp::Neg,
                ..
            }
        ));
    }

    #[test]
    fn parenthesized_grouping() {
        let e = parse("($a + $b) * 2");
        let ExprKind::Binary { op, left, .. } = e.kind else {
            panic!("expected binary");
        };
        assert_eq!(op, BinaryOp::Mul);
        assert!(matches!(left.kind, ExprKind::Paren(_)));
    }

    #[test]
    fn call_with_args() {
        let e = parse("either(\"a\", \"b\", \"c\")");
        let ExprKind::Call { name, args } = e.kind else {
            panic!("expected call");
        };
        assert_eq!(name, "either");
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn call_args_may_be_expressions() {
        let e = parse("random(1, $max + 1)");
        let ExprKind::Call { args, .. } = e.kind else {
            panic!("expected call");
        };
        assert!(matches!(args[1].kind, ExprKind::Binary { .. }));
    }

    #[test]
    fn assignment_with_eq() {
        let a = parse_assign("$H = 10");
        assert_eq!(a.name, "H");
        assert_eq!(a.op, AssignOp::Set);
        assert!(matches!(a.value.kind, ExprKind::Int(10)));
    }

    #[test]
    fn assignment_with_to() {
        let a = parse_assign("$NAME to \"Thorgrim\"");
        assert_eq!(a.name, "NAME");
        assert_eq!(a.op, AssignOp::Set);
    }

    #[test]
    fn compound_assignment() {
        assert_eq!(parse_assign("$X += 3").op, AssignOp::Add);
        assert_eq!(parse_assign("$X -= 3").op, AssignOp::Sub);
        assert_eq!(parse_assign("$X *= 3").op, AssignOp::Mul);
        assert_eq!(parse_assign("$X /= 3").op, AssignOp::Div);
    }

    #[test]
    fn assignment_without_target_is_error() {
        let mut lexer = ExprLexer::new("5 = 3", 0);
        assert!(parse_assignment(&mut lexer).is_err());
    }

    #[test]
    fn empty_input_is_error_node() {
        assert!(matches!(parse("").kind, ExprKind::Error(_)));
    }

    #[test]
    fn trailing_garbage_is_error_node() {
        assert!(matches!(parse("1 2").kind, ExprKind::Error(_)));
    }
}
