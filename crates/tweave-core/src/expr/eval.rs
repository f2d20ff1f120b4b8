//! Expression evaluation.
//!
//! Evaluates an `Expr` against a variable store, yielding a typed `Value`.
//! Failures never abort: a malformed expression, unknown function, or type
//! mismatch appends a record to the caller's error list and evaluates to
//! integer zero. Undefined variables read as zero (a reference error is
//! recorded only under the opt-in strict flag).

use crate::error::{ErrorKind, ErrorRecord};
use crate::rng::{self, Entropy};
use crate::scope::VarScope;
use crate::value::{Value, VarStore};

use super::ast::{AssignOp, Assignment, BinaryOp, Expr, ExprKind, Span, UnaryOp};
use super::lexer::ExprLexer;
use super::parser;

/// Evaluator state for one expression walk. Internal functions append to
/// `errors` rather than returning failures, keeping control flow
/// straight-line.
pub struct Evaluator<'a> {
    pub vars: &'a VarStore,
    pub scope: &'a VarScope,
    pub rng: &'a mut dyn Entropy,
    pub errors: &'a mut Vec<ErrorRecord>,
    pub strict: bool,
}

/// Parse and evaluate an expression source slice.
pub fn evaluate(
    src: &str,
    vars: &VarStore,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    errors: &mut Vec<ErrorRecord>,
    strict: bool,
) -> Value {
    let mut lexer = ExprLexer::new(src, 0);
    let expr = parser::parse_expr(&mut lexer);
    Evaluator {
        vars,
        scope,
        rng,
        errors,
        strict,
    }
    .eval(&expr)
}

/// Parse and evaluate a condition: the expression's value coerced to
/// boolean by truthiness.
pub fn evaluate_condition(
    src: &str,
    vars: &VarStore,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    errors: &mut Vec<ErrorRecord>,
    strict: bool,
) -> bool {
    evaluate(src, vars, scope, rng, errors, strict).truthy()
}

/// Execute a parsed assignment against the store. Compound operators load
/// the current value (missing reads as zero), combine, and store. Returns
/// the canonical key written and the stored value.
pub fn execute_assignment(
    assign: &Assignment,
    vars: &mut VarStore,
    scope: &VarScope,
    rng: &mut dyn Entropy,
    errors: &mut Vec<ErrorRecord>,
    strict: bool,
) -> (String, Value) {
    let rhs = Evaluator {
        vars: &*vars,
        scope,
        rng: &mut *rng,
        errors: &mut *errors,
        strict,
    }
    .eval(&assign.value);

    let stored = match assign.op {
        AssignOp::Set => rhs,
        compound => {
            let current = scope
                .lookup(vars, &assign.name)
                .cloned()
                .unwrap_or(Value::Int(0));
            let op = match compound {
                AssignOp::Add => BinaryOp::Add,
                AssignOp::Sub => BinaryOp::Sub,
                AssignOp::Mul => BinaryOp::Mul,
                AssignOp::Div => BinaryOp::Div,
                AssignOp::Set => unreachable!(),
            };
            apply_binary(op, current, rhs, assign.value.span, errors)
        }
    };

    let key = scope.write(vars, &assign.name, stored.clone());
    (key, stored)
}

impl Evaluator<'_> {
    pub fn eval(&mut self, expr: &Expr) -> Value {
        match &expr.kind {
            ExprKind::Int(v) => Value::Int(*v),
            ExprKind::Float(v) => Value::Float(*v),
            ExprKind::Bool(v) => Value::Bool(*v),
            ExprKind::Str(s) => Value::Str(s.clone()),

            ExprKind::Var(name) => match self.scope.lookup(self.vars, name) {
                Some(v) => v.clone(),
                None => {
                    if self.strict {
                        self.errors.push(ErrorRecord::with_span(
                            ErrorKind::Reference,
                            format!("undefined variable ${name}"),
                            expr.span,
                        ));
                    }
                    Value::Int(0)
                }
            },

            ExprKind::Ident(name) => {
                self.errors.push(ErrorRecord::with_span(
                    ErrorKind::Expression,
                    format!("unknown identifier `{name}`"),
                    expr.span,
                ));
                Value::Int(0)
            }

            ExprKind::Paren(inner) => self.eval(inner),

            ExprKind::Unary { op, operand } => {
                let v = self.eval(operand);
                match op {
                    UnaryOp::Not => Value::Bool(!v.truthy()),
                    UnaryOp::Neg => match v {
                        Value::Int(i) => Value::Int(i.wrapping_neg()),
                        Value::Float(f) => Value::Float(-f),
                        Value::Bool(b) => Value::Int(-i64::from(b)),
                        Value::Str(_) => {
                            self.errors.push(ErrorRecord::with_span(
                                ErrorKind::Type,
                                "cannot negate a string",
                                expr.span,
                            ));
                            Value::Int(0)
                        }
                    },
                }
            }

            ExprKind::Binary { op, left, right } => match op {
                // Short-circuit: the right operand of a decided logical
                // expression is never evaluated.
                BinaryOp::And => {
                    if !self.eval(left).truthy() {
                        Value::Bool(false)
                    } else {
                        Value::Bool(self.eval(right).truthy())
                    }
                }
                BinaryOp::Or => {
                    if self.eval(left).truthy() {
                        Value::Bool(true)
                    } else {
                        Value::Bool(self.eval(right).truthy())
                    }
                }
                _ => {
                    let a = self.eval(left);
                    let b = self.eval(right);
                    apply_binary(*op, a, b, expr.span, self.errors)
                }
            },

            ExprKind::Call { name, args } => self.eval_call(name, args, expr.span),

            ExprKind::Error(msg) => {
                self.errors.push(ErrorRecord::with_span(
                    ErrorKind::Expression,
                    msg.clone(),
                    expr.span,
                ));
                Value::Int(0)
            }
        }
    }

    pub fn eval_condition(&mut self, expr: &Expr) -> bool {
        self.eval(expr).truthy()
    }

    fn eval_call(&mut self, name: &str, args: &[Expr], span: Span) -> Value {
        match name {
            "either" => {
                if args.is_empty() {
                    self.errors.push(ErrorRecord::with_span(
                        ErrorKind::Expression,
                        "either() requires at least one argument",
                        span,
                    ));
                    return Value::Int(0);
                }
                // Arguments evaluate in textual order before the choice.
                let values: Vec<Value> = args.iter().map(|a| self.eval(a)).collect();
                let idx = rng::pick_index(self.rng, values.len());
                values.into_iter().nth(idx).unwrap_or(Value::Int(0))
            }
            "random" => {
                if args.len() != 2 {
                    self.errors.push(ErrorRecord::with_span(
                        ErrorKind::Expression,
                        format!("random() takes 2 arguments, got {}", args.len()),
                        span,
                    ));
                    return Value::Int(0);
                }
                let lo = self.eval(&args[0]);
                let hi = self.eval(&args[1]);
                let (Some(min), Some(max)) = (lo.as_i64(), hi.as_i64()) else {
                    self.errors.push(ErrorRecord::with_span(
                        ErrorKind::Type,
                        format!(
                            "random() bounds must be numeric, got {} and {}",
                            lo.type_name(),
                            hi.type_name()
                        ),
                        span,
                    ));
                    return Value::Int(0);
                };
                if min > max {
                    self.errors.push(ErrorRecord::with_span(
                        ErrorKind::Expression,
                        format!("random() range is empty: [{min}, {max}]"),
                        span,
                    ));
                    return Value::Int(0);
                }
                Value::Int(rng::int_in(self.rng, min, max))
            }
            _ => {
                self.errors.push(ErrorRecord::with_span(
                    ErrorKind::Expression,
                    format!("unknown function `{name}`"),
                    span,
                ));
                Value::Int(0)
            }
        }
    }
}

/// Apply a non-logical binary operator with the numeric promotion rules:
/// int ∘ int stays int (division only when it divides evenly), anything
/// involving a float is float, `+` with a string operand concatenates.
fn apply_binary(
    op: BinaryOp,
    a: Value,
    b: Value,
    span: Span,
    errors: &mut Vec<ErrorRecord>,
) -> Value {
    match op {
        BinaryOp::Add => {
            if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
                return Value::Str(format!("{a}{b}"));
            }
            if a.is_int_like() && b.is_int_like() {
                Value::Int(int_of(&a).wrapping_add(int_of(&b)))
            } else {
                Value::Float(float_of(&a) + float_of(&b))
            }
        }

        BinaryOp::Sub | BinaryOp::Mul => {
            let Some(()) = require_numeric(op, &a, &b, span, errors) else {
                return Value::Int(0);
            };
            if a.is_int_like() && b.is_int_like() {
                let (x, y) = (int_of(&a), int_of(&b));
                Value::Int(match op {
                    BinaryOp::Sub => x.wrapping_sub(y),
                    _ => x.wrapping_mul(y),
                })
            } else {
                let (x, y) = (float_of(&a), float_of(&b));
                Value::Float(match op {
                    BinaryOp::Sub => x - y,
                    _ => x * y,
                })
            }
        }

        BinaryOp::Div => {
            let Some(()) = require_numeric(op, &a, &b, span, errors) else {
                return Value::Int(0);
            };
            if float_of(&b) == 0.0 {
                errors.push(ErrorRecord::with_span(
                    ErrorKind::Expression,
                    "division by zero",
                    span,
                ));
                return Value::Int(0);
            }
            if a.is_int_like() && b.is_int_like() {
                let (x, y) = (int_of(&a), int_of(&b));
                if x % y == 0 {
                    Value::Int(x / y)
                } else {
                    Value::Float(x as f64 / y as f64)
                }
            } else {
                Value::Float(float_of(&a) / float_of(&b))
            }
        }

        BinaryOp::Mod => {
            let Some(()) = require_numeric(op, &a, &b, span, errors) else {
                return Value::Int(0);
            };
            if float_of(&b) == 0.0 {
                errors.push(ErrorRecord::with_span(
                    ErrorKind::Expression,
                    "modulo by zero",
                    span,
                ));
                return Value::Int(0);
            }
            if a.is_int_like() && b.is_int_like() {
                Value::Int(int_of(&a) % int_of(&b))
            } else {
                Value::Float(float_of(&a) % float_of(&b))
            }
        }

        BinaryOp::Eq => Value::Bool(values_equal(&a, &b)),
        BinaryOp::Neq => Value::Bool(!values_equal(&a, &b)),

        BinaryOp::Lt | BinaryOp::Lte | BinaryOp::Gt | BinaryOp::Gte => {
            let ord = match (&a, &b) {
                (Value::Str(x), Value::Str(y)) => Some(x.cmp(y)),
                _ => match (a.as_f64(), b.as_f64()) {
                    (Some(x), Some(y)) => x.partial_cmp(&y),
                    _ => {
                        errors.push(ErrorRecord::with_span(
                            ErrorKind::Type,
                            format!(
                                "cannot order {} against {}",
                                a.type_name(),
                                b.type_name()
                            ),
                            span,
                        ));
                        None
                    }
                },
            };
            let result = match ord {
                Some(ord) => match op {
                    BinaryOp::Lt => ord.is_lt(),
                    BinaryOp::Lte => ord.is_le(),
                    BinaryOp::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                },
                None => false,
            };
            Value::Bool(result)
        }

        BinaryOp::And | BinaryOp::Or => {
            // Handled with short-circuit in the evaluator.
            Value::Bool(a.truthy() && b.truthy())
        }
    }
}

fn require_numeric(
    op: BinaryOp,
    a: &Value,
    b: &Value,
    span: Span,
    errors: &mut Vec<ErrorRecord>,
) -> Option<()> {
    if matches!(a, Value::Str(_)) || matches!(b, Value::Str(_)) {
        let sym = match op {
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            _ => "?",
        };
        errors.push(ErrorRecord::with_span(
            ErrorKind::Type,
            format!(
                "`{sym}` needs numeric operands, got {} and {}",
                a.type_name(),
                b.type_name()
            ),
            span,
        ));
        return None;
    }
    Some(())
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Str(x), Value::Str(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            // String against number: unequal, not an error.
            _ => false,
        },
    }
}

fn int_of(v: &Value) -> i64 {
    match v {
        Value::Int(i) => *i,
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn float_of(v: &Value) -> f64 {
    v.as_f64().unwrap_or(0.0)
}
