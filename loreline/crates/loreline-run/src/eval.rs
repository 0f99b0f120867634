//! Expression evaluation and text rendering.

use loreline_lex::TextFragment;
use loreline_par::{BinOp, Expr, LiteralValue, UnOp};
use loreline_util::{Error, Position, Result, RuntimeErrorKind};
use rustc_hash::FxHashMap;

use crate::interpreter::HostFunction;
use crate::rng::DiceRng;
use crate::scope::Env;
use crate::value::Value;

/// A tag marker in rendered text: `<name>` or `</name>` at a byte offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TagMarker {
    pub name: String,
    pub closing: bool,
    /// Byte offset in the rendered text where the marker sits.
    pub offset: usize,
}

/// Everything an expression needs to evaluate.
pub(crate) struct EvalCtx<'a, 'e> {
    pub env: &'a Env<'e>,
    pub rng: &'a mut DiceRng,
    pub functions: &'a mut FxHashMap<String, HostFunction>,
    /// Set while evaluating choice guards; with strict access, impure
    /// calls are rejected here.
    pub in_guard: bool,
}

pub(crate) fn eval(ctx: &mut EvalCtx<'_, '_>, expr: &Expr) -> Result<Value> {
    match expr {
        Expr::Literal(lit) => Ok(match &lit.value {
            LiteralValue::Int(value) => Value::Int(*value),
            LiteralValue::Float(value) => Value::Float(*value),
            LiteralValue::Bool(value) => Value::Bool(*value),
            LiteralValue::Null => Value::Null,
        }),
        Expr::Str(lit) => {
            let (text, _tags) = render_text(ctx, &lit.fragments, lit.pos)?;
            Ok(Value::String(text))
        }
        Expr::Path(path) => ctx.env.lookup(&path.segments, path.pos),
        Expr::Paren(paren) => eval(ctx, &paren.inner),
        Expr::Unary(unary) => {
            let value = eval(ctx, &unary.expr)?;
            match unary.op {
                UnOp::Not => Ok(Value::Bool(!value.is_truthy())),
                UnOp::Neg => match value {
                    Value::Int(v) => Ok(Value::Int(v.wrapping_neg())),
                    Value::Float(v) => Ok(Value::Float(-v)),
                    other => Err(error(
                        ctx,
                        RuntimeErrorKind::TypeMismatch,
                        format!("cannot negate {}", other.type_name()),
                        unary.pos,
                    )),
                },
            }
        }
        Expr::Binary(binary) => match binary.op {
            BinOp::And => {
                let left = eval(ctx, &binary.left)?;
                if !left.is_truthy() {
                    return Ok(Value::Bool(false));
                }
                let right = eval(ctx, &binary.right)?;
                Ok(Value::Bool(right.is_truthy()))
            }
            BinOp::Or => {
                let left = eval(ctx, &binary.left)?;
                if left.is_truthy() {
                    return Ok(Value::Bool(true));
                }
                let right = eval(ctx, &binary.right)?;
                Ok(Value::Bool(right.is_truthy()))
            }
            op => {
                let left = eval(ctx, &binary.left)?;
                let right = eval(ctx, &binary.right)?;
                apply_binary(op, left, right, binary.pos, ctx.env.file)
            }
        },
        Expr::Call(call) => eval_call(ctx, call),
    }
}

fn eval_call(ctx: &mut EvalCtx<'_, '_>, call: &loreline_par::CallExpr) -> Result<Value> {
    // Host functions shadow built-ins.
    if ctx.functions.contains_key(&call.name) {
        let pure = ctx.functions[&call.name].pure;
        if ctx.in_guard && ctx.env.strict && !pure {
            return Err(error(
                ctx,
                RuntimeErrorKind::ImpureGuardCall,
                format!("guard calls '{}', which is not declared pure", call.name),
                call.pos,
            ));
        }
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(eval(ctx, arg)?);
        }
        let function = ctx.functions.get_mut(&call.name).expect("checked above");
        return (function.func)(&args).map_err(|message| {
            Error::new(
                RuntimeErrorKind::HostFunctionFailed,
                format!("'{}': {message}", call.name),
                call.pos,
            )
            .with_frame(ctx.env.file, call.pos.line)
        });
    }

    if call.name == "chance" {
        // Draws from the interpreter RNG, so it is never guard-pure.
        if ctx.in_guard && ctx.env.strict {
            return Err(error(
                ctx,
                RuntimeErrorKind::ImpureGuardCall,
                "guard calls 'chance', which draws from the interpreter RNG",
                call.pos,
            ));
        }
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(eval(ctx, arg)?);
        }
        let n = match args.as_slice() {
            [Value::Int(n)] if *n >= 1 => *n as u64,
            _ => {
                return Err(error(
                    ctx,
                    RuntimeErrorKind::TypeMismatch,
                    "chance(n) takes one integer argument with n >= 1",
                    call.pos,
                ))
            }
        };
        return Ok(Value::Bool(ctx.rng.chance(n)));
    }

    if ctx.env.strict {
        Err(error(
            ctx,
            RuntimeErrorKind::UndefinedReference,
            format!("unknown function '{}'", call.name),
            call.pos,
        ))
    } else {
        Ok(Value::Null)
    }
}

/// Apply a non-boolean binary operator.
pub(crate) fn apply_binary(
    op: BinOp,
    left: Value,
    right: Value,
    pos: Position,
    file: Option<&str>,
) -> Result<Value> {
    let mismatch = |message: String| {
        Err(Error::new(RuntimeErrorKind::TypeMismatch, message, pos)
            .with_frame(file, pos.line))
    };
    match op {
        BinOp::Add => match (left, right) {
            (Value::String(a), b) => Ok(Value::String(a + &b.render())),
            (a, Value::String(b)) => {
                let mut out = a.render();
                out.push_str(&b);
                Ok(Value::String(out))
            }
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_add(b))),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Ok(Value::Float(x + y)),
                _ => mismatch(format!("cannot add {} and {}", a.type_name(), b.type_name())),
            },
        },
        BinOp::Sub => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_sub(b))),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Ok(Value::Float(x - y)),
                _ => mismatch(format!(
                    "cannot subtract {} from {}",
                    b.type_name(),
                    a.type_name()
                )),
            },
        },
        BinOp::Mul => match (left, right) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a.wrapping_mul(b))),
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(x), Some(y)) => Ok(Value::Float(x * y)),
                _ => mismatch(format!(
                    "cannot multiply {} and {}",
                    a.type_name(),
                    b.type_name()
                )),
            },
        },
        BinOp::Div => match (left, right) {
            (Value::Int(a), Value::Int(b)) => {
                if b == 0 {
                    Err(Error::new(RuntimeErrorKind::DivideByZero, "division by zero", pos)
                        .with_frame(file, pos.line))
                } else {
                    // truncation toward zero
                    Ok(Value::Int(a.wrapping_div(b)))
                }
            }
            (a, b) => match (a.as_number(), b.as_number()) {
                (Some(_), Some(y)) if y == 0.0 => {
                    Err(Error::new(RuntimeErrorKind::DivideByZero, "division by zero", pos)
                        .with_frame(file, pos.line))
                }
                (Some(x), Some(y)) => Ok(Value::Float(x / y)),
                _ => mismatch(format!(
                    "cannot divide {} by {}",
                    a.type_name(),
                    b.type_name()
                )),
            },
        },
        BinOp::Eq => Ok(Value::Bool(left == right)),
        BinOp::Ne => Ok(Value::Bool(left != right)),
        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            match (left.as_number(), right.as_number()) {
                (Some(a), Some(b)) => Ok(Value::Bool(match op {
                    BinOp::Lt => a < b,
                    BinOp::Le => a <= b,
                    BinOp::Gt => a > b,
                    _ => a >= b,
                })),
                _ => mismatch(format!(
                    "cannot order {} and {}",
                    left.type_name(),
                    right.type_name()
                )),
            }
        }
        BinOp::And | BinOp::Or => unreachable!("short-circuit operators are handled in eval"),
    }
}

/// Render a fragment stream: interpolations substituted, tag markers
/// collected with their offsets in the final text.
pub(crate) fn render_text(
    ctx: &mut EvalCtx<'_, '_>,
    fragments: &[TextFragment],
    pos: Position,
) -> Result<(String, Vec<TagMarker>)> {
    let mut out = String::new();
    let mut tags = Vec::new();
    for fragment in fragments {
        match fragment {
            TextFragment::Literal { text, .. } => out.push_str(text),
            TextFragment::Interp { path, .. } => {
                let value = ctx.env.lookup(path, pos)?;
                out.push_str(&value.render());
            }
            TextFragment::TagOpen { name, .. } => tags.push(TagMarker {
                name: name.clone(),
                closing: false,
                offset: out.len(),
            }),
            TextFragment::TagClose { name, .. } => tags.push(TagMarker {
                name: name.clone(),
                closing: true,
                offset: out.len(),
            }),
        }
    }
    Ok((out, tags))
}

fn error(
    ctx: &EvalCtx<'_, '_>,
    kind: RuntimeErrorKind,
    message: impl Into<String>,
    pos: Position,
) -> Error {
    Error::new(kind, message, pos).with_frame(ctx.env.file, pos.line)
}
