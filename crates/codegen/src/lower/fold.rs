//! Constant folding of expressions.

use crate::{BinOp, BuiltinFn, Expr, ExprKind, NumericError, NumericResult, PrefixOp, Value};
use std::cmp::Ordering;

/// Evaluates `expr` if it is a compile-time constant.
///
/// Returns `Ok(None)` if some part of the expression is not constant, and an error if folding
/// violates the numeric contract.
pub fn fold_constant(expr: &Expr) -> NumericResult<Option<Value>> {
    let value = match &expr.kind {
        ExprKind::Number(value) => *value,
        ExprKind::Prefix(op, operand) => {
            let Some(value) = fold_constant(operand)? else { return Ok(None) };
            match op {
                PrefixOp::Plus => value,
                PrefixOp::Neg => value.neg()?,
                PrefixOp::Inv => value.inv()?,
                PrefixOp::Not => value.not(),
            }
        }
        ExprKind::Binary(left, op, right) => {
            let (Some(a), Some(b)) = (fold_constant(left)?, fold_constant(right)?) else {
                return Ok(None);
            };
            let literal = matches!(right.kind, ExprKind::Number(_));
            fold_binary(a, *op, b, literal)?
        }
        ExprKind::Cast(operand) => match fold_constant(operand)? {
            Some(value) => value.cast(expr.ty)?,
            None => return Ok(None),
        },
        ExprKind::Builtin(func, args) => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                match fold_constant(arg)? {
                    Some(value) => values.push(value),
                    None => return Ok(None),
                }
            }
            match (func, values.as_slice()) {
                (BuiltinFn::Msb, [value]) => value.msb()?,
                (BuiltinFn::Lsb, [value]) => value.lsb()?,
                (BuiltinFn::Mkword, [msb, lsb]) => {
                    let (msb, lsb) = (msb.lsb()?, lsb.lsb()?);
                    let word = (msb.as_bits().unwrap_or(0) << 8) | lsb.as_bits().unwrap_or(0);
                    Value::UWord(word)
                }
                _ => return Ok(None),
            }
        }
        ExprKind::Ident(_)
        | ExprKind::MachineRegister(_)
        | ExprKind::Memory(_)
        | ExprKind::ArrayIndex(_) => return Ok(None),
    };
    Ok(Some(value))
}

/// Folds `a op b`. With `mixed`, `b` is a literal that is first cast to the type of `a`.
fn fold_binary(a: Value, op: BinOp, b: Value, mixed: bool) -> NumericResult<Value> {
    let arith = |f: fn(Value, Value) -> NumericResult<Value>| {
        if mixed { a.fold_mixed(b, f) } else { f(a, b) }
    };
    let compare = |expected: &[Ordering]| -> NumericResult<Value> {
        let b = if mixed && a.ty() != b.ty() { b.cast(a.ty())? } else { b };
        Ok(Value::bool(expected.contains(&a.compare(b)?)))
    };
    match op {
        BinOp::Add => arith(Value::add),
        BinOp::Sub => arith(Value::sub),
        BinOp::Mul => arith(Value::mul),
        BinOp::Div => arith(Value::div),
        BinOp::Rem => arith(Value::rem),
        BinOp::BitAnd => arith(Value::bitand),
        BinOp::BitOr => arith(Value::bitor),
        BinOp::BitXor => arith(Value::bitxor),
        BinOp::Shl => a.shl(shift_count(b)?),
        BinOp::Shr => a.shr(shift_count(b)?),
        BinOp::And => Ok(a.and(b)),
        BinOp::Or => Ok(a.or(b)),
        BinOp::Xor => Ok(a.xor(b)),
        BinOp::Eq => compare(&[Ordering::Equal]),
        BinOp::Ne => compare(&[Ordering::Less, Ordering::Greater]),
        BinOp::Lt => compare(&[Ordering::Less]),
        BinOp::Le => compare(&[Ordering::Less, Ordering::Equal]),
        BinOp::Gt => compare(&[Ordering::Greater]),
        BinOp::Ge => compare(&[Ordering::Greater, Ordering::Equal]),
    }
}

fn shift_count(count: Value) -> NumericResult<u32> {
    count
        .as_i64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or(NumericError::InvalidOperation("shift by a negative or non-integer count"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataType;
    use octet_interface::Pos;

    fn num(value: Value) -> Expr {
        Expr::number(value, Pos::dummy())
    }

    fn x() -> Expr {
        Expr::ident("main.x", DataType::UByte, Pos::dummy())
    }

    #[test]
    fn folds_arithmetic() {
        let e = Expr::binary(num(Value::UByte(200)), BinOp::Add, num(Value::UByte(100)));
        assert_eq!(fold_constant(&e).unwrap(), Some(Value::UByte(44)));

        let e = Expr::prefix(PrefixOp::Neg, num(Value::Byte(-128)));
        assert_eq!(fold_constant(&e).unwrap(), Some(Value::Byte(-128)));

        // uword + ubyte literal folds in the type of the left operand
        let e = Expr::binary(num(Value::UWord(65535)), BinOp::Add, num(Value::UByte(2)));
        assert_eq!(fold_constant(&e).unwrap(), Some(Value::UWord(1)));

        let e = Expr::binary(num(Value::UByte(3)), BinOp::Lt, num(Value::UByte(4)));
        assert_eq!(fold_constant(&e).unwrap(), Some(Value::UByte(1)));

        let e = Expr::binary(num(Value::UWord(1)), BinOp::Shl, num(Value::UByte(15)));
        assert_eq!(fold_constant(&e).unwrap(), Some(Value::UWord(0x8000)));
    }

    #[test]
    fn non_constants() {
        let e = Expr::binary(x(), BinOp::Add, num(Value::UByte(1)));
        assert_eq!(fold_constant(&e).unwrap(), None);
        assert_eq!(fold_constant(&Expr::cast(x(), DataType::UWord)).unwrap(), None);
    }

    #[test]
    fn builtins_and_casts() {
        let pos = Pos::dummy();
        let msb = Expr::new(
            ExprKind::Builtin(BuiltinFn::Msb, vec![num(Value::UWord(0x1234))]),
            DataType::UByte,
            pos.clone(),
        );
        assert_eq!(fold_constant(&msb).unwrap(), Some(Value::UByte(0x12)));

        let mkword = Expr::new(
            ExprKind::Builtin(BuiltinFn::Mkword, vec![num(Value::UByte(0xab)), num(Value::UByte(0xcd))]),
            DataType::UWord,
            pos,
        );
        assert_eq!(fold_constant(&mkword).unwrap(), Some(Value::UWord(0xabcd)));

        let cast = Expr::cast(num(Value::Float(300.0)), DataType::UByte);
        assert!(matches!(fold_constant(&cast), Err(NumericError::CastOverflow { .. })));
    }

    #[test]
    fn strict_types_without_literal() {
        let e = Expr::binary(
            num(Value::UWord(1)),
            BinOp::Add,
            Expr::cast(num(Value::UByte(1)), DataType::UByte),
        );
        assert!(matches!(fold_constant(&e), Err(NumericError::TypeMismatch { .. })));
    }
}
