use std::sync::Arc;

use arbiter_core::{AttributeValue, IndeterminateError};

use super::{double, integer, simple, Function, Signature, XACML1};
use crate::expression::{Value, ValueType};

fn overflow(op: &str) -> IndeterminateError {
    IndeterminateError::processing(format!("integer overflow in {}", op))
}

fn int_value(i: i64) -> Value {
    Value::Primitive(AttributeValue::Integer(i))
}

fn double_value(d: f64) -> Value {
    Value::Primitive(AttributeValue::Double(d))
}

/// Fold over two or more integer arguments with overflow checking.
fn integer_fold(
    args: &[Value],
    op: &'static str,
    f: fn(i64, i64) -> Option<i64>,
) -> Result<Value, IndeterminateError> {
    let mut acc = integer(args, 0)?;
    for i in 1..args.len() {
        acc = f(acc, integer(args, i)?).ok_or_else(|| overflow(op))?;
    }
    Ok(int_value(acc))
}

fn double_fold(args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, IndeterminateError> {
    let mut acc = double(args, 0)?;
    for i in 1..args.len() {
        acc = f(acc, double(args, i)?);
    }
    Ok(double_value(acc))
}

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    let int2 = || Signature::new(ValueType::INTEGER, vec![ValueType::INTEGER, ValueType::INTEGER]);
    let dbl2 = || Signature::new(ValueType::DOUBLE, vec![ValueType::DOUBLE, ValueType::DOUBLE]);
    let int_n = || int2().variadic(ValueType::INTEGER);
    let dbl_n = || dbl2().variadic(ValueType::DOUBLE);

    vec![
        simple(format!("{XACML1}integer-add"), int_n(), |args| {
            integer_fold(args, "integer-add", i64::checked_add)
        }),
        simple(format!("{XACML1}integer-multiply"), int_n(), |args| {
            integer_fold(args, "integer-multiply", i64::checked_mul)
        }),
        simple(format!("{XACML1}integer-subtract"), int2(), |args| {
            integer_fold(args, "integer-subtract", i64::checked_sub)
        }),
        simple(format!("{XACML1}integer-divide"), int2(), |args| {
            let divisor = integer(args, 1)?;
            if divisor == 0 {
                return Err(IndeterminateError::processing("integer division by zero"));
            }
            integer(args, 0)?
                .checked_div(divisor)
                .map(int_value)
                .ok_or_else(|| overflow("integer-divide"))
        }),
        simple(format!("{XACML1}integer-mod"), int2(), |args| {
            let divisor = integer(args, 1)?;
            if divisor == 0 {
                return Err(IndeterminateError::processing("integer modulo by zero"));
            }
            integer(args, 0)?
                .checked_rem(divisor)
                .map(int_value)
                .ok_or_else(|| overflow("integer-mod"))
        }),
        simple(
            format!("{XACML1}integer-abs"),
            Signature::new(ValueType::INTEGER, vec![ValueType::INTEGER]),
            |args| {
                integer(args, 0)?
                    .checked_abs()
                    .map(int_value)
                    .ok_or_else(|| overflow("integer-abs"))
            },
        ),
        simple(format!("{XACML1}double-add"), dbl_n(), |args| double_fold(args, |a, b| a + b)),
        simple(format!("{XACML1}double-multiply"), dbl_n(), |args| {
            double_fold(args, |a, b| a * b)
        }),
        simple(format!("{XACML1}double-subtract"), dbl2(), |args| {
            double_fold(args, |a, b| a - b)
        }),
        simple(format!("{XACML1}double-divide"), dbl2(), |args| {
            let divisor = double(args, 1)?;
            if divisor == 0.0 {
                return Err(IndeterminateError::processing("double division by zero"));
            }
            Ok(double_value(double(args, 0)? / divisor))
        }),
        simple(
            format!("{XACML1}double-abs"),
            Signature::new(ValueType::DOUBLE, vec![ValueType::DOUBLE]),
            |args| Ok(double_value(double(args, 0)?.abs())),
        ),
        // fn:round rounds half towards positive infinity
        simple(
            format!("{XACML1}round"),
            Signature::new(ValueType::DOUBLE, vec![ValueType::DOUBLE]),
            |args| Ok(double_value((double(args, 0)? + 0.5).floor())),
        ),
        simple(
            format!("{XACML1}floor"),
            Signature::new(ValueType::DOUBLE, vec![ValueType::DOUBLE]),
            |args| Ok(double_value(double(args, 0)?.floor())),
        ),
        simple(
            format!("{XACML1}integer-to-double"),
            Signature::new(ValueType::DOUBLE, vec![ValueType::INTEGER]),
            |args| Ok(double_value(integer(args, 0)? as f64)),
        ),
        simple(
            format!("{XACML1}double-to-integer"),
            Signature::new(ValueType::INTEGER, vec![ValueType::DOUBLE]),
            |args| {
                let d = double(args, 0)?.trunc();
                if !d.is_finite() || d < i64::MIN as f64 || d >= i64::MAX as f64 {
                    return Err(IndeterminateError::processing(format!(
                        "{} is out of integer range",
                        d
                    )));
                }
                Ok(int_value(d as i64))
            },
        ),
    ]
}
