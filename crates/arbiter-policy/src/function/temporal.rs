use std::sync::Arc;

use arbiter_core::{AttributeValue, DayTimeDuration, Datatype, IndeterminateError};

use super::{primitive, simple, Function, Signature, XACML3};
use crate::expression::{Value, ValueType};

fn out_of_range(op: &str) -> IndeterminateError {
    IndeterminateError::processing(format!("{}: result out of range", op))
}

fn day_time(args: &[Value], index: usize) -> Result<DayTimeDuration, IndeterminateError> {
    match primitive(args, index)? {
        AttributeValue::DayTimeDuration(d) => Ok(*d),
        other => Err(IndeterminateError::processing(format!(
            "expected dayTimeDuration, got {}",
            other.datatype()
        ))),
    }
}

fn months(args: &[Value], index: usize) -> Result<i64, IndeterminateError> {
    match primitive(args, index)? {
        AttributeValue::YearMonthDuration(d) => Ok(d.months),
        other => Err(IndeterminateError::processing(format!(
            "expected yearMonthDuration, got {}",
            other.datatype()
        ))),
    }
}

fn date_time_arith(args: &[Value], op: &str, negate: bool) -> Result<Value, IndeterminateError> {
    let AttributeValue::DateTime(base) = primitive(args, 0)? else {
        return Err(IndeterminateError::processing("expected dateTime"));
    };
    let result = match primitive(args, 1)? {
        AttributeValue::DayTimeDuration(_) => {
            let d = day_time(args, 1)?;
            let d = if negate { DayTimeDuration(-d.0) } else { d };
            base.add_duration(&d)
        }
        _ => {
            let m = months(args, 1)?;
            base.add_months(if negate { -m } else { m })
        }
    };
    result
        .map(|dt| Value::Primitive(AttributeValue::DateTime(dt)))
        .ok_or_else(|| out_of_range(op))
}

fn date_arith(args: &[Value], op: &str, negate: bool) -> Result<Value, IndeterminateError> {
    let AttributeValue::Date(base) = primitive(args, 0)? else {
        return Err(IndeterminateError::processing("expected date"));
    };
    let m = months(args, 1)?;
    base.add_months(if negate { -m } else { m })
        .map(|d| Value::Primitive(AttributeValue::Date(d)))
        .ok_or_else(|| out_of_range(op))
}

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    let date_time = ValueType::Primitive(Datatype::DateTime);
    let date = ValueType::Primitive(Datatype::Date);
    let dtd = ValueType::Primitive(Datatype::DayTimeDuration);
    let ymd = ValueType::Primitive(Datatype::YearMonthDuration);

    let mut functions = Vec::new();
    for (duration, name) in [(dtd, "dayTimeDuration"), (ymd, "yearMonthDuration")] {
        for (verb, negate) in [("add", false), ("subtract", true)] {
            let id = format!("{XACML3}dateTime-{}-{}", verb, name);
            let op = id.clone();
            functions.push(simple(
                id,
                Signature::new(date_time, vec![date_time, duration]),
                move |args| date_time_arith(args, &op, negate),
            ));
        }
    }
    for (verb, negate) in [("add", false), ("subtract", true)] {
        let id = format!("{XACML3}date-{}-yearMonthDuration", verb);
        let op = id.clone();
        functions.push(simple(
            id,
            Signature::new(date, vec![date, ymd]),
            move |args| date_arith(args, &op, negate),
        ));
    }
    functions
}
