use std::cmp::Ordering;
use std::sync::Arc;

use arbiter_core::{AttributeValue, Datatype, IndeterminateError};

use super::{bool_value, primitive, simple, typed_id, Function, Signature, XACML2};
use crate::expression::ValueType;

const ORDERED_TYPES: [Datatype; 6] = [
    Datatype::Integer,
    Datatype::Double,
    Datatype::String,
    Datatype::Time,
    Datatype::Date,
    Datatype::DateTime,
];

/// Total or partial order of two values of the same ordered datatype.
/// `None` for NaN operands.
fn compare(a: &AttributeValue, b: &AttributeValue) -> Result<Option<Ordering>, IndeterminateError> {
    use AttributeValue as V;
    Ok(match (a, b) {
        (V::Integer(x), V::Integer(y)) => Some(x.cmp(y)),
        (V::Double(x), V::Double(y)) => x.partial_cmp(y),
        (V::String(x), V::String(y)) => Some(x.cmp(y)),
        (V::Time(x), V::Time(y)) => Some(x.cmp(y)),
        (V::Date(x), V::Date(y)) => Some(x.cmp(y)),
        (V::DateTime(x), V::DateTime(y)) => Some(x.cmp(y)),
        _ => {
            return Err(IndeterminateError::processing(format!(
                "cannot compare {} with {}",
                a.datatype(),
                b.datatype()
            )))
        }
    })
}

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    let relations: [(&str, fn(Ordering) -> bool); 4] = [
        ("greater-than", |o| o == Ordering::Greater),
        ("greater-than-or-equal", |o| o != Ordering::Less),
        ("less-than", |o| o == Ordering::Less),
        ("less-than-or-equal", |o| o != Ordering::Greater),
    ];

    let mut functions = Vec::new();
    for dt in ORDERED_TYPES {
        let t = ValueType::Primitive(dt);
        for (name, holds) in relations {
            functions.push(simple(
                typed_id(dt, name),
                Signature::new(ValueType::BOOLEAN, vec![t, t]),
                move |args| {
                    let ordering = compare(primitive(args, 0)?, primitive(args, 1)?)?;
                    Ok(bool_value(ordering.map(holds).unwrap_or(false)))
                },
            ));
        }
    }

    let time = ValueType::Primitive(Datatype::Time);
    functions.push(simple(
        format!("{XACML2}time-in-range"),
        Signature::new(ValueType::BOOLEAN, vec![time, time, time]),
        |args| {
            let times = (primitive(args, 0)?, primitive(args, 1)?, primitive(args, 2)?);
            match times {
                (AttributeValue::Time(t), AttributeValue::Time(lo), AttributeValue::Time(hi)) => {
                    let (t, lo, hi) = (t.instant(), lo.instant(), hi.instant());
                    // a range whose upper bound is before its lower bound spans midnight
                    let in_range = if lo <= hi {
                        lo <= t && t <= hi
                    } else {
                        t >= lo || t <= hi
                    };
                    Ok(bool_value(in_range))
                }
                _ => Err(IndeterminateError::processing("time-in-range expects three times")),
            }
        },
    ));
    functions
}

#[cfg(test)]
mod tests {
    use super::super::test_support::call_bool;
    use super::super::XACML1;
    use super::*;

    fn time(s: &str) -> AttributeValue {
        AttributeValue::parse(Datatype::Time, s).unwrap()
    }

    #[test]
    fn test_integer_relations() {
        let gt = format!("{XACML1}integer-greater-than");
        let le = format!("{XACML1}integer-less-than-or-equal");
        assert!(call_bool(&gt, vec![AttributeValue::Integer(3), AttributeValue::Integer(2)]));
        assert!(!call_bool(&gt, vec![AttributeValue::Integer(2), AttributeValue::Integer(2)]));
        assert!(call_bool(&le, vec![AttributeValue::Integer(2), AttributeValue::Integer(2)]));
    }

    #[test]
    fn test_double_nan_is_never_ordered() {
        let lt = format!("{XACML1}double-less-than");
        let ge = format!("{XACML1}double-greater-than-or-equal");
        let nan = AttributeValue::Double(f64::NAN);
        assert!(!call_bool(&lt, vec![nan.clone(), AttributeValue::Double(1.0)]));
        assert!(!call_bool(&ge, vec![nan, AttributeValue::Double(1.0)]));
    }

    #[test]
    fn test_date_comparison() {
        let lt = format!("{XACML1}date-less-than");
        let a = AttributeValue::parse(Datatype::Date, "2024-01-01").unwrap();
        let b = AttributeValue::parse(Datatype::Date, "2024-03-01").unwrap();
        assert!(call_bool(&lt, vec![a, b]));
    }

    #[test]
    fn test_time_in_range() {
        let id = format!("{XACML2}time-in-range");
        assert!(call_bool(&id, vec![time("10:00:00Z"), time("09:00:00Z"), time("17:00:00Z")]));
        assert!(!call_bool(&id, vec![time("18:00:00Z"), time("09:00:00Z"), time("17:00:00Z")]));
        // overnight window
        assert!(call_bool(&id, vec![time("23:30:00Z"), time("22:00:00Z"), time("06:00:00Z")]));
        assert!(!call_bool(&id, vec![time("12:00:00Z"), time("22:00:00Z"), time("06:00:00Z")]));
    }
}
