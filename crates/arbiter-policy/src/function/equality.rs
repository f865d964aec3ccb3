use std::sync::Arc;

use arbiter_core::{AttributeValue, Datatype};

use super::{bool_value, primitive, simple, text, typed_id, Function, Signature, XACML3};
use crate::expression::ValueType;

const EQUALITY_TYPES: [Datatype; 14] = [
    Datatype::String,
    Datatype::Boolean,
    Datatype::Integer,
    Datatype::Double,
    Datatype::Date,
    Datatype::Time,
    Datatype::DateTime,
    Datatype::DayTimeDuration,
    Datatype::YearMonthDuration,
    Datatype::AnyUri,
    Datatype::X500Name,
    Datatype::Rfc822Name,
    Datatype::HexBinary,
    Datatype::Base64Binary,
];

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    let mut functions: Vec<Arc<dyn Function>> = EQUALITY_TYPES
        .iter()
        .map(|&dt| {
            let t = ValueType::Primitive(dt);
            simple(
                typed_id(dt, "equal"),
                Signature::new(ValueType::BOOLEAN, vec![t, t]),
                |args| Ok(bool_value(equal(primitive(args, 0)?, primitive(args, 1)?))),
            )
        })
        .collect();

    functions.push(simple(
        format!("{XACML3}string-equal-ignore-case"),
        Signature::new(ValueType::BOOLEAN, vec![ValueType::STRING, ValueType::STRING]),
        |args| Ok(bool_value(text(args, 0)?.to_lowercase() == text(args, 1)?.to_lowercase())),
    ));
    functions
}

/// Typed equality. Doubles compare numerically (NaN is unequal to itself);
/// everything else uses value equality.
fn equal(a: &AttributeValue, b: &AttributeValue) -> bool {
    match (a, b) {
        (AttributeValue::Double(x), AttributeValue::Double(y)) => x == y,
        _ => a == b,
    }
}
