use std::sync::Arc;

use arbiter_core::{AttributeValue, Datatype};

use super::{primitive, simple, text, Function, Signature, XACML3};
use crate::expression::{Value, ValueType};

const CONVERTIBLE: [Datatype; 13] = [
    Datatype::Boolean,
    Datatype::Integer,
    Datatype::Double,
    Datatype::Time,
    Datatype::Date,
    Datatype::DateTime,
    Datatype::AnyUri,
    Datatype::DayTimeDuration,
    Datatype::YearMonthDuration,
    Datatype::X500Name,
    Datatype::Rfc822Name,
    Datatype::IpAddress,
    Datatype::DnsName,
];

/// `<type>-from-string` parses the lexical form (a malformed literal is a
/// syntax-error fault); `string-from-<type>` yields the canonical form.
pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    let mut functions = Vec::with_capacity(CONVERTIBLE.len() * 2);
    for dt in CONVERTIBLE {
        let t = ValueType::Primitive(dt);
        let name = dt.short_name();
        functions.push(simple(
            format!("{XACML3}{}-from-string", name),
            Signature::new(t, vec![ValueType::STRING]),
            move |args| Ok(Value::Primitive(AttributeValue::parse(dt, text(args, 0)?)?)),
        ));
        functions.push(simple(
            format!("{XACML3}string-from-{}", name),
            Signature::new(ValueType::STRING, vec![t]),
            |args| Ok(Value::Primitive(AttributeValue::String(primitive(args, 0)?.to_string()))),
        ));
    }
    functions
}

#[cfg(test)]
mod tests {
    use super::super::test_support::call;
    use super::*;
    use arbiter_core::StatusCode;

    #[test]
    fn test_integer_from_string() {
        let id = format!("{XACML3}integer-from-string");
        assert_eq!(
            call(&id, vec![AttributeValue::string("42")]).unwrap(),
            Value::Primitive(AttributeValue::Integer(42))
        );
        let err = call(&id, vec![AttributeValue::string("4x")]).unwrap_err();
        assert_eq!(err.code, StatusCode::SyntaxError);
    }

    #[test]
    fn test_string_from_canonical() {
        let id = format!("{XACML3}string-from-dayTimeDuration");
        let d = AttributeValue::parse(Datatype::DayTimeDuration, "PT36H").unwrap();
        assert_eq!(
            call(&id, vec![d]).unwrap(),
            Value::Primitive(AttributeValue::string("P1DT12H"))
        );
        let id = format!("{XACML3}string-from-boolean");
        assert_eq!(
            call(&id, vec![AttributeValue::Boolean(true)]).unwrap(),
            Value::Primitive(AttributeValue::string("true"))
        );
    }
}
