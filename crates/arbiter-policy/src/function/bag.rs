use std::sync::Arc;

use arbiter_core::{AttributeValue, Bag, Datatype, IndeterminateError};

use super::{bag, bool_value, primitive, simple, typed_id, Function, Signature};
use crate::expression::{Value, ValueType};

/// Datatypes with bag and set function families.
const BAG_TYPES: [Datatype; 16] = [
    Datatype::String,
    Datatype::Boolean,
    Datatype::Integer,
    Datatype::Double,
    Datatype::Time,
    Datatype::Date,
    Datatype::DateTime,
    Datatype::AnyUri,
    Datatype::HexBinary,
    Datatype::Base64Binary,
    Datatype::DayTimeDuration,
    Datatype::YearMonthDuration,
    Datatype::X500Name,
    Datatype::Rfc822Name,
    Datatype::IpAddress,
    Datatype::DnsName,
];

fn new_bag(datatype: Datatype, values: Vec<AttributeValue>) -> Result<Value, IndeterminateError> {
    Ok(Value::Bag(Arc::new(Bag::new(datatype, values)?)))
}

fn bag_functions(dt: Datatype) -> Vec<Arc<dyn Function>> {
    let t = ValueType::Primitive(dt);
    let b = ValueType::Bag(dt);
    vec![
        simple(typed_id(dt, "one-and-only"), Signature::new(t, vec![b]), |args| {
            Ok(Value::Primitive(bag(args, 0)?.one_and_only()?.clone()))
        }),
        simple(
            typed_id(dt, "bag-size"),
            Signature::new(ValueType::INTEGER, vec![b]),
            |args| Ok(Value::Primitive(AttributeValue::Integer(bag(args, 0)?.len() as i64))),
        ),
        simple(
            typed_id(dt, "is-in"),
            Signature::new(ValueType::BOOLEAN, vec![t, b]),
            |args| Ok(bool_value(bag(args, 1)?.contains(primitive(args, 0)?))),
        ),
        simple(typed_id(dt, "bag"), Signature::new(b, Vec::new()).variadic(t), move |args| {
            let values = args
                .iter()
                .map(|v| v.as_primitive().cloned())
                .collect::<Result<Vec<_>, _>>()?;
            new_bag(dt, values)
        }),
    ]
}

fn set_functions(dt: Datatype) -> Vec<Arc<dyn Function>> {
    let b = ValueType::Bag(dt);
    let pair = |ret| Signature::new(ret, vec![b, b]);
    vec![
        simple(typed_id(dt, "intersection"), pair(b), move |args| {
            let other = bag(args, 1)?;
            let values = bag(args, 0)?
                .distinct()
                .into_iter()
                .filter(|v| other.contains(v))
                .cloned()
                .collect();
            new_bag(dt, values)
        }),
        simple(
            typed_id(dt, "at-least-one-member-of"),
            pair(ValueType::BOOLEAN),
            |args| {
                let other = bag(args, 1)?;
                Ok(bool_value(bag(args, 0)?.iter().any(|v| other.contains(v))))
            },
        ),
        simple(typed_id(dt, "union"), pair(b).variadic(b), move |args| {
            let mut values: Vec<AttributeValue> = Vec::new();
            for i in 0..args.len() {
                for v in bag(args, i)?.iter() {
                    if !values.contains(v) {
                        values.push(v.clone());
                    }
                }
            }
            new_bag(dt, values)
        }),
        simple(typed_id(dt, "subset"), pair(ValueType::BOOLEAN), |args| {
            let other = bag(args, 1)?;
            Ok(bool_value(bag(args, 0)?.iter().all(|v| other.contains(v))))
        }),
        simple(typed_id(dt, "set-equals"), pair(ValueType::BOOLEAN), |args| {
            let (a, b) = (bag(args, 0)?, bag(args, 1)?);
            Ok(bool_value(
                a.iter().all(|v| b.contains(v)) && b.iter().all(|v| a.contains(v)),
            ))
        }),
    ]
}

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    BAG_TYPES
        .iter()
        .flat_map(|&dt| {
            let mut family = bag_functions(dt);
            family.extend(set_functions(dt));
            family
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::bag_of;
    use super::super::{FunctionRegistry, XACML1};
    use super::*;

    fn apply(id: &str, args: Vec<Value>) -> Result<Value, IndeterminateError> {
        FunctionRegistry::standard().get(id).unwrap().apply(&args)
    }

    fn strings(values: &[&str]) -> Value {
        bag_of(values.iter().map(|s| AttributeValue::string(*s)).collect())
    }

    #[test]
    fn test_one_and_only() {
        let id = format!("{XACML1}string-one-and-only");
        assert_eq!(
            apply(&id, vec![strings(&["a"])]).unwrap(),
            Value::Primitive(AttributeValue::string("a"))
        );
        assert!(apply(&id, vec![strings(&["a", "b"])]).is_err());
        assert!(apply(&id, vec![Value::from(Bag::empty(Datatype::String))]).is_err());
    }

    #[test]
    fn test_bag_size_and_is_in() {
        let size = apply(&format!("{XACML1}string-bag-size"), vec![strings(&["a", "b", "a"])]).unwrap();
        assert_eq!(size, Value::Primitive(AttributeValue::Integer(3)));
        let is_in = apply(
            &format!("{XACML1}string-is-in"),
            vec![Value::Primitive(AttributeValue::string("b")), strings(&["a", "b"])],
        )
        .unwrap();
        assert_eq!(is_in, bool_value(true));
    }

    #[test]
    fn test_set_operations() {
        let a = strings(&["a", "b", "b", "c"]);
        let b = strings(&["b", "c", "d"]);
        let inter = apply(&format!("{XACML1}string-intersection"), vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(inter, strings(&["b", "c"]));
        let union = apply(&format!("{XACML1}string-union"), vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(union, strings(&["a", "b", "c", "d"]));
        let subset = apply(&format!("{XACML1}string-subset"), vec![strings(&["c", "b"]), a.clone()]).unwrap();
        assert_eq!(subset, bool_value(true));
        let equals = apply(
            &format!("{XACML1}string-set-equals"),
            vec![strings(&["a", "b", "c"]), a],
        )
        .unwrap();
        assert_eq!(equals, bool_value(true));
    }

    #[test]
    fn test_bag_constructor() {
        let id = format!("{XACML1}integer-bag");
        let v = apply(
            &id,
            vec![
                Value::Primitive(AttributeValue::Integer(1)),
                Value::Primitive(AttributeValue::Integer(2)),
            ],
        )
        .unwrap();
        assert_eq!(v.as_bag().unwrap().len(), 2);
        let empty = apply(&id, vec![]).unwrap();
        assert!(empty.as_bag().unwrap().is_empty());
    }
}
