use std::sync::Arc;

use arbiter_core::{AttributeValue, Datatype, IndeterminateError};

use super::{bool_value, integer, simple, text, Function, Signature, XACML1, XACML2, XACML3};
use crate::expression::{Value, ValueType};

fn string_value(s: impl Into<String>) -> Value {
    Value::Primitive(AttributeValue::String(s.into()))
}

/// Characters `[begin, end)` of `s`; `end == -1` means through the end.
fn substring(s: &str, begin: i64, end: i64) -> Result<String, IndeterminateError> {
    let len = s.chars().count() as i64;
    let end = if end == -1 { len } else { end };
    if begin < 0 || begin > len || end < begin || end > len {
        return Err(IndeterminateError::processing(format!(
            "substring range [{}, {}) out of bounds for length {}",
            begin, end, len
        )));
    }
    Ok(s.chars()
        .skip(begin as usize)
        .take((end - begin) as usize)
        .collect())
}

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    let uri = ValueType::Primitive(Datatype::AnyUri);
    let mut functions = vec![
        simple(
            format!("{XACML1}string-normalize-space"),
            Signature::new(ValueType::STRING, vec![ValueType::STRING]),
            |args| Ok(string_value(text(args, 0)?.trim())),
        ),
        simple(
            format!("{XACML1}string-normalize-to-lower-case"),
            Signature::new(ValueType::STRING, vec![ValueType::STRING]),
            |args| Ok(string_value(text(args, 0)?.to_lowercase())),
        ),
        simple(
            format!("{XACML2}string-concatenate"),
            Signature::new(ValueType::STRING, vec![ValueType::STRING, ValueType::STRING])
                .variadic(ValueType::STRING),
            |args| {
                let mut out = String::new();
                for i in 0..args.len() {
                    out.push_str(text(args, i)?);
                }
                Ok(string_value(out))
            },
        ),
        simple(
            format!("{XACML3}string-substring"),
            Signature::new(
                ValueType::STRING,
                vec![ValueType::STRING, ValueType::INTEGER, ValueType::INTEGER],
            ),
            |args| Ok(string_value(substring(text(args, 0)?, integer(args, 1)?, integer(args, 2)?)?)),
        ),
        simple(
            format!("{XACML3}anyURI-substring"),
            Signature::new(ValueType::STRING, vec![uri, ValueType::INTEGER, ValueType::INTEGER]),
            |args| Ok(string_value(substring(text(args, 0)?, integer(args, 1)?, integer(args, 2)?)?)),
        ),
    ];

    // (name, test) where test(needle, haystack); the needle is always a string
    let predicates: [(&str, fn(&str, &str) -> bool); 3] = [
        ("starts-with", |needle, hay| hay.starts_with(needle)),
        ("ends-with", |needle, hay| hay.ends_with(needle)),
        ("contains", |needle, hay| hay.contains(needle)),
    ];
    for (name, test) in predicates {
        for (prefix, haystack) in [("string", ValueType::STRING), ("anyURI", uri)] {
            functions.push(simple(
                format!("{XACML3}{}-{}", prefix, name),
                Signature::new(ValueType::BOOLEAN, vec![ValueType::STRING, haystack]),
                move |args| Ok(bool_value(test(text(args, 0)?, text(args, 1)?))),
            ));
        }
    }
    functions
}
