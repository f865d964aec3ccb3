use std::sync::Arc;

use arbiter_core::{Datatype, IndeterminateError};
use regex::Regex;

use super::{bool_value, primitive, simple, text, Function, Signature, XACML1, XACML2};
use crate::expression::ValueType;

/// Schema regular expressions match the whole input.
fn regexp_match(pattern: &str, input: &str) -> Result<bool, IndeterminateError> {
    let anchored = format!("^(?:{})$", pattern);
    let regex = Regex::new(&anchored).map_err(|e| {
        IndeterminateError::processing(format!("invalid regular expression '{}': {}", pattern, e))
    })?;
    Ok(regex.is_match(input))
}

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    let mut functions = vec![simple(
        format!("{XACML1}string-regexp-match"),
        Signature::new(ValueType::BOOLEAN, vec![ValueType::STRING, ValueType::STRING]),
        |args| Ok(bool_value(regexp_match(text(args, 0)?, text(args, 1)?)?)),
    )];

    // matched against the canonical lexical form of the value
    for dt in [
        Datatype::AnyUri,
        Datatype::IpAddress,
        Datatype::DnsName,
        Datatype::Rfc822Name,
        Datatype::X500Name,
    ] {
        functions.push(simple(
            format!("{XACML2}{}-regexp-match", dt.short_name()),
            Signature::new(ValueType::BOOLEAN, vec![ValueType::STRING, ValueType::Primitive(dt)]),
            |args| {
                let input = primitive(args, 1)?.to_string();
                Ok(bool_value(regexp_match(text(args, 0)?, &input)?))
            },
        ));
    }
    functions
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{call, call_bool};
    use super::*;
    use arbiter_core::AttributeValue;

    #[test]
    fn test_string_regexp_is_anchored() {
        let id = format!("{XACML1}string-regexp-match");
        let s = AttributeValue::string;
        assert!(call_bool(&id, vec![s("ab+c"), s("abbbc")]));
        assert!(!call_bool(&id, vec![s("b+"), s("abbbc")]));
        assert!(call_bool(&id, vec![s(".*b+.*"), s("abbbc")]));
    }

    #[test]
    fn test_invalid_pattern_is_processing_error() {
        let id = format!("{XACML1}string-regexp-match");
        let err = call(&id, vec![AttributeValue::string("(["), AttributeValue::string("x")]).unwrap_err();
        assert!(err.message.contains("invalid regular expression"));
    }

    #[test]
    fn test_rfc822_regexp() {
        let id = format!("{XACML2}rfc822Name-regexp-match");
        let name = AttributeValue::parse(Datatype::Rfc822Name, "alice@Example.COM").unwrap();
        assert!(call_bool(&id, vec![AttributeValue::string(".*@example\\.com"), name]));
    }

    #[test]
    fn test_ip_address_regexp() {
        let id = format!("{XACML2}ipAddress-regexp-match");
        let ip = AttributeValue::parse(Datatype::IpAddress, "10.0.0.7").unwrap();
        assert!(call_bool(&id, vec![AttributeValue::string("10\\..*"), ip]));
    }
}
