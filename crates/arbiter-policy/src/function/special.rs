use std::sync::Arc;

use arbiter_core::{AttributeValue, Datatype, IndeterminateError};

use super::{bool_value, primitive, simple, text, Function, Signature, XACML1};
use crate::expression::ValueType;

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    let x500 = ValueType::Primitive(Datatype::X500Name);
    let rfc822 = ValueType::Primitive(Datatype::Rfc822Name);
    vec![
        // true if the first name is a terminal RDN sequence of the second
        simple(
            format!("{XACML1}x500Name-match"),
            Signature::new(ValueType::BOOLEAN, vec![x500, x500]),
            |args| match (primitive(args, 0)?, primitive(args, 1)?) {
                (AttributeValue::X500Name(a), AttributeValue::X500Name(b)) => Ok(bool_value(a.is_suffix_of(b))),
                _ => Err(IndeterminateError::processing("x500Name-match expects two x500Name values")),
            },
        ),
        simple(
            format!("{XACML1}rfc822Name-match"),
            Signature::new(ValueType::BOOLEAN, vec![ValueType::STRING, rfc822]),
            |args| match primitive(args, 1)? {
                AttributeValue::Rfc822Name(name) => Ok(bool_value(name.matches_pattern(text(args, 0)?))),
                _ => Err(IndeterminateError::processing("rfc822Name-match expects an rfc822Name")),
            },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::super::test_support::call_bool;
    use super::*;

    #[test]
    fn test_x500_name_match() {
        let id = format!("{XACML1}x500Name-match");
        let org = AttributeValue::parse(Datatype::X500Name, "O=Acme,C=US").unwrap();
        let person = AttributeValue::parse(Datatype::X500Name, "CN=Alice,O=Acme,C=US").unwrap();
        assert!(call_bool(&id, vec![org.clone(), person.clone()]));
        assert!(!call_bool(&id, vec![person, org]));
    }

    #[test]
    fn test_rfc822_name_match() {
        let id = format!("{XACML1}rfc822Name-match");
        let name = AttributeValue::parse(Datatype::Rfc822Name, "Anderson@sun.com").unwrap();
        let s = AttributeValue::string;
        assert!(call_bool(&id, vec![s("sun.com"), name.clone()]));
        assert!(call_bool(&id, vec![s("Anderson@SUN.COM"), name.clone()]));
        assert!(!call_bool(&id, vec![s("anderson@sun.com"), name.clone()]));
        assert!(call_bool(&id, vec![s(".com"), name]));
    }
}
