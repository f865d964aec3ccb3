use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::error::{IndeterminateError, ValueError, ValueResult};
use crate::types::Datatype;
use crate::value::AttributeValue;

// ---------------------------------------------------------------------------
// Bag — immutable unordered multiset of same-typed values
// ---------------------------------------------------------------------------

/// Unordered multiset of values of one datatype.
///
/// An empty bag may carry the reason it is empty (the fault raised while
/// looking the attribute up), which is distinct from "legitimately no
/// values". Bags are built once per attribute lookup and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct Bag {
    datatype: Datatype,
    values: Vec<AttributeValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason_empty: Option<IndeterminateError>,
}

impl Bag {
    /// Build a bag, rejecting values of another datatype.
    pub fn new(datatype: Datatype, values: Vec<AttributeValue>) -> ValueResult<Self> {
        if let Some(bad) = values.iter().find(|v| v.datatype() != datatype) {
            return Err(ValueError::BagTypeMismatch {
                expected: datatype,
                actual: bad.datatype(),
            });
        }
        Ok(Self {
            datatype,
            values,
            reason_empty: None,
        })
    }

    pub fn empty(datatype: Datatype) -> Self {
        Self {
            datatype,
            values: Vec::new(),
            reason_empty: None,
        }
    }

    /// Empty bag recording why the lookup produced nothing.
    pub fn empty_because(datatype: Datatype, reason: IndeterminateError) -> Self {
        Self {
            datatype,
            values: Vec::new(),
            reason_empty: Some(reason),
        }
    }

    pub fn singleton(value: AttributeValue) -> Self {
        Self {
            datatype: value.datatype(),
            values: vec![value],
            reason_empty: None,
        }
    }

    pub fn datatype(&self) -> Datatype {
        self.datatype
    }

    pub fn values(&self) -> &[AttributeValue] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AttributeValue> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn reason_empty(&self) -> Option<&IndeterminateError> {
        self.reason_empty.as_ref()
    }

    pub fn contains(&self, value: &AttributeValue) -> bool {
        self.values.iter().any(|v| v == value)
    }

    /// The single value of a one-element bag.
    pub fn one_and_only(&self) -> Result<&AttributeValue, IndeterminateError> {
        match self.values.as_slice() {
            [single] => Ok(single),
            _ => Err(self.reason_empty.clone().unwrap_or_else(|| {
                IndeterminateError::processing(format!(
                    "expected a bag of exactly one {} value, got {}",
                    self.datatype,
                    self.values.len()
                ))
            })),
        }
    }

    /// Distinct values, keeping first-seen order.
    pub fn distinct(&self) -> Vec<&AttributeValue> {
        let mut seen = HashSet::with_capacity(self.values.len());
        self.values.iter().filter(|v| seen.insert(*v)).collect()
    }

    fn counts(&self) -> HashMap<&AttributeValue, usize> {
        let mut counts = HashMap::with_capacity(self.values.len());
        for v in &self.values {
            *counts.entry(v).or_insert(0) += 1;
        }
        counts
    }
}

/// Multiset equality: same datatype, same values with the same
/// multiplicities, in any order. The empty reason is not compared.
impl PartialEq for Bag {
    fn eq(&self, other: &Self) -> bool {
        self.datatype == other.datatype
            && self.values.len() == other.values.len()
            && self.counts() == other.counts()
    }
}

impl<'a> IntoIterator for &'a Bag {
    type Item = &'a AttributeValue;
    type IntoIter = std::slice::Iter<'a, AttributeValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bag_rejects_mixed_types() {
        let err = Bag::new(
            Datatype::String,
            vec![AttributeValue::string("a"), AttributeValue::Integer(1)],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValueError::BagTypeMismatch {
                expected: Datatype::String,
                actual: Datatype::Integer
            }
        );
    }

    #[test]
    fn test_bag_equality_is_unordered_multiset() {
        let a = Bag::new(
            Datatype::Integer,
            vec![AttributeValue::Integer(1), AttributeValue::Integer(2), AttributeValue::Integer(2)],
        )
        .unwrap();
        let b = Bag::new(
            Datatype::Integer,
            vec![AttributeValue::Integer(2), AttributeValue::Integer(1), AttributeValue::Integer(2)],
        )
        .unwrap();
        let c = Bag::new(
            Datatype::Integer,
            vec![AttributeValue::Integer(1), AttributeValue::Integer(1), AttributeValue::Integer(2)],
        )
        .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_empty_reason() {
        let reason = IndeterminateError::processing("provider down");
        let bag = Bag::empty_because(Datatype::String, reason.clone());
        assert!(bag.is_empty());
        assert_eq!(bag.reason_empty(), Some(&reason));
        assert_eq!(bag.one_and_only().unwrap_err(), reason);
        assert_eq!(bag, Bag::empty(Datatype::String));
    }

    #[test]
    fn test_one_and_only() {
        let bag = Bag::singleton(AttributeValue::Boolean(true));
        assert_eq!(bag.one_and_only().unwrap(), &AttributeValue::Boolean(true));
        let two = Bag::new(
            Datatype::Boolean,
            vec![AttributeValue::Boolean(true), AttributeValue::Boolean(false)],
        )
        .unwrap();
        assert!(two.one_and_only().is_err());
    }

    #[test]
    fn test_distinct() {
        let bag = Bag::new(
            Datatype::String,
            vec![AttributeValue::string("a"), AttributeValue::string("b"), AttributeValue::string("a")],
        )
        .unwrap();
        assert_eq!(bag.distinct().len(), 2);
    }

    #[test]
    fn test_distinct_keeps_first_seen_order_on_large_bags() {
        let values: Vec<AttributeValue> = (0..5_000).map(|i| AttributeValue::Integer(i % 1_000)).collect();
        let bag = Bag::new(Datatype::Integer, values).unwrap();
        let distinct = bag.distinct();
        assert_eq!(distinct.len(), 1_000);
        assert_eq!(distinct[0], &AttributeValue::Integer(0));
        assert_eq!(distinct[999], &AttributeValue::Integer(999));

        let nans = Bag::new(
            Datatype::Double,
            vec![AttributeValue::Double(f64::NAN), AttributeValue::Double(-f64::NAN)],
        )
        .unwrap();
        assert_eq!(nans.distinct().len(), 1);
    }
}
