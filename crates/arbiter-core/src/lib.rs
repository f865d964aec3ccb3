//! Arbiter Core
//!
//! Attribute value model shared by the policy engine: primitive datatypes,
//! typed values with lexical parsing, bags, fully-qualified attribute names,
//! and the runtime status/fault types.

pub mod bag;
pub mod error;
pub mod network;
pub mod temporal;
pub mod types;
pub mod value;

pub use bag::Bag;
pub use error::{IndeterminateError, MissingAttributeDetail, StatusCode, ValueError, ValueResult};
pub use network::{DnsNameValue, IpAddressValue, PortRange, Rfc822Name, X500Name, XPathExpression};
pub use temporal::{DayTimeDuration, XsDate, XsDateTime, XsTime, YearMonthDuration};
pub use types::{attribute_id, category, AttributeFqn, Datatype};
pub use value::AttributeValue;
