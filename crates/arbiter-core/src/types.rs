use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::ValueError;

// ---------------------------------------------------------------------------
// Datatype — closed set of primitive attribute datatypes
// ---------------------------------------------------------------------------

/// Primitive datatype of an attribute value.
///
/// Exhaustive (no #[non_exhaustive]) so that every function family and
/// every lexical parser is forced to cover new datatypes at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Datatype {
    String,
    Boolean,
    Integer,
    Double,
    Date,
    Time,
    DateTime,
    DayTimeDuration,
    YearMonthDuration,
    AnyUri,
    HexBinary,
    Base64Binary,
    X500Name,
    Rfc822Name,
    IpAddress,
    DnsName,
    XPathExpression,
}

const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

impl Datatype {
    pub const ALL: [Datatype; 17] = [
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
        Datatype::HexBinary,
        Datatype::Base64Binary,
        Datatype::X500Name,
        Datatype::Rfc822Name,
        Datatype::IpAddress,
        Datatype::DnsName,
        Datatype::XPathExpression,
    ];

    /// The datatype identifier URI.
    pub fn uri(self) -> &'static str {
        match self {
            Datatype::String => "http://www.w3.org/2001/XMLSchema#string",
            Datatype::Boolean => "http://www.w3.org/2001/XMLSchema#boolean",
            Datatype::Integer => "http://www.w3.org/2001/XMLSchema#integer",
            Datatype::Double => "http://www.w3.org/2001/XMLSchema#double",
            Datatype::Date => "http://www.w3.org/2001/XMLSchema#date",
            Datatype::Time => "http://www.w3.org/2001/XMLSchema#time",
            Datatype::DateTime => "http://www.w3.org/2001/XMLSchema#dateTime",
            Datatype::DayTimeDuration => "http://www.w3.org/2001/XMLSchema#dayTimeDuration",
            Datatype::YearMonthDuration => "http://www.w3.org/2001/XMLSchema#yearMonthDuration",
            Datatype::AnyUri => "http://www.w3.org/2001/XMLSchema#anyURI",
            Datatype::HexBinary => "http://www.w3.org/2001/XMLSchema#hexBinary",
            Datatype::Base64Binary => "http://www.w3.org/2001/XMLSchema#base64Binary",
            Datatype::X500Name => "urn:oasis:names:tc:xacml:1.0:data-type:x500Name",
            Datatype::Rfc822Name => "urn:oasis:names:tc:xacml:1.0:data-type:rfc822Name",
            Datatype::IpAddress => "urn:oasis:names:tc:xacml:2.0:data-type:ipAddress",
            Datatype::DnsName => "urn:oasis:names:tc:xacml:2.0:data-type:dnsName",
            Datatype::XPathExpression => "urn:oasis:names:tc:xacml:3.0:data-type:xpathExpression",
        }
    }

    /// Short name used to build standard function identifiers
    /// (e.g. `integer` in `integer-equal`).
    pub fn short_name(self) -> &'static str {
        match self {
            Datatype::String => "string",
            Datatype::Boolean => "boolean",
            Datatype::Integer => "integer",
            Datatype::Double => "double",
            Datatype::Date => "date",
            Datatype::Time => "time",
            Datatype::DateTime => "dateTime",
            Datatype::DayTimeDuration => "dayTimeDuration",
            Datatype::YearMonthDuration => "yearMonthDuration",
            Datatype::AnyUri => "anyURI",
            Datatype::HexBinary => "hexBinary",
            Datatype::Base64Binary => "base64Binary",
            Datatype::X500Name => "x500Name",
            Datatype::Rfc822Name => "rfc822Name",
            Datatype::IpAddress => "ipAddress",
            Datatype::DnsName => "dnsName",
            Datatype::XPathExpression => "xpathExpression",
        }
    }

    pub fn from_uri(uri: &str) -> Option<Self> {
        if let Some(local) = uri.strip_prefix(XSD) {
            return Self::ALL
                .into_iter()
                .find(|dt| dt.uri().starts_with(XSD) && dt.short_name() == local);
        }
        Self::ALL.into_iter().find(|dt| dt.uri() == uri)
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

impl std::str::FromStr for Datatype {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Datatype::from_uri(s).ok_or_else(|| ValueError::UnknownDatatype(s.to_string()))
    }
}

impl Serialize for Datatype {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.uri())
    }
}

impl<'de> Deserialize<'de> for Datatype {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let uri = String::deserialize(deserializer)?;
        uri.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// AttributeFqn — (category, issuer, attribute-id) global attribute key
// ---------------------------------------------------------------------------

/// Fully-qualified attribute name.
///
/// Structural equality and hashing; used as the key of the per-request
/// attribute cache and of the attribute provider registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AttributeFqn {
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    pub id: String,
}

impl AttributeFqn {
    pub fn new(category: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            issuer: None,
            id: id.into(),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// The same attribute without issuer.
    pub fn without_issuer(&self) -> Self {
        Self {
            category: self.category.clone(),
            issuer: None,
            id: self.id.clone(),
        }
    }
}

impl fmt::Display for AttributeFqn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.issuer {
            Some(issuer) => write!(f, "{}#{} (issuer={})", self.category, self.id, issuer),
            None => write!(f, "{}#{}", self.category, self.id),
        }
    }
}

/// Standard attribute category identifiers.
pub mod category {
    pub const ACCESS_SUBJECT: &str = "urn:oasis:names:tc:xacml:1.0:subject-category:access-subject";
    pub const RECIPIENT_SUBJECT: &str =
        "urn:oasis:names:tc:xacml:1.0:subject-category:recipient-subject";
    pub const RESOURCE: &str = "urn:oasis:names:tc:xacml:3.0:attribute-category:resource";
    pub const ACTION: &str = "urn:oasis:names:tc:xacml:3.0:attribute-category:action";
    pub const ENVIRONMENT: &str = "urn:oasis:names:tc:xacml:3.0:attribute-category:environment";
}

/// Standard attribute identifiers.
pub mod attribute_id {
    pub const SUBJECT_ID: &str = "urn:oasis:names:tc:xacml:1.0:subject:subject-id";
    pub const RESOURCE_ID: &str = "urn:oasis:names:tc:xacml:1.0:resource:resource-id";
    pub const ACTION_ID: &str = "urn:oasis:names:tc:xacml:1.0:action:action-id";
    pub const CURRENT_TIME: &str = "urn:oasis:names:tc:xacml:1.0:environment:current-time";
    pub const CURRENT_DATE: &str = "urn:oasis:names:tc:xacml:1.0:environment:current-date";
    pub const CURRENT_DATETIME: &str = "urn:oasis:names:tc:xacml:1.0:environment:current-dateTime";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_uri_roundtrip() {
        for dt in Datatype::ALL {
            assert_eq!(Datatype::from_uri(dt.uri()), Some(dt));
        }
        assert_eq!(Datatype::from_uri("urn:example:unknown"), None);
    }

    #[test]
    fn test_datatype_serde_uses_uri() {
        let json = serde_json::to_string(&Datatype::DayTimeDuration).unwrap();
        assert_eq!(json, "\"http://www.w3.org/2001/XMLSchema#dayTimeDuration\"");
        let back: Datatype = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Datatype::DayTimeDuration);
        assert!(serde_json::from_str::<Datatype>("\"nope\"").is_err());
    }

    #[test]
    fn test_fqn_issuer_handling() {
        let fqn = AttributeFqn::new(category::RESOURCE, attribute_id::RESOURCE_ID).with_issuer("me");
        assert_eq!(fqn.issuer.as_deref(), Some("me"));
        let bare = fqn.without_issuer();
        assert_eq!(bare.issuer, None);
        assert_ne!(fqn, bare);
        assert!(fqn.to_string().contains("issuer=me"));
    }
}
