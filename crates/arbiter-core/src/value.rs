use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{ValueError, ValueResult};
use crate::network::{DnsNameValue, IpAddressValue, Rfc822Name, X500Name, XPathExpression};
use crate::temporal::{DayTimeDuration, XsDate, XsDateTime, XsTime, YearMonthDuration};
use crate::types::Datatype;

// ---------------------------------------------------------------------------
// AttributeValue — immutable typed scalar
// ---------------------------------------------------------------------------

/// A typed attribute value. Equality and hashing are value-based.
///
/// Integers are 64-bit; arithmetic that leaves that range is a
/// processing error rather than a silent wrap.
#[derive(Debug, Clone)]
pub enum AttributeValue {
    String(String),
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Date(XsDate),
    Time(XsTime),
    DateTime(XsDateTime),
    DayTimeDuration(DayTimeDuration),
    YearMonthDuration(YearMonthDuration),
    AnyUri(String),
    HexBinary(Vec<u8>),
    Base64Binary(Vec<u8>),
    X500Name(X500Name),
    Rfc822Name(Rfc822Name),
    IpAddress(IpAddressValue),
    DnsName(DnsNameValue),
    XPathExpression(XPathExpression),
}

impl AttributeValue {
    pub fn datatype(&self) -> Datatype {
        match self {
            AttributeValue::String(_) => Datatype::String,
            AttributeValue::Boolean(_) => Datatype::Boolean,
            AttributeValue::Integer(_) => Datatype::Integer,
            AttributeValue::Double(_) => Datatype::Double,
            AttributeValue::Date(_) => Datatype::Date,
            AttributeValue::Time(_) => Datatype::Time,
            AttributeValue::DateTime(_) => Datatype::DateTime,
            AttributeValue::DayTimeDuration(_) => Datatype::DayTimeDuration,
            AttributeValue::YearMonthDuration(_) => Datatype::YearMonthDuration,
            AttributeValue::AnyUri(_) => Datatype::AnyUri,
            AttributeValue::HexBinary(_) => Datatype::HexBinary,
            AttributeValue::Base64Binary(_) => Datatype::Base64Binary,
            AttributeValue::X500Name(_) => Datatype::X500Name,
            AttributeValue::Rfc822Name(_) => Datatype::Rfc822Name,
            AttributeValue::IpAddress(_) => Datatype::IpAddress,
            AttributeValue::DnsName(_) => Datatype::DnsName,
            AttributeValue::XPathExpression(_) => Datatype::XPathExpression,
        }
    }

    /// Parse a value from its lexical form.
    ///
    /// xpathExpression values parsed this way carry an empty category; use
    /// [`AttributeValue::parse_xpath`] when the category is known.
    pub fn parse(datatype: Datatype, lexical: &str) -> ValueResult<Self> {
        let invalid = |reason: String| ValueError::invalid(datatype, lexical, reason);
        Ok(match datatype {
            Datatype::String => AttributeValue::String(lexical.to_string()),
            Datatype::Boolean => AttributeValue::Boolean(match lexical.trim() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(invalid("expected true, false, 1 or 0".into())),
            }),
            Datatype::Integer => {
                let trimmed = lexical.trim();
                let digits = trimmed.strip_prefix('+').unwrap_or(trimmed);
                AttributeValue::Integer(digits.parse().map_err(|e| invalid(format!("{}", e)))?)
            }
            Datatype::Double => AttributeValue::Double(parse_double(lexical.trim()).ok_or_else(|| {
                invalid("expected a decimal, scientific, INF, -INF or NaN literal".into())
            })?),
            Datatype::Date => AttributeValue::Date(XsDate::parse(lexical.trim())?),
            Datatype::Time => AttributeValue::Time(XsTime::parse(lexical.trim())?),
            Datatype::DateTime => AttributeValue::DateTime(XsDateTime::parse(lexical.trim())?),
            Datatype::DayTimeDuration => {
                AttributeValue::DayTimeDuration(DayTimeDuration::parse(lexical.trim())?)
            }
            Datatype::YearMonthDuration => {
                AttributeValue::YearMonthDuration(YearMonthDuration::parse(lexical.trim())?)
            }
            Datatype::AnyUri => {
                let uri = lexical.trim();
                if uri.chars().any(char::is_whitespace) {
                    return Err(invalid("URI must not contain whitespace".into()));
                }
                AttributeValue::AnyUri(uri.to_string())
            }
            Datatype::HexBinary => AttributeValue::HexBinary(
                hex::decode(lexical.trim()).map_err(|e| invalid(e.to_string()))?,
            ),
            Datatype::Base64Binary => AttributeValue::Base64Binary(
                base64::engine::general_purpose::STANDARD
                    .decode(lexical.trim())
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            Datatype::X500Name => AttributeValue::X500Name(X500Name::parse(lexical)?),
            Datatype::Rfc822Name => AttributeValue::Rfc822Name(Rfc822Name::parse(lexical.trim())?),
            Datatype::IpAddress => AttributeValue::IpAddress(IpAddressValue::parse(lexical.trim())?),
            Datatype::DnsName => AttributeValue::DnsName(DnsNameValue::parse(lexical.trim())?),
            Datatype::XPathExpression => {
                AttributeValue::XPathExpression(XPathExpression::new(lexical, ""))
            }
        })
    }

    pub fn parse_xpath(path: &str, category: &str) -> Self {
        AttributeValue::XPathExpression(XPathExpression::new(path, category))
    }

    pub fn string(s: impl Into<String>) -> Self {
        AttributeValue::String(s.into())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            AttributeValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Text of string and anyURI values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) | AttributeValue::AnyUri(s) => Some(s),
            _ => None,
        }
    }
}

fn parse_double(lexical: &str) -> Option<f64> {
    match lexical {
        "INF" | "+INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ if lexical.is_empty() || lexical.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => None,
        _ => lexical.parse().ok(),
    }
}

fn format_double(f: &mut fmt::Formatter<'_>, d: f64) -> fmt::Result {
    if d.is_nan() {
        write!(f, "NaN")
    } else if d == f64::INFINITY {
        write!(f, "INF")
    } else if d == f64::NEG_INFINITY {
        write!(f, "-INF")
    } else {
        write!(f, "{}", d)
    }
}

impl PartialEq for AttributeValue {
    fn eq(&self, other: &Self) -> bool {
        use AttributeValue as V;
        match (self, other) {
            (V::String(a), V::String(b)) | (V::AnyUri(a), V::AnyUri(b)) => a == b,
            (V::Boolean(a), V::Boolean(b)) => a == b,
            (V::Integer(a), V::Integer(b)) => a == b,
            (V::Double(a), V::Double(b)) => a == b || (a.is_nan() && b.is_nan()),
            (V::Date(a), V::Date(b)) => a == b,
            (V::Time(a), V::Time(b)) => a == b,
            (V::DateTime(a), V::DateTime(b)) => a == b,
            (V::DayTimeDuration(a), V::DayTimeDuration(b)) => a == b,
            (V::YearMonthDuration(a), V::YearMonthDuration(b)) => a == b,
            (V::HexBinary(a), V::HexBinary(b)) | (V::Base64Binary(a), V::Base64Binary(b)) => a == b,
            (V::X500Name(a), V::X500Name(b)) => a == b,
            (V::Rfc822Name(a), V::Rfc822Name(b)) => a == b,
            (V::IpAddress(a), V::IpAddress(b)) => a == b,
            (V::DnsName(a), V::DnsName(b)) => a == b,
            (V::XPathExpression(a), V::XPathExpression(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for AttributeValue {}

impl Hash for AttributeValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.datatype().hash(state);
        match self {
            AttributeValue::String(s) | AttributeValue::AnyUri(s) => s.hash(state),
            AttributeValue::Boolean(b) => b.hash(state),
            AttributeValue::Integer(i) => i.hash(state),
            AttributeValue::Double(d) => {
                // 0.0 and -0.0 compare equal, as do all NaNs; each group hashes alike.
                let normalized = if *d == 0.0 {
                    0.0_f64
                } else if d.is_nan() {
                    f64::NAN
                } else {
                    *d
                };
                normalized.to_bits().hash(state)
            }
            AttributeValue::Date(d) => d.hash(state),
            AttributeValue::Time(t) => t.hash(state),
            AttributeValue::DateTime(dt) => dt.hash(state),
            AttributeValue::DayTimeDuration(d) => d.hash(state),
            AttributeValue::YearMonthDuration(d) => d.hash(state),
            AttributeValue::HexBinary(b) | AttributeValue::Base64Binary(b) => b.hash(state),
            AttributeValue::X500Name(n) => n.hash(state),
            AttributeValue::Rfc822Name(n) => n.hash(state),
            AttributeValue::IpAddress(a) => a.hash(state),
            AttributeValue::DnsName(d) => d.hash(state),
            AttributeValue::XPathExpression(x) => x.hash(state),
        }
    }
}

/// Canonical lexical form.
impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) | AttributeValue::AnyUri(s) => write!(f, "{}", s),
            AttributeValue::Boolean(b) => write!(f, "{}", b),
            AttributeValue::Integer(i) => write!(f, "{}", i),
            AttributeValue::Double(d) => format_double(f, *d),
            AttributeValue::Date(d) => write!(f, "{}", d),
            AttributeValue::Time(t) => write!(f, "{}", t),
            AttributeValue::DateTime(dt) => write!(f, "{}", dt),
            AttributeValue::DayTimeDuration(d) => write!(f, "{}", d),
            AttributeValue::YearMonthDuration(d) => write!(f, "{}", d),
            AttributeValue::HexBinary(b) => write!(f, "{}", hex::encode_upper(b)),
            AttributeValue::Base64Binary(b) => {
                write!(f, "{}", base64::engine::general_purpose::STANDARD.encode(b))
            }
            AttributeValue::X500Name(n) => write!(f, "{}", n),
            AttributeValue::Rfc822Name(n) => write!(f, "{}", n),
            AttributeValue::IpAddress(a) => write!(f, "{}", a),
            AttributeValue::DnsName(d) => write!(f, "{}", d),
            AttributeValue::XPathExpression(x) => write!(f, "{}", x),
        }
    }
}

// ---------------------------------------------------------------------------
// Serde — `{ "datatype": <uri>, "value": <lexical> }`
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LexicalValue {
    datatype: Datatype,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    xpath_category: Option<String>,
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let xpath_category = match self {
            AttributeValue::XPathExpression(x) => Some(x.category.clone()),
            _ => None,
        };
        LexicalValue {
            datatype: self.datatype(),
            value: self.to_string(),
            xpath_category,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let lexical = LexicalValue::deserialize(deserializer)?;
        match (lexical.datatype, lexical.xpath_category) {
            (Datatype::XPathExpression, Some(category)) => {
                Ok(AttributeValue::parse_xpath(&lexical.value, &category))
            }
            (datatype, _) => {
                AttributeValue::parse(datatype, &lexical.value).map_err(serde::de::Error::custom)
            }
        }
    }
}
