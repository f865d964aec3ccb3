//! Name and network address values: rfc822Name, x500Name, ipAddress, dnsName.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::IpAddr;

use crate::error::{ValueError, ValueResult};
use crate::types::Datatype;

// ---------------------------------------------------------------------------
// Rfc822Name — local part is case-sensitive, domain is not
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Rfc822Name {
    pub local_part: String,
    /// Lower-cased on parse.
    pub domain: String,
}

impl Rfc822Name {
    pub fn parse(lexical: &str) -> ValueResult<Self> {
        let (local, domain) = lexical
            .split_once('@')
            .ok_or_else(|| ValueError::invalid(Datatype::Rfc822Name, lexical, "missing '@'"))?;
        if local.is_empty() || domain.is_empty() || domain.contains('@') {
            return Err(ValueError::invalid(
                Datatype::Rfc822Name,
                lexical,
                "expected exactly one non-empty local part and domain",
            ));
        }
        Ok(Self {
            local_part: local.to_string(),
            domain: domain.to_ascii_lowercase(),
        })
    }

    /// `rfc822Name-match` semantics. The pattern is either a full mailbox
    /// (`local@domain`), a domain (`example.com`, exact), or a domain suffix
    /// (`.example.com`, any sub-domain).
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        if let Some((local, domain)) = pattern.split_once('@') {
            return local == self.local_part && domain.eq_ignore_ascii_case(&self.domain);
        }
        let pattern = pattern.to_ascii_lowercase();
        if pattern.starts_with('.') {
            self.domain.ends_with(&pattern)
        } else {
            self.domain == pattern
        }
    }
}

impl fmt::Display for Rfc822Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local_part, self.domain)
    }
}

// ---------------------------------------------------------------------------
// X500Name — distinguished name as a sequence of RDNs
// ---------------------------------------------------------------------------

/// Distinguished name. Whitespace around separators is dropped and
/// attribute type names are lower-cased; equality ignores ASCII case.
#[derive(Debug, Clone)]
pub struct X500Name {
    rdns: Vec<String>,
}

impl X500Name {
    pub fn parse(lexical: &str) -> ValueResult<Self> {
        let mut rdns = Vec::new();
        let mut current = String::new();
        let mut escaped = false;
        for c in lexical.chars() {
            match c {
                _ if escaped => {
                    current.push(c);
                    escaped = false;
                }
                '\\' => {
                    current.push(c);
                    escaped = true;
                }
                ',' => rdns.push(std::mem::take(&mut current)),
                _ => current.push(c),
            }
        }
        rdns.push(current);

        let rdns = rdns
            .into_iter()
            .map(|rdn| {
                let (attr_type, value) = rdn.split_once('=').ok_or_else(|| {
                    ValueError::invalid(Datatype::X500Name, lexical, "RDN without '='")
                })?;
                let attr_type = attr_type.trim();
                if attr_type.is_empty() {
                    return Err(ValueError::invalid(Datatype::X500Name, lexical, "empty RDN type"));
                }
                Ok(format!("{}={}", attr_type.to_ascii_lowercase(), value.trim()))
            })
            .collect::<ValueResult<Vec<_>>>()?;
        Ok(Self { rdns })
    }

    pub fn rdns(&self) -> &[String] {
        &self.rdns
    }

    /// `x500Name-match`: true if `self` matches the terminal RDN sequence of `other`.
    pub fn is_suffix_of(&self, other: &X500Name) -> bool {
        if self.rdns.len() > other.rdns.len() {
            return false;
        }
        let offset = other.rdns.len() - self.rdns.len();
        self.rdns
            .iter()
            .zip(&other.rdns[offset..])
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl PartialEq for X500Name {
    fn eq(&self, other: &Self) -> bool {
        self.rdns.len() == other.rdns.len() && self.is_suffix_of(other)
    }
}

impl Eq for X500Name {}

impl Hash for X500Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for rdn in &self.rdns {
            rdn.to_ascii_lowercase().hash(state);
        }
    }
}

impl fmt::Display for X500Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rdns.join(","))
    }
}

// ---------------------------------------------------------------------------
// PortRange
// ---------------------------------------------------------------------------

/// Inclusive port range; `None` bounds are open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PortRange {
    pub lower: Option<u16>,
    pub upper: Option<u16>,
}

impl PortRange {
    fn parse(datatype: Datatype, lexical: &str, range: &str) -> ValueResult<Self> {
        let port = |s: &str| -> ValueResult<Option<u16>> {
            if s.is_empty() {
                return Ok(None);
            }
            s.parse()
                .map(Some)
                .map_err(|_| ValueError::invalid(datatype, lexical, "invalid port"))
        };
        let parsed = match range.split_once('-') {
            Some((lo, hi)) => Self {
                lower: port(lo)?,
                upper: port(hi)?,
            },
            None => {
                let single = port(range)?;
                Self {
                    lower: single,
                    upper: single,
                }
            }
        };
        if let (Some(lo), Some(hi)) = (parsed.lower, parsed.upper) {
            if lo > hi {
                return Err(ValueError::invalid(datatype, lexical, "port range is inverted"));
            }
        }
        Ok(parsed)
    }

    pub fn is_unbounded(&self) -> bool {
        self.lower.is_none() && self.upper.is_none()
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.lower, self.upper) {
            (Some(lo), Some(hi)) if lo == hi => write!(f, "{}", lo),
            (lo, hi) => {
                if let Some(lo) = lo {
                    write!(f, "{}", lo)?;
                }
                write!(f, "-")?;
                if let Some(hi) = hi {
                    write!(f, "{}", hi)?;
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// IpAddressValue — address, optional mask, optional port range
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IpAddressValue {
    pub address: IpAddr,
    pub mask: Option<IpAddr>,
    pub ports: PortRange,
}

impl IpAddressValue {
    /// Parses `a.b.c.d[/mask][:ports]` or `[v6][/[mask]][:ports]`.
    pub fn parse(lexical: &str) -> ValueResult<Self> {
        let dt = Datatype::IpAddress;
        let invalid = |reason: &str| ValueError::invalid(dt, lexical, reason);
        let addr = |s: &str| -> ValueResult<IpAddr> { s.parse().map_err(|_| invalid("invalid address")) };

        if let Some(rest) = lexical.strip_prefix('[') {
            let (address, rest) = rest.split_once(']').ok_or_else(|| invalid("unterminated '['"))?;
            let address = addr(address)?;
            if !address.is_ipv6() {
                return Err(invalid("bracketed address must be IPv6"));
            }
            let (mask, rest) = match rest.strip_prefix("/[") {
                Some(masked) => {
                    let (mask, rest) = masked.split_once(']').ok_or_else(|| invalid("unterminated mask"))?;
                    (Some(addr(mask)?), rest)
                }
                None => (None, rest),
            };
            let ports = match rest.strip_prefix(':') {
                Some(range) => PortRange::parse(dt, lexical, range)?,
                None if rest.is_empty() => PortRange::default(),
                None => return Err(invalid("unexpected trailing characters")),
            };
            return Ok(Self {
                address,
                mask,
                ports,
            });
        }

        let (head, ports) = match lexical.split_once(':') {
            Some((head, range)) => (head, PortRange::parse(dt, lexical, range)?),
            None => (lexical, PortRange::default()),
        };
        let (address, mask) = match head.split_once('/') {
            Some((a, m)) => (addr(a)?, Some(addr(m)?)),
            None => (addr(head)?, None),
        };
        if !address.is_ipv4() || mask.is_some_and(|m| !m.is_ipv4()) {
            return Err(invalid("IPv6 addresses must be bracketed"));
        }
        Ok(Self {
            address,
            mask,
            ports,
        })
    }
}

impl fmt::Display for IpAddressValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.address {
            IpAddr::V4(a) => {
                write!(f, "{}", a)?;
                if let Some(mask) = self.mask {
                    write!(f, "/{}", mask)?;
                }
            }
            IpAddr::V6(a) => {
                write!(f, "[{}]", a)?;
                if let Some(mask) = self.mask {
                    write!(f, "/[{}]", mask)?;
                }
            }
        }
        if !self.ports.is_unbounded() {
            write!(f, ":{}", self.ports)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// DnsNameValue — hostname (optionally `*.` wildcard) and port range
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DnsNameValue {
    /// Lower-cased on parse.
    pub hostname: String,
    pub ports: PortRange,
}

impl DnsNameValue {
    pub fn parse(lexical: &str) -> ValueResult<Self> {
        let dt = Datatype::DnsName;
        let (host, ports) = match lexical.split_once(':') {
            Some((host, range)) => (host, PortRange::parse(dt, lexical, range)?),
            None => (lexical, PortRange::default()),
        };
        let labels = host.strip_prefix("*.").unwrap_or(host);
        let valid = !labels.is_empty()
            && labels.split('.').all(|label| {
                !label.is_empty()
                    && !label.starts_with('-')
                    && !label.ends_with('-')
                    && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
            });
        if !valid {
            return Err(ValueError::invalid(dt, lexical, "invalid hostname"));
        }
        Ok(Self {
            hostname: host.to_ascii_lowercase(),
            ports,
        })
    }
}

impl fmt::Display for DnsNameValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hostname)?;
        if !self.ports.is_unbounded() {
            write!(f, ":{}", self.ports)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// XPathExpression — path plus the category whose Content it addresses
// ---------------------------------------------------------------------------

/// Path expression evaluated against the Content of `category`.
///
/// Content is JSON in this engine, so paths are JSON Pointers (RFC 6901).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct XPathExpression {
    pub path: String,
    pub category: String,
}

impl XPathExpression {
    pub fn new(path: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            category: category.into(),
        }
    }
}

impl fmt::Display for XPathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)
    }
}
