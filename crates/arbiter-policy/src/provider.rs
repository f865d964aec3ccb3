use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arbiter_core::{AttributeFqn, Bag, Datatype, IndeterminateError};

use crate::context::EvaluationContext;
use crate::error::{PolicyError, PolicyResult};

// ---------------------------------------------------------------------------
// AttributeProvider trait — external attribute sources
// ---------------------------------------------------------------------------

/// Supplies attributes missing from the request.
///
/// A provider is consulted at most once per attribute per request; the
/// context caches whatever it returns, including failures. Providers may
/// look up other attributes through the context they are given.
pub trait AttributeProvider: Send + Sync {
    /// Attributes this provider can supply.
    fn provided_attributes(&self) -> Vec<AttributeFqn>;

    fn find(
        &self,
        attribute: &AttributeFqn,
        datatype: Datatype,
        ctx: &EvaluationContext,
    ) -> Result<Bag, IndeterminateError>;
}

/// Providers indexed by the attributes they declare.
#[derive(Default, Clone)]
pub struct AttributeProviderRegistry {
    by_attribute: HashMap<AttributeFqn, Arc<dyn AttributeProvider>>,
}

impl AttributeProviderRegistry {
    /// Build the registry. Two providers declaring the same attribute is a
    /// configuration error.
    pub fn new(providers: Vec<Arc<dyn AttributeProvider>>) -> PolicyResult<Self> {
        let mut by_attribute = HashMap::new();
        for provider in providers {
            for fqn in provider.provided_attributes() {
                if by_attribute.contains_key(&fqn) {
                    return Err(PolicyError::DuplicateAttributeProvider(fqn));
                }
                by_attribute.insert(fqn, Arc::clone(&provider));
            }
        }
        Ok(Self { by_attribute })
    }

    pub fn is_empty(&self) -> bool {
        self.by_attribute.is_empty()
    }

    /// Provider for `fqn`. Unless `strict_issuer` is set, a lookup without
    /// issuer falls back to any provider of the same category and id.
    pub fn provider_for(&self, fqn: &AttributeFqn, strict_issuer: bool) -> Option<&Arc<dyn AttributeProvider>> {
        if let Some(provider) = self.by_attribute.get(fqn) {
            return Some(provider);
        }
        if strict_issuer || fqn.issuer.is_some() {
            return None;
        }
        self.by_attribute
            .iter()
            .filter(|(declared, _)| declared.category == fqn.category && declared.id == fqn.id)
            .min_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, provider)| provider)
    }
}

impl fmt::Debug for AttributeProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut attributes: Vec<String> = self.by_attribute.keys().map(ToString::to_string).collect();
        attributes.sort();
        f.debug_struct("AttributeProviderRegistry")
            .field("attributes", &attributes)
            .finish()
    }
}
