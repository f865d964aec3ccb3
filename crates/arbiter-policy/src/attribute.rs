use std::sync::Arc;

use arbiter_core::{AttributeFqn, Bag, Datatype, IndeterminateError};

use crate::context::EvaluationContext;

/// Turn an empty bag into a missing-attribute fault when presence is required.
fn require_present(
    bag: Arc<Bag>,
    must_be_present: bool,
    missing: impl FnOnce() -> IndeterminateError,
) -> Result<Arc<Bag>, IndeterminateError> {
    if must_be_present && bag.is_empty() {
        let err = missing();
        return Err(match bag.reason_empty() {
            Some(reason) => err.context(format!("lookup failed ({})", reason)),
            None => err,
        });
    }
    Ok(bag)
}

// ---------------------------------------------------------------------------
// AttributeDesignator — named attribute lookup
// ---------------------------------------------------------------------------

/// Looks up a named attribute in the request (or via attribute providers).
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeDesignator {
    pub fqn: AttributeFqn,
    pub datatype: Datatype,
    pub must_be_present: bool,
}

impl AttributeDesignator {
    pub fn new(fqn: AttributeFqn, datatype: Datatype, must_be_present: bool) -> Self {
        Self {
            fqn,
            datatype,
            must_be_present,
        }
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<Arc<Bag>, IndeterminateError> {
        let bag = ctx.get_attribute(&self.fqn, self.datatype)?;
        require_present(bag, self.must_be_present, || {
            IndeterminateError::missing_attribute(&self.fqn, self.datatype)
        })
    }
}

// ---------------------------------------------------------------------------
// AttributeSelector — path into a category's Content
// ---------------------------------------------------------------------------

/// Selects values from the structured Content of a category.
///
/// `path` is a JSON Pointer. When `context_selector_id` is set, the named
/// attribute of the same category must hold a single xpathExpression whose
/// path is used as the base the `path` is resolved against.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeSelector {
    pub category: String,
    pub path: String,
    pub context_selector_id: Option<String>,
    pub datatype: Datatype,
    pub must_be_present: bool,
}

impl AttributeSelector {
    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<Arc<Bag>, IndeterminateError> {
        let bag = ctx.select(self)?;
        require_present(bag, self.must_be_present, || {
            let mut err = IndeterminateError::missing_attribute(
                &AttributeFqn::new(self.category.clone(), self.path.clone()),
                self.datatype,
            );
            err.message = format!(
                "no {} value selected by '{}' in {}",
                self.datatype, self.path, self.category
            );
            err
        })
    }
}
