use std::sync::Arc;

use arbiter_core::IndeterminateError;

use crate::context::EvaluationContext;
use crate::expression::{Expression, Value, ValueType};

/// A named expression defined in a Policy.
#[derive(Debug)]
pub struct VariableDefinition {
    pub id: String,
    /// Unique within a loaded policy tree; keys the per-request value cache.
    pub(crate) scope_key: String,
    pub expression: Expression,
    /// Length of the longest chain of variable references inside `expression`.
    pub longest_chain: usize,
}

impl VariableDefinition {
    pub fn new(policy_id: &str, id: impl Into<String>, expression: Expression, longest_chain: usize) -> Self {
        let id = id.into();
        Self {
            scope_key: format!("{}#{}", policy_id, id),
            id,
            expression,
            longest_chain,
        }
    }
}

/// Reference to a [`VariableDefinition`].
///
/// Non-static values are computed at most once per request and cached in the
/// evaluation context.
#[derive(Debug, Clone)]
pub struct VariableReference {
    definition: Arc<VariableDefinition>,
}

impl VariableReference {
    pub fn new(definition: Arc<VariableDefinition>) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &Arc<VariableDefinition> {
        &self.definition
    }

    pub fn value_type(&self) -> ValueType {
        self.definition.expression.value_type()
    }

    pub fn is_static(&self) -> bool {
        self.definition.expression.is_static()
    }

    pub fn evaluate(&self, ctx: Option<&EvaluationContext>) -> Result<Value, IndeterminateError> {
        let def = &self.definition;
        let ctx = match ctx {
            Some(ctx) if !self.is_static() => ctx,
            _ => return def.expression.evaluate(ctx),
        };
        if let Some(value) = ctx.variable_value(&def.scope_key) {
            return Ok(value);
        }
        let value = def
            .expression
            .evaluate(Some(ctx))
            .map_err(|e| e.context(format!("variable {}", def.id)))?;
        ctx.put_variable(&def.scope_key, value.clone());
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeDesignator;
    use crate::context::ContextOptions;
    use crate::request::{IndividualRequest, RequestAttribute};
    use arbiter_core::{AttributeFqn, AttributeValue, Datatype};

    #[test]
    fn test_static_variable() {
        let def = Arc::new(VariableDefinition::new(
            "p",
            "limit",
            Expression::constant(AttributeValue::Integer(10)),
            0,
        ));
        let r = VariableReference::new(def);
        assert!(r.is_static());
        assert_eq!(
            r.evaluate(None).unwrap(),
            Value::Primitive(AttributeValue::Integer(10))
        );
    }

    #[test]
    fn test_dynamic_variable_cached_per_request() {
        let fqn = AttributeFqn::new("c", "a");
        let def = Arc::new(VariableDefinition::new(
            "p",
            "v",
            Expression::Designator(AttributeDesignator::new(fqn.clone(), Datatype::String, false)),
            0,
        ));
        let r = VariableReference::new(def);
        assert!(!r.is_static());

        let mut request = IndividualRequest::default();
        request
            .attributes
            .push(RequestAttribute::new("c", "a", vec![AttributeValue::string("x")]));
        let ctx = EvaluationContext::new(&request, &ContextOptions::default()).unwrap();

        let first = r.evaluate(Some(&ctx)).unwrap();
        assert!(ctx.variable_value("p#v").is_some());
        let second = r.evaluate(Some(&ctx)).unwrap();
        match (first, second) {
            (Value::Bag(a), Value::Bag(b)) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
