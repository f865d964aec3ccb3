use arbiter_core::IndeterminateError;

use crate::context::EvaluationContext;
use crate::decision::{AttributeAssignment, Effect, PepAction, PepActions};
use crate::expression::{Expression, Value};

/// Assignment whose value is computed per request. A bag-valued expression
/// yields one assignment per bag element.
#[derive(Debug, Clone)]
pub struct AttributeAssignmentExpression {
    pub attribute_id: String,
    pub category: Option<String>,
    pub issuer: Option<String>,
    pub expression: Expression,
}

impl AttributeAssignmentExpression {
    fn evaluate(&self, ctx: &EvaluationContext, out: &mut Vec<AttributeAssignment>) -> Result<(), IndeterminateError> {
        let assign = |value| AttributeAssignment {
            attribute_id: self.attribute_id.clone(),
            category: self.category.clone(),
            issuer: self.issuer.clone(),
            value,
        };
        match self.expression.evaluate(Some(ctx))? {
            Value::Primitive(value) => out.push(assign(value)),
            Value::Bag(bag) => out.extend(bag.iter().cloned().map(assign)),
        }
        Ok(())
    }
}

/// Obligation or advice template, emitted only with a matching effect.
#[derive(Debug, Clone)]
pub struct PepActionExpression {
    pub id: String,
    pub applies_to: Effect,
    pub assignments: Vec<AttributeAssignmentExpression>,
}

impl PepActionExpression {
    fn evaluate(&self, ctx: &EvaluationContext) -> Result<PepAction, IndeterminateError> {
        let mut assignments = Vec::with_capacity(self.assignments.len());
        for assignment in &self.assignments {
            assignment
                .evaluate(ctx, &mut assignments)
                .map_err(|e| e.context(format!("assignment {} of {}", assignment.attribute_id, self.id)))?;
        }
        Ok(PepAction {
            id: self.id.clone(),
            assignments,
        })
    }
}

/// The obligation and advice expressions of a rule, policy or policy set.
#[derive(Debug, Clone, Default)]
pub struct PepActionExpressions {
    pub obligations: Vec<PepActionExpression>,
    pub advice: Vec<PepActionExpression>,
}

impl PepActionExpressions {
    pub fn is_empty(&self) -> bool {
        self.obligations.is_empty() && self.advice.is_empty()
    }

    /// Instantiate the actions that apply to `effect`. Any failure fails the
    /// whole set.
    pub fn evaluate(&self, effect: Effect, ctx: &EvaluationContext) -> Result<PepActions, IndeterminateError> {
        let instantiate = |templates: &[PepActionExpression]| {
            templates
                .iter()
                .filter(|t| t.applies_to == effect)
                .map(|t| t.evaluate(ctx))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(PepActions {
            obligations: instantiate(&self.obligations)?,
            advice: instantiate(&self.advice)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeDesignator;
    use crate::context::ContextOptions;
    use crate::request::{IndividualRequest, RequestAttribute};
    use arbiter_core::{AttributeFqn, AttributeValue, Datatype};

    fn ctx() -> EvaluationContext {
        let request = IndividualRequest::new().with_attribute(RequestAttribute::new(
            "c",
            "email",
            vec![AttributeValue::string("a@x.org"), AttributeValue::string("b@x.org")],
        ));
        EvaluationContext::new(&request, &ContextOptions::default()).unwrap()
    }

    fn notify(applies_to: Effect, must_be_present: bool, id: &str) -> PepActionExpression {
        PepActionExpression {
            id: "notify".into(),
            applies_to,
            assignments: vec![AttributeAssignmentExpression {
                attribute_id: "to".into(),
                category: None,
                issuer: None,
                expression: Expression::Designator(AttributeDesignator::new(
                    AttributeFqn::new("c", id),
                    Datatype::String,
                    must_be_present,
                )),
            }],
        }
    }

    #[test]
    fn test_filtered_by_effect_and_bag_expanded() {
        let pep = PepActionExpressions {
            obligations: vec![notify(Effect::Permit, true, "email"), notify(Effect::Deny, true, "email")],
            advice: Vec::new(),
        };
        let actions = pep.evaluate(Effect::Permit, &ctx()).unwrap();
        assert_eq!(actions.obligations.len(), 1);
        assert_eq!(actions.obligations[0].assignments.len(), 2);
    }

    #[test]
    fn test_failure_propagates() {
        let pep = PepActionExpressions {
            obligations: Vec::new(),
            advice: vec![notify(Effect::Deny, true, "missing")],
        };
        assert!(pep.evaluate(Effect::Deny, &ctx()).is_err());
        // not applicable to Permit, so never evaluated
        assert!(pep.evaluate(Effect::Permit, &ctx()).unwrap().is_empty());
    }
}
