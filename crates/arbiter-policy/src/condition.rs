use arbiter_core::IndeterminateError;

use crate::context::EvaluationContext;
use crate::error::{PolicyError, PolicyResult};
use crate::expression::{Expression, ValueType};

/// Boolean guard of a rule.
///
/// A condition that is statically true, whether a literal or a reference to
/// a static variable, is reduced to `AlwaysTrue` and never evaluated; one
/// that is statically false is rejected when the policy is loaded.
#[derive(Debug, Clone)]
pub enum Condition {
    AlwaysTrue,
    Expression(Expression),
}

impl Condition {
    pub fn new(expression: Expression) -> PolicyResult<Self> {
        let value_type = expression.value_type();
        if value_type != ValueType::BOOLEAN {
            return Err(PolicyError::NonBooleanCondition(value_type));
        }
        if !expression.is_static() {
            return Ok(Condition::Expression(expression));
        }
        // Static through variable references too, not only literal constants.
        match expression.evaluate_bool(None) {
            Ok(true) => Ok(Condition::AlwaysTrue),
            Ok(false) => Err(PolicyError::ConstantFalseCondition),
            Err(source) => Err(PolicyError::StaticEvaluation {
                function: "condition".to_string(),
                source,
            }),
        }
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        match self {
            Condition::AlwaysTrue => Ok(true),
            Condition::Expression(expression) => expression.evaluate_bool(Some(ctx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FunctionRegistry, XACML1};
    use crate::variable::{VariableDefinition, VariableReference};
    use arbiter_core::AttributeValue;
    use std::sync::Arc;

    fn b(v: bool) -> Expression {
        Expression::constant(AttributeValue::Boolean(v))
    }

    #[test]
    fn test_constant_true_optimized_away() {
        assert!(matches!(Condition::new(b(true)).unwrap(), Condition::AlwaysTrue));
    }

    #[test]
    fn test_constant_false_rejected() {
        assert!(matches!(
            Condition::new(b(false)).unwrap_err(),
            PolicyError::ConstantFalseCondition
        ));
    }

    #[test]
    fn test_static_expression_folded_then_checked() {
        let not = FunctionRegistry::standard()
            .resolve(&format!("{XACML1}not"), None)
            .unwrap();
        let folded = Expression::apply(not, vec![b(true)]).unwrap();
        assert!(matches!(
            Condition::new(folded).unwrap_err(),
            PolicyError::ConstantFalseCondition
        ));
    }

    #[test]
    fn test_non_boolean_rejected() {
        let err = Condition::new(Expression::constant(AttributeValue::Integer(1))).unwrap_err();
        assert!(matches!(err, PolicyError::NonBooleanCondition(_)));
    }

    #[test]
    fn test_static_variable_folded() {
        let reference = |v: bool| {
            let def = Arc::new(VariableDefinition::new("p", "flag", b(v), 0));
            Expression::VariableRef(VariableReference::new(def))
        };
        assert!(matches!(Condition::new(reference(true)).unwrap(), Condition::AlwaysTrue));
        assert!(matches!(
            Condition::new(reference(false)).unwrap_err(),
            PolicyError::ConstantFalseCondition
        ));
    }
}
