use std::fmt;
use std::sync::Arc;

use arbiter_core::{AttributeValue, Bag, Datatype, IndeterminateError};

use crate::attribute::{AttributeDesignator, AttributeSelector};
use crate::context::EvaluationContext;
use crate::error::{PolicyError, PolicyResult};
use crate::function::Function;
use crate::variable::VariableReference;

// ---------------------------------------------------------------------------
// ValueType / Value — what an expression evaluates to
// ---------------------------------------------------------------------------

/// Static result type of an expression: a primitive datatype or a bag of one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Primitive(Datatype),
    Bag(Datatype),
}

impl ValueType {
    pub const BOOLEAN: ValueType = ValueType::Primitive(Datatype::Boolean);
    pub const INTEGER: ValueType = ValueType::Primitive(Datatype::Integer);
    pub const DOUBLE: ValueType = ValueType::Primitive(Datatype::Double);
    pub const STRING: ValueType = ValueType::Primitive(Datatype::String);

    pub fn datatype(self) -> Datatype {
        match self {
            ValueType::Primitive(dt) | ValueType::Bag(dt) => dt,
        }
    }

    pub fn is_bag(self) -> bool {
        matches!(self, ValueType::Bag(_))
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Primitive(dt) => write!(f, "{}", dt),
            ValueType::Bag(dt) => write!(f, "bag of {}", dt),
        }
    }
}

/// Result of evaluating an expression.
///
/// Bags are shared: the attribute cache hands out the same `Arc<Bag>` to
/// every lookup of an attribute within one request.
#[derive(Debug, Clone)]
pub enum Value {
    Primitive(AttributeValue),
    Bag(Arc<Bag>),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Primitive(v) => ValueType::Primitive(v.datatype()),
            Value::Bag(b) => ValueType::Bag(b.datatype()),
        }
    }

    pub fn as_primitive(&self) -> Result<&AttributeValue, IndeterminateError> {
        match self {
            Value::Primitive(v) => Ok(v),
            Value::Bag(b) => Err(IndeterminateError::processing(format!(
                "expected a primitive value, got bag of {}",
                b.datatype()
            ))),
        }
    }

    pub fn as_bag(&self) -> Result<&Arc<Bag>, IndeterminateError> {
        match self {
            Value::Bag(b) => Ok(b),
            Value::Primitive(v) => Err(IndeterminateError::processing(format!(
                "expected a bag, got {}",
                v.datatype()
            ))),
        }
    }

    pub fn as_bool(&self) -> Result<bool, IndeterminateError> {
        self.as_primitive()?.as_bool().ok_or_else(|| {
            IndeterminateError::processing(format!(
                "expected a boolean, got {}",
                self.value_type()
            ))
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Primitive(a), Value::Primitive(b)) => a == b,
            (Value::Bag(a), Value::Bag(b)) => a == b,
            _ => false,
        }
    }
}

impl From<AttributeValue> for Value {
    fn from(value: AttributeValue) -> Self {
        Value::Primitive(value)
    }
}

impl From<Bag> for Value {
    fn from(bag: Bag) -> Self {
        Value::Bag(Arc::new(bag))
    }
}

// ---------------------------------------------------------------------------
// Expression — closed set of expression kinds
// ---------------------------------------------------------------------------

/// Compiled expression tree.
///
/// Expressions are immutable once built and shared across concurrent
/// evaluations; per-request state lives in the [`EvaluationContext`].
#[derive(Debug, Clone)]
pub enum Expression {
    Constant(Value),
    Designator(AttributeDesignator),
    Selector(AttributeSelector),
    Apply(Apply),
    VariableRef(VariableReference),
    /// Function passed as the first argument of a higher-order function.
    Function(FunctionRef),
}

impl Expression {
    pub fn constant(value: AttributeValue) -> Self {
        Expression::Constant(Value::Primitive(value))
    }

    /// Build a function application.
    ///
    /// Arguments are type-checked against the function here. When every
    /// argument is static the application is evaluated once, without a
    /// context, and replaced by its result; a failure at that point is a
    /// parse-time error.
    pub fn apply(function: Arc<dyn Function>, args: Vec<Expression>) -> PolicyResult<Self> {
        let apply = Apply::new(function, args)?;
        if apply.args.iter().all(Expression::is_static) {
            let value = apply
                .evaluate(None)
                .map_err(|source| PolicyError::StaticEvaluation {
                    function: apply.function.id().to_string(),
                    source,
                })?;
            return Ok(Expression::Constant(value));
        }
        Ok(Expression::Apply(apply))
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Expression::Constant(v) => v.value_type(),
            Expression::Designator(d) => ValueType::Bag(d.datatype),
            Expression::Selector(s) => ValueType::Bag(s.datatype),
            Expression::Apply(a) => a.function.return_type(),
            Expression::VariableRef(r) => r.value_type(),
            Expression::Function(f) => f.0.return_type(),
        }
    }

    /// Whether the value can be computed without any request context.
    pub fn is_static(&self) -> bool {
        match self {
            Expression::Constant(_) | Expression::Function(_) => true,
            Expression::Designator(_) | Expression::Selector(_) | Expression::Apply(_) => false,
            Expression::VariableRef(r) => r.is_static(),
        }
    }

    pub fn as_function(&self) -> Option<&Arc<dyn Function>> {
        match self {
            Expression::Function(f) => Some(&f.0),
            _ => None,
        }
    }

    /// Evaluate against a request context, or statically when `ctx` is `None`.
    pub fn evaluate(&self, ctx: Option<&EvaluationContext>) -> Result<Value, IndeterminateError> {
        match self {
            Expression::Constant(v) => Ok(v.clone()),
            Expression::Designator(d) => d.evaluate(require(ctx)?).map(Value::Bag),
            Expression::Selector(s) => s.evaluate(require(ctx)?).map(Value::Bag),
            Expression::Apply(a) => a.evaluate(ctx),
            Expression::VariableRef(r) => r.evaluate(ctx),
            Expression::Function(f) => Err(IndeterminateError::processing(format!(
                "function '{}' cannot be evaluated as a value",
                f.0.id()
            ))),
        }
    }

    pub fn evaluate_primitive(
        &self,
        ctx: Option<&EvaluationContext>,
    ) -> Result<AttributeValue, IndeterminateError> {
        match self.evaluate(ctx)? {
            Value::Primitive(v) => Ok(v),
            Value::Bag(b) => Err(IndeterminateError::processing(format!(
                "expected a primitive value, got bag of {}",
                b.datatype()
            ))),
        }
    }

    pub fn evaluate_bool(&self, ctx: Option<&EvaluationContext>) -> Result<bool, IndeterminateError> {
        self.evaluate(ctx)?.as_bool()
    }
}

fn require(ctx: Option<&EvaluationContext>) -> Result<&EvaluationContext, IndeterminateError> {
    ctx.ok_or_else(|| IndeterminateError::processing("no request context available"))
}

/// Function application: a function plus its argument expressions.
#[derive(Debug, Clone)]
pub struct Apply {
    function: Arc<dyn Function>,
    args: Vec<Expression>,
}

impl Apply {
    /// Type-checked application, kept as is even when every argument is
    /// static.
    pub fn new(function: Arc<dyn Function>, args: Vec<Expression>) -> PolicyResult<Self> {
        function.check_args(&args)?;
        Ok(Self { function, args })
    }

    pub fn function(&self) -> &Arc<dyn Function> {
        &self.function
    }

    pub fn args(&self) -> &[Expression] {
        &self.args
    }

    pub fn evaluate(&self, ctx: Option<&EvaluationContext>) -> Result<Value, IndeterminateError> {
        self.function
            .call(&self.args, ctx)
            .map_err(|e| e.context(format!("function {}", self.function.id())))
    }
}

/// A function used as a value (sub-function of a higher-order function).
#[derive(Debug, Clone)]
pub struct FunctionRef(pub Arc<dyn Function>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionRegistry;
    use crate::function::XACML1;

    fn registry() -> FunctionRegistry {
        FunctionRegistry::standard()
    }

    fn int(i: i64) -> Expression {
        Expression::constant(AttributeValue::Integer(i))
    }

    #[test]
    fn test_static_apply_is_pre_evaluated() {
        let add = registry()
            .resolve(&format!("{XACML1}integer-add"), None)
            .unwrap();
        let expr = Expression::apply(add, vec![int(2), int(3)]).unwrap();
        match expr {
            Expression::Constant(v) => assert_eq!(v, Value::Primitive(AttributeValue::Integer(5))),
            other => panic!("expected constant, got {:?}", other),
        }
    }

    #[test]
    fn test_static_failure_is_parse_error() {
        let divide = registry()
            .resolve(&format!("{XACML1}integer-divide"), None)
            .unwrap();
        let err = Expression::apply(divide, vec![int(1), int(0)]).unwrap_err();
        assert!(matches!(err, PolicyError::StaticEvaluation { .. }));
    }

    #[test]
    fn test_argument_type_checked() {
        let add = registry()
            .resolve(&format!("{XACML1}integer-add"), None)
            .unwrap();
        let err = Expression::apply(
            add,
            vec![int(1), Expression::constant(AttributeValue::string("x"))],
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::ArgumentType { index: 1, .. }));
    }

    #[test]
    fn test_designator_without_context_fails() {
        let designator = Expression::Designator(AttributeDesignator::new(
            arbiter_core::AttributeFqn::new("cat", "id"),
            Datatype::String,
            false,
        ));
        assert!(!designator.is_static());
        assert!(designator.evaluate(None).is_err());
        assert_eq!(designator.value_type(), ValueType::Bag(Datatype::String));
    }

    #[test]
    fn test_function_expression_not_a_value() {
        let f = registry()
            .resolve(&format!("{XACML1}string-equal"), None)
            .unwrap();
        let expr = Expression::Function(FunctionRef(f));
        assert!(expr.is_static());
        assert!(expr.evaluate(None).is_err());
    }

    #[test]
    fn test_value_type_display() {
        assert_eq!(ValueType::BOOLEAN.to_string(), "boolean");
        assert_eq!(ValueType::Bag(Datatype::AnyUri).to_string(), "bag of anyURI");
    }
}
