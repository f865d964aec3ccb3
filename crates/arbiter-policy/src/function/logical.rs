use std::sync::Arc;

use arbiter_core::IndeterminateError;

use super::{bool_value, boolean, integer, simple, Function, Signature, XACML1};
use crate::context::EvaluationContext;
use crate::expression::{Expression, Value, ValueType};

// ---------------------------------------------------------------------------
// and / or — short-circuit over lazily evaluated arguments
// ---------------------------------------------------------------------------

/// `and` / `or`. Evaluation stops at the first argument equal to
/// `short_circuit`; an error in an earlier argument does not prevent a later
/// short-circuit value from deciding the result.
#[derive(Debug)]
struct ShortCircuit {
    id: String,
    signature: Signature,
    short_circuit: bool,
}

impl ShortCircuit {
    fn fold(
        &self,
        results: impl Iterator<Item = Result<bool, IndeterminateError>>,
    ) -> Result<Value, IndeterminateError> {
        let mut first_error = None;
        for (i, result) in results.enumerate() {
            match result {
                Ok(b) if b == self.short_circuit => return Ok(bool_value(b)),
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert_with(|| e.context(format!("argument {}", i)));
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(bool_value(!self.short_circuit)),
        }
    }
}

impl Function for ShortCircuit {
    fn id(&self) -> &str {
        &self.id
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn apply(&self, args: &[Value]) -> Result<Value, IndeterminateError> {
        self.fold(args.iter().map(Value::as_bool))
    }

    fn call(&self, args: &[Expression], ctx: Option<&EvaluationContext>) -> Result<Value, IndeterminateError> {
        self.fold(args.iter().map(|arg| arg.evaluate_bool(ctx)))
    }
}

// ---------------------------------------------------------------------------
// n-of — true once `n` of the boolean arguments are true
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct NOf {
    id: String,
    signature: Signature,
}

impl NOf {
    fn count(
        n: i64,
        remaining: usize,
        results: impl Iterator<Item = Result<bool, IndeterminateError>>,
    ) -> Result<Value, IndeterminateError> {
        if n <= 0 {
            return Ok(bool_value(true));
        }
        if n as u64 > remaining as u64 {
            return Err(IndeterminateError::processing(format!(
                "n-of requires {} true arguments but only {} were given",
                n, remaining
            )));
        }
        let mut needed = n as usize;
        let mut left = remaining;
        let mut first_error = None;
        for result in results {
            left -= 1;
            match result {
                Ok(true) => {
                    needed -= 1;
                    if needed == 0 {
                        return Ok(bool_value(true));
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
            if needed > left {
                break;
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(bool_value(false)),
        }
    }
}

impl Function for NOf {
    fn id(&self) -> &str {
        &self.id
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn apply(&self, args: &[Value]) -> Result<Value, IndeterminateError> {
        let n = integer(args, 0)?;
        Self::count(n, args.len() - 1, args[1..].iter().map(Value::as_bool))
    }

    fn call(&self, args: &[Expression], ctx: Option<&EvaluationContext>) -> Result<Value, IndeterminateError> {
        let n = match args.first() {
            Some(first) => first.evaluate_primitive(ctx)?.as_integer().ok_or_else(|| {
                IndeterminateError::processing("n-of expects an integer first argument")
            })?,
            None => return Err(IndeterminateError::processing("n-of requires an argument")),
        };
        Self::count(n, args.len() - 1, args[1..].iter().map(|arg| arg.evaluate_bool(ctx)))
    }
}

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    let booleans = || Signature::new(ValueType::BOOLEAN, Vec::new()).variadic(ValueType::BOOLEAN);
    vec![
        Arc::new(ShortCircuit {
            id: format!("{XACML1}or"),
            signature: booleans(),
            short_circuit: true,
        }),
        Arc::new(ShortCircuit {
            id: format!("{XACML1}and"),
            signature: booleans(),
            short_circuit: false,
        }),
        Arc::new(NOf {
            id: format!("{XACML1}n-of"),
            signature: Signature::new(ValueType::BOOLEAN, vec![ValueType::INTEGER])
                .variadic(ValueType::BOOLEAN),
        }),
        simple(
            format!("{XACML1}not"),
            Signature::new(ValueType::BOOLEAN, vec![ValueType::BOOLEAN]),
            |args| Ok(bool_value(!boolean(args, 0)?)),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeDesignator;
    use crate::context::ContextOptions;
    use crate::function::FunctionRegistry;
    use crate::request::IndividualRequest;
    use arbiter_core::{AttributeFqn, AttributeValue, Datatype};

    fn b(v: bool) -> Expression {
        Expression::constant(AttributeValue::Boolean(v))
    }

    /// Boolean expression that fails at runtime (missing mandatory attribute).
    fn failing() -> Expression {
        let designator = Expression::Designator(AttributeDesignator::new(
            AttributeFqn::new("c", "missing"),
            Datatype::Boolean,
            true,
        ));
        let one_and_only = FunctionRegistry::standard()
            .resolve(&format!("{XACML1}boolean-one-and-only"), None)
            .unwrap();
        Expression::apply(one_and_only, vec![designator]).unwrap()
    }

    fn run(id: &str, args: Vec<Expression>) -> Result<Value, IndeterminateError> {
        let f = FunctionRegistry::standard().resolve(id, None).unwrap();
        let ctx = EvaluationContext::new(&IndividualRequest::default(), &ContextOptions::default()).unwrap();
        f.call(&args, Some(&ctx))
    }

    #[test]
    fn test_or_short_circuits_past_error() {
        let v = run(&format!("{XACML1}or"), vec![failing(), b(true)]).unwrap();
        assert_eq!(v, bool_value(true));
        assert!(run(&format!("{XACML1}or"), vec![failing(), b(false)]).is_err());
    }

    #[test]
    fn test_and_short_circuits() {
        let v = run(&format!("{XACML1}and"), vec![b(false), failing()]).unwrap();
        assert_eq!(v, bool_value(false));
        assert_eq!(run(&format!("{XACML1}and"), vec![]).unwrap(), bool_value(true));
        assert_eq!(run(&format!("{XACML1}or"), vec![]).unwrap(), bool_value(false));
    }

    #[test]
    fn test_n_of() {
        let id = format!("{XACML1}n-of");
        let two = Expression::constant(AttributeValue::Integer(2));
        assert_eq!(
            run(&id, vec![two.clone(), b(true), b(false), b(true)]).unwrap(),
            bool_value(true)
        );
        assert_eq!(
            run(&id, vec![two.clone(), b(true), b(false), b(false)]).unwrap(),
            bool_value(false)
        );
        assert!(run(&id, vec![two, b(true)]).is_err());
    }

    #[test]
    fn test_not() {
        assert_eq!(run(&format!("{XACML1}not"), vec![b(true)]).unwrap(), bool_value(false));
    }
}
