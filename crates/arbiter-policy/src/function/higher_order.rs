use std::sync::Arc;

use arbiter_core::{AttributeValue, Bag, IndeterminateError};

use super::{bool_value, Function, GenericFunctionFactory, Signature, XACML1, XACML3};
use crate::context::EvaluationContext;
use crate::error::{PolicyError, PolicyResult};
use crate::expression::{Expression, Value, ValueType};

// ---------------------------------------------------------------------------
// Shared argument handling
// ---------------------------------------------------------------------------

/// The sub-function passed as first argument, checked to be present.
fn sub_function<'a>(id: &str, args: &'a [Expression]) -> PolicyResult<&'a Arc<dyn Function>> {
    args.first()
        .and_then(Expression::as_function)
        .ok_or_else(|| PolicyError::MissingSubFunction(id.to_string()))
}

fn invalid_sub(id: &str, sub: &Arc<dyn Function>, reason: impl Into<String>) -> PolicyError {
    PolicyError::InvalidSubFunction {
        function: id.to_string(),
        sub_function: sub.id().to_string(),
        reason: reason.into(),
    }
}

/// Check that the sub-function accepts one primitive of each remaining
/// argument's datatype.
fn check_sub_params(id: &str, sub: &Arc<dyn Function>, rest: &[Expression]) -> PolicyResult<()> {
    if let Some(nested) = rest.iter().find_map(Expression::as_function) {
        return Err(invalid_sub(id, nested, "only the first argument may be a function"));
    }
    let params: Vec<ValueType> = rest
        .iter()
        .map(|arg| ValueType::Primitive(arg.value_type().datatype()))
        .collect();
    if !sub.signature().accepts(&params) {
        let listed: Vec<String> = params.iter().map(ToString::to_string).collect();
        return Err(invalid_sub(
            id,
            sub,
            format!("does not accept arguments ({})", listed.join(", ")),
        ));
    }
    Ok(())
}

/// Index of the single bag among the remaining arguments.
fn single_bag_position(id: &str, rest: &[Expression]) -> PolicyResult<usize> {
    let bags: Vec<usize> = rest
        .iter()
        .enumerate()
        .filter(|(_, arg)| arg.value_type().is_bag())
        .map(|(i, _)| i)
        .collect();
    match bags.as_slice() {
        [single] => Ok(*single),
        _ => Err(PolicyError::ValidationError(format!(
            "function '{}' requires exactly one bag argument, got {}",
            id,
            bags.len()
        ))),
    }
}

fn evaluate_rest(args: &[Expression], ctx: Option<&EvaluationContext>) -> Result<Vec<Value>, IndeterminateError> {
    args.iter()
        .enumerate()
        .skip(1)
        .map(|(i, arg)| arg.evaluate(ctx).map_err(|e| e.context(format!("argument {}", i))))
        .collect()
}

fn runtime_sub<'a>(args: &'a [Expression]) -> Result<&'a Arc<dyn Function>, IndeterminateError> {
    args.first()
        .and_then(Expression::as_function)
        .ok_or_else(|| IndeterminateError::processing("missing sub-function argument"))
}

/// Replace the bag at `position` with each of its elements in turn.
fn each_element<'a>(
    values: &'a [Value],
    position: usize,
) -> Result<impl Iterator<Item = Vec<Value>> + 'a, IndeterminateError> {
    let bag = values
        .get(position)
        .ok_or_else(|| IndeterminateError::processing("missing bag argument"))?
        .as_bag()?;
    Ok(bag.iter().map(move |element| {
        let mut call = values.to_vec();
        call[position] = Value::Primitive(element.clone());
        call
    }))
}

fn predicate(sub: &Arc<dyn Function>, args: &[Value]) -> Result<bool, IndeterminateError> {
    sub.apply(args)?.as_bool()
}

// ---------------------------------------------------------------------------
// Boolean higher-order functions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Quantifier {
    AnyOf,
    AllOf,
    AnyOfAny,
    AllOfAny,
    AnyOfAll,
    AllOfAll,
}

#[derive(Debug)]
struct BooleanHigherOrder {
    id: String,
    quantifier: Quantifier,
    signature: Signature,
}

impl BooleanHigherOrder {
    fn new(id: String, quantifier: Quantifier) -> Self {
        Self {
            id,
            quantifier,
            signature: Signature::new(ValueType::BOOLEAN, Vec::new()),
        }
    }

    fn any_combination(
        sub: &Arc<dyn Function>,
        values: &[Value],
        current: &mut Vec<Value>,
    ) -> Result<bool, IndeterminateError> {
        let index = current.len();
        let Some(next) = values.get(index) else {
            return predicate(sub, current);
        };
        let candidates: Vec<AttributeValue> = match next {
            Value::Primitive(v) => vec![v.clone()],
            Value::Bag(b) => b.values().to_vec(),
        };
        for candidate in candidates {
            current.push(Value::Primitive(candidate));
            let found = Self::any_combination(sub, values, current)?;
            current.pop();
            if found {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Nested quantification over two bags: `outer_all` / `inner_all` select
    /// universal (true) or existential (false) quantifiers.
    fn two_bags(
        sub: &Arc<dyn Function>,
        first: &Bag,
        second: &Bag,
        outer_all: bool,
        inner_all: bool,
    ) -> Result<bool, IndeterminateError> {
        for a in first {
            let mut inner = inner_all;
            for b in second {
                let holds = predicate(sub, &[Value::Primitive(a.clone()), Value::Primitive(b.clone())])?;
                if holds != inner_all {
                    inner = !inner_all;
                    break;
                }
            }
            if inner != outer_all {
                return Ok(!outer_all);
            }
        }
        Ok(outer_all)
    }
}

impl Function for BooleanHigherOrder {
    fn id(&self) -> &str {
        &self.id
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn check_args(&self, args: &[Expression]) -> PolicyResult<()> {
        let sub = sub_function(&self.id, args)?;
        if sub.return_type() != ValueType::BOOLEAN {
            return Err(invalid_sub(&self.id, sub, "must return a boolean"));
        }
        let rest = &args[1..];
        match self.quantifier {
            Quantifier::AnyOf | Quantifier::AllOf => {
                single_bag_position(&self.id, rest)?;
            }
            Quantifier::AnyOfAny => {
                if rest.is_empty() {
                    return Err(PolicyError::Arity {
                        function: self.id.clone(),
                        expected: "at least 2".into(),
                        actual: args.len(),
                    });
                }
            }
            Quantifier::AllOfAny | Quantifier::AnyOfAll | Quantifier::AllOfAll => {
                if rest.len() != 2 {
                    return Err(PolicyError::Arity {
                        function: self.id.clone(),
                        expected: "3".into(),
                        actual: args.len(),
                    });
                }
                if let Some((index, arg)) = rest.iter().enumerate().find(|(_, a)| !a.value_type().is_bag()) {
                    return Err(PolicyError::ArgumentType {
                        function: self.id.clone(),
                        index: index + 1,
                        expected: ValueType::Bag(arg.value_type().datatype()),
                        actual: arg.value_type(),
                    });
                }
            }
        }
        check_sub_params(&self.id, sub, rest)
    }

    fn apply(&self, _args: &[Value]) -> Result<Value, IndeterminateError> {
        Err(IndeterminateError::processing(format!(
            "{} requires a sub-function argument",
            self.id
        )))
    }

    fn call(&self, args: &[Expression], ctx: Option<&EvaluationContext>) -> Result<Value, IndeterminateError> {
        let sub = runtime_sub(args)?;
        let values = evaluate_rest(args, ctx)?;
        let result = match self.quantifier {
            Quantifier::AnyOf | Quantifier::AllOf => {
                let position = values
                    .iter()
                    .position(|v| matches!(v, Value::Bag(_)))
                    .ok_or_else(|| IndeterminateError::processing("missing bag argument"))?;
                let universal = self.quantifier == Quantifier::AllOf;
                let mut result = universal;
                for call in each_element(&values, position)? {
                    if predicate(sub, &call)? != universal {
                        result = !universal;
                        break;
                    }
                }
                result
            }
            Quantifier::AnyOfAny => Self::any_combination(sub, &values, &mut Vec::with_capacity(values.len()))?,
            Quantifier::AllOfAny | Quantifier::AnyOfAll | Quantifier::AllOfAll => {
                let first = super::bag(&values, 0)?;
                let second = super::bag(&values, 1)?;
                let (outer_all, inner_all) = match self.quantifier {
                    Quantifier::AllOfAny => (true, false),
                    Quantifier::AnyOfAll => (false, true),
                    _ => (true, true),
                };
                Self::two_bags(sub, first, second, outer_all, inner_all)?
            }
        };
        Ok(bool_value(result))
    }
}

// ---------------------------------------------------------------------------
// map — generic over the sub-function's return datatype
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MapFunction {
    id: String,
    signature: Signature,
}

impl Function for MapFunction {
    fn id(&self) -> &str {
        &self.id
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn check_args(&self, args: &[Expression]) -> PolicyResult<()> {
        let sub = sub_function(&self.id, args)?;
        if ValueType::Primitive(self.signature.return_type.datatype()) != sub.return_type() {
            return Err(invalid_sub(&self.id, sub, "return type does not match this map instance"));
        }
        let rest = &args[1..];
        single_bag_position(&self.id, rest)?;
        check_sub_params(&self.id, sub, rest)
    }

    fn apply(&self, _args: &[Value]) -> Result<Value, IndeterminateError> {
        Err(IndeterminateError::processing(format!(
            "{} requires a sub-function argument",
            self.id
        )))
    }

    fn call(&self, args: &[Expression], ctx: Option<&EvaluationContext>) -> Result<Value, IndeterminateError> {
        let sub = runtime_sub(args)?;
        let values = evaluate_rest(args, ctx)?;
        let position = values
            .iter()
            .position(|v| matches!(v, Value::Bag(_)))
            .ok_or_else(|| IndeterminateError::processing("missing bag argument"))?;
        let mapped = each_element(&values, position)?
            .map(|call| sub.apply(&call)?.as_primitive().cloned())
            .collect::<Result<Vec<_>, _>>()?;
        let bag = Bag::new(self.signature.return_type.datatype(), mapped)?;
        Ok(Value::Bag(Arc::new(bag)))
    }
}

struct MapFactory;

impl GenericFunctionFactory for MapFactory {
    fn id(&self) -> &str {
        "urn:oasis:names:tc:xacml:3.0:function:map"
    }

    fn instantiate(&self, sub_function_return: ValueType) -> PolicyResult<Arc<dyn Function>> {
        match sub_function_return {
            ValueType::Primitive(dt) => Ok(Arc::new(MapFunction {
                id: self.id().to_string(),
                signature: Signature::new(ValueType::Bag(dt), Vec::new()),
            })),
            ValueType::Bag(_) => Err(PolicyError::InvalidSubFunction {
                function: self.id().to_string(),
                sub_function: sub_function_return.to_string(),
                reason: "sub-function must return a primitive value".into(),
            }),
        }
    }
}

pub(super) fn functions() -> Vec<Arc<dyn Function>> {
    [
        (format!("{XACML3}any-of"), Quantifier::AnyOf),
        (format!("{XACML3}all-of"), Quantifier::AllOf),
        (format!("{XACML3}any-of-any"), Quantifier::AnyOfAny),
        (format!("{XACML1}all-of-any"), Quantifier::AllOfAny),
        (format!("{XACML1}any-of-all"), Quantifier::AnyOfAll),
        (format!("{XACML1}all-of-all"), Quantifier::AllOfAll),
    ]
    .into_iter()
    .map(|(id, quantifier)| Arc::new(BooleanHigherOrder::new(id, quantifier)) as Arc<dyn Function>)
    .collect()
}

pub(super) fn generic_functions() -> Vec<Arc<dyn GenericFunctionFactory>> {
    vec![Arc::new(MapFactory)]
}
