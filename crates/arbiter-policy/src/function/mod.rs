//! Function library.
//!
//! Functions are resolved by identifier at parse time through a
//! [`FunctionRegistry`]; [`FunctionRegistry::standard`] holds the standard
//! library. Higher-order functions whose return type depends on their
//! sub-function (`map`) are produced per use by a [`GenericFunctionFactory`].

mod arithmetic;
mod bag;
mod comparison;
mod conversion;
mod equality;
mod higher_order;
mod logical;
mod regexp;
mod special;
mod string;
mod temporal;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use arbiter_core::{AttributeValue, Bag, Datatype, IndeterminateError};

use crate::context::EvaluationContext;
use crate::error::{PolicyError, PolicyResult};
use crate::expression::{Expression, Value, ValueType};

pub const XACML1: &str = "urn:oasis:names:tc:xacml:1.0:function:";
pub const XACML2: &str = "urn:oasis:names:tc:xacml:2.0:function:";
pub const XACML3: &str = "urn:oasis:names:tc:xacml:3.0:function:";

/// Identifier of a per-datatype function family member, e.g. `string-bag`.
///
/// Durations were added in 3.0 and network types in 2.0, so their family
/// members live under those prefixes.
pub(crate) fn typed_id(datatype: Datatype, suffix: &str) -> String {
    let prefix = match datatype {
        Datatype::DayTimeDuration | Datatype::YearMonthDuration => XACML3,
        Datatype::IpAddress | Datatype::DnsName => XACML2,
        _ => XACML1,
    };
    format!("{}{}-{}", prefix, datatype.short_name(), suffix)
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Parameter list of a function: fixed parameters followed by an optional
/// repeated parameter type (zero or more occurrences).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub return_type: ValueType,
    pub params: Vec<ValueType>,
    pub variadic: Option<ValueType>,
}

impl Signature {
    pub fn new(return_type: ValueType, params: Vec<ValueType>) -> Self {
        Self {
            return_type,
            params,
            variadic: None,
        }
    }

    pub fn variadic(mut self, param: ValueType) -> Self {
        self.variadic = Some(param);
        self
    }

    pub fn param_type(&self, index: usize) -> Option<ValueType> {
        self.params.get(index).copied().or(self.variadic)
    }

    pub fn accepts(&self, types: &[ValueType]) -> bool {
        self.accepts_count(types.len())
            && types
                .iter()
                .enumerate()
                .all(|(i, t)| self.param_type(i) == Some(*t))
    }

    fn accepts_count(&self, count: usize) -> bool {
        count >= self.params.len() && (self.variadic.is_some() || count == self.params.len())
    }

    fn arity(&self) -> String {
        match self.variadic {
            Some(_) => format!("at least {}", self.params.len()),
            None => self.params.len().to_string(),
        }
    }
}

/// Parse-time argument check shared by first-order functions.
pub(crate) fn check_signature(id: &str, signature: &Signature, args: &[Expression]) -> PolicyResult<()> {
    if !signature.accepts_count(args.len()) {
        return Err(PolicyError::Arity {
            function: id.to_string(),
            expected: signature.arity(),
            actual: args.len(),
        });
    }
    for (index, arg) in args.iter().enumerate() {
        if let Some(f) = arg.as_function() {
            return Err(PolicyError::InvalidSubFunction {
                function: id.to_string(),
                sub_function: f.id().to_string(),
                reason: "not a higher-order function".into(),
            });
        }
        let expected = signature.param_type(index).unwrap_or(signature.return_type);
        let actual = arg.value_type();
        if actual != expected {
            return Err(PolicyError::ArgumentType {
                function: id.to_string(),
                index,
                expected,
                actual,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Function trait
// ---------------------------------------------------------------------------

/// A callable in the function library.
pub trait Function: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    fn signature(&self) -> &Signature;

    fn return_type(&self) -> ValueType {
        self.signature().return_type
    }

    /// Check argument count and types at parse time.
    fn check_args(&self, args: &[Expression]) -> PolicyResult<()> {
        check_signature(self.id(), self.signature(), args)
    }

    /// Apply the function to already evaluated arguments.
    fn apply(&self, args: &[Value]) -> Result<Value, IndeterminateError>;

    /// Evaluate the argument expressions and apply. Functions with lazy
    /// argument evaluation override this.
    fn call(&self, args: &[Expression], ctx: Option<&EvaluationContext>) -> Result<Value, IndeterminateError> {
        let values = args
            .iter()
            .enumerate()
            .map(|(i, arg)| arg.evaluate(ctx).map_err(|e| e.context(format!("argument {}", i))))
            .collect::<Result<Vec<_>, _>>()?;
        self.apply(&values)
    }
}

type Implementation = Box<dyn Fn(&[Value]) -> Result<Value, IndeterminateError> + Send + Sync>;

/// First-order function backed by a closure over evaluated arguments.
pub(crate) struct SimpleFunction {
    id: String,
    signature: Signature,
    implementation: Implementation,
}

impl fmt::Debug for SimpleFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleFunction").field("id", &self.id).finish()
    }
}

impl Function for SimpleFunction {
    fn id(&self) -> &str {
        &self.id
    }

    fn signature(&self) -> &Signature {
        &self.signature
    }

    fn apply(&self, args: &[Value]) -> Result<Value, IndeterminateError> {
        (self.implementation)(args)
    }
}

pub(crate) fn simple(
    id: impl Into<String>,
    signature: Signature,
    implementation: impl Fn(&[Value]) -> Result<Value, IndeterminateError> + Send + Sync + 'static,
) -> Arc<dyn Function> {
    Arc::new(SimpleFunction {
        id: id.into(),
        signature,
        implementation: Box::new(implementation),
    })
}

// ---------------------------------------------------------------------------
// Argument accessors
// ---------------------------------------------------------------------------

fn mismatch(expected: &str, actual: &Value) -> IndeterminateError {
    IndeterminateError::processing(format!("expected {}, got {}", expected, actual.value_type()))
}

pub(crate) fn arg(args: &[Value], index: usize) -> Result<&Value, IndeterminateError> {
    args.get(index)
        .ok_or_else(|| IndeterminateError::processing(format!("missing argument {}", index)))
}

pub(crate) fn primitive(args: &[Value], index: usize) -> Result<&AttributeValue, IndeterminateError> {
    arg(args, index)?.as_primitive()
}

pub(crate) fn boolean(args: &[Value], index: usize) -> Result<bool, IndeterminateError> {
    let v = arg(args, index)?;
    v.as_primitive()?.as_bool().ok_or_else(|| mismatch("boolean", v))
}

pub(crate) fn integer(args: &[Value], index: usize) -> Result<i64, IndeterminateError> {
    let v = arg(args, index)?;
    v.as_primitive()?.as_integer().ok_or_else(|| mismatch("integer", v))
}

pub(crate) fn double(args: &[Value], index: usize) -> Result<f64, IndeterminateError> {
    let v = arg(args, index)?;
    v.as_primitive()?.as_double().ok_or_else(|| mismatch("double", v))
}

/// Text of a string or anyURI argument.
pub(crate) fn text(args: &[Value], index: usize) -> Result<&str, IndeterminateError> {
    let v = arg(args, index)?;
    v.as_primitive()?.as_str().ok_or_else(|| mismatch("string", v))
}

pub(crate) fn bag(args: &[Value], index: usize) -> Result<&Arc<Bag>, IndeterminateError> {
    arg(args, index)?.as_bag()
}

pub(crate) fn bool_value(b: bool) -> Value {
    Value::Primitive(AttributeValue::Boolean(b))
}

// ---------------------------------------------------------------------------
// FunctionRegistry
// ---------------------------------------------------------------------------

/// Produces a concrete function for a given sub-function return type.
pub trait GenericFunctionFactory: Send + Sync {
    fn id(&self) -> &str;

    fn instantiate(&self, sub_function_return: ValueType) -> PolicyResult<Arc<dyn Function>>;
}

/// Function lookup by identifier.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn Function>>,
    generic: HashMap<String, Arc<dyn GenericFunctionFactory>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the standard function library.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        let families = [
            equality::functions(),
            arithmetic::functions(),
            string::functions(),
            comparison::functions(),
            logical::functions(),
            bag::functions(),
            higher_order::functions(),
            regexp::functions(),
            special::functions(),
            conversion::functions(),
            temporal::functions(),
        ];
        for function in families.into_iter().flatten() {
            registry
                .functions
                .insert(function.id().to_string(), function);
        }
        for factory in higher_order::generic_functions() {
            registry.generic.insert(factory.id().to_string(), factory);
        }
        registry
    }

    pub fn register(&mut self, function: Arc<dyn Function>) -> PolicyResult<()> {
        let id = function.id().to_string();
        if self.functions.contains_key(&id) || self.generic.contains_key(&id) {
            return Err(PolicyError::DuplicateFunction(id));
        }
        self.functions.insert(id, function);
        Ok(())
    }

    pub fn register_generic(&mut self, factory: Arc<dyn GenericFunctionFactory>) -> PolicyResult<()> {
        let id = factory.id().to_string();
        if self.functions.contains_key(&id) || self.generic.contains_key(&id) {
            return Err(PolicyError::DuplicateFunction(id));
        }
        self.generic.insert(id, factory);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Function>> {
        self.functions.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.functions.len() + self.generic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolve a function identifier.
    ///
    /// `sub_function_return` is the return type of the sub-function when the
    /// first argument of the call is a function; generic functions need it to
    /// produce a concrete instance.
    pub fn resolve(
        &self,
        id: &str,
        sub_function_return: Option<ValueType>,
    ) -> PolicyResult<Arc<dyn Function>> {
        if let Some(function) = self.functions.get(id) {
            return Ok(Arc::clone(function));
        }
        match self.generic.get(id) {
            Some(factory) => match sub_function_return {
                Some(return_type) => factory.instantiate(return_type),
                None => Err(PolicyError::MissingSubFunction(id.to_string())),
            },
            None => Err(PolicyError::UnknownFunction(id.to_string())),
        }
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.functions.len())
            .field("generic", &self.generic.len())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_resolves_core_ids() {
        let registry = FunctionRegistry::standard();
        for id in [
            "urn:oasis:names:tc:xacml:1.0:function:string-equal",
            "urn:oasis:names:tc:xacml:3.0:function:dayTimeDuration-equal",
            "urn:oasis:names:tc:xacml:1.0:function:and",
            "urn:oasis:names:tc:xacml:3.0:function:any-of",
            "urn:oasis:names:tc:xacml:2.0:function:ipAddress-bag",
            "urn:oasis:names:tc:xacml:1.0:function:string-regexp-match",
            "urn:oasis:names:tc:xacml:3.0:function:string-from-integer",
        ] {
            assert!(registry.resolve(id, None).is_ok(), "missing {}", id);
        }
    }

    #[test]
    fn test_unknown_function() {
        let err = FunctionRegistry::standard()
            .resolve("urn:example:nope", None)
            .unwrap_err();
        assert!(matches!(err, PolicyError::UnknownFunction(_)));
    }

    #[test]
    fn test_generic_requires_sub_function() {
        let registry = FunctionRegistry::standard();
        let id = format!("{XACML3}map");
        assert!(matches!(
            registry.resolve(&id, None).unwrap_err(),
            PolicyError::MissingSubFunction(_)
        ));
        let map = registry.resolve(&id, Some(ValueType::STRING)).unwrap();
        assert_eq!(map.return_type(), ValueType::Bag(Datatype::String));
    }

    #[test]
    fn test_register_duplicate_rejected() {
        let mut registry = FunctionRegistry::standard();
        let f = registry.get(&format!("{XACML1}not")).unwrap();
        assert!(matches!(
            registry.register(f).unwrap_err(),
            PolicyError::DuplicateFunction(_)
        ));
    }

    #[test]
    fn test_signature_accepts() {
        let sig = Signature::new(ValueType::STRING, vec![ValueType::STRING, ValueType::STRING])
            .variadic(ValueType::STRING);
        assert!(sig.accepts(&[ValueType::STRING, ValueType::STRING]));
        assert!(sig.accepts(&[ValueType::STRING; 4]));
        assert!(!sig.accepts(&[ValueType::STRING]));
        assert!(!sig.accepts(&[ValueType::STRING, ValueType::INTEGER]));
    }

    #[test]
    fn test_typed_id() {
        assert_eq!(
            typed_id(Datatype::IpAddress, "bag"),
            "urn:oasis:names:tc:xacml:2.0:function:ipAddress-bag"
        );
        assert_eq!(
            typed_id(Datatype::YearMonthDuration, "equal"),
            "urn:oasis:names:tc:xacml:3.0:function:yearMonthDuration-equal"
        );
    }
}
