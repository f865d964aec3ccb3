use std::sync::Arc;

use arbiter_core::{AttributeValue, IndeterminateError};

use crate::context::EvaluationContext;
use crate::error::{PolicyError, PolicyResult};
use crate::expression::{Expression, Value, ValueType};
use crate::function::Function;

// ---------------------------------------------------------------------------
// Match — function(literal, attribute value) over a bag
// ---------------------------------------------------------------------------

/// Compares a literal with each value of an attribute bag.
///
/// True as soon as one comparison is true. Otherwise an error from any
/// comparison (or from the lookup) makes the match Indeterminate.
#[derive(Debug, Clone)]
pub struct Match {
    function: Arc<dyn Function>,
    value: AttributeValue,
    /// A designator or selector expression.
    source: Expression,
}

impl Match {
    /// `source` must be bag-valued and `function` a boolean function over
    /// (literal datatype, bag element datatype).
    pub fn new(function: Arc<dyn Function>, value: AttributeValue, source: Expression) -> PolicyResult<Self> {
        let invalid = |reason: String| PolicyError::InvalidMatch {
            function: function.id().to_string(),
            reason,
        };
        let source_type = source.value_type();
        if !source_type.is_bag() {
            return Err(invalid(format!("attribute source must be a bag, got {}", source_type)));
        }
        if function.return_type() != ValueType::BOOLEAN {
            return Err(invalid("match function must return a boolean".into()));
        }
        let params = [
            ValueType::Primitive(value.datatype()),
            ValueType::Primitive(source_type.datatype()),
        ];
        if !function.signature().accepts(&params) {
            return Err(invalid(format!(
                "function does not accept ({}, {})",
                params[0], params[1]
            )));
        }
        Ok(Self {
            function,
            value,
            source,
        })
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        let values = self.source.evaluate(Some(ctx))?;
        let bag = values.as_bag()?;
        let literal = Value::Primitive(self.value.clone());
        let mut first_error = None;
        for element in bag.iter() {
            match self
                .function
                .apply(&[literal.clone(), Value::Primitive(element.clone())])
                .and_then(|v| v.as_bool())
            {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e.context(format!("match {}", self.function.id()))),
            None => Ok(false),
        }
    }
}

// ---------------------------------------------------------------------------
// AllOf / AnyOf / Target
// ---------------------------------------------------------------------------

/// Conjunction of matches: false wins over Indeterminate.
#[derive(Debug, Clone)]
pub struct AllOf {
    matches: Vec<Match>,
}

impl AllOf {
    pub fn new(matches: Vec<Match>) -> Self {
        Self { matches }
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        let mut first_error = None;
        for m in &self.matches {
            match m.evaluate(ctx) {
                Ok(false) => return Ok(false),
                Ok(true) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(true), Err)
    }
}

/// Disjunction of AllOfs: true wins over Indeterminate.
#[derive(Debug, Clone)]
pub struct AnyOf {
    all_of: Vec<AllOf>,
}

impl AnyOf {
    pub fn new(all_of: Vec<AllOf>) -> Self {
        Self { all_of }
    }

    pub fn evaluate(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        let mut first_error = None;
        for all_of in &self.all_of {
            match all_of.evaluate(ctx) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(false), Err)
    }
}

/// Applicability test of a rule, policy or policy set. An empty target
/// matches every request.
#[derive(Debug, Clone, Default)]
pub struct Target {
    any_of: Vec<AnyOf>,
}

impl Target {
    pub fn new(any_of: Vec<AnyOf>) -> Self {
        Self { any_of }
    }

    pub fn match_all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.any_of.is_empty()
    }

    /// Conjunction of AnyOfs with false winning over Indeterminate.
    pub fn matches(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        let mut first_error = None;
        for any_of in &self.any_of {
            match any_of.evaluate(ctx) {
                Ok(false) => return Ok(false),
                Ok(true) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(true), Err)
    }
}
