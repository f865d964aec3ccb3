use arbiter_core::{AttributeFqn, IndeterminateError, ValueError};
use thiserror::Error;

use crate::expression::ValueType;

/// Parse-time (configuration) error.
///
/// Raised while loading or compiling a policy document; fatal to loading
/// that document. Runtime failures are `IndeterminateError`s and end up as
/// Indeterminate decisions instead.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("policy load error: {0}")]
    LoadError(String),

    #[error("deserialization error: {0}")]
    DeserializationError(String),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("duplicate function '{0}'")]
    DuplicateFunction(String),

    #[error("function '{0}' requires a sub-function as its first argument")]
    MissingSubFunction(String),

    #[error("function '{function}' expects {expected} arguments, got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },

    #[error("function '{function}' argument {index}: expected {expected}, got {actual}")]
    ArgumentType {
        function: String,
        index: usize,
        expected: ValueType,
        actual: ValueType,
    },

    #[error("function '{function}' cannot take '{sub_function}' as sub-function: {reason}")]
    InvalidSubFunction {
        function: String,
        sub_function: String,
        reason: String,
    },

    #[error("static evaluation of '{function}' failed: {source}")]
    StaticEvaluation {
        function: String,
        #[source]
        source: IndeterminateError,
    },

    #[error("unknown datatype '{0}'")]
    UnknownDatatype(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("cyclic variable reference: {0}")]
    CyclicVariableReference(String),

    #[error("variable '{variable}' exceeds maximum reference depth of {max}")]
    VariableReferenceDepthExceeded { variable: String, max: usize },

    #[error("unknown combining algorithm '{0}'")]
    UnknownCombiningAlgorithm(String),

    #[error("unsupported legacy combining algorithm '{0}'")]
    UnsupportedCombiningAlgorithm(String),

    #[error("combining algorithm '{algorithm}' cannot combine {kind}")]
    AlgorithmNotApplicable {
        algorithm: String,
        kind: &'static str,
    },

    #[error("condition must evaluate to a single boolean, got {0}")]
    NonBooleanCondition(ValueType),

    #[error("condition is always false")]
    ConstantFalseCondition,

    #[error("invalid match with function '{function}': {reason}")]
    InvalidMatch { function: String, reason: String },

    #[error("invalid attribute value: {0}")]
    InvalidValue(#[from] ValueError),

    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("policy set nesting exceeds maximum depth of {0}")]
    PolicySetTooDeep(usize),

    #[error("attribute {0} has more than one provider")]
    DuplicateAttributeProvider(AttributeFqn),

    #[error("invalid attribute selector: {0}")]
    InvalidSelector(String),

    #[error("validation error: {0}")]
    ValidationError(String),
}

pub type PolicyResult<T> = Result<T, PolicyError>;

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::Datatype;

    #[test]
    fn test_policy_error_display() {
        let err = PolicyError::ArgumentType {
            function: "integer-add".into(),
            index: 1,
            expected: ValueType::Primitive(Datatype::Integer),
            actual: ValueType::Bag(Datatype::String),
        };
        assert_eq!(
            err.to_string(),
            "function 'integer-add' argument 1: expected integer, got bag of string"
        );
    }

    #[test]
    fn test_static_evaluation_keeps_source() {
        use std::error::Error as _;
        let err = PolicyError::StaticEvaluation {
            function: "integer-divide".into(),
            source: IndeterminateError::processing("division by zero"),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_error_variants_display_non_empty() {
        let errors = vec![
            PolicyError::LoadError("empty".into()),
            PolicyError::UnknownFunction("f".into()),
            PolicyError::CyclicVariableReference("a -> b -> a".into()),
            PolicyError::UnsupportedCombiningAlgorithm("legacy".into()),
            PolicyError::ConstantFalseCondition,
            PolicyError::PolicySetTooDeep(3),
            PolicyError::DuplicateId {
                kind: "rule",
                id: "r1".into(),
            },
        ];
        for err in errors {
            assert!(!err.to_string().is_empty());
        }
    }
}
