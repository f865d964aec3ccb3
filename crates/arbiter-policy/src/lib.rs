//! Arbiter Policy Engine
//!
//! XACML 3.0 style policy evaluation. A policy document is compiled once
//! into an immutable tree of rules, policies and policy sets; each decision
//! request is then evaluated against it with its own per-request context.
//!
//! Key features:
//! - Typed expression trees with parse-time type checking and static
//!   pre-evaluation of request-independent sub-expressions
//! - Standard function library, including higher-order bag functions
//! - Four-valued decisions with extended Indeterminate {P, D, DP}
//! - deny/permit-overrides, first-applicable, only-one-applicable,
//!   deny-unless-permit and permit-unless-deny combining
//! - Obligations and advice filtered by effect and merged without loss
//! - Per-request attribute cache with pluggable attribute providers
//! - Runtime faults become Indeterminate results and never escape evaluation

pub mod attribute;
pub mod combining;
pub mod compile;
pub mod condition;
pub mod context;
pub mod decision;
pub mod document;
pub mod engine;
pub mod error;
pub mod expression;
pub mod function;
pub mod pep;
pub mod policy;
pub mod provider;
pub mod request;
pub mod rule;
pub mod target;
pub mod variable;

// Re-export primary types for convenience
pub use attribute::{AttributeDesignator, AttributeSelector};
pub use combining::{CombinableKind, CombinerParameter, CombiningAlgorithm};
pub use compile::{CompilerOptions, PolicyCompiler};
pub use condition::Condition;
pub use context::{ContextOptions, EvaluationContext, StandardEnvAttributeSource};
pub use decision::{
    AttributeAssignment, Decidable, Decision, DecisionResult, Effect, PepAction, PepActions, PolicyIdRef, PolicyKind,
};
pub use document::{PolicyDocument, DEFAULT_MAX_DOCUMENT_BYTES};
pub use engine::{AuditSink, DecisionAuditEvent, InMemoryAuditSink, NoopAuditSink, PolicyDecisionPoint};
pub use error::{PolicyError, PolicyResult};
pub use expression::{Apply, Expression, Value, ValueType};
pub use function::{Function, FunctionRegistry, GenericFunctionFactory, Signature};
pub use policy::{Policy, PolicyElement, PolicySet};
pub use provider::{AttributeProvider, AttributeProviderRegistry};
pub use request::{IndividualRequest, RequestAttribute};
pub use rule::Rule;
pub use target::{AllOf, AnyOf, Match, Target};
pub use variable::{VariableDefinition, VariableReference};
