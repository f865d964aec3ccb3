use std::sync::Arc;

use arbiter_core::IndeterminateError;

use crate::combining::{CombinerParameter, CombiningAlgorithm};
use crate::context::EvaluationContext;
use crate::decision::{Decidable, Decision, DecisionResult, PolicyIdRef, PolicyKind};
use crate::pep::PepActionExpressions;
use crate::rule::Rule;
use crate::target::Target;
use crate::variable::VariableDefinition;

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Rules combined by a rule-combining algorithm.
#[derive(Debug, Clone)]
pub struct Policy {
    pub id: String,
    pub version: String,
    pub target: Target,
    /// Definitions in document order. References to them are already
    /// resolved inside the rules; kept for introspection.
    pub variables: Vec<Arc<VariableDefinition>>,
    pub rules: Vec<Rule>,
    pub algorithm: CombiningAlgorithm,
    pub combiner_parameters: Vec<CombinerParameter>,
    pub pep_actions: PepActionExpressions,
}

impl Policy {
    pub fn id_ref(&self) -> PolicyIdRef {
        PolicyIdRef {
            kind: PolicyKind::Policy,
            id: self.id.clone(),
            version: self.version.clone(),
        }
    }
}

impl Decidable for Policy {
    fn evaluate(&self, ctx: &EvaluationContext) -> DecisionResult {
        evaluate_combined(
            self.id_ref(),
            &self.target,
            self.algorithm,
            &self.rules,
            &self.combiner_parameters,
            &self.pep_actions,
            ctx,
        )
    }

    fn is_applicable(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        self.target.matches(ctx)
    }
}

// ---------------------------------------------------------------------------
// PolicySet
// ---------------------------------------------------------------------------

/// Policies and nested policy sets combined by a policy-combining algorithm.
#[derive(Debug, Clone)]
pub struct PolicySet {
    pub id: String,
    pub version: String,
    pub target: Target,
    pub children: Vec<PolicyElement>,
    pub algorithm: CombiningAlgorithm,
    pub combiner_parameters: Vec<CombinerParameter>,
    pub pep_actions: PepActionExpressions,
}

impl PolicySet {
    pub fn id_ref(&self) -> PolicyIdRef {
        PolicyIdRef {
            kind: PolicyKind::PolicySet,
            id: self.id.clone(),
            version: self.version.clone(),
        }
    }
}

impl Decidable for PolicySet {
    fn evaluate(&self, ctx: &EvaluationContext) -> DecisionResult {
        evaluate_combined(
            self.id_ref(),
            &self.target,
            self.algorithm,
            &self.children,
            &self.combiner_parameters,
            &self.pep_actions,
            ctx,
        )
    }

    fn is_applicable(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        self.target.matches(ctx)
    }
}

/// A child of a policy set, or the root of a loaded document.
#[derive(Debug, Clone)]
pub enum PolicyElement {
    Policy(Arc<Policy>),
    PolicySet(Arc<PolicySet>),
}

impl PolicyElement {
    pub fn id_ref(&self) -> PolicyIdRef {
        match self {
            PolicyElement::Policy(p) => p.id_ref(),
            PolicyElement::PolicySet(s) => s.id_ref(),
        }
    }
}

impl Decidable for PolicyElement {
    fn evaluate(&self, ctx: &EvaluationContext) -> DecisionResult {
        match self {
            PolicyElement::Policy(p) => p.evaluate(ctx),
            PolicyElement::PolicySet(s) => s.evaluate(ctx),
        }
    }

    fn is_applicable(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        match self {
            PolicyElement::Policy(p) => p.is_applicable(ctx),
            PolicyElement::PolicySet(s) => s.is_applicable(ctx),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared evaluation
// ---------------------------------------------------------------------------

/// Target, then the combining algorithm over `children`, then this level's
/// PEP actions for the combined effect.
///
/// A non-matching Target returns NotApplicable before any child is touched.
/// An Indeterminate Target still combines the children, then maps the
/// outcome: NotApplicable stays NotApplicable, Permit and Deny become
/// Indeterminate{P} and Indeterminate{D}, and an Indeterminate keeps its
/// extended value.
fn evaluate_combined<D: Decidable>(
    id: PolicyIdRef,
    target: &Target,
    algorithm: CombiningAlgorithm,
    children: &[D],
    params: &[CombinerParameter],
    pep_actions: &PepActionExpressions,
    ctx: &EvaluationContext,
) -> DecisionResult {
    let target_fault = match target.matches(ctx) {
        Ok(true) => None,
        Ok(false) => return DecisionResult::not_applicable(),
        Err(e) => Some(e),
    };

    let mut result = algorithm.combine(children, params, ctx);
    if let Some(fault) = target_fault {
        if !result.is_not_applicable() {
            let extended = match result.decision {
                Decision::Indeterminate => result.extended_indeterminate,
                decision => decision,
            };
            result = rebuild_indeterminate(result, extended, fault.context(format!("target of {}", id)));
        }
    } else if let Some(effect) = result.as_effect() {
        match pep_actions.evaluate(effect, ctx) {
            Ok(actions) => result.pep_actions.merge(actions),
            Err(e) => {
                let status = e.context(format!("obligations of {}", id));
                result = rebuild_indeterminate(result, effect.into(), status);
            }
        }
    }

    if result.is_not_applicable() {
        tracing::debug!(policy = %id, "not applicable");
        return result;
    }
    if let (true, Some(status)) = (result.is_indeterminate(), &result.status) {
        tracing::warn!(
            policy = %id,
            extended = %result.extended_indeterminate,
            status = %status,
            "policy indeterminate"
        );
    } else {
        tracing::debug!(policy = %id, decision = %result.decision, "policy decided");
    }
    result.applicable_policies.insert(0, id);
    result
}

/// Replace `result` with an Indeterminate, keeping the applicable policies
/// collected so far. PEP actions are dropped.
fn rebuild_indeterminate(result: DecisionResult, extended: Decision, status: IndeterminateError) -> DecisionResult {
    let mut indeterminate = DecisionResult::indeterminate(extended, status);
    indeterminate.applicable_policies = result.applicable_policies;
    indeterminate
}
