use std::fmt;

use arbiter_core::{AttributeValue, IndeterminateError};
use serde::{Deserialize, Serialize};

use crate::context::EvaluationContext;

// ---------------------------------------------------------------------------
// Effect / Decision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    Permit,
    Deny,
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Effect::Permit => write!(f, "Permit"),
            Effect::Deny => write!(f, "Deny"),
        }
    }
}

/// Authorization decision.
///
/// Also used for the extended-Indeterminate classification, where `Permit`
/// stands for Indeterminate{P}, `Deny` for Indeterminate{D},
/// `Indeterminate` for Indeterminate{DP} and `NotApplicable` for none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Permit,
    Deny,
    NotApplicable,
    Indeterminate,
}

impl From<Effect> for Decision {
    fn from(effect: Effect) -> Self {
        match effect {
            Effect::Permit => Decision::Permit,
            Effect::Deny => Decision::Deny,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Permit => write!(f, "Permit"),
            Decision::Deny => write!(f, "Deny"),
            Decision::NotApplicable => write!(f, "NotApplicable"),
            Decision::Indeterminate => write!(f, "Indeterminate"),
        }
    }
}

// ---------------------------------------------------------------------------
// PEP actions — obligations and advice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeAssignment {
    pub attribute_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    pub value: AttributeValue,
}

/// An obligation or advice to be handled by the enforcement point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PepAction {
    pub id: String,
    pub assignments: Vec<AttributeAssignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PepActions {
    pub obligations: Vec<PepAction>,
    pub advice: Vec<PepAction>,
}

impl PepActions {
    pub fn is_empty(&self) -> bool {
        self.obligations.is_empty() && self.advice.is_empty()
    }

    /// Append `other`'s actions after ours.
    pub fn merge(&mut self, other: PepActions) {
        self.obligations.extend(other.obligations);
        self.advice.extend(other.advice);
    }
}

// ---------------------------------------------------------------------------
// PolicyIdRef
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PolicyKind {
    Policy,
    PolicySet,
}

/// Identifies a policy or policy set that contributed to a decision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyIdRef {
    pub kind: PolicyKind,
    pub id: String,
    pub version: String,
}

impl fmt::Display for PolicyIdRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

// ---------------------------------------------------------------------------
// DecisionResult
// ---------------------------------------------------------------------------

/// Outcome of evaluating a rule, policy or policy set.
///
/// Obligations and advice are only ever attached to Permit or Deny; an
/// Indeterminate result carries the fault that caused it in `status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResult {
    pub decision: Decision,
    pub extended_indeterminate: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IndeterminateError>,
    #[serde(skip_serializing_if = "PepActions::is_empty")]
    pub pep_actions: PepActions,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applicable_policies: Vec<PolicyIdRef>,
}

impl DecisionResult {
    pub fn not_applicable() -> Self {
        Self {
            decision: Decision::NotApplicable,
            extended_indeterminate: Decision::NotApplicable,
            status: None,
            pep_actions: PepActions::default(),
            applicable_policies: Vec::new(),
        }
    }

    pub fn effect(effect: Effect, pep_actions: PepActions) -> Self {
        Self {
            decision: effect.into(),
            extended_indeterminate: Decision::NotApplicable,
            status: None,
            pep_actions,
            applicable_policies: Vec::new(),
        }
    }

    pub fn permit() -> Self {
        Self::effect(Effect::Permit, PepActions::default())
    }

    pub fn deny() -> Self {
        Self::effect(Effect::Deny, PepActions::default())
    }

    /// Indeterminate result. `extended` names the decision that could have
    /// been reached: Permit, Deny, or Indeterminate for either.
    pub fn indeterminate(extended: Decision, status: IndeterminateError) -> Self {
        let extended = match extended {
            Decision::NotApplicable => Decision::Indeterminate,
            other => other,
        };
        Self {
            decision: Decision::Indeterminate,
            extended_indeterminate: extended,
            status: Some(status),
            pep_actions: PepActions::default(),
            applicable_policies: Vec::new(),
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.decision == Decision::Indeterminate
    }

    pub fn is_not_applicable(&self) -> bool {
        self.decision == Decision::NotApplicable
    }

    /// The effect of a Permit or Deny result.
    pub fn as_effect(&self) -> Option<Effect> {
        match self.decision {
            Decision::Permit => Some(Effect::Permit),
            Decision::Deny => Some(Effect::Deny),
            _ => None,
        }
    }

    /// Fold another result with the same decision into this one: PEP actions
    /// and applicable policies are appended, never overwritten.
    pub fn merge(&mut self, other: DecisionResult) {
        if self.decision == other.decision && self.as_effect().is_some() {
            self.pep_actions.merge(other.pep_actions);
        }
        self.applicable_policies.extend(other.applicable_policies);
    }
}

// ---------------------------------------------------------------------------
// Decidable — the unit combining algorithms work over
// ---------------------------------------------------------------------------

/// A rule, policy or policy set.
pub trait Decidable: Send + Sync {
    /// Evaluate to a decision. Runtime faults become Indeterminate results;
    /// this never fails.
    fn evaluate(&self, ctx: &EvaluationContext) -> DecisionResult;

    /// Whether the Target applies, without evaluating anything else.
    fn is_applicable(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError>;
}

impl<T: Decidable + ?Sized> Decidable for std::sync::Arc<T> {
    fn evaluate(&self, ctx: &EvaluationContext) -> DecisionResult {
        (**self).evaluate(ctx)
    }

    fn is_applicable(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        (**self).is_applicable(ctx)
    }
}
