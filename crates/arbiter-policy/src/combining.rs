use std::fmt;

use arbiter_core::{AttributeValue, IndeterminateError};

use crate::context::EvaluationContext;
use crate::decision::{Decidable, Decision, DecisionResult, Effect, PolicyIdRef};
use crate::error::{PolicyError, PolicyResult};

/// Named parameter passed to a combining algorithm.
///
/// The standard algorithms take no parameters; they are kept on the policy
/// for algorithms that do.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinerParameter {
    pub name: String,
    pub value: AttributeValue,
}

/// What an algorithm combines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombinableKind {
    Rule,
    Policy,
}

impl CombinableKind {
    fn segment(self) -> &'static str {
        match self {
            CombinableKind::Rule => "rule-combining-algorithm",
            CombinableKind::Policy => "policy-combining-algorithm",
        }
    }
}

// ---------------------------------------------------------------------------
// CombiningAlgorithm
// ---------------------------------------------------------------------------

/// Combining algorithm for child decisions.
///
/// Children are always evaluated in declaration order, so the "ordered"
/// variants are the same algorithms. The 1.0/1.1 overrides algorithms are
/// not supported and are rejected when the policy is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CombiningAlgorithm {
    DenyOverrides,
    PermitOverrides,
    FirstApplicable,
    /// Policy sets only; selects by Target applicability.
    OnlyOneApplicable,
    DenyUnlessPermit,
    PermitUnlessDeny,
}

impl CombiningAlgorithm {
    pub fn from_id(id: &str, kind: CombinableKind) -> PolicyResult<Self> {
        let unknown = || PolicyError::UnknownCombiningAlgorithm(id.to_string());
        let rest = id
            .strip_prefix("urn:oasis:names:tc:xacml:")
            .ok_or_else(unknown)?;
        let (version, rest) = rest.split_once(':').ok_or_else(unknown)?;
        let name = rest
            .strip_prefix(kind.segment())
            .and_then(|r| r.strip_prefix(':'))
            .ok_or_else(unknown)?;

        match (version, name) {
            ("1.0", "first-applicable") => Ok(CombiningAlgorithm::FirstApplicable),
            ("1.0", "only-one-applicable") => match kind {
                CombinableKind::Policy => Ok(CombiningAlgorithm::OnlyOneApplicable),
                CombinableKind::Rule => Err(PolicyError::AlgorithmNotApplicable {
                    algorithm: id.to_string(),
                    kind: "rules",
                }),
            },
            ("1.0", "deny-overrides" | "permit-overrides")
            | ("1.1", "ordered-deny-overrides" | "ordered-permit-overrides") => {
                Err(PolicyError::UnsupportedCombiningAlgorithm(id.to_string()))
            }
            ("3.0", "deny-overrides" | "ordered-deny-overrides") => Ok(CombiningAlgorithm::DenyOverrides),
            ("3.0", "permit-overrides" | "ordered-permit-overrides") => Ok(CombiningAlgorithm::PermitOverrides),
            ("3.0", "deny-unless-permit") => Ok(CombiningAlgorithm::DenyUnlessPermit),
            ("3.0", "permit-unless-deny") => Ok(CombiningAlgorithm::PermitUnlessDeny),
            _ => Err(unknown()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CombiningAlgorithm::DenyOverrides => "deny-overrides",
            CombiningAlgorithm::PermitOverrides => "permit-overrides",
            CombiningAlgorithm::FirstApplicable => "first-applicable",
            CombiningAlgorithm::OnlyOneApplicable => "only-one-applicable",
            CombiningAlgorithm::DenyUnlessPermit => "deny-unless-permit",
            CombiningAlgorithm::PermitUnlessDeny => "permit-unless-deny",
        }
    }

    /// Combine the children's decisions. Never fails: faults are folded into
    /// Indeterminate results according to the algorithm.
    ///
    /// None of the standard algorithms reads `params`.
    pub fn combine<D: Decidable>(
        self,
        children: &[D],
        params: &[CombinerParameter],
        ctx: &EvaluationContext,
    ) -> DecisionResult {
        tracing::trace!(algorithm = %self, children = children.len(), parameters = params.len(), "combining");
        match self {
            CombiningAlgorithm::DenyOverrides => overrides(children, ctx, Effect::Deny),
            CombiningAlgorithm::PermitOverrides => overrides(children, ctx, Effect::Permit),
            CombiningAlgorithm::FirstApplicable => first_applicable(children, ctx),
            CombiningAlgorithm::OnlyOneApplicable => only_one_applicable(children, ctx),
            CombiningAlgorithm::DenyUnlessPermit => unless(children, ctx, Effect::Permit),
            CombiningAlgorithm::PermitUnlessDeny => unless(children, ctx, Effect::Deny),
        }
    }
}

impl fmt::Display for CombiningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn opposite(effect: Effect) -> Effect {
    match effect {
        Effect::Permit => Effect::Deny,
        Effect::Deny => Effect::Permit,
    }
}

/// Collects applicable policy ids from every evaluated child, in order.
#[derive(Default)]
struct Applicable(Vec<PolicyIdRef>);

impl Applicable {
    fn take(&mut self, result: &mut DecisionResult) {
        self.0.append(&mut result.applicable_policies);
    }

    fn finish(mut self, mut result: DecisionResult) -> DecisionResult {
        self.0.append(&mut result.applicable_policies);
        result.applicable_policies = self.0;
        result
    }
}

// ---------------------------------------------------------------------------
// Algorithms
// ---------------------------------------------------------------------------

/// deny-overrides / permit-overrides with the extended-Indeterminate rules:
/// the first `winner` result is returned immediately; otherwise
/// Indeterminate{DP}, Indeterminate{winner}, the merged `loser` results,
/// Indeterminate{loser} and NotApplicable are tried in that order.
fn overrides<D: Decidable>(children: &[D], ctx: &EvaluationContext, winner: Effect) -> DecisionResult {
    let loser = opposite(winner);
    let mut applicable = Applicable::default();
    let mut losing: Option<DecisionResult> = None;
    let (mut ind_winner, mut ind_loser, mut ind_both) = (false, false, false);
    let mut first_status: Option<IndeterminateError> = None;

    for child in children {
        let mut result = child.evaluate(ctx);
        if result.decision == Decision::from(winner) {
            return applicable.finish(result);
        }
        applicable.take(&mut result);
        match result.decision {
            Decision::NotApplicable => {}
            Decision::Indeterminate => {
                match result.extended_indeterminate {
                    d if d == Decision::from(winner) => ind_winner = true,
                    d if d == Decision::from(loser) => ind_loser = true,
                    _ => ind_both = true,
                }
                if first_status.is_none() {
                    first_status = result.status.take();
                }
            }
            _ => match losing.as_mut() {
                Some(acc) => acc.merge(result),
                None => losing = Some(result),
            },
        }
    }

    let status = || {
        first_status
            .clone()
            .unwrap_or_else(|| IndeterminateError::processing("child evaluation was indeterminate"))
    };
    let result = if ind_both || (ind_winner && (ind_loser || losing.is_some())) {
        DecisionResult::indeterminate(Decision::Indeterminate, status())
    } else if ind_winner {
        DecisionResult::indeterminate(winner.into(), status())
    } else if let Some(losing) = losing {
        losing
    } else if ind_loser {
        DecisionResult::indeterminate(loser.into(), status())
    } else {
        DecisionResult::not_applicable()
    };
    applicable.finish(result)
}

fn first_applicable<D: Decidable>(children: &[D], ctx: &EvaluationContext) -> DecisionResult {
    let mut applicable = Applicable::default();
    for child in children {
        let mut result = child.evaluate(ctx);
        if !result.is_not_applicable() {
            return applicable.finish(result);
        }
        applicable.take(&mut result);
    }
    applicable.finish(DecisionResult::not_applicable())
}

/// Selects the single child whose Target applies. More than one, or a Target
/// fault, is Indeterminate{DP}.
fn only_one_applicable<D: Decidable>(children: &[D], ctx: &EvaluationContext) -> DecisionResult {
    let mut selected: Option<&D> = None;
    for child in children {
        match child.is_applicable(ctx) {
            Err(e) => {
                return DecisionResult::indeterminate(
                    Decision::Indeterminate,
                    e.context("only-one-applicable target"),
                )
            }
            Ok(false) => {}
            Ok(true) if selected.is_some() => {
                return DecisionResult::indeterminate(
                    Decision::Indeterminate,
                    IndeterminateError::processing("only-one-applicable: more than one applicable policy"),
                )
            }
            Ok(true) => selected = Some(child),
        }
    }
    match selected {
        Some(child) => child.evaluate(ctx),
        None => DecisionResult::not_applicable(),
    }
}

/// deny-unless-permit / permit-unless-deny: the first `winner` result is
/// returned; otherwise the opposite effect with the merged PEP actions of the
/// children that reached it. Never NotApplicable or Indeterminate.
fn unless<D: Decidable>(children: &[D], ctx: &EvaluationContext, winner: Effect) -> DecisionResult {
    let loser = opposite(winner);
    let mut applicable = Applicable::default();
    let mut fallback = DecisionResult::effect(loser, Default::default());
    for child in children {
        let mut result = child.evaluate(ctx);
        if result.decision == Decision::from(winner) {
            return applicable.finish(result);
        }
        applicable.take(&mut result);
        if result.decision == Decision::from(loser) {
            fallback.merge(result);
        }
    }
    applicable.finish(fallback)
}
