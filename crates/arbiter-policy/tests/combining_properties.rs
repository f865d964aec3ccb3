//! Property-based tests for the combining algorithms.
//!
//! Children are generated as fixed outcomes so that each algorithm is
//! checked against its decision table independently of expression
//! evaluation.

use arbiter_core::IndeterminateError;
use arbiter_policy::{
    CombiningAlgorithm, ContextOptions, Decidable, Decision, DecisionResult, Effect, EvaluationContext,
    IndividualRequest, PepAction, PepActions,
};
use proptest::prelude::*;

// =============================================================================
// Test children
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Permit,
    Deny,
    NotApplicable,
    IndP,
    IndD,
    IndDP,
}

struct Leaf(Outcome);

impl Leaf {
    fn result(&self) -> DecisionResult {
        // every Permit/Deny child carries exactly one obligation
        let actions = |id: &str| PepActions {
            obligations: vec![PepAction {
                id: id.to_string(),
                assignments: Vec::new(),
            }],
            advice: Vec::new(),
        };
        let fault = || IndeterminateError::processing("leaf fault");
        match self.0 {
            Outcome::Permit => DecisionResult::effect(Effect::Permit, actions("on-permit")),
            Outcome::Deny => DecisionResult::effect(Effect::Deny, actions("on-deny")),
            Outcome::NotApplicable => DecisionResult::not_applicable(),
            Outcome::IndP => DecisionResult::indeterminate(Decision::Permit, fault()),
            Outcome::IndD => DecisionResult::indeterminate(Decision::Deny, fault()),
            Outcome::IndDP => DecisionResult::indeterminate(Decision::Indeterminate, fault()),
        }
    }
}

impl Decidable for Leaf {
    fn evaluate(&self, _ctx: &EvaluationContext) -> DecisionResult {
        self.result()
    }

    fn is_applicable(&self, _ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        Ok(self.0 != Outcome::NotApplicable)
    }
}

fn ctx() -> EvaluationContext {
    EvaluationContext::new(&IndividualRequest::default(), &ContextOptions::default()).unwrap()
}

fn combine(algorithm: CombiningAlgorithm, outcomes: &[Outcome]) -> DecisionResult {
    let children: Vec<Leaf> = outcomes.iter().copied().map(Leaf).collect();
    algorithm.combine(&children, &[], &ctx())
}

// =============================================================================
// Strategies
// =============================================================================

fn arb_outcome() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::Permit),
        Just(Outcome::Deny),
        Just(Outcome::NotApplicable),
        Just(Outcome::IndP),
        Just(Outcome::IndD),
        Just(Outcome::IndDP),
    ]
}

fn arb_algorithm() -> impl Strategy<Value = CombiningAlgorithm> {
    prop_oneof![
        Just(CombiningAlgorithm::DenyOverrides),
        Just(CombiningAlgorithm::PermitOverrides),
        Just(CombiningAlgorithm::FirstApplicable),
        Just(CombiningAlgorithm::OnlyOneApplicable),
        Just(CombiningAlgorithm::DenyUnlessPermit),
        Just(CombiningAlgorithm::PermitUnlessDeny),
    ]
}

fn arb_children() -> impl Strategy<Value = Vec<Outcome>> {
    prop::collection::vec(arb_outcome(), 0..12)
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Invariant: the "unless" algorithms always produce Permit or Deny.
    #[test]
    fn prop_unless_algorithms_are_total(outcomes in arb_children()) {
        for algorithm in [CombiningAlgorithm::DenyUnlessPermit, CombiningAlgorithm::PermitUnlessDeny] {
            let result = combine(algorithm, &outcomes);
            prop_assert!(matches!(result.decision, Decision::Permit | Decision::Deny));
            prop_assert!(result.status.is_none());
        }
    }

    /// Invariant: any Deny child makes deny-overrides Deny.
    #[test]
    fn prop_deny_overrides_dominance(outcomes in arb_children()) {
        let result = combine(CombiningAlgorithm::DenyOverrides, &outcomes);
        if outcomes.contains(&Outcome::Deny) {
            prop_assert_eq!(result.decision, Decision::Deny);
        } else {
            prop_assert_ne!(result.decision, Decision::Deny);
        }
    }

    /// Invariant: any Permit child makes permit-overrides Permit.
    #[test]
    fn prop_permit_overrides_dominance(outcomes in arb_children()) {
        let result = combine(CombiningAlgorithm::PermitOverrides, &outcomes);
        if outcomes.contains(&Outcome::Permit) {
            prop_assert_eq!(result.decision, Decision::Permit);
        } else {
            prop_assert_ne!(result.decision, Decision::Permit);
        }
    }

    /// Invariant: without a Deny, deny-overrides is Indeterminate{DP} exactly
    /// when an Indeterminate{D} meets a Permit or an Indeterminate{P}, or an
    /// Indeterminate{DP} is present.
    #[test]
    fn prop_deny_overrides_extended_indeterminate(outcomes in arb_children()) {
        prop_assume!(!outcomes.contains(&Outcome::Deny));
        let has = |o| outcomes.contains(&o);
        let result = combine(CombiningAlgorithm::DenyOverrides, &outcomes);
        let expected = if has(Outcome::IndDP) || (has(Outcome::IndD) && (has(Outcome::IndP) || has(Outcome::Permit))) {
            (Decision::Indeterminate, Decision::Indeterminate)
        } else if has(Outcome::IndD) {
            (Decision::Indeterminate, Decision::Deny)
        } else if has(Outcome::Permit) {
            (Decision::Permit, Decision::NotApplicable)
        } else if has(Outcome::IndP) {
            (Decision::Indeterminate, Decision::Permit)
        } else {
            (Decision::NotApplicable, Decision::NotApplicable)
        };
        prop_assert_eq!((result.decision, result.extended_indeterminate), expected);
    }

    /// Invariant: first-applicable returns the first child that is not
    /// NotApplicable.
    #[test]
    fn prop_first_applicable(outcomes in arb_children()) {
        let result = combine(CombiningAlgorithm::FirstApplicable, &outcomes);
        match outcomes.iter().find(|o| **o != Outcome::NotApplicable) {
            Some(first) => prop_assert_eq!(result, Leaf(*first).result()),
            None => prop_assert!(result.is_not_applicable()),
        }
    }

    /// Invariant: only-one-applicable is Indeterminate{DP} when more than one
    /// child applies.
    #[test]
    fn prop_only_one_applicable(outcomes in arb_children()) {
        let applicable = outcomes.iter().filter(|o| **o != Outcome::NotApplicable).count();
        let result = combine(CombiningAlgorithm::OnlyOneApplicable, &outcomes);
        match applicable {
            0 => prop_assert!(result.is_not_applicable()),
            1 => prop_assert_ne!(result.decision, Decision::NotApplicable),
            _ => prop_assert_eq!(
                (result.decision, result.extended_indeterminate),
                (Decision::Indeterminate, Decision::Indeterminate)
            ),
        }
    }

    /// Invariant: obligations are only attached to Permit or Deny and come
    /// from children with that same decision; none are lost when merging.
    #[test]
    fn prop_obligations_follow_decision(algorithm in arb_algorithm(), outcomes in arb_children()) {
        let result = combine(algorithm, &outcomes);
        match result.decision {
            Decision::Permit | Decision::Deny => {
                let expected_id = if result.decision == Decision::Permit { "on-permit" } else { "on-deny" };
                prop_assert!(result.pep_actions.obligations.iter().all(|o| o.id == expected_id));
            }
            _ => prop_assert!(result.pep_actions.is_empty()),
        }
        if algorithm == CombiningAlgorithm::PermitUnlessDeny && result.decision == Decision::Permit {
            let permits = outcomes.iter().filter(|o| **o == Outcome::Permit).count();
            prop_assert_eq!(result.pep_actions.obligations.len(), permits);
        }
    }

    /// Invariant: the same children always combine to the same result.
    #[test]
    fn prop_determinism(algorithm in arb_algorithm(), outcomes in arb_children()) {
        prop_assert_eq!(combine(algorithm, &outcomes), combine(algorithm, &outcomes));
    }
}
