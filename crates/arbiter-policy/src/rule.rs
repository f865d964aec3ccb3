use arbiter_core::IndeterminateError;

use crate::condition::Condition;
use crate::context::EvaluationContext;
use crate::decision::{Decidable, Decision, DecisionResult, Effect};
use crate::pep::PepActionExpressions;
use crate::target::Target;

/// A rule: Target, Condition, Effect and PEP action expressions.
#[derive(Debug, Clone)]
pub struct Rule {
    pub id: String,
    pub effect: Effect,
    pub target: Target,
    pub condition: Condition,
    pub pep_actions: PepActionExpressions,
}

impl Rule {
    fn indeterminate(&self, stage: &str, err: IndeterminateError) -> DecisionResult {
        tracing::debug!(rule = %self.id, stage, error = %err, "rule indeterminate");
        DecisionResult::indeterminate(
            Decision::from(self.effect),
            err.context(format!("rule {} {}", self.id, stage)),
        )
    }
}

impl Decidable for Rule {
    /// Target, then Condition, then PEP actions for the rule's effect.
    /// Any fault yields Indeterminate extended with the rule's effect.
    fn evaluate(&self, ctx: &EvaluationContext) -> DecisionResult {
        match self.target.matches(ctx) {
            Ok(true) => {}
            Ok(false) => return DecisionResult::not_applicable(),
            Err(e) => return self.indeterminate("target", e),
        }
        match self.condition.evaluate(ctx) {
            Ok(true) => {}
            Ok(false) => return DecisionResult::not_applicable(),
            Err(e) => return self.indeterminate("condition", e),
        }
        match self.pep_actions.evaluate(self.effect, ctx) {
            Ok(actions) => {
                tracing::trace!(rule = %self.id, effect = %self.effect, "rule applies");
                DecisionResult::effect(self.effect, actions)
            }
            Err(e) => self.indeterminate("obligations", e),
        }
    }

    fn is_applicable(&self, ctx: &EvaluationContext) -> Result<bool, IndeterminateError> {
        self.target.matches(ctx)
    }
}
