//! Compiles a [`PolicyDocument`] into immutable evaluators.
//!
//! Every parse-time check happens here: function resolution and argument
//! typing, static pre-evaluation, variable cycles and reference depth,
//! constant-false conditions, combining algorithm resolution and nesting
//! limits. A compiled tree never fails to evaluate; it only produces
//! Indeterminate results.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use arbiter_core::{AttributeFqn, AttributeValue, Datatype};

use crate::attribute::{AttributeDesignator, AttributeSelector};
use crate::combining::{CombinableKind, CombinerParameter, CombiningAlgorithm};
use crate::condition::Condition;
use crate::decision::PolicyKind;
use crate::document::{
    AnyOfDoc, ApplyDoc, CombinerParameterDoc, DesignatorDoc, ExpressionDoc, MatchDoc, PepActionExpressionDoc,
    PolicyDoc, PolicyDocument, RuleDoc, SelectorDoc, ValueDoc, VariableDefinitionDoc,
};
use crate::error::{PolicyError, PolicyResult};
use crate::expression::{Expression, FunctionRef};
use crate::function::FunctionRegistry;
use crate::pep::{AttributeAssignmentExpression, PepActionExpression, PepActionExpressions};
use crate::policy::{Policy, PolicyElement, PolicySet};
use crate::rule::Rule;
use crate::target::{AllOf, AnyOf, Match, Target};
use crate::variable::{VariableDefinition, VariableReference};

pub const DEFAULT_MAX_VARIABLE_REFERENCE_DEPTH: usize = 10;
pub const DEFAULT_MAX_POLICY_SET_DEPTH: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Longest allowed chain of variable references.
    pub max_variable_reference_depth: usize,
    /// Maximum nesting of policy sets, the root counting as one.
    pub max_policy_set_depth: usize,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_variable_reference_depth: DEFAULT_MAX_VARIABLE_REFERENCE_DEPTH,
            max_policy_set_depth: DEFAULT_MAX_POLICY_SET_DEPTH,
        }
    }
}

pub fn parse_datatype(uri: &str) -> PolicyResult<Datatype> {
    Datatype::from_uri(uri).ok_or_else(|| PolicyError::UnknownDatatype(uri.to_string()))
}

pub fn parse_value(doc: &ValueDoc) -> PolicyResult<AttributeValue> {
    let datatype = parse_datatype(&doc.datatype)?;
    if datatype == Datatype::XPathExpression {
        let category = doc.xpath_category.as_deref().unwrap_or_default();
        return Ok(AttributeValue::parse_xpath(&doc.value, category));
    }
    Ok(AttributeValue::parse(datatype, &doc.value)?)
}

// ---------------------------------------------------------------------------
// Variable scope
// ---------------------------------------------------------------------------

/// Variable definitions of one policy while it is being compiled.
struct VariableScope<'d> {
    policy_id: &'d str,
    docs: HashMap<&'d str, &'d ExpressionDoc>,
    compiled: HashMap<&'d str, Arc<VariableDefinition>>,
    /// Definitions currently being compiled, outermost first.
    in_progress: Vec<&'d str>,
    /// Longest reference chain seen so far in each definition in progress.
    chains: Vec<usize>,
    max_depth: usize,
}

impl<'d> VariableScope<'d> {
    fn new(policy_id: &'d str, definitions: &'d [VariableDefinitionDoc], max_depth: usize) -> PolicyResult<Self> {
        let mut docs = HashMap::new();
        for def in definitions {
            if docs.insert(def.variable_id.as_str(), &def.expression).is_some() {
                return Err(PolicyError::DuplicateId {
                    kind: "variable",
                    id: def.variable_id.clone(),
                });
            }
        }
        Ok(Self {
            policy_id,
            docs,
            compiled: HashMap::new(),
            in_progress: Vec::new(),
            chains: Vec::new(),
            max_depth,
        })
    }

    /// Scope without definitions, for policy sets.
    fn empty(owner_id: &'d str, max_depth: usize) -> Self {
        Self {
            policy_id: owner_id,
            docs: HashMap::new(),
            compiled: HashMap::new(),
            in_progress: Vec::new(),
            chains: Vec::new(),
            max_depth,
        }
    }

    fn depth_exceeded(&self, variable: &str) -> PolicyError {
        PolicyError::VariableReferenceDepthExceeded {
            variable: variable.to_string(),
            max: self.max_depth,
        }
    }
}

// ---------------------------------------------------------------------------
// PolicyCompiler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PolicyCompiler {
    registry: Arc<FunctionRegistry>,
    options: CompilerOptions,
}

impl PolicyCompiler {
    pub fn new(registry: Arc<FunctionRegistry>, options: CompilerOptions) -> Self {
        Self { registry, options }
    }

    /// Compiler over the standard function library with default limits.
    pub fn standard() -> Self {
        Self::new(Arc::new(FunctionRegistry::standard()), CompilerOptions::default())
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn compile(&self, document: &PolicyDocument) -> PolicyResult<PolicyElement> {
        let mut seen = HashSet::new();
        let root = self.compile_element(document, 0, &mut seen)?;
        tracing::info!(root = %root.id_ref(), elements = seen.len(), "policy document compiled");
        Ok(root)
    }

    fn compile_element(
        &self,
        document: &PolicyDocument,
        depth: usize,
        seen: &mut HashSet<(PolicyKind, String)>,
    ) -> PolicyResult<PolicyElement> {
        match document {
            PolicyDocument::Policy(doc) => Ok(PolicyElement::Policy(Arc::new(self.compile_policy(doc, seen)?))),
            PolicyDocument::PolicySet(doc) => {
                let depth = depth + 1;
                if depth > self.options.max_policy_set_depth {
                    return Err(PolicyError::PolicySetTooDeep(self.options.max_policy_set_depth));
                }
                register(seen, PolicyKind::PolicySet, &doc.policy_set_id)?;
                let algorithm = CombiningAlgorithm::from_id(&doc.policy_combining_alg_id, CombinableKind::Policy)?;
                let children = doc
                    .children
                    .iter()
                    .map(|child| self.compile_element(child, depth, seen))
                    .collect::<PolicyResult<Vec<_>>>()?;
                let mut scope = VariableScope::empty(&doc.policy_set_id, self.options.max_variable_reference_depth);
                let set = PolicySet {
                    id: doc.policy_set_id.clone(),
                    version: doc.version.clone(),
                    target: self.compile_target(&doc.target)?,
                    children,
                    algorithm,
                    combiner_parameters: compile_combiner_parameters(&doc.combiner_parameters)?,
                    pep_actions: self.compile_pep_actions(
                        &doc.obligation_expressions,
                        &doc.advice_expressions,
                        &mut scope,
                    )?,
                };
                tracing::debug!(policy_set = %set.id, children = set.children.len(), %algorithm, "policy set compiled");
                Ok(PolicyElement::PolicySet(Arc::new(set)))
            }
        }
    }

    fn compile_policy(&self, doc: &PolicyDoc, seen: &mut HashSet<(PolicyKind, String)>) -> PolicyResult<Policy> {
        register(seen, PolicyKind::Policy, &doc.policy_id)?;
        let algorithm = CombiningAlgorithm::from_id(&doc.rule_combining_alg_id, CombinableKind::Rule)?;
        let mut scope = VariableScope::new(
            &doc.policy_id,
            &doc.variable_definitions,
            self.options.max_variable_reference_depth,
        )?;

        // Definitions are compiled even when unreferenced so that cycles and
        // bad expressions are reported.
        let variables = doc
            .variable_definitions
            .iter()
            .map(|def| self.define_variable(&def.variable_id, &mut scope))
            .collect::<PolicyResult<Vec<_>>>()?;

        let mut rule_ids = HashSet::new();
        let mut rules = Vec::with_capacity(doc.rules.len());
        for rule in &doc.rules {
            if !rule_ids.insert(rule.rule_id.as_str()) {
                return Err(PolicyError::DuplicateId {
                    kind: "rule",
                    id: rule.rule_id.clone(),
                });
            }
            let compiled = self.compile_rule(rule, &mut scope).map_err(|e| {
                tracing::warn!(policy = %doc.policy_id, rule = %rule.rule_id, error = %e, "rule rejected");
                e
            })?;
            rules.push(compiled);
        }

        let pep_actions = self.compile_pep_actions(&doc.obligation_expressions, &doc.advice_expressions, &mut scope)?;
        let policy = Policy {
            id: doc.policy_id.clone(),
            version: doc.version.clone(),
            target: self.compile_target(&doc.target)?,
            variables,
            rules,
            algorithm,
            combiner_parameters: compile_combiner_parameters(&doc.combiner_parameters)?,
            pep_actions,
        };
        tracing::debug!(policy = %policy.id, rules = policy.rules.len(), %algorithm, "policy compiled");
        Ok(policy)
    }

    fn compile_rule<'d>(&self, doc: &'d RuleDoc, scope: &mut VariableScope<'d>) -> PolicyResult<Rule> {
        let condition = match &doc.condition {
            Some(expression) => Condition::new(self.compile_value_expression(expression, scope)?)?,
            None => Condition::AlwaysTrue,
        };
        Ok(Rule {
            id: doc.rule_id.clone(),
            effect: doc.effect,
            target: self.compile_target(&doc.target)?,
            condition,
            pep_actions: self.compile_pep_actions(&doc.obligation_expressions, &doc.advice_expressions, scope)?,
        })
    }

    // -----------------------------------------------------------------------
    // Target
    // -----------------------------------------------------------------------

    fn compile_target(&self, any_ofs: &[AnyOfDoc]) -> PolicyResult<Target> {
        let any_ofs = any_ofs
            .iter()
            .map(|any_of| {
                let all_ofs = any_of
                    .all_of
                    .iter()
                    .map(|all_of| {
                        let matches = all_of
                            .matches
                            .iter()
                            .map(|m| self.compile_match(m))
                            .collect::<PolicyResult<Vec<_>>>()?;
                        Ok(AllOf::new(matches))
                    })
                    .collect::<PolicyResult<Vec<_>>>()?;
                Ok(AnyOf::new(all_ofs))
            })
            .collect::<PolicyResult<Vec<_>>>()?;
        Ok(Target::new(any_ofs))
    }

    fn compile_match(&self, doc: &MatchDoc) -> PolicyResult<Match> {
        let function = self.registry.resolve(&doc.match_id, None)?;
        let value = parse_value(&doc.value)?;
        let source = match (&doc.designator, &doc.selector) {
            (Some(designator), None) => Expression::Designator(compile_designator(designator)?),
            (None, Some(selector)) => Expression::Selector(compile_selector(selector)?),
            _ => {
                return Err(PolicyError::InvalidMatch {
                    function: doc.match_id.clone(),
                    reason: "needs exactly one of designator or selector".into(),
                })
            }
        };
        Match::new(function, value, source)
    }

    // -----------------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------------

    /// An expression in a value position, where a bare function is not
    /// allowed.
    fn compile_value_expression<'d>(
        &self,
        doc: &'d ExpressionDoc,
        scope: &mut VariableScope<'d>,
    ) -> PolicyResult<Expression> {
        if let ExpressionDoc::Function(id) = doc {
            return Err(PolicyError::ValidationError(format!(
                "function '{}' can only be the first argument of a higher-order function",
                id
            )));
        }
        self.compile_expression(doc, scope)
    }

    fn compile_expression<'d>(&self, doc: &'d ExpressionDoc, scope: &mut VariableScope<'d>) -> PolicyResult<Expression> {
        match doc {
            ExpressionDoc::Value(value) => Ok(Expression::constant(parse_value(value)?)),
            ExpressionDoc::Designator(designator) => Ok(Expression::Designator(compile_designator(designator)?)),
            ExpressionDoc::Selector(selector) => Ok(Expression::Selector(compile_selector(selector)?)),
            ExpressionDoc::Apply(apply) => self.compile_apply(apply, scope),
            ExpressionDoc::VariableReference(id) => {
                let definition = self.reference_variable(id, scope)?;
                Ok(Expression::VariableRef(VariableReference::new(definition)))
            }
            ExpressionDoc::Function(id) => Ok(Expression::Function(FunctionRef(self.registry.resolve(id, None)?))),
        }
    }

    fn compile_apply<'d>(&self, doc: &'d ApplyDoc, scope: &mut VariableScope<'d>) -> PolicyResult<Expression> {
        let args = doc
            .arguments
            .iter()
            .map(|arg| self.compile_expression(arg, scope))
            .collect::<PolicyResult<Vec<_>>>()?;
        let sub_function_return = args.first().and_then(Expression::as_function).map(|f| f.return_type());
        let function = self.registry.resolve(&doc.function_id, sub_function_return)?;
        Expression::apply(function, args)
    }

    // -----------------------------------------------------------------------
    // Variables
    // -----------------------------------------------------------------------

    /// Compile a definition once; later calls return the shared instance.
    fn define_variable<'d>(&self, id: &'d str, scope: &mut VariableScope<'d>) -> PolicyResult<Arc<VariableDefinition>> {
        if let Some(definition) = scope.compiled.get(id) {
            return Ok(Arc::clone(definition));
        }
        if let Some(start) = scope.in_progress.iter().position(|v| *v == id) {
            let mut cycle = scope.in_progress[start..].to_vec();
            cycle.push(id);
            return Err(PolicyError::CyclicVariableReference(cycle.join(" -> ")));
        }
        let doc = *scope
            .docs
            .get(id)
            .ok_or_else(|| PolicyError::UnknownVariable(id.to_string()))?;
        if scope.in_progress.len() >= scope.max_depth {
            return Err(scope.depth_exceeded(id));
        }

        scope.in_progress.push(id);
        scope.chains.push(0);
        let expression = self.compile_value_expression(doc, scope);
        let longest_chain = scope.chains.pop().unwrap_or_default();
        scope.in_progress.pop();

        let definition = Arc::new(VariableDefinition::new(scope.policy_id, id, expression?, longest_chain));
        scope.compiled.insert(id, Arc::clone(&definition));
        Ok(definition)
    }

    fn reference_variable<'d>(
        &self,
        id: &'d str,
        scope: &mut VariableScope<'d>,
    ) -> PolicyResult<Arc<VariableDefinition>> {
        let definition = self.define_variable(id, scope)?;
        let chain = definition.longest_chain + 1;
        if chain > scope.max_depth {
            return Err(scope.depth_exceeded(id));
        }
        if let Some(longest) = scope.chains.last_mut() {
            *longest = (*longest).max(chain);
        }
        Ok(definition)
    }

    // -----------------------------------------------------------------------
    // Obligations / advice
    // -----------------------------------------------------------------------

    fn compile_pep_actions<'d>(
        &self,
        obligations: &'d [PepActionExpressionDoc],
        advice: &'d [PepActionExpressionDoc],
        scope: &mut VariableScope<'d>,
    ) -> PolicyResult<PepActionExpressions> {
        let mut compile_all = |docs: &'d [PepActionExpressionDoc]| {
            docs.iter()
                .map(|doc| self.compile_pep_action(doc, scope))
                .collect::<PolicyResult<Vec<_>>>()
        };
        let obligations = compile_all(obligations)?;
        let advice = compile_all(advice)?;
        Ok(PepActionExpressions { obligations, advice })
    }

    fn compile_pep_action<'d>(
        &self,
        doc: &'d PepActionExpressionDoc,
        scope: &mut VariableScope<'d>,
    ) -> PolicyResult<PepActionExpression> {
        let assignments = doc
            .attribute_assignments
            .iter()
            .map(|assignment| {
                Ok(AttributeAssignmentExpression {
                    attribute_id: assignment.attribute_id.clone(),
                    category: assignment.category.clone(),
                    issuer: assignment.issuer.clone(),
                    expression: self.compile_value_expression(&assignment.expression, scope)?,
                })
            })
            .collect::<PolicyResult<Vec<_>>>()?;
        Ok(PepActionExpression {
            id: doc.id.clone(),
            applies_to: doc.applies_to,
            assignments,
        })
    }
}

fn register(seen: &mut HashSet<(PolicyKind, String)>, kind: PolicyKind, id: &str) -> PolicyResult<()> {
    if seen.insert((kind, id.to_string())) {
        return Ok(());
    }
    Err(PolicyError::DuplicateId {
        kind: match kind {
            PolicyKind::Policy => "policy",
            PolicyKind::PolicySet => "policy set",
        },
        id: id.to_string(),
    })
}

fn compile_designator(doc: &DesignatorDoc) -> PolicyResult<AttributeDesignator> {
    let mut fqn = AttributeFqn::new(doc.category.clone(), doc.attribute_id.clone());
    if let Some(issuer) = &doc.issuer {
        fqn = fqn.with_issuer(issuer.clone());
    }
    Ok(AttributeDesignator::new(
        fqn,
        parse_datatype(&doc.datatype)?,
        doc.must_be_present,
    ))
}

fn compile_selector(doc: &SelectorDoc) -> PolicyResult<AttributeSelector> {
    if !doc.path.is_empty() && !doc.path.starts_with('/') {
        return Err(PolicyError::InvalidSelector(format!(
            "path '{}' is not a JSON Pointer",
            doc.path
        )));
    }
    Ok(AttributeSelector {
        category: doc.category.clone(),
        path: doc.path.clone(),
        context_selector_id: doc.context_selector_id.clone(),
        datatype: parse_datatype(&doc.datatype)?,
        must_be_present: doc.must_be_present,
    })
}

fn compile_combiner_parameters(docs: &[CombinerParameterDoc]) -> PolicyResult<Vec<CombinerParameter>> {
    docs.iter()
        .map(|doc| {
            Ok(CombinerParameter {
                name: doc.parameter_name.clone(),
                value: parse_value(&doc.value)?,
            })
        })
        .collect()
}
