//! Serializable policy document model.
//!
//! Documents are plain data: datatypes, function and algorithm identifiers
//! stay strings until [`crate::compile::PolicyCompiler`] resolves them.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::decision::Effect;
use crate::error::{PolicyError, PolicyResult};

/// Default limit for a serialized document.
pub const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;

fn default_version() -> String {
    "1.0".to_string()
}

// ---------------------------------------------------------------------------
// Values, designators, selectors
// ---------------------------------------------------------------------------

/// A literal in lexical form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueDoc {
    pub datatype: String,
    pub value: String,
    /// Category of an xpathExpression literal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath_category: Option<String>,
}

impl ValueDoc {
    pub fn new(datatype: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            datatype: datatype.into(),
            value: value.into(),
            xpath_category: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignatorDoc {
    pub category: String,
    pub attribute_id: String,
    pub datatype: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default)]
    pub must_be_present: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorDoc {
    pub category: String,
    /// JSON Pointer into the category's Content.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_selector_id: Option<String>,
    pub datatype: String,
    #[serde(default)]
    pub must_be_present: bool,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExpressionDoc {
    Value(ValueDoc),
    Designator(DesignatorDoc),
    Selector(SelectorDoc),
    Apply(ApplyDoc),
    VariableReference(String),
    /// A function passed to a higher-order function.
    Function(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyDoc {
    pub function_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<ExpressionDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDefinitionDoc {
    pub variable_id: String,
    pub expression: ExpressionDoc,
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// `matchId(value, attribute)` against a designator or a selector; exactly
/// one of the two must be present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDoc {
    pub match_id: String,
    pub value: ValueDoc,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub designator: Option<DesignatorDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<SelectorDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllOfDoc {
    pub matches: Vec<MatchDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnyOfDoc {
    pub all_of: Vec<AllOfDoc>,
}

// ---------------------------------------------------------------------------
// Obligations / advice
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeAssignmentExpressionDoc {
    pub attribute_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    pub expression: ExpressionDoc,
}

/// ObligationExpression or AdviceExpression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PepActionExpressionDoc {
    pub id: String,
    pub applies_to: Effect,
    #[serde(default)]
    pub attribute_assignments: Vec<AttributeAssignmentExpressionDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinerParameterDoc {
    pub parameter_name: String,
    pub value: ValueDoc,
}

// ---------------------------------------------------------------------------
// Rule / Policy / PolicySet
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleDoc {
    pub rule_id: String,
    pub effect: Effect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub target: Vec<AnyOfDoc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<ExpressionDoc>,
    #[serde(default)]
    pub obligation_expressions: Vec<PepActionExpressionDoc>,
    #[serde(default)]
    pub advice_expressions: Vec<PepActionExpressionDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDoc {
    pub policy_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub target: Vec<AnyOfDoc>,
    pub rule_combining_alg_id: String,
    #[serde(default)]
    pub combiner_parameters: Vec<CombinerParameterDoc>,
    #[serde(default)]
    pub variable_definitions: Vec<VariableDefinitionDoc>,
    #[serde(default)]
    pub rules: Vec<RuleDoc>,
    #[serde(default)]
    pub obligation_expressions: Vec<PepActionExpressionDoc>,
    #[serde(default)]
    pub advice_expressions: Vec<PepActionExpressionDoc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySetDoc {
    pub policy_set_id: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub target: Vec<AnyOfDoc>,
    pub policy_combining_alg_id: String,
    #[serde(default)]
    pub combiner_parameters: Vec<CombinerParameterDoc>,
    /// Policies and nested policy sets, in evaluation order.
    #[serde(default)]
    pub children: Vec<PolicyDocument>,
    #[serde(default)]
    pub obligation_expressions: Vec<PepActionExpressionDoc>,
    #[serde(default)]
    pub advice_expressions: Vec<PepActionExpressionDoc>,
}

/// Root of a document: `{"Policy": {...}}` or `{"PolicySet": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PolicyDocument {
    Policy(PolicyDoc),
    PolicySet(PolicySetDoc),
}

impl PolicyDocument {
    pub fn id(&self) -> &str {
        match self {
            PolicyDocument::Policy(p) => &p.policy_id,
            PolicyDocument::PolicySet(s) => &s.policy_set_id,
        }
    }

    /// Parse and validate a JSON document of at most `max_bytes`.
    pub fn from_json(data: &[u8], max_bytes: usize) -> PolicyResult<Self> {
        if data.is_empty() {
            return Err(PolicyError::LoadError("policy data is empty".to_string()));
        }
        if data.len() > max_bytes {
            return Err(PolicyError::LoadError(format!(
                "policy data exceeds {} byte size limit",
                max_bytes
            )));
        }

        let json_str = std::str::from_utf8(data)
            .map_err(|_| PolicyError::LoadError("policy data is not valid UTF-8".to_string()))?;

        let document: PolicyDocument = serde_json::from_str(json_str)
            .map_err(|e| PolicyError::DeserializationError(format!("JSON parse error: {}", e)))?;

        if let Err(errors) = validate_document(&document) {
            return Err(PolicyError::ValidationError(errors.join("; ")));
        }

        Ok(document)
    }

    pub fn to_json_pretty(&self) -> PolicyResult<Vec<u8>> {
        serde_json::to_vec_pretty(self)
            .map_err(|e| PolicyError::DeserializationError(format!("JSON serialize error: {}", e)))
    }
}

// ---------------------------------------------------------------------------
// Structural validation
// ---------------------------------------------------------------------------

/// Structural checks that need no function or datatype resolution. Returns
/// every problem found.
pub fn validate_document(document: &PolicyDocument) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    validate_element(document, &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_element(document: &PolicyDocument, errors: &mut Vec<String>) {
    match document {
        PolicyDocument::Policy(p) => validate_policy(p, errors),
        PolicyDocument::PolicySet(s) => {
            if s.policy_set_id.trim().is_empty() {
                errors.push("policy set id must not be empty".to_string());
            }
            if s.version.trim().is_empty() {
                errors.push(format!("policy set '{}': version must not be empty", s.policy_set_id));
            }
            let owner = format!("policy set '{}'", s.policy_set_id);
            validate_target(&owner, &s.target, errors);
            validate_pep_actions(&owner, &s.obligation_expressions, &s.advice_expressions, errors);
            for child in &s.children {
                validate_element(child, errors);
            }
        }
    }
}

fn validate_policy(policy: &PolicyDoc, errors: &mut Vec<String>) {
    if policy.policy_id.trim().is_empty() {
        errors.push("policy id must not be empty".to_string());
    }
    if policy.version.trim().is_empty() {
        errors.push(format!("policy '{}': version must not be empty", policy.policy_id));
    }
    let owner = format!("policy '{}'", policy.policy_id);
    validate_target(&owner, &policy.target, errors);
    validate_pep_actions(&owner, &policy.obligation_expressions, &policy.advice_expressions, errors);

    let mut variable_ids = HashSet::new();
    for def in &policy.variable_definitions {
        if def.variable_id.trim().is_empty() {
            errors.push(format!("{}: variable id must not be empty", owner));
        }
        if !variable_ids.insert(def.variable_id.as_str()) {
            errors.push(format!("{}: duplicate variable id '{}'", owner, def.variable_id));
        }
    }

    let mut rule_ids = HashSet::new();
    for rule in &policy.rules {
        if rule.rule_id.trim().is_empty() {
            errors.push(format!("{}: rule id must not be empty", owner));
        }
        if !rule_ids.insert(rule.rule_id.as_str()) {
            errors.push(format!("{}: duplicate rule id '{}'", owner, rule.rule_id));
        }
        let rule_owner = format!("rule '{}' of {}", rule.rule_id, owner);
        validate_target(&rule_owner, &rule.target, errors);
        validate_pep_actions(&rule_owner, &rule.obligation_expressions, &rule.advice_expressions, errors);
    }
}

fn validate_target(owner: &str, target: &[AnyOfDoc], errors: &mut Vec<String>) {
    for any_of in target {
        if any_of.all_of.is_empty() {
            errors.push(format!("{}: AnyOf must contain at least one AllOf", owner));
        }
        for all_of in &any_of.all_of {
            if all_of.matches.is_empty() {
                errors.push(format!("{}: AllOf must contain at least one Match", owner));
            }
            for m in &all_of.matches {
                if m.designator.is_some() == m.selector.is_some() {
                    errors.push(format!(
                        "{}: match '{}' needs exactly one of designator or selector",
                        owner, m.match_id
                    ));
                }
            }
        }
    }
}

fn validate_pep_actions(
    owner: &str,
    obligations: &[PepActionExpressionDoc],
    advice: &[PepActionExpressionDoc],
    errors: &mut Vec<String>,
) {
    for action in obligations.iter().chain(advice) {
        if action.id.trim().is_empty() {
            errors.push(format!("{}: obligation/advice id must not be empty", owner));
        }
    }
}
