//! End-to-end evaluation scenarios against a compiled policy document.
//!
//! A small hospital policy: record owners may read their own records,
//! doctors (per an external directory) may read any record, everyone else is
//! denied, and an emergency lockdown denies everything.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arbiter_core::{attribute_id, category, AttributeFqn, AttributeValue, Bag, Datatype, IndeterminateError, StatusCode};
use arbiter_policy::{
    AttributeProvider, AttributeProviderRegistry, ContextOptions, Decision, EvaluationContext, IndividualRequest,
    InMemoryAuditSink, PolicyCompiler, PolicyDecisionPoint, PolicyDocument, RequestAttribute,
    DEFAULT_MAX_DOCUMENT_BYTES,
};
use serde_json::json;

const STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
const BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
const F1: &str = "urn:oasis:names:tc:xacml:1.0:function:";
const F3: &str = "urn:oasis:names:tc:xacml:3.0:function:";
const ROLE: &str = "urn:test:role";
const LOCKDOWN: &str = "urn:test:emergency-lockdown";

// =============================================================================
// Fixtures
// =============================================================================

/// Directory that knows the roles of a few users.
struct Directory {
    calls: AtomicUsize,
}

impl AttributeProvider for Directory {
    fn provided_attributes(&self) -> Vec<AttributeFqn> {
        vec![AttributeFqn::new(category::ACCESS_SUBJECT, ROLE)]
    }

    fn find(&self, _: &AttributeFqn, datatype: Datatype, ctx: &EvaluationContext) -> Result<Bag, IndeterminateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let subject = ctx.get_attribute(
            &AttributeFqn::new(category::ACCESS_SUBJECT, attribute_id::SUBJECT_ID),
            Datatype::String,
        )?;
        let roles: Vec<AttributeValue> = match subject.one_and_only()?.as_str() {
            Some("dr-house") => vec![AttributeValue::string("doctor")],
            Some("dr-suspended") => vec![AttributeValue::string("doctor"), AttributeValue::string("suspended")],
            _ => Vec::new(),
        };
        Ok(Bag::new(datatype, roles)?)
    }
}

fn designator(category: &str, id: &str, datatype: &str, must_be_present: bool) -> serde_json::Value {
    json!({"designator": {
        "category": category,
        "attributeId": id,
        "datatype": datatype,
        "mustBePresent": must_be_present
    }})
}

fn string(value: &str) -> serde_json::Value {
    json!({"value": {"datatype": STRING, "value": value}})
}

fn apply(function: String, arguments: Vec<serde_json::Value>) -> serde_json::Value {
    json!({"apply": {"functionId": function, "arguments": arguments}})
}

fn has_role(role: &str) -> serde_json::Value {
    apply(
        format!("{F3}any-of"),
        vec![
            json!({"function": format!("{F1}string-equal")}),
            string(role),
            designator(category::ACCESS_SUBJECT, ROLE, STRING, false),
        ],
    )
}

fn document() -> PolicyDocument {
    let subject_id = || designator(category::ACCESS_SUBJECT, attribute_id::SUBJECT_ID, STRING, true);
    let owner = json!({"selector": {
        "category": category::RESOURCE,
        "path": "/record/owner",
        "datatype": STRING
    }});

    let doc = json!({"PolicySet": {
        "policySetId": "hospital",
        "version": "3.0",
        "policyCombiningAlgId": "urn:oasis:names:tc:xacml:3.0:policy-combining-algorithm:deny-overrides",
        "children": [
            {"Policy": {
                "policyId": "records",
                "ruleCombiningAlgId": "urn:oasis:names:tc:xacml:1.0:rule-combining-algorithm:first-applicable",
                "target": [{"allOf": [{"matches": [{
                    "matchId": format!("{F1}string-equal"),
                    "value": {"datatype": STRING, "value": "read"},
                    "designator": {
                        "category": category::ACTION,
                        "attributeId": attribute_id::ACTION_ID,
                        "datatype": STRING
                    }
                }]}]}],
                "variableDefinitions": [{
                    "variableId": "is-owner",
                    "expression": apply(format!("{F1}string-equal"), vec![
                        apply(format!("{F1}string-one-and-only"), vec![subject_id()]),
                        apply(format!("{F1}string-one-and-only"), vec![owner]),
                    ])
                }],
                "rules": [
                    {
                        "ruleId": "owner-read",
                        "effect": "Permit",
                        "condition": {"variableReference": "is-owner"},
                        "obligationExpressions": [{
                            "id": "log-access",
                            "appliesTo": "Permit",
                            "attributeAssignments": [{"attributeId": "reader", "expression": subject_id()}]
                        }]
                    },
                    {
                        "ruleId": "doctor-read",
                        "effect": "Permit",
                        "condition": apply(format!("{F1}and"), vec![
                            has_role("doctor"),
                            apply(format!("{F1}not"), vec![has_role("suspended")]),
                        ])
                    },
                    {
                        "ruleId": "default-deny",
                        "effect": "Deny",
                        "adviceExpressions": [{"id": "ask-the-owner", "appliesTo": "Deny"}]
                    }
                ]
            }},
            {"Policy": {
                "policyId": "lockdown",
                "ruleCombiningAlgId": "urn:oasis:names:tc:xacml:3.0:rule-combining-algorithm:deny-overrides",
                "target": [{"allOf": [{"matches": [{
                    "matchId": format!("{F1}boolean-equal"),
                    "value": {"datatype": BOOLEAN, "value": "true"},
                    "designator": {
                        "category": category::ENVIRONMENT,
                        "attributeId": LOCKDOWN,
                        "datatype": BOOLEAN
                    }
                }]}]}],
                "rules": [{"ruleId": "deny-all", "effect": "Deny"}]
            }}
        ]
    }});
    let bytes = serde_json::to_vec(&doc).unwrap();
    PolicyDocument::from_json(&bytes, DEFAULT_MAX_DOCUMENT_BYTES).unwrap()
}

struct Hospital {
    pdp: PolicyDecisionPoint,
    directory: Arc<Directory>,
    audit: Arc<InMemoryAuditSink>,
}

fn hospital() -> Hospital {
    let directory = Arc::new(Directory {
        calls: AtomicUsize::new(0),
    });
    let provider: Arc<dyn AttributeProvider> = directory.clone();
    let providers = AttributeProviderRegistry::new(vec![provider]).unwrap();
    let options = ContextOptions {
        providers: Some(Arc::new(providers)),
        ..ContextOptions::default()
    };
    let audit = Arc::new(InMemoryAuditSink::new());
    let pdp = PolicyDecisionPoint::from_document(&document(), &PolicyCompiler::standard(), options, audit.clone())
        .unwrap();
    Hospital { pdp, directory, audit }
}

fn read_request(subject: &str, owner: Option<&str>) -> IndividualRequest {
    let request = IndividualRequest::new()
        .with_attribute(RequestAttribute::new(
            category::ACCESS_SUBJECT,
            attribute_id::SUBJECT_ID,
            vec![AttributeValue::string(subject)],
        ))
        .with_attribute(RequestAttribute::new(
            category::ACTION,
            attribute_id::ACTION_ID,
            vec![AttributeValue::string("read")],
        ));
    match owner {
        Some(owner) => request.with_content(category::RESOURCE, json!({"record": {"owner": owner, "ward": 4}})),
        None => request,
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn owner_reads_own_record_with_obligation() {
    let h = hospital();
    let result = h.pdp.evaluate(&read_request("alice", Some("alice")));
    assert_eq!(result.decision, Decision::Permit);
    assert_eq!(result.pep_actions.obligations.len(), 1);
    let obligation = &result.pep_actions.obligations[0];
    assert_eq!(obligation.id, "log-access");
    assert_eq!(obligation.assignments[0].value, AttributeValue::string("alice"));
    // the owner rule applies first, so the directory is never asked
    assert_eq!(h.directory.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn doctor_reads_any_record_and_directory_is_asked_once() {
    let h = hospital();
    let result = h.pdp.evaluate(&read_request("dr-house", Some("alice")));
    assert_eq!(result.decision, Decision::Permit);
    assert!(result.pep_actions.is_empty());
    assert_eq!(h.directory.calls.load(Ordering::SeqCst), 1);

    let result = h.pdp.evaluate(&read_request("dr-suspended", Some("alice")));
    assert_eq!(result.decision, Decision::Deny);
    assert_eq!(h.directory.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn stranger_is_denied_with_advice() {
    let h = hospital();
    let result = h.pdp.evaluate(&read_request("mallory", Some("alice")));
    assert_eq!(result.decision, Decision::Deny);
    assert_eq!(result.pep_actions.advice.len(), 1);
    assert_eq!(result.pep_actions.advice[0].id, "ask-the-owner");
}

#[test]
fn lockdown_overrides_owner_permit() {
    let h = hospital();
    let request = read_request("alice", Some("alice")).with_attribute(RequestAttribute::new(
        category::ENVIRONMENT,
        LOCKDOWN,
        vec![AttributeValue::Boolean(true)],
    ));
    let result = h.pdp.evaluate(&request);
    assert_eq!(result.decision, Decision::Deny);
    // the permit's obligation is not carried into the deny
    assert!(result.pep_actions.obligations.is_empty());
}

#[test]
fn missing_record_content_is_indeterminate_not_deny() {
    let h = hospital();
    let result = h.pdp.evaluate(&read_request("alice", None));
    assert_eq!(result.decision, Decision::Indeterminate);
    assert_eq!(result.extended_indeterminate, Decision::Permit);
    assert_eq!(result.status.unwrap().code, StatusCode::ProcessingError);
}

#[test]
fn other_actions_are_not_applicable() {
    let h = hospital();
    let request = IndividualRequest::new().with_attribute(RequestAttribute::new(
        category::ACTION,
        attribute_id::ACTION_ID,
        vec![AttributeValue::string("delete")],
    ));
    assert_eq!(h.pdp.evaluate(&request).decision, Decision::NotApplicable);
}

#[test]
fn applicable_policy_ids_reported_on_request() {
    let h = hospital();
    let result = h.pdp.evaluate(&read_request("alice", Some("alice")).with_policy_id_list());
    let ids: Vec<String> = result.applicable_policies.iter().map(ToString::to_string).collect();
    assert_eq!(ids, vec!["hospital@3.0", "records@1.0"]);
}

#[test]
fn batch_evaluation_is_independent_and_audited() {
    let h = hospital();
    let results = h.pdp.evaluate_all(&[
        read_request("alice", Some("alice")),
        read_request("mallory", Some("alice")),
        read_request("dr-house", Some("bob")),
    ]);
    let decisions: Vec<Decision> = results.iter().map(|r| r.decision).collect();
    assert_eq!(decisions, vec![Decision::Permit, Decision::Deny, Decision::Permit]);
    assert_eq!(h.audit.events().len(), 3);
}

#[test]
fn result_serializes_for_the_enforcement_point() {
    let h = hospital();
    let result = h.pdp.evaluate(&read_request("alice", Some("alice")));
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["decision"], "Permit");
    assert_eq!(json["pepActions"]["obligations"][0]["id"], "log-access");
    assert!(json.get("status").is_none());
}
