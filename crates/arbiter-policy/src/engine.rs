use std::sync::{Arc, Mutex};

use arbiter_core::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::compile::PolicyCompiler;
use crate::context::{ContextOptions, EvaluationContext};
use crate::decision::{Decidable, Decision, DecisionResult, PolicyIdRef};
use crate::document::PolicyDocument;
use crate::error::PolicyResult;
use crate::policy::PolicyElement;
use crate::request::IndividualRequest;

// ---------------------------------------------------------------------------
// AuditSink trait — decision audit event emission
// ---------------------------------------------------------------------------

/// One evaluated decision request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionAuditEvent {
    pub timestamp: DateTime<Utc>,
    pub root: PolicyIdRef,
    pub decision: Decision,
    pub extended_indeterminate: Decision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<StatusCode>,
    /// Always recorded, whether or not the request asked for the list.
    pub applicable_policies: Vec<PolicyIdRef>,
    pub obligations: usize,
    pub advice: usize,
}

/// Receives one event per evaluated request.
///
/// A failing sink never changes the decision; the failure is logged.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &DecisionAuditEvent) -> Result<(), String>;
}

/// Sink that drops every event.
#[derive(Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: &DecisionAuditEvent) -> Result<(), String> {
        Ok(())
    }
}

/// In-memory audit sink for testing.
#[derive(Default)]
pub struct InMemoryAuditSink {
    events: Mutex<Vec<DecisionAuditEvent>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<DecisionAuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: &DecisionAuditEvent) -> Result<(), String> {
        self.events
            .lock()
            .map_err(|_| "audit sink lock poisoned".to_string())?
            .push(event.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PolicyDecisionPoint — request evaluation entry point
// ---------------------------------------------------------------------------

/// Evaluates individual decision requests against a compiled policy tree.
///
/// The tree is immutable and shared; each request gets its own
/// [`EvaluationContext`], so one instance serves concurrent callers.
pub struct PolicyDecisionPoint {
    root: PolicyElement,
    options: ContextOptions,
    audit_sink: Arc<dyn AuditSink>,
}

impl PolicyDecisionPoint {
    pub fn new(root: PolicyElement, options: ContextOptions, audit_sink: Arc<dyn AuditSink>) -> Self {
        Self {
            root,
            options,
            audit_sink,
        }
    }

    /// Compile `document` and wrap the result.
    pub fn from_document(
        document: &PolicyDocument,
        compiler: &PolicyCompiler,
        options: ContextOptions,
        audit_sink: Arc<dyn AuditSink>,
    ) -> PolicyResult<Self> {
        let root = compiler.compile(document)?;
        Ok(Self::new(root, options, audit_sink))
    }

    pub fn root(&self) -> &PolicyElement {
        &self.root
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    /// Evaluate one request. Never fails: request and evaluation faults are
    /// reported as Indeterminate results.
    pub fn evaluate(&self, request: &IndividualRequest) -> DecisionResult {
        self.evaluate_with(request, &self.options)
    }

    /// Evaluate with the standard environment attributes taken from `now`.
    pub fn evaluate_at(&self, request: &IndividualRequest, now: DateTime<Utc>) -> DecisionResult {
        let options = ContextOptions {
            now: Some(now),
            ..self.options.clone()
        };
        self.evaluate_with(request, &options)
    }

    /// Evaluate independent requests in order, all at the same instant.
    pub fn evaluate_all(&self, requests: &[IndividualRequest]) -> Vec<DecisionResult> {
        let now = self.options.now.unwrap_or_else(Utc::now);
        requests.iter().map(|request| self.evaluate_at(request, now)).collect()
    }

    fn evaluate_with(&self, request: &IndividualRequest, options: &ContextOptions) -> DecisionResult {
        let mut result = match EvaluationContext::new(request, options) {
            Ok(ctx) => self.root.evaluate(&ctx),
            Err(e) => {
                tracing::warn!(error = %e, "invalid decision request");
                DecisionResult::indeterminate(Decision::Indeterminate, e.context("request"))
            }
        };

        self.emit_audit(&result, options);
        if !request.return_policy_id_list {
            result.applicable_policies.clear();
        }
        tracing::debug!(root = %self.root.id_ref(), decision = %result.decision, "request evaluated");
        result
    }

    fn emit_audit(&self, result: &DecisionResult, options: &ContextOptions) {
        let event = DecisionAuditEvent {
            timestamp: options.now.unwrap_or_else(Utc::now),
            root: self.root.id_ref(),
            decision: result.decision,
            extended_indeterminate: result.extended_indeterminate,
            status_code: result.status.as_ref().map(|s| s.code),
            applicable_policies: result.applicable_policies.clone(),
            obligations: result.pep_actions.obligations.len(),
            advice: result.pep_actions.advice.len(),
        };
        if let Err(e) = self.audit_sink.emit(&event) {
            tracing::warn!(error = %e, "failed to emit decision audit event");
        }
    }
}

impl std::fmt::Debug for PolicyDecisionPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyDecisionPoint")
            .field("root", &self.root.id_ref())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
