//! Arbiter Root Library
//!
//! Facade over the policy engine: loads a JSON policy document under the
//! limits of a [`PdpConfig`], compiles it once, and evaluates lists of
//! individual decision requests into individual results.
//!
//! # Architecture
//!
//! The facade is a thin orchestrator. Attribute providers, the audit sink
//! and the function registry are injected through [`PdpBuilder`]; the
//! compiled policy tree is immutable, so one [`Pdp`] serves concurrent
//! callers.

pub mod config;
pub mod error;

pub use config::{AttributesConfig, LimitsConfig, PdpConfig};
pub use error::{RootError, RootResult};

use std::path::Path;
use std::sync::Arc;

use arbiter_policy::{
    AttributeProviderRegistry, AuditSink, ContextOptions, DecisionResult, FunctionRegistry, IndividualRequest,
    NoopAuditSink, PolicyCompiler, PolicyDecisionPoint, PolicyDocument, PolicyElement, RequestAttribute,
};
use serde::Serialize;
use tracing::info;

// ---------------------------------------------------------------------------
// Individual results
// ---------------------------------------------------------------------------

/// Result of one individual decision request, with the request attributes
/// that asked to be echoed back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualResult {
    #[serde(flatten)]
    pub result: DecisionResult,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<RequestAttribute>,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Collects the collaborators of a [`Pdp`] before a policy is loaded.
pub struct PdpBuilder {
    config: PdpConfig,
    functions: Option<Arc<FunctionRegistry>>,
    providers: Option<Arc<AttributeProviderRegistry>>,
    audit_sink: Arc<dyn AuditSink>,
}

impl PdpBuilder {
    pub fn new(config: PdpConfig) -> Self {
        Self {
            config,
            functions: None,
            providers: None,
            audit_sink: Arc::new(NoopAuditSink),
        }
    }

    /// Replace the standard function library, e.g. to add extension functions.
    pub fn functions(mut self, functions: Arc<FunctionRegistry>) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn providers(mut self, providers: AttributeProviderRegistry) -> Self {
        self.providers = Some(Arc::new(providers));
        self
    }

    pub fn audit_sink(mut self, audit_sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = audit_sink;
        self
    }

    /// Parse, validate and compile a JSON policy document.
    pub fn load_json(self, policy: &[u8]) -> RootResult<Pdp> {
        self.config.validate()?;
        let document = PolicyDocument::from_json(policy, self.config.limits.max_policy_document_bytes)?;
        self.load_document(&document)
    }

    /// Read a JSON policy document from disk and load it.
    pub fn load_file(self, path: &Path) -> RootResult<Pdp> {
        let bytes = std::fs::read(path).map_err(RootError::Io)?;
        self.load_json(&bytes)
    }

    pub fn load_document(self, document: &PolicyDocument) -> RootResult<Pdp> {
        let functions = self
            .functions
            .unwrap_or_else(|| Arc::new(FunctionRegistry::standard()));
        let compiler = PolicyCompiler::new(functions, self.config.compiler_options());
        let options = ContextOptions {
            providers: self.providers,
            strict_attribute_issuer_match: self.config.attributes.strict_attribute_issuer_match,
            standard_env_attributes: self.config.attributes.standard_env_attributes,
            now: None,
        };
        let engine = PolicyDecisionPoint::from_document(document, &compiler, options, self.audit_sink)?;
        info!(root = %engine.root().id_ref(), "policy decision point ready");
        Ok(Pdp {
            config: self.config,
            engine,
        })
    }
}

// ---------------------------------------------------------------------------
// Pdp
// ---------------------------------------------------------------------------

/// A loaded policy decision point.
#[derive(Debug)]
pub struct Pdp {
    config: PdpConfig,
    engine: PolicyDecisionPoint,
}

impl Pdp {
    pub fn builder(config: PdpConfig) -> PdpBuilder {
        PdpBuilder::new(config)
    }

    /// Load a JSON policy document with no attribute providers and no audit.
    pub fn from_json(policy: &[u8], config: PdpConfig) -> RootResult<Self> {
        PdpBuilder::new(config).load_json(policy)
    }

    pub fn config(&self) -> &PdpConfig {
        &self.config
    }

    pub fn root(&self) -> &PolicyElement {
        self.engine.root()
    }

    pub fn engine(&self) -> &PolicyDecisionPoint {
        &self.engine
    }

    /// Evaluate a single request.
    pub fn decide(&self, request: &IndividualRequest) -> IndividualResult {
        IndividualResult {
            result: self.engine.evaluate(request),
            attributes: request.included_attributes(),
        }
    }

    /// Evaluate independent requests in order, one result each.
    pub fn decide_all(&self, requests: &[IndividualRequest]) -> Vec<IndividualResult> {
        self.engine
            .evaluate_all(requests)
            .into_iter()
            .zip(requests)
            .map(|(result, request)| IndividualResult {
                result,
                attributes: request.included_attributes(),
            })
            .collect()
    }

    /// Evaluate a JSON array of requests and return the JSON array of results.
    pub fn decide_json(&self, requests: &str) -> RootResult<String> {
        let requests: Vec<IndividualRequest> = serde_json::from_str(requests)?;
        let results = self.decide_all(&requests);
        Ok(serde_json::to_string(&results)?)
    }
}
