use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use arbiter_core::{
    attribute_id, category, AttributeFqn, AttributeValue, Bag, Datatype, IndeterminateError, XsDate,
    XsDateTime, XsTime,
};
use chrono::{DateTime, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::attribute::AttributeSelector;
use crate::expression::Value;
use crate::provider::AttributeProviderRegistry;
use crate::request::IndividualRequest;

// ---------------------------------------------------------------------------
// ContextOptions
// ---------------------------------------------------------------------------

/// Where the standard environment attributes (current time, date and
/// dateTime) come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StandardEnvAttributeSource {
    /// Request values win; the PDP clock fills in the rest.
    #[default]
    RequestElsePdp,
    RequestOnly,
    /// The PDP clock overrides request values.
    PdpOnly,
}

#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    pub providers: Option<Arc<AttributeProviderRegistry>>,
    /// When false, a lookup without issuer also sees attributes that carry one.
    pub strict_attribute_issuer_match: bool,
    pub standard_env_attributes: StandardEnvAttributeSource,
    /// Instant used for the standard environment attributes; `None` reads
    /// the system clock when the context is created.
    pub now: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SelectionKey {
    category: String,
    path: String,
    context_selector_id: Option<String>,
    datatype: Datatype,
}

// ---------------------------------------------------------------------------
// EvaluationContext — per-request state
// ---------------------------------------------------------------------------

/// Per-request evaluation state: request attributes, Content, and the caches
/// for attribute, selector and variable values.
///
/// Owned by a single evaluation and not shared between threads. Every lookup
/// of the same attribute returns the same `Arc<Bag>`.
pub struct EvaluationContext {
    attributes: RefCell<HashMap<AttributeFqn, Arc<Bag>>>,
    content: HashMap<String, serde_json::Value>,
    providers: Option<Arc<AttributeProviderRegistry>>,
    strict_issuer: bool,
    selections: RefCell<HashMap<SelectionKey, Arc<Bag>>>,
    variables: RefCell<HashMap<String, Value>>,
    pending: RefCell<HashSet<AttributeFqn>>,
}

impl EvaluationContext {
    /// Build the context for one request. Fails if an attribute mixes
    /// datatypes across its values.
    pub fn new(request: &IndividualRequest, options: &ContextOptions) -> Result<Self, IndeterminateError> {
        let mut grouped: HashMap<AttributeFqn, Vec<AttributeValue>> = HashMap::new();
        for attribute in &request.attributes {
            let fqn = attribute.fqn();
            if fqn.issuer.is_some() && !options.strict_attribute_issuer_match {
                grouped
                    .entry(fqn.without_issuer())
                    .or_default()
                    .extend(attribute.values.iter().cloned());
            }
            grouped
                .entry(fqn)
                .or_default()
                .extend(attribute.values.iter().cloned());
        }

        let mut attributes = HashMap::with_capacity(grouped.len() + 3);
        for (fqn, values) in grouped {
            let Some(datatype) = values.first().map(AttributeValue::datatype) else {
                continue;
            };
            let bag = Bag::new(datatype, values).map_err(|e| {
                IndeterminateError::syntax(format!("request attribute {}: {}", fqn, e))
            })?;
            attributes.insert(fqn, Arc::new(bag));
        }

        let now = options.now.unwrap_or_else(Utc::now);
        match options.standard_env_attributes {
            StandardEnvAttributeSource::RequestOnly => {}
            StandardEnvAttributeSource::RequestElsePdp => {
                for (fqn, value) in environment_attributes(now) {
                    attributes
                        .entry(fqn)
                        .or_insert_with(|| Arc::new(Bag::singleton(value)));
                }
            }
            StandardEnvAttributeSource::PdpOnly => {
                for (fqn, value) in environment_attributes(now) {
                    attributes.insert(fqn, Arc::new(Bag::singleton(value)));
                }
            }
        }

        Ok(Self {
            attributes: RefCell::new(attributes),
            content: request.content.clone(),
            providers: options.providers.clone(),
            strict_issuer: options.strict_attribute_issuer_match,
            selections: RefCell::new(HashMap::new()),
            variables: RefCell::new(HashMap::new()),
            pending: RefCell::new(HashSet::new()),
        })
    }

    /// Values of a named attribute.
    ///
    /// Request values come first, then attribute providers. The result is
    /// cached, so a provider is asked at most once per request; a provider
    /// failure is cached as an empty bag carrying the failure as its reason.
    /// A non-empty bag of another datatype is a syntax-error fault.
    pub fn get_attribute(&self, fqn: &AttributeFqn, datatype: Datatype) -> Result<Arc<Bag>, IndeterminateError> {
        let cached = self.attributes.borrow().get(fqn).cloned();
        let bag = match cached {
            Some(bag) => bag,
            None => self.resolve_with_providers(fqn, datatype)?,
        };
        if bag.datatype() == datatype {
            return Ok(bag);
        }
        if bag.is_empty() {
            // An empty bag cached under another datatype, keeping why it is empty.
            let retyped = match bag.reason_empty() {
                Some(reason) => Bag::empty_because(datatype, reason.clone()),
                None => Bag::empty(datatype),
            };
            return Ok(Arc::new(retyped));
        }
        Err(IndeterminateError::syntax(format!(
            "attribute {} has datatype {}, expected {}",
            fqn,
            bag.datatype(),
            datatype
        )))
    }

    fn resolve_with_providers(&self, fqn: &AttributeFqn, datatype: Datatype) -> Result<Arc<Bag>, IndeterminateError> {
        let provider = self
            .providers
            .as_ref()
            .and_then(|registry| registry.provider_for(fqn, self.strict_issuer));
        let bag = match provider {
            None => Bag::empty(datatype),
            Some(provider) => {
                if !self.pending.borrow_mut().insert(fqn.clone()) {
                    return Err(IndeterminateError::processing(format!(
                        "cyclic attribute provider dependency on {}",
                        fqn
                    )));
                }
                let found = provider.find(fqn, datatype, self);
                self.pending.borrow_mut().remove(fqn);
                match found {
                    Ok(bag) => bag,
                    Err(e) => {
                        tracing::warn!(attribute = %fqn, error = %e, "attribute provider failed");
                        Bag::empty_because(datatype, e)
                    }
                }
            }
        };
        // the provider may already have primed this attribute
        let mut attributes = self.attributes.borrow_mut();
        Ok(Arc::clone(attributes.entry(fqn.clone()).or_insert_with(|| Arc::new(bag))))
    }

    /// Cache `bag` under `fqn` unless a value is already known.
    /// Returns whether the bag was stored.
    pub fn put_attribute_if_absent(&self, fqn: AttributeFqn, bag: Bag) -> bool {
        let mut attributes = self.attributes.borrow_mut();
        if attributes.contains_key(&fqn) {
            return false;
        }
        attributes.insert(fqn, Arc::new(bag));
        true
    }

    /// Values selected from a category's Content, cached per selector.
    pub fn select(&self, selector: &AttributeSelector) -> Result<Arc<Bag>, IndeterminateError> {
        let key = SelectionKey {
            category: selector.category.clone(),
            path: selector.path.clone(),
            context_selector_id: selector.context_selector_id.clone(),
            datatype: selector.datatype,
        };
        if let Some(bag) = self.selections.borrow().get(&key) {
            return Ok(Arc::clone(bag));
        }
        let bag = Arc::new(self.run_selection(selector)?);
        let mut selections = self.selections.borrow_mut();
        Ok(Arc::clone(selections.entry(key).or_insert(bag)))
    }

    fn run_selection(&self, selector: &AttributeSelector) -> Result<Bag, IndeterminateError> {
        let Some(content) = self.content.get(&selector.category) else {
            return Ok(Bag::empty(selector.datatype));
        };

        let mut pointer = String::new();
        if let Some(id) = &selector.context_selector_id {
            let fqn = AttributeFqn::new(selector.category.clone(), id.clone());
            let base = self.get_attribute(&fqn, Datatype::XPathExpression)?;
            match base.one_and_only() {
                Ok(AttributeValue::XPathExpression(xpath)) => {
                    pointer.push_str(xpath.path.trim_end_matches('/'));
                }
                _ => {
                    return Err(IndeterminateError::missing_attribute(&fqn, Datatype::XPathExpression)
                        .context("context selector"))
                }
            }
        }
        pointer.push_str(&selector.path);
        if !pointer.is_empty() && !pointer.starts_with('/') {
            return Err(IndeterminateError::syntax(format!("invalid content path '{}'", pointer)));
        }

        let Some(node) = content.pointer(&pointer) else {
            return Ok(Bag::empty(selector.datatype));
        };
        let nodes: Vec<&serde_json::Value> = match node {
            serde_json::Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        let values = nodes
            .into_iter()
            .map(|node| scalar_value(node, selector.datatype))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Bag::new(selector.datatype, values)?)
    }

    pub fn variable_value(&self, key: &str) -> Option<Value> {
        self.variables.borrow().get(key).cloned()
    }

    pub fn put_variable(&self, key: &str, value: Value) {
        self.variables.borrow_mut().insert(key.to_string(), value);
    }
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("attributes", &self.attributes.borrow().len())
            .field("content_categories", &self.content.len())
            .field("strict_issuer", &self.strict_issuer)
            .finish()
    }
}

fn scalar_value(node: &serde_json::Value, datatype: Datatype) -> Result<AttributeValue, IndeterminateError> {
    let lexical = match node {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        other => {
            return Err(IndeterminateError::syntax(format!(
                "selected content is not a scalar: {}",
                other
            )))
        }
    };
    Ok(AttributeValue::parse(datatype, &lexical)?)
}

fn environment_attributes(now: DateTime<Utc>) -> [(AttributeFqn, AttributeValue); 3] {
    let utc = Some(Utc.fix());
    let naive = now.naive_utc();
    [
        (
            AttributeFqn::new(category::ENVIRONMENT, attribute_id::CURRENT_TIME),
            AttributeValue::Time(XsTime {
                time: naive.time(),
                offset: utc,
            }),
        ),
        (
            AttributeFqn::new(category::ENVIRONMENT, attribute_id::CURRENT_DATE),
            AttributeValue::Date(XsDate {
                date: naive.date(),
                offset: utc,
            }),
        ),
        (
            AttributeFqn::new(category::ENVIRONMENT, attribute_id::CURRENT_DATETIME),
            AttributeValue::DateTime(XsDateTime {
                datetime: naive,
                offset: utc,
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::AttributeProvider;
    use crate::request::RequestAttribute;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const CAT: &str = "urn:test:subject";

    /// Provider that counts calls and optionally fails.
    struct CountingProvider {
        fqn: AttributeFqn,
        calls: AtomicUsize,
        fail: bool,
    }

    impl AttributeProvider for CountingProvider {
        fn provided_attributes(&self) -> Vec<AttributeFqn> {
            vec![self.fqn.clone()]
        }

        fn find(&self, _: &AttributeFqn, _: Datatype, _: &EvaluationContext) -> Result<Bag, IndeterminateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(IndeterminateError::processing("directory unavailable"));
            }
            Ok(Bag::singleton(AttributeValue::string("engineering")))
        }
    }

    fn with_provider(fail: bool) -> (Arc<CountingProvider>, EvaluationContext) {
        let provider = Arc::new(CountingProvider {
            fqn: AttributeFqn::new(CAT, "department"),
            calls: AtomicUsize::new(0),
            fail,
        });
        let registry = AttributeProviderRegistry::new(vec![provider.clone() as Arc<dyn AttributeProvider>]).unwrap();
        let options = ContextOptions {
            providers: Some(Arc::new(registry)),
            ..ContextOptions::default()
        };
        let ctx = EvaluationContext::new(&IndividualRequest::default(), &options).unwrap();
        (provider, ctx)
    }

    #[test]
    fn test_repeat_lookup_returns_same_bag() {
        let request = IndividualRequest::new().with_attribute(RequestAttribute::new(
            CAT,
            "role",
            vec![AttributeValue::string("nurse")],
        ));
        let ctx = EvaluationContext::new(&request, &ContextOptions::default()).unwrap();
        let fqn = AttributeFqn::new(CAT, "role");
        let a = ctx.get_attribute(&fqn, Datatype::String).unwrap();
        let b = ctx.get_attribute(&fqn, Datatype::String).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_provider_called_at_most_once() {
        let (provider, ctx) = with_provider(false);
        let fqn = AttributeFqn::new(CAT, "department");
        let a = ctx.get_attribute(&fqn, Datatype::String).unwrap();
        let b = ctx.get_attribute(&fqn, Datatype::String).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_provider_failure_cached_as_reason() {
        let (provider, ctx) = with_provider(true);
        let fqn = AttributeFqn::new(CAT, "department");
        let bag = ctx.get_attribute(&fqn, Datatype::String).unwrap();
        assert!(bag.is_empty());
        assert!(bag.reason_empty().unwrap().message.contains("directory unavailable"));
        ctx.get_attribute(&fqn, Datatype::String).unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cached_empty_bag_takes_requested_datatype() {
        let (provider, ctx) = with_provider(true);
        let fqn = AttributeFqn::new(CAT, "department");
        ctx.get_attribute(&fqn, Datatype::String).unwrap();

        let bag = ctx.get_attribute(&fqn, Datatype::Integer).unwrap();
        assert!(bag.is_empty());
        assert_eq!(bag.datatype(), Datatype::Integer);
        assert!(bag.reason_empty().unwrap().message.contains("directory unavailable"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let missing = AttributeFqn::new(CAT, "absent");
        ctx.get_attribute(&missing, Datatype::String).unwrap();
        let bag = ctx.get_attribute(&missing, Datatype::Boolean).unwrap();
        assert_eq!(bag.datatype(), Datatype::Boolean);
        assert!(bag.reason_empty().is_none());
    }

    #[test]
    fn test_datatype_mismatch_is_syntax_error() {
        let request = IndividualRequest::new().with_attribute(RequestAttribute::new(
            CAT,
            "age",
            vec![AttributeValue::Integer(40)],
        ));
        let ctx = EvaluationContext::new(&request, &ContextOptions::default()).unwrap();
        let err = ctx
            .get_attribute(&AttributeFqn::new(CAT, "age"), Datatype::String)
            .unwrap_err();
        assert_eq!(err.code, arbiter_core::StatusCode::SyntaxError);
    }

    #[test]
    fn test_mixed_datatypes_rejected() {
        let request = IndividualRequest::new().with_attribute(RequestAttribute::new(
            CAT,
            "x",
            vec![AttributeValue::Integer(1), AttributeValue::string("1")],
        ));
        assert!(EvaluationContext::new(&request, &ContextOptions::default()).is_err());
    }

    #[test]
    fn test_issuer_matching() {
        let request = IndividualRequest::new().with_attribute(
            RequestAttribute::new(CAT, "role", vec![AttributeValue::string("admin")]).with_issuer("idp"),
        );
        let plain = AttributeFqn::new(CAT, "role");
        let issued = AttributeFqn::new(CAT, "role").with_issuer("idp");

        let lenient = EvaluationContext::new(&request, &ContextOptions::default()).unwrap();
        assert_eq!(lenient.get_attribute(&plain, Datatype::String).unwrap().len(), 1);
        assert_eq!(lenient.get_attribute(&issued, Datatype::String).unwrap().len(), 1);

        let strict = EvaluationContext::new(
            &request,
            &ContextOptions {
                strict_attribute_issuer_match: true,
                ..ContextOptions::default()
            },
        )
        .unwrap();
        assert!(strict.get_attribute(&plain, Datatype::String).unwrap().is_empty());
        assert_eq!(strict.get_attribute(&issued, Datatype::String).unwrap().len(), 1);
    }

    #[test]
    fn test_put_attribute_if_absent() {
        let ctx = EvaluationContext::new(&IndividualRequest::default(), &ContextOptions::default()).unwrap();
        let fqn = AttributeFqn::new(CAT, "clearance");
        assert!(ctx.put_attribute_if_absent(fqn.clone(), Bag::singleton(AttributeValue::Integer(3))));
        assert!(!ctx.put_attribute_if_absent(fqn.clone(), Bag::singleton(AttributeValue::Integer(5))));
        let bag = ctx.get_attribute(&fqn, Datatype::Integer).unwrap();
        assert_eq!(bag.one_and_only().unwrap(), &AttributeValue::Integer(3));
    }

    #[test]
    fn test_standard_environment_sources() {
        let fixed = "2030-06-01T08:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let date_fqn = AttributeFqn::new(category::ENVIRONMENT, attribute_id::CURRENT_DATE);
        let supplied = AttributeValue::parse(Datatype::Date, "2001-01-01Z").unwrap();
        let request = IndividualRequest::new().with_attribute(RequestAttribute::new(
            category::ENVIRONMENT,
            attribute_id::CURRENT_DATE,
            vec![supplied.clone()],
        ));
        let options = |source| ContextOptions {
            standard_env_attributes: source,
            now: Some(fixed),
            ..ContextOptions::default()
        };
        let pdp_date = AttributeValue::parse(Datatype::Date, "2030-06-01Z").unwrap();

        let ctx = EvaluationContext::new(&request, &options(StandardEnvAttributeSource::RequestElsePdp)).unwrap();
        let date = ctx.get_attribute(&date_fqn, Datatype::Date).unwrap();
        assert_eq!(date.one_and_only().unwrap(), &supplied);
        let time_fqn = AttributeFqn::new(category::ENVIRONMENT, attribute_id::CURRENT_TIME);
        assert_eq!(ctx.get_attribute(&time_fqn, Datatype::Time).unwrap().len(), 1);

        let ctx = EvaluationContext::new(&request, &options(StandardEnvAttributeSource::PdpOnly)).unwrap();
        let date = ctx.get_attribute(&date_fqn, Datatype::Date).unwrap();
        assert_eq!(date.one_and_only().unwrap(), &pdp_date);

        let ctx = EvaluationContext::new(
            &IndividualRequest::default(),
            &options(StandardEnvAttributeSource::RequestOnly),
        )
        .unwrap();
        assert!(ctx.get_attribute(&time_fqn, Datatype::Time).unwrap().is_empty());
    }

    #[test]
    fn test_context_selector_base() {
        let request = IndividualRequest::new()
            .with_content(CAT, serde_json::json!({ "records": [{ "id": 7 }, { "id": 9 }] }))
            .with_attribute(RequestAttribute::new(
                CAT,
                "base",
                vec![AttributeValue::parse_xpath("/records/1", CAT)],
            ));
        let ctx = EvaluationContext::new(&request, &ContextOptions::default()).unwrap();
        let selector = AttributeSelector {
            category: CAT.into(),
            path: "/id".into(),
            context_selector_id: Some("base".into()),
            datatype: Datatype::Integer,
            must_be_present: true,
        };
        let bag = ctx.select(&selector).unwrap();
        assert_eq!(bag.one_and_only().unwrap(), &AttributeValue::Integer(9));
        assert!(Arc::ptr_eq(&bag, &ctx.select(&selector).unwrap()));
    }

    #[test]
    fn test_selector_non_scalar_is_error() {
        let request = IndividualRequest::new().with_content(CAT, serde_json::json!({ "doc": { "nested": {} } }));
        let ctx = EvaluationContext::new(&request, &ContextOptions::default()).unwrap();
        let selector = AttributeSelector {
            category: CAT.into(),
            path: "/doc/nested".into(),
            context_selector_id: None,
            datatype: Datatype::String,
            must_be_present: false,
        };
        assert!(ctx.select(&selector).is_err());
    }
}
