use std::collections::HashMap;

use arbiter_core::{AttributeFqn, AttributeValue};
use serde::{Deserialize, Serialize};

/// One attribute of a decision request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestAttribute {
    pub category: String,
    pub attribute_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    pub values: Vec<AttributeValue>,
    /// Echo this attribute back in the individual result.
    #[serde(default)]
    pub include_in_result: bool,
}

impl RequestAttribute {
    pub fn new(category: impl Into<String>, attribute_id: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            category: category.into(),
            attribute_id: attribute_id.into(),
            issuer: None,
            values,
            include_in_result: false,
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn included_in_result(mut self) -> Self {
        self.include_in_result = true;
        self
    }

    pub fn fqn(&self) -> AttributeFqn {
        let fqn = AttributeFqn::new(self.category.clone(), self.attribute_id.clone());
        match &self.issuer {
            Some(issuer) => fqn.with_issuer(issuer.clone()),
            None => fqn,
        }
    }
}

/// A single decision request: attributes, per-category structured Content,
/// and whether applicable policy ids should be reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualRequest {
    #[serde(default)]
    pub attributes: Vec<RequestAttribute>,
    /// Content keyed by category.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub content: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub return_policy_id_list: bool,
}

impl IndividualRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, attribute: RequestAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn with_content(mut self, category: impl Into<String>, content: serde_json::Value) -> Self {
        self.content.insert(category.into(), content);
        self
    }

    pub fn with_policy_id_list(mut self) -> Self {
        self.return_policy_id_list = true;
        self
    }

    /// Attributes flagged to be echoed back in the result.
    pub fn included_attributes(&self) -> Vec<RequestAttribute> {
        self.attributes
            .iter()
            .filter(|a| a.include_in_result)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbiter_core::{category, Datatype};

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::json!({
            "attributes": [{
                "category": category::ACCESS_SUBJECT,
                "attributeId": "role",
                "issuer": "hr",
                "values": [{ "datatype": Datatype::String.uri(), "value": "doctor" }],
                "includeInResult": true
            }],
            "returnPolicyIdList": true
        });
        let request: IndividualRequest = serde_json::from_value(json).unwrap();
        assert!(request.return_policy_id_list);
        let attr = &request.attributes[0];
        assert_eq!(attr.fqn(), AttributeFqn::new(category::ACCESS_SUBJECT, "role").with_issuer("hr"));
        assert_eq!(attr.values, vec![AttributeValue::string("doctor")]);
        assert_eq!(request.included_attributes().len(), 1);
    }

    #[test]
    fn test_builder() {
        let request = IndividualRequest::new()
            .with_attribute(RequestAttribute::new("c", "a", vec![AttributeValue::Integer(1)]).included_in_result())
            .with_content("c", serde_json::json!({"k": 1}))
            .with_policy_id_list();
        assert_eq!(request.attributes.len(), 1);
        assert!(request.content.contains_key("c"));
        assert!(request.return_policy_id_list);
    }
}
