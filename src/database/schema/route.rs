use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::common::errors::{EngineError, EngineResult};

/// Expected primitive type of a route parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Integer,
    Boolean,
    Array,
    Object,
}

impl PrimitiveType {
    pub fn matches(self, value: &Value) -> bool {
        match self {
            PrimitiveType::String => value.is_string(),
            PrimitiveType::Integer => value.is_i64() || value.is_u64(),
            PrimitiveType::Boolean => value.is_boolean(),
            PrimitiveType::Array => value.is_array(),
            PrimitiveType::Object => value.is_object(),
        }
    }
}

/// Maps an inbound route identifier to its target workflow plus the
/// parameter names and types the request layer must provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSchema {
    pub route_id: String,
    pub workflow_name: String,
    #[serde(default)]
    pub required: BTreeMap<String, PrimitiveType>,
    #[serde(default)]
    pub optional: BTreeMap<String, PrimitiveType>,
}

impl RouteSchema {
    /// Check a parameter document against this schema. Missing or mistyped
    /// required parameters fail; optional parameters only fail on a type
    /// mismatch; unknown parameters pass through untouched.
    pub fn validate(&self, parameters: &Map<String, Value>) -> EngineResult<()> {
        let missing: Vec<&str> = self
            .required
            .keys()
            .filter(|name| !parameters.contains_key(name.as_str()))
            .map(|name| name.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::Validation(format!(
                "missing required parameters: {}",
                missing.join(", ")
            )));
        }

        for (name, value) in parameters {
            let expected = self
                .required
                .get(name)
                .or_else(|| self.optional.get(name))
                .copied();
            if let Some(expected) = expected {
                if !expected.matches(value) {
                    return Err(EngineError::Validation(format!(
                        "parameter '{}' should be of type {:?}",
                        name, expected
                    )));
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> RouteSchema {
        RouteSchema {
            route_id: "translate".into(),
            workflow_name: "translation_only".into(),
            required: BTreeMap::from([
                ("input".into(), PrimitiveType::String),
                ("targetLanguageIds".into(), PrimitiveType::Array),
            ]),
            optional: BTreeMap::from([("sourceLanguageId".into(), PrimitiveType::String)]),
        }
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn valid_parameters_pass() {
        let result = schema().validate(&params(json!({
            "input": "guten tag",
            "targetLanguageIds": ["es", "fr"],
            "sourceLanguageId": "de",
            "extraneous": 42,
        })));
        assert!(result.is_ok());
    }

    #[test]
    fn missing_required_parameter_fails() {
        let err = schema()
            .validate(&params(json!({"input": "guten tag"})))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("targetLanguageIds")));
    }

    #[test]
    fn mistyped_optional_parameter_fails() {
        let err = schema()
            .validate(&params(json!({
                "input": "guten tag",
                "targetLanguageIds": ["es"],
                "sourceLanguageId": 7,
            })))
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(msg) if msg.contains("sourceLanguageId")));
    }
}
