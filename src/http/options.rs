use crate::errors::{BrowserError, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A query or body parameter: one value, or several for `name[]` style keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    One(String),
    Many(Vec<String>),
}

impl ParamValue {
    pub fn values(&self) -> Vec<String> {
        match self {
            ParamValue::One(value) => vec![value.clone()],
            ParamValue::Many(values) => values.clone(),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::One(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::One(value)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(values: Vec<String>) -> Self {
        ParamValue::Many(values)
    }
}

/// Per-request options for the simulated backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpOptions {
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, ParamValue>,
    pub parameters: BTreeMap<String, ParamValue>,
    pub files: BTreeMap<String, Vec<PathBuf>>,
    pub server: BTreeMap<String, String>,
    pub body: Option<String>,
    pub json: Option<serde_json::Value>,
    pub ajax: bool,
}

impl HttpOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds options from a loosely typed map, rejecting unknown keys and
    /// mistyped values.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let options: HttpOptions = serde_json::from_value(value)
            .map_err(|e| BrowserError::InvalidOptions(e.to_string()))?;
        Ok(options.canonicalized())
    }

    fn canonicalized(mut self) -> Self {
        self.headers = std::mem::take(&mut self.headers)
            .into_iter()
            .map(|(name, value)| (canonical_header(&name), value))
            .collect();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(canonical_header(name), value.into());
        self
    }

    pub fn with_query(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }

    pub fn with_parameter(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.to_string(), value.into());
        self
    }

    pub fn with_file(mut self, name: &str, path: impl Into<PathBuf>) -> Self {
        self.files.entry(name.to_string()).or_default().push(path.into());
        self
    }

    pub fn with_server(mut self, name: &str, value: impl Into<String>) -> Self {
        self.server.insert(name.to_string(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_json(mut self, json: serde_json::Value) -> Self {
        self.json = Some(json);
        self
    }

    pub fn as_ajax(mut self) -> Self {
        self.ajax = true;
        self
    }

    pub fn with_basic_auth(self, username: &str, password: &str) -> Self {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", username, password));
        self.with_header("authorization", format!("Basic {}", token))
    }

    /// Map groups are unioned with `other` winning; scalar options are only
    /// taken from `other` when they differ from their default.
    pub fn merge(&mut self, other: &HttpOptions) {
        self.headers.extend(other.headers.clone());
        self.query.extend(other.query.clone());
        self.parameters.extend(other.parameters.clone());
        self.files.extend(other.files.clone());
        self.server.extend(other.server.clone());

        if other.body.is_some() {
            self.body = other.body.clone();
        }
        if other.json.is_some() {
            self.json = other.json.clone();
        }
        if other.ajax {
            self.ajax = true;
        }
    }

    pub fn merged(mut self, other: &HttpOptions) -> Self {
        self.merge(other);
        self
    }

    /// Headers as sent: implied JSON and ajax headers, then explicit ones.
    pub fn effective_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if self.json.is_some() {
            headers.insert("Accept".to_string(), "application/json".to_string());
            headers.insert("Content-Type".to_string(), "application/json".to_string());
        }
        if self.ajax {
            headers.insert("X-Requested-With".to_string(), "XMLHttpRequest".to_string());
        }
        headers.extend(self.headers.clone());
        headers
    }

    /// Raw body: the serialized JSON payload when set, else `body`.
    pub fn effective_body(&self) -> Result<Option<String>> {
        match &self.json {
            Some(json) => Ok(Some(serde_json::to_string(json)?)),
            None => Ok(self.body.clone()),
        }
    }

    pub(crate) fn flat_parameters(&self) -> Vec<(String, String)> {
        flatten(&self.parameters)
    }

    pub(crate) fn flat_query(&self) -> Vec<(String, String)> {
        flatten(&self.query)
    }
}

fn flatten(map: &BTreeMap<String, ParamValue>) -> Vec<(String, String)> {
    map.iter()
        .flat_map(|(name, value)| {
            value
                .values()
                .into_iter()
                .map(move |v| (name.clone(), v))
        })
        .collect()
}

/// `content_type` / `CONTENT-TYPE` → `Content-Type`.
pub fn canonical_header(name: &str) -> String {
    name.trim()
        .split(['-', '_'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_canonicalization() {
        assert_eq!(canonical_header("content-type"), "Content-Type");
        assert_eq!(canonical_header("X_REQUESTED_WITH"), "X-Requested-With");
        assert_eq!(canonical_header("accept"), "Accept");

        let options = HttpOptions::new().with_header("x-api-key", "k");
        assert_eq!(options.headers.get("X-Api-Key").map(String::as_str), Some("k"));
    }

    #[test]
    fn test_implied_headers_yield_to_explicit_ones() {
        let options = HttpOptions::new()
            .with_json(json!({"a": 1}))
            .as_ajax()
            .with_header("accept", "text/plain");
        let headers = options.effective_headers();
        assert_eq!(headers["Accept"], "text/plain");
        assert_eq!(headers["Content-Type"], "application/json");
        assert_eq!(headers["X-Requested-With"], "XMLHttpRequest");
        assert_eq!(options.effective_body().unwrap().as_deref(), Some(r#"{"a":1}"#));
    }

    #[test]
    fn test_merge_semantics() {
        let mut base = HttpOptions::new()
            .with_header("a", "1")
            .with_header("b", "1")
            .with_body("keep")
            .as_ajax();
        base.merge(&HttpOptions::new().with_header("b", "2").with_query("q", "x"));

        assert_eq!(base.headers["A"], "1");
        assert_eq!(base.headers["B"], "2");
        assert_eq!(base.query["q"], ParamValue::One("x".into()));
        // defaults in the incoming options never clobber
        assert_eq!(base.body.as_deref(), Some("keep"));
        assert!(base.ajax);

        base.merge(&HttpOptions::new().with_body("new"));
        assert_eq!(base.body.as_deref(), Some("new"));
    }

    #[test]
    fn test_from_value() {
        let options = HttpOptions::from_value(json!({
            "headers": {"content-type": "text/csv"},
            "parameters": {"tags[]": ["a", "b"], "name": "x"},
            "ajax": true
        }))
        .unwrap();
        assert_eq!(options.headers["Content-Type"], "text/csv");
        assert_eq!(options.flat_parameters().len(), 3);
        assert!(options.ajax);

        let err = HttpOptions::from_value(json!({"cookies": {}})).unwrap_err();
        assert!(matches!(err, BrowserError::InvalidOptions(_)));
        let err = HttpOptions::from_value(json!({"ajax": "yes"})).unwrap_err();
        assert!(matches!(err, BrowserError::InvalidOptions(_)));
    }

    #[test]
    fn test_basic_auth() {
        let options = HttpOptions::new().with_basic_auth("user", "pass");
        assert_eq!(options.headers["Authorization"], "Basic dXNlcjpwYXNz");
    }
}
