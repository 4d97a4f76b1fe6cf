//! Untyped cluster objects
//!
//! Test documents describe resources as free-form YAML, so the engine works
//! on JSON values and only reaches into the handful of metadata fields it
//! needs for identity, namespacing and diagnostics.

pub mod load;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::common::{Error, Result};

/// Identity of an object inside the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}/{}", self.namespace, self.name)
        }
    }
}

/// An unstructured cluster object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource {
    content: Value,
}

impl Default for Resource {
    fn default() -> Self {
        Self {
            content: Value::Object(Map::new()),
        }
    }
}

impl Resource {
    /// Wrap a JSON value, which must be an object carrying a kind
    pub fn from_value(content: Value) -> Result<Self> {
        if !content.is_object() {
            return Err(Error::InvalidResource(
                "resource must be an object".to_string(),
            ));
        }
        let resource = Self { content };
        if resource.kind().is_empty() {
            return Err(Error::InvalidResource("Object 'Kind' is missing".to_string()));
        }
        Ok(resource)
    }

    /// Build an object from identifying fields only
    pub fn from_identity(
        api_version: &str,
        kind: &str,
        name: Option<&str>,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Self {
        let mut resource = Self::default();
        resource.set_api_version(api_version);
        resource.set_kind(kind);
        if let Some(name) = name {
            resource.set_name(name);
        }
        if let Some(namespace) = namespace {
            resource.set_namespace(namespace);
        }
        resource.set_labels(labels);
        resource
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn api_version(&self) -> &str {
        self.content
            .get("apiVersion")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn kind(&self) -> &str {
        self.content
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.metadata_str("name")
    }

    pub fn namespace(&self) -> &str {
        self.metadata_str("namespace")
    }

    /// Labels as a sorted map; non-string values are skipped
    pub fn labels(&self) -> BTreeMap<String, String> {
        self.content
            .get("metadata")
            .and_then(|m| m.get("labels"))
            .and_then(Value::as_object)
            .map(|labels| {
                labels
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.namespace().to_string(),
            name: self.name().to_string(),
        }
    }

    /// `apiVersion/kind/namespace/name`, the form used in diagnostics
    pub fn describe(&self) -> String {
        format!("{}/{}/{}", self.api_version(), self.kind(), self.key())
    }

    /// API group of the object (empty for the core group)
    pub fn group(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((group, _)) => group,
            None => "",
        }
    }

    /// API version without the group
    pub fn version(&self) -> &str {
        match self.api_version().split_once('/') {
            Some((_, version)) => version,
            None => self.api_version(),
        }
    }

    pub fn set_api_version(&mut self, api_version: &str) {
        self.root_mut()
            .insert("apiVersion".to_string(), Value::String(api_version.to_string()));
    }

    pub fn set_kind(&mut self, kind: &str) {
        self.root_mut()
            .insert("kind".to_string(), Value::String(kind.to_string()));
    }

    pub fn set_name(&mut self, name: &str) {
        self.set_metadata("name", Value::String(name.to_string()));
    }

    pub fn set_namespace(&mut self, namespace: &str) {
        self.set_metadata("namespace", Value::String(namespace.to_string()));
    }

    /// Replace the labels; an empty map removes them
    pub fn set_labels(&mut self, labels: &BTreeMap<String, String>) {
        if labels.is_empty() {
            if let Some(Value::Object(metadata)) = self.root_mut().get_mut("metadata") {
                metadata.remove("labels");
            }
            return;
        }
        let labels = labels
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        self.set_metadata("labels", Value::Object(labels));
    }

    /// Set a value at `path`, creating intermediate objects as needed
    ///
    /// Fails when an intermediate value exists but is not an object.
    pub fn set_nested(&mut self, value: Value, path: &[&str]) -> Result<()> {
        let Some((last, parents)) = path.split_last() else {
            return Err(Error::InvalidResource("empty field path".to_string()));
        };
        let mut current = self.root_mut();
        for (i, field) in parents.iter().enumerate() {
            let entry = current
                .entry(field.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            current = match entry {
                Value::Object(map) => map,
                _ => {
                    return Err(Error::InvalidResource(format!(
                        "value cannot be set because {} is not a map",
                        path[..=i].join(".")
                    )))
                }
            };
        }
        current.insert(last.to_string(), value);
        Ok(())
    }

    /// Look up a value at `path`
    pub fn get_nested(&self, path: &[&str]) -> Option<&Value> {
        path.iter()
            .try_fold(&self.content, |current, field| current.get(field))
    }

    fn metadata_str(&self, field: &str) -> &str {
        self.content
            .get("metadata")
            .and_then(|m| m.get(field))
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    fn set_metadata(&mut self, field: &str, value: Value) {
        let root = self.root_mut();
        let metadata = root
            .entry("metadata".to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !metadata.is_object() {
            *metadata = Value::Object(Map::new());
        }
        if let Value::Object(metadata) = metadata {
            metadata.insert(field.to_string(), value);
        }
    }

    fn root_mut(&mut self) -> &mut Map<String, Value> {
        if !self.content.is_object() {
            self.content = Value::Object(Map::new());
        }
        match &mut self.content {
            Value::Object(map) => map,
            _ => unreachable!("content was just replaced by an object"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        let resource = Resource::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "demo", "labels": {"app": "web"}}
        }))
        .unwrap();
        assert_eq!(resource.api_version(), "apps/v1");
        assert_eq!(resource.group(), "apps");
        assert_eq!(resource.version(), "v1");
        assert_eq!(resource.kind(), "Deployment");
        assert_eq!(resource.name(), "web");
        assert_eq!(resource.namespace(), "demo");
        assert_eq!(resource.labels().get("app").map(String::as_str), Some("web"));
        assert_eq!(resource.describe(), "apps/v1/Deployment/demo/web");
    }

    #[test]
    fn test_from_value_requires_kind() {
        assert!(Resource::from_value(json!({"apiVersion": "v1"})).is_err());
        assert!(Resource::from_value(json!(["not", "an", "object"])).is_err());
    }

    #[test]
    fn test_from_identity_only_sets_identity() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "web".to_string());
        let resource = Resource::from_identity("v1", "Pod", None, Some("demo"), &labels);
        assert_eq!(
            resource.content(),
            &json!({
                "apiVersion": "v1",
                "kind": "Pod",
                "metadata": {"namespace": "demo", "labels": {"app": "web"}}
            })
        );
    }

    #[test]
    fn test_set_nested_creates_parents() {
        let mut resource = Resource::from_value(json!({"kind": "Pod"})).unwrap();
        resource
            .set_nested(json!(5), &["spec", "terminationGracePeriodSeconds"])
            .unwrap();
        assert_eq!(
            resource.get_nested(&["spec", "terminationGracePeriodSeconds"]),
            Some(&json!(5))
        );
    }

    #[test]
    fn test_set_nested_rejects_non_map_parent() {
        let mut resource = Resource::from_value(json!({"kind": "Pod", "spec": "oops"})).unwrap();
        let err = resource
            .set_nested(json!(5), &["spec", "terminationGracePeriodSeconds"])
            .unwrap_err();
        assert!(err.to_string().contains("spec is not a map"));
    }
}
