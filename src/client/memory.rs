//! In-process client
//!
//! Keeps objects in a map and journals every mutation. Used for offline
//! validation of test documents and as the cluster stand-in in tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Client, ClientError, TypeMeta, WriteOptions};
use crate::common::lock;
use crate::resource::{ObjectKey, Resource};

type StoreKey = (String, String, String, String);

/// A mutation recorded by [`MemoryClient`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create { describe: String, dry_run: bool },
    Patch { describe: String, dry_run: bool },
    Delete { describe: String, dry_run: bool },
}

/// Client backed by an in-memory object store
#[derive(Default)]
pub struct MemoryClient {
    objects: Mutex<BTreeMap<StoreKey, Resource>>,
    journal: Mutex<Vec<Mutation>>,
    reads: AtomicUsize,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an object as if it already existed in the cluster
    pub fn insert(&self, resource: Resource) {
        let key = store_key(&TypeMeta::of(&resource), &resource.key());
        lock(&self.objects).insert(key, resource);
    }

    /// Whether an object with this identity is stored
    pub fn contains(&self, resource: &Resource) -> bool {
        let key = store_key(&TypeMeta::of(resource), &resource.key());
        lock(&self.objects).contains_key(&key)
    }

    /// Mutations performed so far, in order
    pub fn journal(&self) -> Vec<Mutation> {
        lock(&self.journal).clone()
    }

    /// Number of get and list calls served
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn record(&self, mutation: Mutation) {
        lock(&self.journal).push(mutation);
    }
}

#[async_trait]
impl Client for MemoryClient {
    async fn get(&self, type_meta: &TypeMeta, key: &ObjectKey) -> Result<Resource, ClientError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        lock(&self.objects)
            .get(&store_key(type_meta, key))
            .cloned()
            .ok_or_else(|| ClientError::not_found(&type_meta.kind, key))
    }

    async fn list(
        &self,
        type_meta: &TypeMeta,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Resource>, ClientError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let objects = lock(&self.objects);
        Ok(objects
            .values()
            .filter(|r| r.api_version() == type_meta.api_version && r.kind() == type_meta.kind)
            .filter(|r| namespace.map_or(true, |ns| r.namespace() == ns))
            .filter(|r| {
                let actual = r.labels();
                labels.iter().all(|(k, v)| actual.get(k) == Some(v))
            })
            .cloned()
            .collect())
    }

    async fn create(&self, obj: &Resource, options: WriteOptions) -> Result<Resource, ClientError> {
        let key = store_key(&TypeMeta::of(obj), &obj.key());
        self.record(Mutation::Create {
            describe: obj.describe(),
            dry_run: options.dry_run,
        });
        let mut objects = lock(&self.objects);
        if objects.contains_key(&key) {
            return Err(ClientError::AlreadyExists {
                kind: obj.kind().to_string(),
                key: obj.key().to_string(),
            });
        }
        if !options.dry_run {
            objects.insert(key, obj.clone());
        }
        Ok(obj.clone())
    }

    async fn patch(&self, obj: &Resource, options: WriteOptions) -> Result<Resource, ClientError> {
        let key = store_key(&TypeMeta::of(obj), &obj.key());
        self.record(Mutation::Patch {
            describe: obj.describe(),
            dry_run: options.dry_run,
        });
        let mut objects = lock(&self.objects);
        let existing = objects
            .get(&key)
            .ok_or_else(|| ClientError::not_found(obj.kind(), &obj.key()))?;
        let mut merged = existing.content().clone();
        merge(&mut merged, obj.content());
        let merged = Resource::from_value(merged).map_err(|e| ClientError::Api(e.to_string()))?;
        if !options.dry_run {
            objects.insert(key, merged.clone());
        }
        Ok(merged)
    }

    async fn delete(&self, obj: &Resource, options: WriteOptions) -> Result<(), ClientError> {
        let key = store_key(&TypeMeta::of(obj), &obj.key());
        self.record(Mutation::Delete {
            describe: obj.describe(),
            dry_run: options.dry_run,
        });
        let mut objects = lock(&self.objects);
        if !objects.contains_key(&key) {
            return Err(ClientError::not_found(obj.kind(), &obj.key()));
        }
        if !options.dry_run {
            objects.remove(&key);
        }
        Ok(())
    }
}

fn store_key(type_meta: &TypeMeta, key: &ObjectKey) -> StoreKey {
    (
        type_meta.api_version.clone(),
        type_meta.kind.clone(),
        key.namespace.clone(),
        key.name.clone(),
    )
}

/// JSON merge patch semantics: objects merge, null removes, anything else replaces
fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (key, value) in patch {
                if value.is_null() {
                    target.remove(key);
                } else {
                    merge(target.entry(key.clone()).or_insert(Value::Null), value);
                }
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_map(name: &str, data: Value) -> Resource {
        Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": "demo", "labels": {"app": name}},
            "data": data
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let client = MemoryClient::new();
        let cm = config_map("one", json!({"a": "1"}));
        client.create(&cm, WriteOptions::default()).await.unwrap();
        let fetched = client.get(&TypeMeta::of(&cm), &cm.key()).await.unwrap();
        assert_eq!(fetched, cm);
        client.delete(&cm, WriteOptions::default()).await.unwrap();
        let err = client.get(&TypeMeta::of(&cm), &cm.key()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_persist() {
        let client = MemoryClient::new();
        let cm = config_map("one", json!({}));
        client.create(&cm, WriteOptions { dry_run: true }).await.unwrap();
        assert!(!client.contains(&cm));
        assert_eq!(
            client.journal(),
            vec![Mutation::Create {
                describe: "v1/ConfigMap/demo/one".to_string(),
                dry_run: true
            }]
        );
    }

    #[tokio::test]
    async fn test_patch_merges() {
        let client = MemoryClient::new();
        client.insert(config_map("one", json!({"a": "1", "b": "2"})));
        let patched = client
            .patch(&config_map("one", json!({"b": null, "c": "3"})), WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(patched.get_nested(&["data"]), Some(&json!({"a": "1", "c": "3"})));
    }

    #[tokio::test]
    async fn test_list_filters_by_labels() {
        let client = MemoryClient::new();
        client.insert(config_map("one", json!({})));
        client.insert(config_map("two", json!({})));
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "two".to_string());
        let type_meta = TypeMeta {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        };
        let found = client.list(&type_meta, Some("demo"), &labels).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name(), "two");
        assert_eq!(client.reads(), 1);
    }
}
