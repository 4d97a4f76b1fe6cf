//! Dry-run client wrapper

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::{Client, ClientError, TypeMeta, WriteOptions};
use crate::resource::{ObjectKey, Resource};

/// Forces every mutation through the wrapped client into dry-run mode
pub struct DryRun {
    inner: Arc<dyn Client>,
}

impl DryRun {
    pub fn new(inner: Arc<dyn Client>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Client for DryRun {
    async fn get(&self, type_meta: &TypeMeta, key: &ObjectKey) -> Result<Resource, ClientError> {
        self.inner.get(type_meta, key).await
    }

    async fn list(
        &self,
        type_meta: &TypeMeta,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Resource>, ClientError> {
        self.inner.list(type_meta, namespace, labels).await
    }

    async fn create(&self, obj: &Resource, _: WriteOptions) -> Result<Resource, ClientError> {
        self.inner.create(obj, WriteOptions { dry_run: true }).await
    }

    async fn patch(&self, obj: &Resource, _: WriteOptions) -> Result<Resource, ClientError> {
        self.inner.patch(obj, WriteOptions { dry_run: true }).await
    }

    async fn delete(&self, obj: &Resource, _: WriteOptions) -> Result<(), ClientError> {
        self.inner.delete(obj, WriteOptions { dry_run: true }).await
    }

    fn is_dry_run(&self) -> bool {
        true
    }
}
