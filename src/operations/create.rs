//! Creation of an object that must not exist yet

use async_trait::async_trait;
use std::sync::Arc;

use crate::client::{Client, TypeMeta, WriteOptions};
use crate::common::{Error, Result};
use crate::resource::Resource;
use crate::testing::cleanup::Registrar;
use crate::testing::context::Context;
use crate::testing::operation::Action;

pub struct Create {
    client: Arc<dyn Client>,
    resource: Resource,
    cleanup: Option<Registrar>,
}

impl Create {
    pub fn new(client: Arc<dyn Client>, resource: Resource, cleanup: Option<Registrar>) -> Self {
        Self {
            client,
            resource,
            cleanup,
        }
    }
}

#[async_trait]
impl Action for Create {
    async fn exec(&self, _ctx: &Context) -> Result<()> {
        let type_meta = TypeMeta::of(&self.resource);
        match self.client.get(&type_meta, &self.resource.key()).await {
            Ok(_) => Err(Error::AlreadyExists),
            Err(e) if e.is_not_found() => {
                self.client
                    .create(&self.resource, WriteOptions::default())
                    .await?;
                if let Some(cleanup) = &self.cleanup {
                    cleanup.register(self.resource.clone(), self.client.clone());
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryClient;
    use serde_json::json;

    #[tokio::test]
    async fn test_fails_when_object_exists() {
        let cm = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "taken", "namespace": "demo"}
        }))
        .unwrap();
        let client = Arc::new(MemoryClient::new());
        client.insert(cm.clone());
        let err = Create::new(client.clone(), cm, None)
            .exec(&Context::background())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "the resource already exists in the cluster");
        assert!(client.journal().is_empty());
    }
}
