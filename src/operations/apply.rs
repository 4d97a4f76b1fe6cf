//! Create-or-update of a desired object

use async_trait::async_trait;
use std::sync::Arc;

use crate::client::{Client, TypeMeta, WriteOptions};
use crate::common::Result;
use crate::resource::Resource;
use crate::testing::cleanup::Registrar;
use crate::testing::context::Context;
use crate::testing::operation::Action;

/// Creates the object when missing, merges it into the live object otherwise
pub struct Apply {
    client: Arc<dyn Client>,
    resource: Resource,
    cleanup: Option<Registrar>,
}

impl Apply {
    pub fn new(client: Arc<dyn Client>, resource: Resource, cleanup: Option<Registrar>) -> Self {
        Self {
            client,
            resource,
            cleanup,
        }
    }
}

#[async_trait]
impl Action for Apply {
    async fn exec(&self, _ctx: &Context) -> Result<()> {
        let type_meta = TypeMeta::of(&self.resource);
        match self.client.get(&type_meta, &self.resource.key()).await {
            Ok(_) => {
                self.client
                    .patch(&self.resource, WriteOptions::default())
                    .await?;
            }
            Err(e) if e.is_not_found() => {
                self.client
                    .create(&self.resource, WriteOptions::default())
                    .await?;
                if let Some(cleanup) = &self.cleanup {
                    cleanup.register(self.resource.clone(), self.client.clone());
                }
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{DryRun, MemoryClient, Mutation};
    use crate::testing::cleanup::Cleaner;
    use serde_json::json;
    use std::time::Duration;

    fn config_map(value: &str) -> Resource {
        Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "settings", "namespace": "demo"},
            "data": {"key": value}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_creates_then_patches() {
        let client = Arc::new(MemoryClient::new());
        let cleaner = Arc::new(Cleaner::new());
        let registrar = Registrar::new(cleaner.clone(), Duration::from_secs(30));
        let ctx = Context::background();

        Apply::new(client.clone(), config_map("a"), Some(registrar.clone()))
            .exec(&ctx)
            .await
            .unwrap();
        Apply::new(client.clone(), config_map("b"), Some(registrar))
            .exec(&ctx)
            .await
            .unwrap();

        let journal = client.journal();
        assert!(matches!(journal[0], Mutation::Create { .. }));
        assert!(matches!(journal[1], Mutation::Patch { .. }));
        assert_eq!(cleaner.len(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_leaves_cluster_untouched() {
        let memory = Arc::new(MemoryClient::new());
        let client: Arc<dyn Client> = Arc::new(DryRun::new(memory.clone()));
        Apply::new(client, config_map("a"), None)
            .exec(&Context::background())
            .await
            .unwrap();
        assert!(!memory.contains(&config_map("a")));
    }
}
