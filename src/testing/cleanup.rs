//! Deferred deletion of objects created by a step

use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::context::Context;
use super::logging::Logger;
use super::operation::Operation;
use super::report::{OperationKind, StepReport};
use crate::client::Client;
use crate::common::{lock, Error};
use crate::operations::delete::Delete;
use crate::resource::Resource;

struct Entry {
    object: Resource,
    client: Arc<dyn Client>,
    timeout: Duration,
}

/// Registry of objects to delete when a step is torn down
///
/// Registration is append-only and safe from concurrent operations. The
/// registry is drained once, newest entry first.
#[derive(Default)]
pub struct Cleaner {
    entries: Mutex<Vec<Entry>>,
}

impl Cleaner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, object: Resource, client: Arc<dyn Client>, timeout: Duration) {
        tracing::debug!(resource = %object.describe(), "registered for cleanup");
        lock(&self.entries).push(Entry {
            object,
            client,
            timeout,
        });
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every registered object in reverse registration order
    ///
    /// Each deletion runs under its own timeout; a failure does not stop the
    /// remaining deletions. Returns the failures.
    pub async fn run(
        &self,
        ctx: &Context,
        logger: &Logger,
        report: Option<&StepReport>,
    ) -> Vec<Error> {
        let entries = std::mem::take(&mut *lock(&self.entries));
        let mut errors = Vec::new();
        for entry in entries.into_iter().rev() {
            let label = entry.object.describe();
            let mut operation = Operation::new(
                "CLEANUP",
                label.clone(),
                Delete::new(entry.client, entry.object),
            )
            .with_timeout(entry.timeout)
            .with_continue_on_error(true);
            if let Some(report) = report {
                operation =
                    operation.with_report(report.add_operation(&label, OperationKind::Delete));
            }
            if let Err(e) = operation.execute(ctx, logger).await {
                tracing::warn!(resource = %label, error = %e, "cleanup failed");
                errors.push(e);
            }
        }
        errors
    }
}

/// Handle given to mutating actions so they can register what they create
#[derive(Clone)]
pub struct Registrar {
    cleaner: Arc<Cleaner>,
    timeout: Duration,
}

impl Registrar {
    pub fn new(cleaner: Arc<Cleaner>, timeout: Duration) -> Self {
        Self { cleaner, timeout }
    }

    pub fn register(&self, object: Resource, client: Arc<dyn Client>) {
        self.cleaner.register(object, client, self.timeout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{MemoryClient, Mutation};
    use serde_json::json;

    fn config_map(name: &str) -> Resource {
        Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": "demo"}
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_drains_in_reverse_order() {
        let client = Arc::new(MemoryClient::new());
        client.insert(config_map("first"));
        client.insert(config_map("second"));

        let cleaner = Cleaner::new();
        cleaner.register(config_map("first"), client.clone(), Duration::from_secs(5));
        cleaner.register(config_map("second"), client.clone(), Duration::from_secs(5));
        assert_eq!(cleaner.len(), 2);

        let errors = cleaner
            .run(&Context::background(), &Logger::new("t"), None)
            .await;
        assert!(errors.is_empty());
        assert!(cleaner.is_empty());

        let deletes: Vec<_> = client
            .journal()
            .into_iter()
            .filter_map(|m| match m {
                Mutation::Delete { describe, .. } => Some(describe),
                _ => None,
            })
            .collect();
        assert_eq!(
            deletes,
            vec!["v1/ConfigMap/demo/second", "v1/ConfigMap/demo/first"]
        );
    }
}
