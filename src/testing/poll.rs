//! Polling consistency checks
//!
//! The cluster converges asynchronously, so assertions are re-evaluated on a
//! fixed interval until they hold or the operation's context ends. Only the
//! context bounds a poll; there is no retry count.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::context::Context;
use crate::check::{Bindings, Checker};
use crate::client::{self, Client};
use crate::common::{Error, Result};
use crate::resource::Resource;

/// Delay between two evaluations
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A condition re-evaluated by [`poll_until_done`]
#[async_trait]
pub trait Condition: Send {
    /// `Ok(true)` when satisfied, `Ok(false)` to poll again, `Err` to stop
    async fn check(&mut self, ctx: &Context) -> Result<bool>;

    /// What to report instead of the bare context error when polling runs out
    fn last_error(&self) -> Option<Error> {
        None
    }
}

/// Evaluate `condition` every `interval` until it holds
///
/// Unless `immediate` is set the first evaluation happens after one
/// interval. Evaluations never overlap. Errors from the condition stop the
/// loop immediately; when the context ends instead, the condition's last
/// observed failure is preferred over the context error.
pub async fn poll_until_done(
    ctx: &Context,
    interval: Duration,
    immediate: bool,
    condition: &mut dyn Condition,
) -> Result<()> {
    if !immediate {
        if let Err(e) = ctx.sleep(interval).await {
            return Err(condition.last_error().unwrap_or(e));
        }
    }
    loop {
        match ctx.run(condition.check(ctx)).await {
            Ok(true) => return Ok(()),
            Ok(false) => {}
            Err(e) if e.is_context_error() => return Err(condition.last_error().unwrap_or(e)),
            Err(e) => return Err(e),
        }
        if let Err(e) = ctx.sleep(interval).await {
            return Err(condition.last_error().unwrap_or(e));
        }
    }
}

/// Whether the expected pattern must eventually hold or must not hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// Some candidate must match (assert)
    Match,
    /// No candidate may match (error)
    Forbid,
}

/// Compares live objects against an expected pattern on every poll
pub struct ResourceCheck {
    client: Arc<dyn Client>,
    checker: Arc<dyn Checker>,
    expected: Resource,
    bindings: Bindings,
    expectation: Expectation,
    last_errs: Vec<String>,
}

impl ResourceCheck {
    pub fn new(
        client: Arc<dyn Client>,
        checker: Arc<dyn Checker>,
        expected: Resource,
        bindings: Bindings,
        expectation: Expectation,
    ) -> Self {
        Self {
            client,
            checker,
            expected,
            bindings,
            expectation,
            last_errs: Vec::new(),
        }
    }

    /// Poll until the expectation is met or the context ends
    pub async fn run(&mut self, ctx: &Context) -> Result<()> {
        poll_until_done(ctx, POLL_INTERVAL, false, self).await
    }

    async fn evaluate(&self) -> Result<(bool, Vec<String>)> {
        let candidates = match client::read(self.client.as_ref(), &self.expected).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_not_found() => return Ok(self.absent("actual resource not found")),
            Err(e) => return Err(e.into()),
        };
        if candidates.is_empty() {
            return Ok(self.absent("no actual resource found"));
        }

        let mut errs = Vec::new();
        for candidate in &candidates {
            let mismatches =
                self.checker
                    .check(candidate.content(), &self.bindings, self.expected.content())?;
            match self.expectation {
                Expectation::Match if mismatches.is_empty() => return Ok((true, Vec::new())),
                Expectation::Match => errs.extend(
                    mismatches
                        .iter()
                        .map(|m| format!("{} - {}", candidate_label(candidate), m)),
                ),
                Expectation::Forbid if mismatches.is_empty() => errs.push(format!(
                    "{} - resource matches expectation",
                    candidate_label(candidate)
                )),
                Expectation::Forbid => {}
            }
        }
        let done = self.expectation == Expectation::Forbid && errs.is_empty();
        Ok((done, errs))
    }

    fn absent(&self, reason: &str) -> (bool, Vec<String>) {
        match self.expectation {
            Expectation::Match => (false, vec![reason.to_string()]),
            Expectation::Forbid => (true, Vec::new()),
        }
    }
}

#[async_trait]
impl Condition for ResourceCheck {
    async fn check(&mut self, _ctx: &Context) -> Result<bool> {
        let (done, errs) = self.evaluate().await?;
        tracing::debug!(
            resource = %self.expected.describe(),
            done,
            failures = errs.len(),
            "poll iteration"
        );
        self.last_errs = errs;
        Ok(done)
    }

    fn last_error(&self) -> Option<Error> {
        if self.last_errs.is_empty() {
            None
        } else {
            Some(Error::Mismatch(self.last_errs.clone()))
        }
    }
}

/// `apiVersion/kind/name` of a live object
fn candidate_label(resource: &Resource) -> String {
    format!(
        "{}/{}/{}",
        resource.api_version(),
        resource.kind(),
        resource.name()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::PartialMatch;
    use crate::client::{ClientError, MemoryClient, TypeMeta, WriteOptions};
    use crate::resource::ObjectKey;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn deployment(replicas: i64) -> Resource {
        Resource::from_value(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "web", "namespace": "demo"},
            "spec": {"replicas": replicas}
        }))
        .unwrap()
    }

    type ClientResult<T> = std::result::Result<T, ClientError>;

    /// Serves a mismatching object until `ready_after` reads have happened
    struct Converging {
        reads: AtomicUsize,
        ready_after: usize,
    }

    #[async_trait]
    impl Client for Converging {
        async fn get(&self, _: &TypeMeta, _: &ObjectKey) -> ClientResult<Resource> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(deployment(if n >= self.ready_after { 2 } else { 1 }))
        }
        async fn list(
            &self,
            _: &TypeMeta,
            _: Option<&str>,
            _: &BTreeMap<String, String>,
        ) -> ClientResult<Vec<Resource>> {
            Ok(Vec::new())
        }
        async fn create(&self, obj: &Resource, _: WriteOptions) -> ClientResult<Resource> {
            Ok(obj.clone())
        }
        async fn patch(&self, obj: &Resource, _: WriteOptions) -> ClientResult<Resource> {
            Ok(obj.clone())
        }
        async fn delete(&self, _: &Resource, _: WriteOptions) -> ClientResult<()> {
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Client for Failing {
        async fn get(&self, _: &TypeMeta, _: &ObjectKey) -> ClientResult<Resource> {
            Err(ClientError::Api("connection refused".to_string()))
        }
        async fn list(
            &self,
            _: &TypeMeta,
            _: Option<&str>,
            _: &BTreeMap<String, String>,
        ) -> ClientResult<Vec<Resource>> {
            Err(ClientError::Api("connection refused".to_string()))
        }
        async fn create(&self, obj: &Resource, _: WriteOptions) -> ClientResult<Resource> {
            Ok(obj.clone())
        }
        async fn patch(&self, obj: &Resource, _: WriteOptions) -> ClientResult<Resource> {
            Ok(obj.clone())
        }
        async fn delete(&self, _: &Resource, _: WriteOptions) -> ClientResult<()> {
            Ok(())
        }
    }

    fn check(
        client: Arc<dyn Client>,
        expected: Resource,
        expectation: Expectation,
    ) -> ResourceCheck {
        ResourceCheck::new(
            client,
            Arc::new(PartialMatch),
            expected,
            Bindings::new(),
            expectation,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_assert_succeeds_once_converged() {
        let client = Arc::new(Converging {
            reads: AtomicUsize::new(0),
            ready_after: 3,
        });
        let ctx = Context::background().with_timeout(Duration::from_secs(5));
        let mut assert = check(client.clone(), deployment(2), Expectation::Match);
        assert.run(&ctx).await.unwrap();
        assert_eq!(client.reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_assert_timeout_reports_last_mismatch() {
        let client = Arc::new(Converging {
            reads: AtomicUsize::new(0),
            ready_after: usize::MAX,
        });
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let mut assert = check(client, deployment(2), Expectation::Match);
        let err = assert.run(&ctx).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "apps/v1/Deployment/web - spec.replicas: Invalid value: 1: Expected value: 2"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_assert_missing_resource() {
        let ctx = Context::background().with_timeout(Duration::from_millis(200));
        let mut assert = check(Arc::new(MemoryClient::new()), deployment(2), Expectation::Match);
        let err = assert.run(&ctx).await.unwrap_err();
        assert_eq!(err.to_string(), "actual resource not found");
    }

    #[tokio::test(start_paused = true)]
    async fn test_infrastructure_error_is_immediate() {
        let ctx = Context::background().with_timeout(Duration::from_secs(30));
        let mut assertion = check(Arc::new(Failing), deployment(2), Expectation::Match);
        let err = assertion.run(&ctx).await.unwrap_err();
        assert!(matches!(err, Error::Client(ClientError::Api(_))));
        assert!(assertion.last_errs.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbid_passes_when_absent() {
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let mut error = check(Arc::new(MemoryClient::new()), deployment(2), Expectation::Forbid);
        error.run(&ctx).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbid_reports_matching_resource() {
        let client = Arc::new(MemoryClient::new());
        client.insert(deployment(2));
        let ctx = Context::background().with_timeout(Duration::from_millis(300));
        let mut error = check(client, deployment(2), Expectation::Forbid);
        let err = error.run(&ctx).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "apps/v1/Deployment/web - resource matches expectation"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbid_passes_once_resource_stops_matching() {
        let client = Arc::new(Converging {
            reads: AtomicUsize::new(0),
            ready_after: 2,
        });
        let ctx = Context::background().with_timeout(Duration::from_secs(1));
        let mut error = check(client, deployment(1), Expectation::Forbid);
        error.run(&ctx).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_candidates() {
        let expected = Resource::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"namespace": "demo", "labels": {"app": "none"}}
        }))
        .unwrap();
        let ctx = Context::background().with_timeout(Duration::from_millis(200));
        let mut assert = check(Arc::new(MemoryClient::new()), expected.clone(), Expectation::Match);
        assert_eq!(
            assert.run(&ctx).await.unwrap_err().to_string(),
            "no actual resource found"
        );
        let ctx = Context::background().with_timeout(Duration::from_millis(200));
        let mut error = check(Arc::new(MemoryClient::new()), expected, Expectation::Forbid);
        error.run(&ctx).await.unwrap();
    }
}
