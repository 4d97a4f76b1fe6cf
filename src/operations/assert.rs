//! Waiting for the cluster to reach an expected state

use async_trait::async_trait;
use std::sync::Arc;

use crate::check::{Bindings, Checker};
use crate::client::Client;
use crate::common::Result;
use crate::resource::Resource;
use crate::testing::context::Context;
use crate::testing::operation::Action;
use crate::testing::poll::{Expectation, ResourceCheck};

/// Succeeds once some live object matches the expected pattern
pub struct Assert {
    client: Arc<dyn Client>,
    checker: Arc<dyn Checker>,
    expected: Resource,
    bindings: Bindings,
}

impl Assert {
    pub fn new(
        client: Arc<dyn Client>,
        checker: Arc<dyn Checker>,
        expected: Resource,
        bindings: Bindings,
    ) -> Self {
        Self {
            client,
            checker,
            expected,
            bindings,
        }
    }
}

#[async_trait]
impl Action for Assert {
    async fn exec(&self, ctx: &Context) -> Result<()> {
        ResourceCheck::new(
            self.client.clone(),
            self.checker.clone(),
            self.expected.clone(),
            self.bindings.clone(),
            Expectation::Match,
        )
        .run(ctx)
        .await
    }
}
