//! Waiting for the cluster to stop showing an unwanted state

use async_trait::async_trait;
use std::sync::Arc;

use crate::check::{Bindings, Checker};
use crate::client::Client;
use crate::common::Result;
use crate::resource::Resource;
use crate::testing::context::Context;
use crate::testing::operation::Action;
use crate::testing::poll::{Expectation, ResourceCheck};

/// Succeeds once no live object matches the forbidden pattern
pub struct ErrorCheck {
    client: Arc<dyn Client>,
    checker: Arc<dyn Checker>,
    expected: Resource,
    bindings: Bindings,
}

impl ErrorCheck {
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
impl Action for ErrorCheck {
    async fn exec(&self, ctx: &Context) -> Result<()> {
        ResourceCheck::new(
            self.client.clone(),
            self.checker.clone(),
            self.expected.clone(),
            self.bindings.clone(),
            Expectation::Forbid,
        )
        .run(ctx)
        .await
    }
}
