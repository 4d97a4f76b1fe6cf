//! Deletion with a wait for the objects to disappear

use async_trait::async_trait;
use std::sync::Arc;

use crate::client::{self, Client, TypeMeta, WriteOptions};
use crate::common::Result;
use crate::resource::Resource;
use crate::testing::context::Context;
use crate::testing::operation::Action;
use crate::testing::poll::{poll_until_done, Condition, POLL_INTERVAL};

/// Deletes every object matching an identity and waits until they are gone
///
/// The identity is a name, or a namespace plus label selector. Nothing to
/// delete is not an error.
pub struct Delete {
    client: Arc<dyn Client>,
    resource: Resource,
}

impl Delete {
    pub fn new(client: Arc<dyn Client>, resource: Resource) -> Self {
        Self { client, resource }
    }
}

#[async_trait]
impl Action for Delete {
    async fn exec(&self, ctx: &Context) -> Result<()> {
        let candidates = match client::read(self.client.as_ref(), &self.resource).await {
            Ok(candidates) => candidates,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for candidate in &candidates {
            match self.client.delete(candidate, WriteOptions::default()).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        if self.client.is_dry_run() {
            return Ok(());
        }
        let mut gone = Gone {
            client: self.client.clone(),
            candidates,
        };
        poll_until_done(ctx, POLL_INTERVAL, true, &mut gone).await
    }
}

/// Holds once none of the candidates can be fetched any more
struct Gone {
    client: Arc<dyn Client>,
    candidates: Vec<Resource>,
}

#[async_trait]
impl Condition for Gone {
    async fn check(&mut self, _ctx: &Context) -> Result<bool> {
        for candidate in &self.candidates {
            match self
                .client
                .get(&TypeMeta::of(candidate), &candidate.key())
                .await
            {
                Ok(_) => return Ok(false),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }
}
