//! Fixed pause

use async_trait::async_trait;
use std::time::Duration;

use crate::common::Result;
use crate::testing::context::Context;
use crate::testing::operation::Action;

pub struct Sleep {
    duration: Duration,
}

impl Sleep {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

#[async_trait]
impl Action for Sleep {
    async fn exec(&self, ctx: &Context) -> Result<()> {
        ctx.sleep(self.duration).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;

    #[tokio::test(start_paused = true)]
    async fn test_sleep_is_cancellable() {
        let ctx = Context::background();
        let sleeper = Sleep::new(Duration::from_secs(3600));
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });
        assert!(matches!(sleeper.exec(&ctx).await, Err(Error::Cancelled)));
    }
}
