//! Uniform envelope around every executable directive

use async_trait::async_trait;
use std::time::Duration;

use super::context::Context;
use super::logging::{Logger, Status};
use super::report::OperationReport;
use crate::common::Result;

/// Something an operation executes
#[async_trait]
pub trait Action: Send + Sync {
    async fn exec(&self, ctx: &Context) -> Result<()>;
}

/// A directive instance ready to run
pub struct Operation {
    /// `None` means the action bounds itself (sleep)
    pub timeout: Option<Duration>,
    pub continue_on_error: bool,
    pub report: Option<OperationReport>,
    /// Section shown in progress lines, e.g. `APPLY`
    pub section: &'static str,
    /// Object or command this operation targets
    pub label: String,
    pub action: Box<dyn Action>,
}

impl Operation {
    pub fn new(
        section: &'static str,
        label: impl Into<String>,
        action: impl Action + 'static,
    ) -> Self {
        Self {
            timeout: None,
            continue_on_error: false,
            report: None,
            section,
            label: label.into(),
            action: Box::new(action),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_report(mut self, report: OperationReport) -> Self {
        self.report = Some(report);
        self
    }

    /// Run the action under its own timeout and record the outcome
    pub async fn execute(&self, ctx: &Context, logger: &Logger) -> Result<()> {
        let ctx = match self.timeout {
            Some(timeout) => ctx.with_timeout(timeout),
            None => ctx.child(),
        };
        if let Some(report) = &self.report {
            report.start();
        }
        logger.log(self.section, Status::Run, &self.label);
        let result = ctx.run(self.action.exec(&ctx)).await;
        if let Some(report) = &self.report {
            report.finish(result.as_ref().err());
        }
        match &result {
            Ok(()) => logger.log(self.section, Status::Done, &self.label),
            Err(e) => logger.log(self.section, Status::Error, format!("{} - {}", self.label, e)),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::testing::report::{OperationKind, Report};

    struct Stuck;

    #[async_trait]
    impl Action for Stuck {
        async fn exec(&self, _ctx: &Context) -> Result<()> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_bounds_action_and_report_records_it() {
        let report = Report::new("run")
            .add_test("t")
            .add_step("s")
            .add_operation("stuck", OperationKind::Command);
        let op = Operation::new("CMD", "stuck", Stuck)
            .with_timeout(Duration::from_secs(1))
            .with_report(report.clone());
        let err = op
            .execute(&Context::background(), &Logger::new("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeadlineExceeded));
        assert!(report.started());
        assert!(report.failed());
    }
}
