//! Step orchestration
//!
//! A step is built in full before anything runs: every directive of the try,
//! catch and finally lists becomes one or more [`Operation`]s. Building can
//! fail (bad directive, unloadable resource) and such failures are fatal for
//! the test. Execution of the try list is sequential; catch, finally and the
//! step's cleanup are handed back as a [`StepTeardown`] that the test driver
//! runs during teardown.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use super::cleanup::{Cleaner, Registrar};
use super::collect;
use super::config::{
    self as model, CatchAction, CatchDirective, FileRefOrResource, Step, Test, TryAction,
};
use super::context::Context;
use super::logging::{Logger, Status};
use super::namespacer::Namespacer;
use super::operation::{Action, Operation};
use super::report::{OperationKind, StepReport};
use super::timeout::{resolve, Timeouts};
use crate::check::{Bindings, Checker};
use crate::client::{Client, DryRun};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::operations;
use crate::resource::{load, Resource};

/// The three lists of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Try,
    Catch,
    Finally,
}

impl Phase {
    /// Catch and finally entries are best effort: one failure never stops the list
    pub fn continue_on_error(self, explicit: Option<bool>) -> bool {
        match self {
            Phase::Try => explicit.unwrap_or(false),
            Phase::Catch | Phase::Finally => true,
        }
    }

    pub fn section(self) -> &'static str {
        match self {
            Phase::Try => "TRY",
            Phase::Catch => "CATCH",
            Phase::Finally => "FINALLY",
        }
    }
}

/// Builds the operations of one step
pub struct StepProcessor<'a> {
    config: &'a Config,
    client: Arc<dyn Client>,
    checker: Arc<dyn Checker>,
    namespacer: &'a Namespacer,
    test: &'a Test,
    step: &'a Step,
    report: Option<StepReport>,
    logger: Logger,
    timeouts: Timeouts,
    cleaner: Arc<Cleaner>,
}

impl<'a> StepProcessor<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &'a Config,
        client: Arc<dyn Client>,
        checker: Arc<dyn Checker>,
        namespacer: &'a Namespacer,
        test: &'a Test,
        step: &'a Step,
        report: Option<StepReport>,
        logger: Logger,
    ) -> Self {
        let timeouts = config
            .timeouts
            .combine(&test.spec.timeouts)
            .combine(&step.timeouts);
        Self {
            config,
            client,
            checker,
            namespacer,
            test,
            step,
            report,
            logger,
            timeouts,
            cleaner: Arc::new(Cleaner::new()),
        }
    }

    /// Build the try, catch and finally lists
    pub async fn prepare(self) -> Result<PreparedStep> {
        let try_ops = self.try_operations().await?;
        let catch = self.phase_operations(Phase::Catch, &self.step.catch)?;
        let finally = self.phase_operations(Phase::Finally, &self.step.finally)?;
        Ok(PreparedStep {
            try_ops,
            teardown: StepTeardown {
                catch,
                finally,
                cleaner: self.cleaner,
                report: self.report,
                logger: self.logger.clone(),
                try_failed: false,
            },
            logger: self.logger,
        })
    }

    async fn try_operations(&self) -> Result<Vec<Operation>> {
        let mut ops = Vec::new();
        for directive in &self.step.r#try {
            let continue_on_error = Phase::Try.continue_on_error(directive.continue_on_error);
            let built = match directive.action()? {
                TryAction::Apply(op) => self.apply_operations(&op).await?,
                TryAction::Assert(op) => self.assert_operations(&op).await?,
                TryAction::Command(op) => vec![self.command_operation(&op)],
                TryAction::Create(op) => self.create_operations(&op).await?,
                TryAction::Delete(op) => vec![self.delete_operation(&op)],
                TryAction::Error(op) => self.error_operations(&op).await?,
                TryAction::Script(op) => vec![self.script_operation(&op)],
                TryAction::Sleep(op) => vec![self.sleep_operation(&op)],
            };
            ops.extend(
                built
                    .into_iter()
                    .map(|op| op.with_continue_on_error(continue_on_error)),
            );
        }
        Ok(ops)
    }

    fn phase_operations(
        &self,
        phase: Phase,
        directives: &[CatchDirective],
    ) -> Result<Vec<Operation>> {
        let continue_on_error = phase.continue_on_error(None);
        let mut ops = Vec::new();
        for directive in directives {
            let op = match directive.action()? {
                CatchAction::PodLogs(collector) => {
                    self.command_operation(&collect::pod_logs(&collector)?)
                }
                CatchAction::Events(collector) => {
                    self.command_operation(&collect::events(&collector)?)
                }
                CatchAction::Command(op) => self.command_operation(&op),
                CatchAction::Script(op) => self.script_operation(&op),
                CatchAction::Sleep(op) => self.sleep_operation(&op),
            };
            ops.push(op.with_continue_on_error(continue_on_error));
        }
        Ok(ops)
    }

    async fn apply_operations(&self, op: &model::Apply) -> Result<Vec<Operation>> {
        let dry_run = op.dry_run.unwrap_or(false);
        let timeout = resolve(op.timeout, || self.timeouts.apply_duration());
        let mut ops = Vec::new();
        for resource in self.resources(&op.source).await? {
            let resource = self.prepare_resource(resource)?;
            let label = resource.describe();
            let action =
                operations::Apply::new(self.client(dry_run), resource, self.registrar(dry_run));
            let operation = self.operation("APPLY", label, OperationKind::Apply, action);
            ops.push(operation.with_timeout(timeout));
        }
        Ok(ops)
    }

    async fn create_operations(&self, op: &model::Create) -> Result<Vec<Operation>> {
        let dry_run = op.dry_run.unwrap_or(false);
        let timeout = resolve(op.timeout, || self.timeouts.apply_duration());
        let mut ops = Vec::new();
        for resource in self.resources(&op.source).await? {
            let resource = self.prepare_resource(resource)?;
            let label = resource.describe();
            let action =
                operations::Create::new(self.client(dry_run), resource, self.registrar(dry_run));
            let operation = self.operation("CREATE", label, OperationKind::Create, action);
            ops.push(operation.with_timeout(timeout));
        }
        Ok(ops)
    }

    async fn assert_operations(&self, op: &model::Assert) -> Result<Vec<Operation>> {
        let timeout = resolve(op.timeout, || self.timeouts.assert_duration());
        let mut ops = Vec::new();
        for mut resource in self.resources(&op.source).await? {
            self.namespacer.apply(&mut resource);
            let label = resource.describe();
            let action = operations::Assert::new(
                self.client.clone(),
                self.checker.clone(),
                resource,
                self.bindings(),
            );
            let operation = self.operation("ASSERT", label, OperationKind::Assert, action);
            ops.push(operation.with_timeout(timeout));
        }
        Ok(ops)
    }

    async fn error_operations(&self, op: &model::ErrorCheck) -> Result<Vec<Operation>> {
        let timeout = resolve(op.timeout, || self.timeouts.error_duration());
        let mut ops = Vec::new();
        for mut resource in self.resources(&op.source).await? {
            self.namespacer.apply(&mut resource);
            let label = resource.describe();
            let action = operations::ErrorCheck::new(
                self.client.clone(),
                self.checker.clone(),
                resource,
                self.bindings(),
            );
            // Error checks are reported as commands
            let operation = self.operation("ERROR", label, OperationKind::Command, action);
            ops.push(operation.with_timeout(timeout));
        }
        Ok(ops)
    }

    fn delete_operation(&self, op: &model::Delete) -> Operation {
        let mut resource = Resource::from_identity(
            &op.api_version,
            &op.kind,
            op.name.as_deref(),
            op.namespace.as_deref(),
            &op.labels,
        );
        self.namespacer.apply(&mut resource);
        let label = resource.describe();
        let timeout = resolve(op.timeout, || self.timeouts.delete_duration());
        let action = operations::Delete::new(self.client.clone(), resource);
        self.operation("DELETE", label, OperationKind::Delete, action)
            .with_timeout(timeout)
    }

    fn command_operation(&self, op: &model::Command) -> Operation {
        let action = operations::Command::new(
            &op.entrypoint,
            &op.args,
            &self.test.base_path,
            self.namespacer.namespace(),
            self.logger.clone(),
        );
        let label = std::iter::once(op.entrypoint.clone())
            .chain(action.expanded_args())
            .collect::<Vec<_>>()
            .join(" ");
        let timeout = resolve(op.timeout, || self.timeouts.exec_duration());
        self.operation("CMD", label, OperationKind::Command, action)
            .with_timeout(timeout)
    }

    fn script_operation(&self, op: &model::Script) -> Operation {
        let action = operations::Script::new(
            &op.content,
            &self.test.base_path,
            self.namespacer.namespace(),
            self.logger.clone(),
        );
        let label = op.content.lines().next().unwrap_or_default().to_string();
        let timeout = resolve(op.timeout, || self.timeouts.exec_duration());
        self.operation("SCRIPT", label, OperationKind::Script, action)
            .with_timeout(timeout)
    }

    fn sleep_operation(&self, op: &model::Sleep) -> Operation {
        let label = crate::common::duration::format(op.duration);
        self.operation("SLEEP", label, OperationKind::Sleep, operations::Sleep::new(op.duration))
    }

    /// Wrap an action, attaching a fresh report entry
    fn operation(
        &self,
        section: &'static str,
        label: String,
        kind: OperationKind,
        action: impl Action + 'static,
    ) -> Operation {
        let mut operation = Operation::new(section, label.clone(), action);
        if let Some(report) = &self.report {
            operation = operation.with_report(report.add_operation(&label, kind));
        }
        operation
    }

    /// Resolve inline, file or URI resources
    async fn resources(&self, source: &FileRefOrResource) -> Result<Vec<Resource>> {
        if let Some(value) = &source.resource {
            return Ok(vec![Resource::from_value(value.clone())?]);
        }
        match source.file.as_deref().filter(|f| !f.is_empty()) {
            Some(file) => match remote_url(file) {
                Some(url) => load::load_from_uri(&url).await,
                None => load::load(&self.test.base_path.join(file)),
            },
            None => Err(Error::MissingResource),
        }
    }

    /// Namespace the object and force its termination grace period
    fn prepare_resource(&self, mut resource: Resource) -> Result<Resource> {
        self.namespacer.apply(&mut resource);
        inject_grace_period(&mut resource, self.grace_period())?;
        Ok(resource)
    }

    fn grace_period(&self) -> Option<Duration> {
        self.step
            .force_termination_grace_period
            .or(self.test.spec.force_termination_grace_period)
            .or(self.config.force_termination_grace_period)
    }

    fn client(&self, dry_run: bool) -> Arc<dyn Client> {
        if dry_run {
            Arc::new(DryRun::new(self.client.clone()))
        } else {
            self.client.clone()
        }
    }

    /// Cleanup handle for created objects, unless deletion is skipped
    fn registrar(&self, dry_run: bool) -> Option<Registrar> {
        if dry_run || skip_delete(self.config, self.test, self.step) {
            return None;
        }
        Some(Registrar::new(
            self.cleaner.clone(),
            self.timeouts.cleanup_duration(),
        ))
    }

    fn bindings(&self) -> Bindings {
        let mut bindings = Bindings::new();
        bindings.insert(
            "namespace".to_string(),
            Value::String(self.namespacer.namespace().to_string()),
        );
        bindings
    }
}

/// Whether any layer asks to keep created objects
pub fn skip_delete(config: &Config, test: &Test, step: &Step) -> bool {
    config.skip_delete || test.spec.skip_delete == Some(true) || step.skip_delete == Some(true)
}

/// Set `terminationGracePeriodSeconds` on pods and pod templates
///
/// Only whole, non-zero seconds are applied. Kinds without a pod spec are
/// left untouched.
pub fn inject_grace_period(resource: &mut Resource, grace_period: Option<Duration>) -> Result<()> {
    let Some(seconds) = grace_period.map(|d| d.as_secs()).filter(|s| *s != 0) else {
        return Ok(());
    };
    let path: &[&str] = match resource.kind() {
        "Pod" => &["spec", "terminationGracePeriodSeconds"],
        "Deployment" | "StatefulSet" | "DaemonSet" | "Job" => {
            &["spec", "template", "spec", "terminationGracePeriodSeconds"]
        }
        "CronJob" => &[
            "spec",
            "jobTemplate",
            "spec",
            "template",
            "spec",
            "terminationGracePeriodSeconds",
        ],
        _ => return Ok(()),
    };
    resource.set_nested(Value::from(seconds), path)
}

fn remote_url(file: &str) -> Option<reqwest::Url> {
    reqwest::Url::parse(file)
        .ok()
        .filter(|url| matches!(url.scheme(), "http" | "https"))
}

/// A built step, ready to run
pub struct PreparedStep {
    pub try_ops: Vec<Operation>,
    pub teardown: StepTeardown,
    logger: Logger,
}

/// Outcome of a try list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TryOutcome {
    /// Some operation failed
    pub failed: bool,
    /// A failure without continue-on-error ended the list (and the test)
    pub stopped: bool,
}

/// Run try operations in order
///
/// A failure skips the remaining operations unless the failed operation is
/// marked continue-on-error. A cancelled context aborts the list as failed.
pub async fn run_try(ops: &[Operation], ctx: &Context, logger: &Logger) -> TryOutcome {
    let mut outcome = TryOutcome::default();
    logger.log(Phase::Try.section(), Status::Run, "");
    for op in ops {
        if let Some(err) = ctx.err() {
            logger.log(Phase::Try.section(), Status::Error, err);
            outcome.failed = true;
            outcome.stopped = true;
            break;
        }
        if op.execute(ctx, logger).await.is_err() {
            outcome.failed = true;
            if !op.continue_on_error {
                outcome.stopped = true;
                break;
            }
        }
    }
    logger.log(Phase::Try.section(), Status::Done, "");
    outcome
}

impl PreparedStep {
    /// Split into the try list and what must run at teardown
    pub fn into_parts(self) -> (Vec<Operation>, StepTeardown, Logger) {
        (self.try_ops, self.teardown, self.logger)
    }
}

/// Deferred work of a step: catch, finally and cleanup
pub struct StepTeardown {
    catch: Vec<Operation>,
    finally: Vec<Operation>,
    cleaner: Arc<Cleaner>,
    report: Option<StepReport>,
    logger: Logger,
    try_failed: bool,
}

impl StepTeardown {
    /// Record that the step's try list failed so catch will run
    pub fn mark_failed(&mut self) {
        self.try_failed = true;
    }

    /// Run catch (only after a failed try), then finally, then cleanup
    ///
    /// Returns whether anything failed.
    pub async fn run(self, ctx: &Context) -> bool {
        let mut failed = false;
        if self.try_failed {
            failed |= run_best_effort(Phase::Catch, &self.catch, ctx, &self.logger).await;
        }
        failed |= run_best_effort(Phase::Finally, &self.finally, ctx, &self.logger).await;
        if !self.cleaner.is_empty() {
            self.logger.log("CLEANUP", Status::Run, "");
            let errors = self
                .cleaner
                .run(ctx, &self.logger, self.report.as_ref())
                .await;
            self.logger.log("CLEANUP", Status::Done, "");
            failed |= !errors.is_empty();
        }
        failed
    }
}

async fn run_best_effort(phase: Phase, ops: &[Operation], ctx: &Context, logger: &Logger) -> bool {
    if ops.is_empty() {
        return false;
    }
    let mut failed = false;
    logger.log(phase.section(), Status::Run, "");
    for op in ops {
        if op.execute(ctx, logger).await.is_err() {
            failed = true;
        }
    }
    logger.log(phase.section(), Status::Done, "");
    failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resource(value: Value) -> Resource {
        Resource::from_value(value).unwrap()
    }

    fn object(api_version: &str, kind: &str) -> Resource {
        resource(json!({"apiVersion": api_version, "kind": kind, "metadata": {"name": "x"}}))
    }

    const POD_GRACE: &[&str] = &["spec", "terminationGracePeriodSeconds"];

    #[test]
    fn test_grace_period_on_pod_and_templates() {
        let grace = Some(Duration::from_secs(7));

        let mut pod = object("v1", "Pod");
        inject_grace_period(&mut pod, grace).unwrap();
        assert_eq!(pod.get_nested(POD_GRACE), Some(&json!(7)));

        let mut cron = object("batch/v1", "CronJob");
        inject_grace_period(&mut cron, grace).unwrap();
        assert_eq!(
            cron.get_nested(&[
                "spec",
                "jobTemplate",
                "spec",
                "template",
                "spec",
                "terminationGracePeriodSeconds"
            ]),
            Some(&json!(7))
        );

        let mut cm = object("v1", "ConfigMap");
        let before = cm.clone();
        inject_grace_period(&mut cm, grace).unwrap();
        assert_eq!(cm, before);
    }

    #[test]
    fn test_grace_period_zero_or_sub_second_is_ignored() {
        let mut pod = object("v1", "Pod");
        let before = pod.clone();
        inject_grace_period(&mut pod, Some(Duration::from_millis(500))).unwrap();
        inject_grace_period(&mut pod, None).unwrap();
        assert_eq!(pod, before);
    }

    #[test]
    fn test_grace_period_on_non_map_is_an_error() {
        let mut deploy = resource(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"name": "d"},
            "spec": {"template": 3}
        }));
        assert!(inject_grace_period(&mut deploy, Some(Duration::from_secs(1))).is_err());
    }

    #[test]
    fn test_phase_continue_on_error() {
        assert!(!Phase::Try.continue_on_error(None));
        assert!(Phase::Try.continue_on_error(Some(true)));
        assert!(Phase::Catch.continue_on_error(Some(false)));
        assert!(Phase::Finally.continue_on_error(None));
    }

    #[test]
    fn test_remote_url() {
        assert!(remote_url("https://example.com/cm.yaml").is_some());
        assert!(remote_url("manifests/cm.yaml").is_none());
        assert!(remote_url("/abs/cm.yaml").is_none());
    }
}
