//! Test runner implementation
//!
//! Drives tests step by step against a cluster client. Each test gets a
//! namespace, and everything a step registers for teardown (catch, finally,
//! created objects) is unwound in reverse step order once the test body
//! ends, whatever the reason it ended.

use colored::Colorize;
use futures_util::{FutureExt, StreamExt};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use super::cleanup::Cleaner;
use super::config::Test;
use super::context::Context;
use super::logging::{Logger, Status};
use super::namespacer::Namespacer;
use super::report::{Report, TestReport};
use super::step::{run_try, StepProcessor, StepTeardown};
use crate::check::Checker;
use crate::client::{Client, TypeMeta, WriteOptions};
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::resource::Resource;

/// Result of a test run
#[derive(Debug, Clone)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub skipped: bool,
    pub steps_run: usize,
    pub steps_total: usize,
    pub error: Option<String>,
}

/// Runs tests against one cluster
pub struct Runner {
    config: Arc<Config>,
    client: Arc<dyn Client>,
    checker: Arc<dyn Checker>,
    report: Report,
}

impl Runner {
    pub fn new(
        config: Arc<Config>,
        client: Arc<dyn Client>,
        checker: Arc<dyn Checker>,
        report: Report,
    ) -> Self {
        Self {
            config,
            client,
            checker,
            report,
        }
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Run tests, up to `parallel` at a time
    ///
    /// With fail-fast the first failure cancels `ctx`; tests that have not
    /// started yet are reported as skipped.
    pub async fn run_tests(&self, tests: Vec<Test>, ctx: &Context) -> Vec<TestResult> {
        let parallel = self.config.parallel.max(1);
        let fail_fast = self.config.fail_fast;
        let this = self;
        let results = futures_util::stream::iter(tests)
            .map(move |test| async move {
                let result = this.run_test(&test, ctx).await;
                if fail_fast && !result.passed && !result.skipped {
                    ctx.cancel();
                }
                result
            })
            .buffer_unordered(parallel)
            .collect::<Vec<_>>()
            .await;
        self.report.finish();
        results
    }

    /// Run a single test, including its teardown
    pub async fn run_test(&self, test: &Test, ctx: &Context) -> TestResult {
        let test_report = self.report.add_test(test.name());
        let logger = Logger::new(test.name());
        let steps_total = test.spec.steps.len();
        let mut result = TestResult {
            name: test.name().to_string(),
            passed: true,
            skipped: false,
            steps_run: 0,
            steps_total,
            error: None,
        };

        if test.spec.skip || ctx.is_cancelled() {
            test_report.skip();
            test_report.finish();
            result.skipped = true;
            return result;
        }

        println!(
            "\n{} {}",
            "Running Test:".blue().bold(),
            test.name().white().bold()
        );

        let body_ctx = ctx.child();
        // Teardown must still run after a fail-fast cancellation of the run
        let teardown_ctx = Context::background();

        let namespace_cleaner = Arc::new(Cleaner::new());
        let namespacer = match self
            .setup_namespace(test, &namespace_cleaner, &logger, &test_report)
            .await
        {
            Ok(namespacer) => namespacer,
            Err(e) => {
                logger.log("SETUP", Status::Error, &e);
                fail(&mut result, &test_report, &e.to_string());
                test_report.finish();
                return result;
            }
        };

        let mut frames: Vec<StepTeardown> = Vec::new();
        for (i, step) in test.spec.steps.iter().enumerate() {
            let step_name = if step.name.is_empty() {
                format!("step-{}", i + 1)
            } else {
                step.name.clone()
            };
            let step_logger = logger.with_step(&step_name);
            let step_report = test_report.add_step(&step_name);
            result.steps_run = i + 1;

            let processor = StepProcessor::new(
                &self.config,
                self.client.clone(),
                self.checker.clone(),
                &namespacer,
                test,
                step,
                Some(step_report),
                step_logger.clone(),
            );
            let prepared = match processor.prepare().await {
                Ok(prepared) => prepared,
                Err(e) => {
                    step_logger.log("BUILD", Status::Error, &e);
                    fail(&mut result, &test_report, &e.to_string());
                    break;
                }
            };

            let (try_ops, teardown, step_logger) = prepared.into_parts();
            frames.push(teardown);

            let outcome = AssertUnwindSafe(run_try(&try_ops, &body_ctx, &step_logger))
                .catch_unwind()
                .await;
            match outcome {
                Ok(outcome) if outcome.failed => {
                    if let Some(frame) = frames.last_mut() {
                        frame.mark_failed();
                    }
                    fail(&mut result, &test_report, &format!("step {step_name} failed"));
                    if outcome.stopped {
                        break;
                    }
                }
                Ok(_) => {}
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    step_logger.log("TRY", Status::Error, format!("panicked: {message}"));
                    if let Some(frame) = frames.last_mut() {
                        frame.mark_failed();
                    }
                    fail(
                        &mut result,
                        &test_report,
                        &format!("step {step_name} panicked: {message}"),
                    );
                    break;
                }
            }
        }

        while let Some(frame) = frames.pop() {
            if frame.run(&teardown_ctx).await {
                fail(&mut result, &test_report, "teardown failed");
            }
        }

        if !namespace_cleaner.is_empty() {
            let errors = namespace_cleaner.run(&teardown_ctx, &logger, None).await;
            if !errors.is_empty() {
                fail(&mut result, &test_report, "namespace cleanup failed");
            }
        }

        test_report.finish();
        print_outcome(&result);
        result
    }

    /// Pick the test namespace and make sure it exists
    ///
    /// A namespace created here is registered for deletion unless deletion
    /// is skipped for the test.
    async fn setup_namespace(
        &self,
        test: &Test,
        cleaner: &Arc<Cleaner>,
        logger: &Logger,
        report: &TestReport,
    ) -> Result<Namespacer> {
        let name = test
            .spec
            .namespace
            .clone()
            .or_else(|| self.config.namespace.clone())
            .unwrap_or_else(generate_namespace);
        report.set_namespace(&name);

        let namespace =
            Resource::from_identity("v1", "Namespace", Some(&name), None, &Default::default());
        let type_meta = TypeMeta::of(&namespace);
        match self.client.get(&type_meta, &namespace.key()).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                logger.log("SETUP", Status::Run, format!("create namespace {name}"));
                self.client
                    .create(&namespace, WriteOptions::default())
                    .await
                    .map_err(Error::from)?;
                let skip = self.config.skip_delete || test.spec.skip_delete == Some(true);
                if !skip {
                    cleaner.register(
                        namespace,
                        self.client.clone(),
                        self.config.timeouts.combine(&test.spec.timeouts).cleanup_duration(),
                    );
                }
            }
            Err(e) => return Err(e.into()),
        }
        Ok(Namespacer::new(name))
    }
}

/// Summarize results the way the per-test output does
pub fn print_summary(results: &[TestResult]) {
    let passed = results.iter().filter(|r| r.passed && !r.skipped).count();
    let skipped = results.iter().filter(|r| r.skipped).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    println!(
        "\n{} passed: {}, failed: {}, skipped: {}",
        "Tests:".bold(),
        passed.to_string().green(),
        failed.to_string().red(),
        skipped.to_string().yellow()
    );
    for result in results.iter().filter(|r| !r.passed) {
        println!(
            "  {} {} ({}/{} steps): {}",
            "✗".red(),
            result.name,
            result.steps_run,
            result.steps_total,
            result.error.as_deref().unwrap_or("failed")
        );
    }
}

fn print_outcome(result: &TestResult) {
    if result.passed {
        println!(
            "\n{} {} {}\n",
            "✓".green().bold(),
            "Test Passed:".green().bold(),
            result.name
        );
    } else {
        println!(
            "\n{} {} {}\n",
            "✗".red().bold(),
            "Test Failed:".red().bold(),
            result.name
        );
    }
}

fn fail(result: &mut TestResult, report: &TestReport, error: &str) {
    result.passed = false;
    if result.error.is_none() {
        result.error = Some(error.to_string());
    }
    report.fail(Some(error));
}

fn generate_namespace() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("kubestep-{}", &id[..12])
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
