//! CLI command handling
//!
//! Turns parsed commands into engine runs and formats their output.

use colored::Colorize;
use futures_util::{Stream, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::check::PartialMatch;
use crate::client::{Client, Kubectl, MemoryClient};
use crate::commands::Commands;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::testing::logging::Logger;
use crate::testing::namespacer::Namespacer;
use crate::testing::step::StepProcessor;
use crate::testing::{discover, load_test, print_summary, Context, Report, Runner, Test};

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Test {
            paths,
            config,
            skip_delete,
            parallel,
            namespace,
            report_path,
            fail_fast,
            kube_context,
            kubeconfig,
            verbose: _,
        } => {
            let mut config = load_config(config.as_deref())?;
            config.skip_delete |= skip_delete;
            config.fail_fast |= fail_fast;
            if let Some(parallel) = parallel {
                if parallel == 0 {
                    return Err(Error::Config("--parallel must be at least 1".to_string()));
                }
                config.parallel = parallel;
            }
            if namespace.is_some() {
                config.namespace = namespace;
            }
            if report_path.is_some() {
                config.report.path = report_path;
            }
            if kube_context.is_some() {
                config.kubectl.context = kube_context;
            }
            if kubeconfig.is_some() {
                config.kubectl.kubeconfig = kubeconfig;
            }
            run_tests(config, &paths).await
        }

        Commands::Lint { paths, config } => {
            let config = load_config(config.as_deref())?;
            lint(&config, &paths).await
        }
    }
}

/// Explicit file, else the default config file, else defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn load_tests(config: &Config, paths: &[PathBuf]) -> Result<Vec<Test>> {
    let files = discover(paths, &config.test_file)?;
    if files.is_empty() {
        return Err(Error::Config(format!(
            "no test files named '{}' found",
            config.test_file
        )));
    }
    files.iter().map(|file| load_test(file)).collect()
}

async fn run_tests(config: Config, paths: &[PathBuf]) -> Result<()> {
    let tests = load_tests(&config, paths)?;
    let client: Arc<dyn Client> = Arc::new(Kubectl::new(&config.kubectl)?);
    let report_path = config.report.path.clone();
    let runner = Runner::new(
        Arc::new(config),
        client,
        Arc::new(PartialMatch),
        Report::new("kubestep"),
    );

    let ctx = Context::background();
    let interrupt = ctx.clone();
    tokio::spawn(async move {
        if watch_interrupts(ctrl_c_signals(), interrupt).await {
            eprintln!("Interrupted again, exiting without teardown");
            std::process::exit(130);
        }
    });

    let results = runner.run_tests(tests, &ctx).await;
    print_summary(&results);

    if let Some(path) = report_path {
        runner.report().write_json(&path)?;
        println!("Report written to {}", path.display());
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed > 0 {
        return Err(Error::TestsFailed(failed));
    }
    Ok(())
}

fn ctrl_c_signals() -> impl Stream<Item = ()> {
    futures_util::stream::unfold((), |()| async {
        tokio::signal::ctrl_c().await.ok().map(|_| ((), ()))
    })
}

/// Cancel `ctx` on the first interrupt
///
/// Returns true once a second interrupt arrives; teardown is still running
/// at that point and the caller gives up on it.
async fn watch_interrupts(signals: impl Stream<Item = ()>, ctx: Context) -> bool {
    tokio::pin!(signals);
    if signals.next().await.is_none() {
        return false;
    }
    tracing::warn!("interrupted, cancelling running tests (interrupt again to exit)");
    ctx.cancel();
    signals.next().await.is_some()
}

/// Build every step of every test against an in-memory client
async fn lint(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let files = discover(paths, &config.test_file)?;
    let client: Arc<dyn Client> = Arc::new(MemoryClient::new());
    let namespacer = Namespacer::new("kubestep-lint");
    let mut invalid = 0;

    for file in &files {
        match lint_file(config, client.clone(), &namespacer, file).await {
            Ok(()) => println!("  {} {}", "✓".green(), file.display()),
            Err(e) => {
                invalid += 1;
                println!("  {} {}: {}", "✗".red(), file.display(), e);
            }
        }
    }

    if invalid > 0 {
        return Err(Error::InvalidTests(invalid));
    }
    Ok(())
}

async fn lint_file(
    config: &Config,
    client: Arc<dyn Client>,
    namespacer: &Namespacer,
    file: &Path,
) -> Result<()> {
    let test = load_test(file)?;
    let logger = Logger::new(test.name());
    for (i, step) in test.spec.steps.iter().enumerate() {
        let processor = StepProcessor::new(
            config,
            client.clone(),
            Arc::new(PartialMatch),
            namespacer,
            &test,
            step,
            None,
            logger.with_step(&format!("step-{}", i + 1)),
        );
        processor
            .prepare()
            .await
            .map_err(|e| Error::Config(format!("step {}: {}", i + 1, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    #[tokio::test]
    async fn test_first_interrupt_cancels_second_exits() {
        let ctx = Context::background();
        assert!(watch_interrupts(stream::iter(vec![(), ()]), ctx.clone()).await);
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_single_interrupt_only_cancels() {
        let ctx = Context::background();
        assert!(!watch_interrupts(stream::iter(vec![()]), ctx.clone()).await);
        assert!(ctx.is_cancelled());

        let untouched = Context::background();
        assert!(!watch_interrupts(stream::empty(), untouched.clone()).await);
        assert!(!untouched.is_cancelled());
    }
}
