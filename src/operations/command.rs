//! Running local programs

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use crate::common::{Error, Result};
use crate::testing::context::Context;
use crate::testing::logging::{Logger, Status};
use crate::testing::operation::Action;

/// Runs `entrypoint args…` in the test directory
///
/// `NAMESPACE` is exported to the child and `$NAMESPACE` (like any other
/// environment variable) is expanded in the arguments.
pub struct Command {
    entrypoint: String,
    args: Vec<String>,
    base_path: PathBuf,
    namespace: String,
    logger: Logger,
}

impl Command {
    pub fn new(
        entrypoint: &str,
        args: &[String],
        base_path: &Path,
        namespace: &str,
        logger: Logger,
    ) -> Self {
        Self {
            entrypoint: entrypoint.to_string(),
            args: args.to_vec(),
            base_path: base_path.to_path_buf(),
            namespace: namespace.to_string(),
            logger,
        }
    }

    /// Arguments with environment references expanded
    pub fn expanded_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| expand(arg, &self.namespace))
            .collect()
    }
}

#[async_trait]
impl Action for Command {
    async fn exec(&self, _ctx: &Context) -> Result<()> {
        let mut cmd = tokio::process::Command::new(&self.entrypoint);
        cmd.args(self.expanded_args());
        run_process(cmd, &self.entrypoint, &self.base_path, &self.namespace, &self.logger).await
    }
}

/// Expand `$VAR` references, resolving `NAMESPACE` to the test namespace
pub(crate) fn expand(input: &str, namespace: &str) -> String {
    shellexpand::env_with_context_no_errors(input, |var| match var {
        "NAMESPACE" => Some(namespace.to_string()),
        _ => std::env::var(var).ok(),
    })
    .into_owned()
}

/// Spawn a prepared process, log its output and fail on a non-zero exit
///
/// The child is killed when the returned future is dropped, which is how
/// timeouts and cancellation reach it.
pub(crate) async fn run_process(
    mut cmd: tokio::process::Command,
    display: &str,
    base_path: &Path,
    namespace: &str,
    logger: &Logger,
) -> Result<()> {
    cmd.current_dir(base_path)
        .env("NAMESPACE", namespace)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(command = ?cmd.as_std(), "spawning");
    let output = cmd.output().await.map_err(|e| Error::Spawn {
        command: display.to_string(),
        error: e.to_string(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    for line in stdout.lines().chain(stderr.lines()) {
        logger.log("OUT", Status::Log, line);
    }

    if output.status.success() {
        Ok(())
    } else {
        Err(Error::exit_status(display, output.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_is_expanded() {
        assert_eq!(expand("-n=$NAMESPACE", "kubestep-1"), "-n=kubestep-1");
        assert_eq!(expand("${NAMESPACE}/x", "kubestep-1"), "kubestep-1/x");
        assert_eq!(expand("$KUBESTEP_UNSET_VAR", "ns"), "$KUBESTEP_UNSET_VAR");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_fails() {
        let dir = tempfile::tempdir().unwrap();
        let ok = Command::new("true", &[], dir.path(), "ns", Logger::new("t"));
        ok.exec(&Context::background()).await.unwrap();

        let failing = Command::new("false", &[], dir.path(), "ns", Logger::new("t"));
        let err = failing.exec(&Context::background()).await.unwrap_err();
        assert!(matches!(err, Error::ExitStatus { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_missing_program() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = Command::new("kubestep-no-such-program", &[], dir.path(), "ns", Logger::new("t"));
        let err = cmd.exec(&Context::background()).await.unwrap_err();
        assert!(matches!(err, Error::Spawn { .. }));
    }
}
