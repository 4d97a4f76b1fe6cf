//! Running shell snippets

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::command::run_process;
use crate::common::Result;
use crate::testing::context::Context;
use crate::testing::logging::Logger;
use crate::testing::operation::Action;

/// Runs `sh -c <content>` in the test directory with `NAMESPACE` exported
pub struct Script {
    content: String,
    base_path: PathBuf,
    namespace: String,
    logger: Logger,
}

impl Script {
    pub fn new(content: &str, base_path: &Path, namespace: &str, logger: Logger) -> Self {
        Self {
            content: content.to_string(),
            base_path: base_path.to_path_buf(),
            namespace: namespace.to_string(),
            logger,
        }
    }
}

#[async_trait]
impl Action for Script {
    async fn exec(&self, _ctx: &Context) -> Result<()> {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c").arg(&self.content);
        run_process(cmd, "sh", &self.base_path, &self.namespace, &self.logger).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::common::Error;

    #[tokio::test]
    async fn test_script_sees_namespace_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker"), "").unwrap();
        let script = Script::new(
            "test \"$NAMESPACE\" = kubestep-1 && test -f marker",
            dir.path(),
            "kubestep-1",
            Logger::new("t"),
        );
        script.exec(&Context::background()).await.unwrap();

        let failing = Script::new("exit 3", dir.path(), "kubestep-1", Logger::new("t"));
        assert!(matches!(
            failing.exec(&Context::background()).await,
            Err(Error::ExitStatus { .. })
        ));
    }
}
