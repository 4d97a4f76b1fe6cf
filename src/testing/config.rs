//! Test document types
//!
//! Defines the data structures for deserializing YAML test documents.

use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::timeout::Timeouts;
use crate::common::{Error, Result};

/// A complete test loaded from a YAML file
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub spec: TestSpec,
    /// Directory holding the test file; relative paths resolve against it
    #[serde(skip)]
    pub base_path: PathBuf,
}

impl Test {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct TestSpec {
    #[serde(default)]
    pub timeouts: Timeouts,
    pub skip_delete: Option<bool>,
    /// Run in this namespace instead of a generated one
    pub namespace: Option<String>,
    #[serde(default, with = "crate::common::duration::option")]
    pub force_termination_grace_period: Option<Duration>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// One step of a test
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub timeouts: Timeouts,
    pub skip_delete: Option<bool>,
    #[serde(default, with = "crate::common::duration::option")]
    pub force_termination_grace_period: Option<Duration>,
    #[serde(default)]
    pub r#try: Vec<TryDirective>,
    #[serde(default)]
    pub catch: Vec<CatchDirective>,
    #[serde(default)]
    pub finally: Vec<CatchDirective>,
}

/// An entry of a step's try list; exactly one operation must be set
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TryDirective {
    pub continue_on_error: Option<bool>,
    pub apply: Option<Apply>,
    pub assert: Option<Assert>,
    pub command: Option<Command>,
    pub create: Option<Create>,
    pub delete: Option<Delete>,
    pub error: Option<ErrorCheck>,
    pub script: Option<Script>,
    pub sleep: Option<Sleep>,
}

/// What a try entry does
#[derive(Debug, Clone)]
pub enum TryAction {
    Apply(Apply),
    Assert(Assert),
    Command(Command),
    Create(Create),
    Delete(Delete),
    Error(ErrorCheck),
    Script(Script),
    Sleep(Sleep),
}

impl TryDirective {
    /// Resolve the single operation this entry holds
    pub fn action(&self) -> Result<TryAction> {
        let mut found = Vec::new();
        if let Some(op) = &self.apply {
            found.push(("apply", TryAction::Apply(op.clone())));
        }
        if let Some(op) = &self.assert {
            found.push(("assert", TryAction::Assert(op.clone())));
        }
        if let Some(op) = &self.command {
            found.push(("command", TryAction::Command(op.clone())));
        }
        if let Some(op) = &self.create {
            found.push(("create", TryAction::Create(op.clone())));
        }
        if let Some(op) = &self.delete {
            found.push(("delete", TryAction::Delete(op.clone())));
        }
        if let Some(op) = &self.error {
            found.push(("error", TryAction::Error(op.clone())));
        }
        if let Some(op) = &self.script {
            found.push(("script", TryAction::Script(op.clone())));
        }
        if let Some(op) = &self.sleep {
            found.push(("sleep", TryAction::Sleep(op.clone())));
        }
        single(found)
    }
}

/// An entry of a step's catch or finally list
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CatchDirective {
    pub pod_logs: Option<PodLogs>,
    pub events: Option<Events>,
    pub command: Option<Command>,
    pub script: Option<Script>,
    pub sleep: Option<Sleep>,
}

/// What a catch or finally entry does
#[derive(Debug, Clone)]
pub enum CatchAction {
    PodLogs(PodLogs),
    Events(Events),
    Command(Command),
    Script(Script),
    Sleep(Sleep),
}

impl CatchDirective {
    pub fn action(&self) -> Result<CatchAction> {
        let mut found = Vec::new();
        if let Some(op) = &self.pod_logs {
            found.push(("podLogs", CatchAction::PodLogs(op.clone())));
        }
        if let Some(op) = &self.events {
            found.push(("events", CatchAction::Events(op.clone())));
        }
        if let Some(op) = &self.command {
            found.push(("command", CatchAction::Command(op.clone())));
        }
        if let Some(op) = &self.script {
            found.push(("script", CatchAction::Script(op.clone())));
        }
        if let Some(op) = &self.sleep {
            found.push(("sleep", CatchAction::Sleep(op.clone())));
        }
        single(found)
    }
}

fn single<T>(mut found: Vec<(&'static str, T)>) -> Result<T> {
    match found.len() {
        0 => Err(Error::NoOperation),
        1 => Ok(found.remove(0).1),
        _ => {
            let names: Vec<_> = found.iter().map(|(name, _)| *name).collect();
            Err(Error::MultipleOperations(names.join(", ")))
        }
    }
}

/// Resources given inline or by file path / URI
#[derive(Deserialize, Debug, Clone, Default)]
pub struct FileRefOrResource {
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub resource: Option<Value>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Apply {
    #[serde(flatten)]
    pub source: FileRefOrResource,
    pub dry_run: Option<bool>,
    #[serde(default, with = "crate::common::duration::option")]
    pub timeout: Option<Duration>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Create {
    #[serde(flatten)]
    pub source: FileRefOrResource,
    pub dry_run: Option<bool>,
    #[serde(default, with = "crate::common::duration::option")]
    pub timeout: Option<Duration>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Assert {
    #[serde(flatten)]
    pub source: FileRefOrResource,
    #[serde(default, with = "crate::common::duration::option")]
    pub timeout: Option<Duration>,
}

/// Expected state that must not be observed
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCheck {
    #[serde(flatten)]
    pub source: FileRefOrResource,
    #[serde(default, with = "crate::common::duration::option")]
    pub timeout: Option<Duration>,
}

/// Objects to delete, identified without a full body
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Delete {
    pub api_version: String,
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default, with = "crate::common::duration::option")]
    pub timeout: Option<Duration>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub entrypoint: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default, with = "crate::common::duration::option")]
    pub timeout: Option<Duration>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub content: String,
    #[serde(default, with = "crate::common::duration::option")]
    pub timeout: Option<Duration>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct Sleep {
    #[serde(with = "crate::common::duration::required")]
    pub duration: Duration,
}

/// Collect container logs from pods
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct PodLogs {
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub selector: Option<String>,
    pub container: Option<String>,
    pub tail: Option<i64>,
    #[serde(default, with = "crate::common::duration::option")]
    pub timeout: Option<Duration>,
}

/// Collect cluster events
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Events {
    pub namespace: Option<String>,
    pub name: Option<String>,
    pub selector: Option<String>,
    #[serde(default, with = "crate::common::duration::option")]
    pub timeout: Option<Duration>,
}

/// Load a test document and remember where it came from
pub fn load_test(path: &Path) -> Result<Test> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    let mut test: Test = serde_yaml::from_str(&content).map_err(|e| {
        Error::Config(format!("failed to parse test '{}': {}", path.display(), e))
    })?;
    if !test.kind.is_empty() && test.kind != "Test" {
        return Err(Error::Config(format!(
            "'{}' is a {}, expected a Test",
            path.display(),
            test.kind
        )));
    }
    let base_path = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    if test.metadata.name.is_empty() {
        test.metadata.name = base_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "test".to_string());
    }
    test.base_path = base_path;
    Ok(test)
}

/// Find test files: explicit files are kept, directories are walked for `file_name`
pub fn discover(paths: &[PathBuf], file_name: &str) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for path in paths {
        if path.is_dir() {
            walk(path, file_name, &mut found)?;
        } else if path.exists() {
            found.push(path.clone());
        } else {
            return Err(Error::FileRead {
                path: path.display().to_string(),
                error: "no such file or directory".to_string(),
            });
        }
    }
    Ok(found)
}

fn walk(dir: &Path, file_name: &str, found: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for entry in entries {
        if entry.is_dir() {
            walk(&entry, file_name, found)?;
        } else if entry.file_name().is_some_and(|n| n == file_name) {
            found.push(entry);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST: &str = r#"
apiVersion: kubestep.dev/v1alpha1
kind: Test
metadata:
  name: basic
spec:
  timeouts:
    assert: 10s
  forceTerminationGracePeriod: 5s
  steps:
  - name: create
    try:
    - apply:
        file: configmap.yaml
    - assert:
        resource:
          apiVersion: v1
          kind: ConfigMap
          metadata:
            name: quick-start
        timeout: 1m
    - continueOnError: true
      command:
        entrypoint: echo
        args: [hello]
    catch:
    - podLogs:
        selector: app=web
    finally:
    - sleep:
        duration: 1s
"#;

    #[test]
    fn test_parse_test_document() {
        let test: Test = serde_yaml::from_str(TEST).unwrap();
        assert_eq!(test.name(), "basic");
        assert_eq!(test.spec.timeouts.assert, Some(Duration::from_secs(10)));
        assert_eq!(test.spec.force_termination_grace_period, Some(Duration::from_secs(5)));

        let step = &test.spec.steps[0];
        assert_eq!(step.r#try.len(), 3);
        assert!(matches!(step.r#try[0].action().unwrap(), TryAction::Apply(_)));
        match step.r#try[1].action().unwrap() {
            TryAction::Assert(assert) => {
                assert_eq!(assert.timeout, Some(Duration::from_secs(60)));
                assert!(assert.source.resource.is_some());
            }
            other => panic!("unexpected action {other:?}"),
        }
        assert_eq!(step.r#try[2].continue_on_error, Some(true));
        assert!(matches!(step.catch[0].action().unwrap(), CatchAction::PodLogs(_)));
        assert!(matches!(step.finally[0].action().unwrap(), CatchAction::Sleep(_)));
    }

    #[test]
    fn test_directive_must_hold_exactly_one_operation() {
        let empty = TryDirective::default();
        assert!(matches!(empty.action(), Err(Error::NoOperation)));

        let both = TryDirective {
            script: Some(Script::default()),
            command: Some(Command::default()),
            ..Default::default()
        };
        match both.action() {
            Err(Error::MultipleOperations(names)) => assert_eq!(names, "command, script"),
            other => panic!("unexpected result {other:?}"),
        }

        assert!(matches!(CatchDirective::default().action(), Err(Error::NoOperation)));
    }

    #[test]
    fn test_load_sets_base_path_and_default_name() {
        let dir = tempfile::tempdir().unwrap();
        let test_dir = dir.path().join("my-test");
        std::fs::create_dir(&test_dir).unwrap();
        let path = test_dir.join("kubestep-test.yaml");
        std::fs::write(&path, "spec:\n  steps: []\n").unwrap();

        let test = load_test(&path).unwrap();
        assert_eq!(test.base_path, test_dir);
        assert_eq!(test.name(), "my-test");

        let found = discover(&[dir.path().to_path_buf()], "kubestep-test.yaml").unwrap();
        assert_eq!(found, vec![path]);
    }

    #[test]
    fn test_load_rejects_other_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cm.yaml");
        std::fs::write(&path, "kind: ConfigMap\nspec: {}\n").unwrap();
        assert!(matches!(load_test(&path), Err(Error::Config(_))));
    }
}
