//! Run report
//!
//! Report handles are shared (`Arc<Mutex<_>>`) so an operation can record its
//! outcome while the tree that owns it is still being built. The whole tree
//! serializes to JSON.

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::common::{lock, Error, Result};

/// Kind of operation a report entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Apply,
    Assert,
    Command,
    Create,
    Delete,
    Script,
    Sleep,
}

#[derive(Debug, Serialize)]
struct ReportData {
    name: String,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ended_at: Option<DateTime<Utc>>,
    tests: Vec<TestReport>,
}

/// Root of the report tree
#[derive(Debug, Clone)]
pub struct Report {
    inner: Arc<Mutex<ReportData>>,
}

impl Report {
    pub fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ReportData {
                name: name.to_string(),
                started_at: Utc::now(),
                ended_at: None,
                tests: Vec::new(),
            })),
        }
    }

    pub fn add_test(&self, name: &str) -> TestReport {
        let test = TestReport::new(name);
        lock(&self.inner).tests.push(test.clone());
        test
    }

    pub fn tests(&self) -> Vec<TestReport> {
        lock(&self.inner).tests.clone()
    }

    pub fn finish(&self) {
        lock(&self.inner).ended_at = Some(Utc::now());
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the report as pretty-printed JSON
    pub fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.to_json()?).map_err(|e| {
            Error::Config(format!("failed to write report '{}': {}", path.display(), e))
        })
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        lock(&self.inner).serialize(serializer)
    }
}

#[derive(Debug, Serialize)]
struct TestReportData {
    name: String,
    started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ended_at: Option<DateTime<Utc>>,
    failed: bool,
    skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    steps: Vec<StepReport>,
}

#[derive(Debug, Clone)]
pub struct TestReport {
    inner: Arc<Mutex<TestReportData>>,
}

impl TestReport {
    fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TestReportData {
                name: name.to_string(),
                started_at: Utc::now(),
                ended_at: None,
                failed: false,
                skipped: false,
                namespace: None,
                error: None,
                steps: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> String {
        lock(&self.inner).name.clone()
    }

    pub fn add_step(&self, name: &str) -> StepReport {
        let step = StepReport::new(name);
        lock(&self.inner).steps.push(step.clone());
        step
    }

    pub fn steps(&self) -> Vec<StepReport> {
        lock(&self.inner).steps.clone()
    }

    pub fn set_namespace(&self, namespace: &str) {
        lock(&self.inner).namespace = Some(namespace.to_string());
    }

    /// Mark the test failed, keeping the first error recorded
    pub fn fail(&self, error: Option<&str>) {
        let mut data = lock(&self.inner);
        data.failed = true;
        if data.error.is_none() {
            data.error = error.map(str::to_string);
        }
    }

    pub fn skip(&self) {
        lock(&self.inner).skipped = true;
    }

    pub fn finish(&self) {
        lock(&self.inner).ended_at = Some(Utc::now());
    }

    pub fn failed(&self) -> bool {
        lock(&self.inner).failed
    }

    pub fn skipped(&self) -> bool {
        lock(&self.inner).skipped
    }
}

impl Serialize for TestReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        lock(&self.inner).serialize(serializer)
    }
}

#[derive(Debug, Serialize)]
struct StepReportData {
    name: String,
    operations: Vec<OperationReport>,
}

#[derive(Debug, Clone)]
pub struct StepReport {
    inner: Arc<Mutex<StepReportData>>,
}

impl StepReport {
    fn new(name: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StepReportData {
                name: name.to_string(),
                operations: Vec::new(),
            })),
        }
    }

    pub fn name(&self) -> String {
        lock(&self.inner).name.clone()
    }

    /// Attach a new operation entry
    pub fn add_operation(&self, name: &str, kind: OperationKind) -> OperationReport {
        let operation = OperationReport::new(name, kind);
        lock(&self.inner).operations.push(operation.clone());
        operation
    }

    pub fn operations(&self) -> Vec<OperationReport> {
        lock(&self.inner).operations.clone()
    }
}

impl Serialize for StepReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        lock(&self.inner).serialize(serializer)
    }
}

#[derive(Debug, Serialize)]
struct OperationReportData {
    name: String,
    kind: OperationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ended_at: Option<DateTime<Utc>>,
    failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OperationReport {
    inner: Arc<Mutex<OperationReportData>>,
}

impl OperationReport {
    fn new(name: &str, kind: OperationKind) -> Self {
        Self {
            inner: Arc::new(Mutex::new(OperationReportData {
                name: name.to_string(),
                kind,
                started_at: None,
                ended_at: None,
                failed: false,
                error: None,
            })),
        }
    }

    pub fn name(&self) -> String {
        lock(&self.inner).name.clone()
    }

    pub fn kind(&self) -> OperationKind {
        lock(&self.inner).kind
    }

    pub fn start(&self) {
        lock(&self.inner).started_at = Some(Utc::now());
    }

    /// Record the outcome of the operation
    pub fn finish(&self, error: Option<&Error>) {
        let mut data = lock(&self.inner);
        data.ended_at = Some(Utc::now());
        if let Some(error) = error {
            data.failed = true;
            data.error = Some(error.to_string());
        }
    }

    pub fn started(&self) -> bool {
        lock(&self.inner).started_at.is_some()
    }

    pub fn failed(&self) -> bool {
        lock(&self.inner).failed
    }

    pub fn error(&self) -> Option<String> {
        lock(&self.inner).error.clone()
    }
}

impl Serialize for OperationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        lock(&self.inner).serialize(serializer)
    }
}
