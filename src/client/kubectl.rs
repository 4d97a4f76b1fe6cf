//! Client that drives the cluster through the `kubectl` binary

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Client, ClientError, TypeMeta, WriteOptions};
use crate::common::config::KubectlConfig;
use crate::resource::{ObjectKey, Resource};

/// `kubectl`-backed client
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: PathBuf,
    context: Option<String>,
    kubeconfig: Option<PathBuf>,
}

impl Kubectl {
    /// Locate `kubectl` (explicit path or PATH lookup) and remember cluster flags
    pub fn new(config: &KubectlConfig) -> Result<Self, ClientError> {
        let binary = match &config.path {
            Some(path) => path.clone(),
            None => which::which("kubectl")
                .map_err(|e| ClientError::Unavailable(format!("kubectl not found in PATH: {e}")))?,
        };
        Ok(Self {
            binary,
            context: config.context.clone(),
            kubeconfig: config.kubeconfig.clone(),
        })
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(context) = &self.context {
            cmd.arg("--context").arg(context);
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    async fn run(&self, mut cmd: Command, stdin: Option<Vec<u8>>) -> Result<Vec<u8>, ClientError> {
        if stdin.is_some() {
            cmd.stdin(Stdio::piped());
        }
        tracing::debug!(command = ?cmd.as_std(), "kubectl");
        let mut child = cmd
            .spawn()
            .map_err(|e| ClientError::Unavailable(format!("failed to run kubectl: {e}")))?;
        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(&input)
                    .await
                    .map_err(|e| ClientError::Api(format!("failed to write to kubectl: {e}")))?;
            }
        }
        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ClientError::Api(format!("failed to wait for kubectl: {e}")))?;
        if output.status.success() {
            return Ok(output.stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify(&stderr))
    }

    fn parse_object(bytes: &[u8]) -> Result<Resource, ClientError> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| ClientError::Api(format!("invalid kubectl output: {e}")))?;
        Resource::from_value(value).map_err(|e| ClientError::Api(e.to_string()))
    }
}

#[async_trait]
impl Client for Kubectl {
    async fn get(&self, type_meta: &TypeMeta, key: &ObjectKey) -> Result<Resource, ClientError> {
        let mut cmd = self.command();
        cmd.arg("get").arg(resource_type(type_meta)).arg(&key.name);
        if !key.namespace.is_empty() {
            cmd.arg("-n").arg(&key.namespace);
        }
        cmd.arg("-o").arg("json");
        let stdout = self.run(cmd, None).await?;
        Self::parse_object(&stdout)
    }

    async fn list(
        &self,
        type_meta: &TypeMeta,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Resource>, ClientError> {
        let mut cmd = self.command();
        cmd.arg("get").arg(resource_type(type_meta));
        match namespace {
            Some(ns) => cmd.arg("-n").arg(ns),
            None => cmd.arg("--all-namespaces"),
        };
        if !labels.is_empty() {
            cmd.arg("-l").arg(selector(labels));
        }
        cmd.arg("-o").arg("json");
        let stdout = self.run(cmd, None).await?;
        let list: Value = serde_json::from_slice(&stdout)
            .map_err(|e| ClientError::Api(format!("invalid kubectl output: {e}")))?;
        list.get("items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .cloned()
                    .map(|item| {
                        Resource::from_value(item).map_err(|e| ClientError::Api(e.to_string()))
                    })
                    .collect()
            })
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn create(&self, obj: &Resource, options: WriteOptions) -> Result<Resource, ClientError> {
        let mut cmd = self.command();
        cmd.arg("create").arg("-f").arg("-").arg("-o").arg("json");
        if options.dry_run {
            cmd.arg("--dry-run=server");
        }
        let body = serde_json::to_vec(obj).map_err(|e| ClientError::Api(e.to_string()))?;
        let stdout = self.run(cmd, Some(body)).await?;
        Self::parse_object(&stdout)
    }

    async fn patch(&self, obj: &Resource, options: WriteOptions) -> Result<Resource, ClientError> {
        let mut cmd = self.command();
        cmd.arg("patch")
            .arg(resource_type(&TypeMeta::of(obj)))
            .arg(obj.name());
        if !obj.namespace().is_empty() {
            cmd.arg("-n").arg(obj.namespace());
        }
        let body = serde_json::to_string(obj).map_err(|e| ClientError::Api(e.to_string()))?;
        cmd.arg("--type").arg("merge").arg("-p").arg(body).arg("-o").arg("json");
        if options.dry_run {
            cmd.arg("--dry-run=server");
        }
        let stdout = self.run(cmd, None).await?;
        Self::parse_object(&stdout)
    }

    async fn delete(&self, obj: &Resource, options: WriteOptions) -> Result<(), ClientError> {
        let mut cmd = self.command();
        cmd.arg("delete")
            .arg(resource_type(&TypeMeta::of(obj)))
            .arg(obj.name());
        if !obj.namespace().is_empty() {
            cmd.arg("-n").arg(obj.namespace());
        }
        cmd.arg("--wait=false");
        if options.dry_run {
            cmd.arg("--dry-run=server");
        }
        self.run(cmd, None).await.map(|_| ())
    }
}

/// `Kind` for the core group, `Kind.version.group` otherwise
fn resource_type(type_meta: &TypeMeta) -> String {
    match type_meta.api_version.split_once('/') {
        Some((group, version)) => format!("{}.{}.{}", type_meta.kind, version, group),
        None => type_meta.kind.clone(),
    }
}

fn selector(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

fn classify(stderr: &str) -> ClientError {
    if stderr.contains("(NotFound)") || stderr.contains("not found") {
        ClientError::NotFound {
            kind: String::new(),
            key: stderr.to_string(),
        }
    } else if stderr.contains("(AlreadyExists)") {
        ClientError::AlreadyExists {
            kind: String::new(),
            key: stderr.to_string(),
        }
    } else {
        ClientError::Api(stderr.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_type() {
        let core = TypeMeta {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        };
        assert_eq!(resource_type(&core), "ConfigMap");
        let apps = TypeMeta {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
        };
        assert_eq!(resource_type(&apps), "Deployment.v1.apps");
    }

    #[test]
    fn test_selector() {
        let mut labels = BTreeMap::new();
        labels.insert("app".to_string(), "web".to_string());
        labels.insert("tier".to_string(), "front".to_string());
        assert_eq!(selector(&labels), "app=web,tier=front");
    }

    #[test]
    fn test_classify() {
        assert!(
            classify("Error from server (NotFound): configmaps \"x\" not found").is_not_found()
        );
        assert!(matches!(
            classify("Error from server (AlreadyExists): configmaps \"x\" already exists"),
            ClientError::AlreadyExists { .. }
        ));
        assert!(matches!(classify("connection refused"), ClientError::Api(_)));
    }
}
