//! Cluster API clients
//!
//! The engine only needs a narrow capability set from the API server: fetch
//! by identity, list by namespace and labels, create, apply and delete. Every
//! implementation must report a missing object as [`ClientError::NotFound`]
//! so the engine can tell "absent" apart from real failures.

mod dry_run;
mod kubectl;
mod memory;

pub use dry_run::DryRun;
pub use kubectl::Kubectl;
pub use memory::{MemoryClient, Mutation};

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::resource::{ObjectKey, Resource};

/// Errors returned by cluster clients
#[derive(Debug, Error, Clone)]
pub enum ClientError {
    #[error("{kind} \"{key}\" not found")]
    NotFound { kind: String, key: String },

    #[error("{kind} \"{key}\" already exists")]
    AlreadyExists { kind: String, key: String },

    #[error("API request failed: {0}")]
    Api(String),

    #[error("client unavailable: {0}")]
    Unavailable(String),
}

impl ClientError {
    pub fn not_found(kind: &str, key: &ObjectKey) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }
}

/// Options applied to mutating requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Ask the server to validate the request without persisting it
    pub dry_run: bool,
}

/// Type information used when reading objects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMeta {
    pub api_version: String,
    pub kind: String,
}

impl TypeMeta {
    pub fn of(resource: &Resource) -> Self {
        Self {
            api_version: resource.api_version().to_string(),
            kind: resource.kind().to_string(),
        }
    }
}

/// Capabilities the engine needs from the API server
#[async_trait]
pub trait Client: Send + Sync {
    /// Fetch a single object by identity
    async fn get(&self, type_meta: &TypeMeta, key: &ObjectKey) -> Result<Resource, ClientError>;

    /// List objects of a type, optionally scoped to a namespace and label selector
    async fn list(
        &self,
        type_meta: &TypeMeta,
        namespace: Option<&str>,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<Resource>, ClientError>;

    /// Create an object that must not exist yet
    async fn create(&self, obj: &Resource, options: WriteOptions) -> Result<Resource, ClientError>;

    /// Merge the desired state into an existing object
    async fn patch(&self, obj: &Resource, options: WriteOptions) -> Result<Resource, ClientError>;

    /// Delete an object
    async fn delete(&self, obj: &Resource, options: WriteOptions) -> Result<(), ClientError>;

    /// Whether mutations through this client are persisted
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Read the live objects matching an expected object's identity
///
/// A named object is fetched directly; otherwise the type is listed within
/// the object's namespace (when set) filtered by its labels.
pub async fn read(client: &dyn Client, expected: &Resource) -> Result<Vec<Resource>, ClientError> {
    let type_meta = TypeMeta::of(expected);
    if !expected.name().is_empty() {
        let actual = client.get(&type_meta, &expected.key()).await?;
        return Ok(vec![actual]);
    }
    let namespace = Some(expected.namespace()).filter(|ns| !ns.is_empty());
    client.list(&type_meta, namespace, &expected.labels()).await
}
