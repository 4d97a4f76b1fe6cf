//! Scoping objects to the test namespace

use crate::resource::Resource;

/// Kinds that never live in a namespace
const CLUSTER_SCOPED: &[&str] = &[
    "APIService",
    "CSIDriver",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "Node",
    "PersistentVolume",
    "PriorityClass",
    "RuntimeClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

/// Places namespaced objects without an explicit namespace into the test namespace
#[derive(Debug, Clone)]
pub struct Namespacer {
    namespace: String,
}

impl Namespacer {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn apply(&self, resource: &mut Resource) {
        if resource.namespace().is_empty() && !is_cluster_scoped(resource.kind()) {
            resource.set_namespace(&self.namespace);
        }
    }
}

pub fn is_cluster_scoped(kind: &str) -> bool {
    CLUSTER_SCOPED.contains(&kind)
}
