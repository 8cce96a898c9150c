//! Deterministic ordering of generated resources.
//!
//! Resources have to be applied in a sensible order: namespaces before the
//! things living in them, roles before their bindings, workloads before the
//! objects exposing them. [`KindOrderer`] establishes such an order without
//! ever reordering resources of the same kind.
use indexmap::IndexSet;
use serde_json::Value;

/// The default priority table, from first to last.
pub const DEFAULT_KIND_ORDER: &[&str] = &[
    "Namespace",
    "NetworkPolicy",
    "ResourceQuota",
    "LimitRange",
    "PodSecurityPolicy",
    "PodDisruptionBudget",
    "ServiceAccount",
    "Secret",
    "SecretList",
    "ConfigMap",
    "StorageClass",
    "PersistentVolume",
    "PersistentVolumeClaim",
    "CustomResourceDefinition",
    "ClusterRole",
    "ClusterRoleList",
    "Role",
    "RoleList",
    "ClusterRoleBinding",
    "ClusterRoleBindingList",
    "RoleBinding",
    "RoleBindingList",
    "DaemonSet",
    "Pod",
    "ReplicationController",
    "ReplicaSet",
    "Deployment",
    "DeploymentConfig",
    "HorizontalPodAutoscaler",
    "StatefulSet",
    "Job",
    "CronJob",
    "Service",
    "IngressClass",
    "Ingress",
    "Route",
    "APIService",
];

/// An item carrying a kind label.
pub trait Kinded {
    fn kind(&self) -> &str;
}

impl<K: AsRef<str>, T> Kinded for (K, T) {
    fn kind(&self) -> &str {
        self.0.as_ref()
    }
}

/// Untyped resources are labelled by their `kind` field. Resources without
/// one sort like any other unknown kind.
impl Kinded for Value {
    fn kind(&self) -> &str {
        self.get("kind").and_then(Value::as_str).unwrap_or_default()
    }
}

/// Orders items by a priority table of kinds.
///
/// Items are grouped by kind, the groups are emitted in table order and kinds
/// missing from the table form one trailing group. The relative order of the
/// input is kept within every group, nothing is dropped or duplicated.
///
/// ```
/// use stackable_manifest::order::KindOrderer;
///
/// let orderer = KindOrderer::new(["A", "B"]);
/// let ordered = orderer.order([("B", 1), ("C", 1), ("A", 1), ("B", 2), ("A", 2)]);
///
/// assert_eq!(ordered, [("A", 1), ("A", 2), ("B", 1), ("B", 2), ("C", 1)]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KindOrderer {
    priorities: IndexSet<String>,
}

impl KindOrderer {
    /// Creates an orderer from kinds listed from first to last. Repeated kinds
    /// keep their first position.
    pub fn new<I, S>(priorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            priorities: priorities.into_iter().map(Into::into).collect(),
        }
    }

    pub fn priorities(&self) -> impl Iterator<Item = &str> {
        self.priorities.iter().map(String::as_str)
    }

    /// Orders `items`, see [`KindOrderer`].
    pub fn order<T: Kinded>(&self, items: impl IntoIterator<Item = T>) -> Vec<T> {
        let unranked = self.priorities.len();
        let mut groups = std::iter::repeat_with(Vec::new)
            .take(unranked + 1)
            .collect::<Vec<Vec<T>>>();

        for item in items {
            let rank = self.priorities.get_index_of(item.kind()).unwrap_or(unranked);
            groups[rank].push(item);
        }

        groups.into_iter().flatten().collect()
    }
}

impl Default for KindOrderer {
    fn default() -> Self {
        Self::new(DEFAULT_KIND_ORDER.iter().copied())
    }
}
