/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/crds/ocm.rs
*
* Typed views of the multicluster control-plane kinds that the DR operator
* consumes but does not own:
*
* - `Subscription` (apps.open-cluster-management.io/v1): an application's
*   propagation to managed clusters. Read, and label-patched on unpause.
* - `PlacementRule` (apps.open-cluster-management.io/v1): the criteria that
*   select the clusters of a DR pair.
* - `ManagedCluster` (cluster.open-cluster-management.io/v1): the cluster
*   descriptors a PlacementRule resolves to.
* - `ManifestWork` (work.open-cluster-management.io/v1): a bundle of manifests
*   the hub asks a managed cluster to apply. Its namespace is the cluster name.
*
* The structs only model the fields the operator reads or writes, and schema
* generation is disabled because the CRDs are installed by their owners.
* Subscriptions are therefore never written back whole: the operator only
* merge-patches their labels, so fields unknown to these types are preserved.
*
* SPDX-License-Identifier: Apache-2.0
*/

use chrono::{DateTime, Utc};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- Label selectors ---

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    /// One of `In`, `NotIn`, `Exists`, `DoesNotExist`.
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

// --- Subscription ---

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default)]
#[kube(
    group = "apps.open-cluster-management.io",
    version = "v1",
    kind = "Subscription",
    namespaced,
    status = "SubscriptionStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    #[serde(default)]
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<SubscriptionPlacement>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlacement {
    /// A local subscription is deployed on the hub itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_ref: Option<PlacementRef>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// `Propagated` marks the parent subscription on the hub, `Subscribed` the
/// child copy sitting on a managed cluster.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq)]
pub enum SubscriptionPhase {
    Subscribed,
    Propagated,
    #[default]
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    #[serde(default)]
    pub phase: SubscriptionPhase,
    /// Aggregated per-cluster status, keyed by managed cluster name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statuses: Option<BTreeMap<String, serde_json::Value>>,
}

// --- PlacementRule ---

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default)]
#[kube(
    group = "apps.open-cluster-management.io",
    version = "v1",
    kind = "PlacementRule",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRuleSpec {
    /// Explicitly named candidate clusters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<Vec<GenericClusterReference>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_selector: Option<LabelSelector>,
    /// How many clusters the rule should pick. Unset means "all candidates".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_replicas: Option<i32>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct GenericClusterReference {
    pub name: String,
}

// --- ManagedCluster ---

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default)]
#[kube(
    group = "cluster.open-cluster-management.io",
    version = "v1",
    kind = "ManagedCluster",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ManagedClusterSpec {
    #[serde(default)]
    pub hub_accepts_client: bool,
}

// --- ManifestWork ---

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "work.open-cluster-management.io",
    version = "v1",
    kind = "ManifestWork",
    namespaced,
    status = "ManifestWorkStatus",
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkSpec {
    #[serde(default)]
    pub workload: ManifestsTemplate,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct ManifestsTemplate {
    /// Opaque, fully serialized Kubernetes objects, applied in order.
    #[serde(default)]
    pub manifests: Vec<serde_json::Value>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ManifestWorkStatus {
    #[serde(default)]
    pub conditions: Vec<WorkCondition>,
}

pub const WORK_APPLIED: &str = "Applied";
pub const WORK_AVAILABLE: &str = "Available";
pub const WORK_PROGRESSING: &str = "Progressing";
pub const WORK_DEGRADED: &str = "Degraded";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkCondition {
    #[serde(rename = "type")]
    pub type_: String,
    pub status: ConditionStatus,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WorkCondition {
    pub fn new(type_: &str, status: ConditionStatus, last_transition_time: DateTime<Utc>) -> Self {
        Self {
            type_: type_.to_string(),
            status,
            last_transition_time,
            reason: None,
            message: None,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ManifestWork {
    /// Builds a bundle named `name` for the managed cluster `cluster`.
    pub fn for_cluster(
        name: &str,
        cluster: &str,
        labels: BTreeMap<String, String>,
        manifests: Vec<serde_json::Value>,
    ) -> Self {
        let mut work = ManifestWork::new(
            name,
            ManifestWorkSpec {
                workload: ManifestsTemplate { manifests },
            },
        );
        work.metadata.namespace = Some(cluster.to_string());
        if !labels.is_empty() {
            work.metadata.labels = Some(labels);
        }
        work
    }

    pub fn conditions(&self) -> &[WorkCondition] {
        self.status
            .as_ref()
            .map(|status| status.conditions.as_slice())
            .unwrap_or_default()
    }
}
