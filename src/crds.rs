/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/crds.rs
*
* This file defines the Rust data structures that correspond to the Custom
* Resource Definitions the DR operator works with. By using the
* `kube::CustomResource` derive macro, we create a strongly-typed representation
* of these APIs, enabling safe and idiomatic interaction with the Kubernetes
* API server.
*
* Architecture:
* - `ApplicationVolumeReplication` is the only kind owned by this operator. Its
*   `spec` declares the object-storage location of volume backups and the
*   operator's failover overrides; its `status` records, per subscription, the
*   cluster currently acting as primary and its DR peer.
* - The kinds owned by the multicluster control plane (Subscription,
*   PlacementRule, ManagedCluster, ManifestWork) live in `crds::ocm`; the
*   VolumeReplicationGroup payload lives in `crds::vrg`. Those types carry only
*   the fields the operator reads or generates.
* - `serde` attributes are used to map between idiomatic Rust `snake_case` and
*   idiomatic Kubernetes `camelCase`.
*
* SPDX-License-Identifier: Apache-2.0
*/

pub mod ocm;
pub mod vrg;

pub use ocm::{
    ConditionStatus, LabelSelector, LabelSelectorRequirement, ManagedCluster, ManagedClusterSpec,
    ManifestWork, ManifestWorkSpec, ManifestWorkStatus, ManifestsTemplate, PlacementRule,
    PlacementRuleSpec, Subscription, SubscriptionPhase, SubscriptionPlacement, SubscriptionSpec,
    SubscriptionStatus, WorkCondition,
};
pub use vrg::{VolumeReplicationGroup, VolumeReplicationGroupSpec};

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// --- ApplicationVolumeReplication Custom Resource Definition ---

/// Declares the DR configuration of every subscription in a namespace.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, Default)]
#[kube(
    group = "ramendr.openshift.io",
    version = "v1alpha1",
    kind = "ApplicationVolumeReplication",
    namespaced,
    status = "ApplicationVolumeReplicationStatus",
    printcolumn = r#"{"name":"S3 Endpoint", "type":"string", "jsonPath":".spec.s3Endpoint"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#,
    shortname = "avr"
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationVolumeReplicationSpec {
    /// Operator-chosen failover target, keyed by subscription name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failover_clusters: BTreeMap<String, String>,
    /// Object-storage endpoint holding the persisted PersistentVolume records.
    pub s3_endpoint: String,
    /// Secret in the AVR's namespace with the object-storage credentials.
    pub s3_secret_name: String,
}

/// Where a subscription's primary copy lives and which cluster backs it up.
#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPlacementDecision {
    pub home_cluster: String,
    pub peer_cluster: String,
}

impl SubscriptionPlacementDecision {
    pub fn new(home_cluster: impl Into<String>, peer_cluster: impl Into<String>) -> Self {
        Self {
            home_cluster: home_cluster.into(),
            peer_cluster: peer_cluster.into(),
        }
    }
}

pub type SubscriptionPlacementDecisionMap = BTreeMap<String, SubscriptionPlacementDecision>;

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationVolumeReplicationStatus {
    #[serde(default)]
    pub decisions: SubscriptionPlacementDecisionMap,
}

impl ApplicationVolumeReplication {
    /// The decision recorded for `subscription` by a previous pass, if any.
    pub fn decision_for(&self, subscription: &str) -> Option<&SubscriptionPlacementDecision> {
        self.status
            .as_ref()
            .and_then(|status| status.decisions.get(subscription))
    }

    /// The failover target an operator set for `subscription`, if any.
    pub fn failover_cluster_for(&self, subscription: &str) -> Option<&str> {
        self.spec
            .failover_clusters
            .get(subscription)
            .map(String::as_str)
            .filter(|cluster| !cluster.is_empty())
    }
}
