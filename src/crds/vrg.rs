/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/crds/vrg.rs
*
* The VolumeReplicationGroup kind is reconciled by the DR agent running on each
* managed cluster. The hub operator never talks to it directly: it only renders
* a VolumeReplicationGroup as a ManifestWork payload for the home cluster.
*
* SPDX-License-Identifier: Apache-2.0
*/

use super::ocm::LabelSelector;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[kube(
    group = "ramendr.openshift.io",
    version = "v1alpha1",
    kind = "VolumeReplicationGroup",
    namespaced,
    schema = "disabled"
)]
#[serde(rename_all = "camelCase")]
pub struct VolumeReplicationGroupSpec {
    /// Selects the PVCs of the application that take part in replication.
    pub pvc_selector: LabelSelector,
    pub volume_replication_class: String,
    /// "Primary" or "Secondary".
    pub replication_state: String,
    pub s3_endpoint: String,
    pub s3_secret_name: String,
}
