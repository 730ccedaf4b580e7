/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/manifests.rs
*
* Pure builders for the ManifestWorks the operator places on managed clusters.
* Nothing here performs I/O; each builder turns typed inputs into a complete
* ManifestWork whose manifests are fully serialized objects.
*
* Three bundles exist:
* - the VRG roles bundle (ClusterRole + ClusterRoleBinding letting the work
*   agent manage VolumeReplicationGroups), identical for every subscription;
* - the VRG bundle, one VolumeReplicationGroup marked Primary;
* - the PV bundle, one manifest per restored PersistentVolume.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::crds::{ManifestWork, VolumeReplicationGroup, VolumeReplicationGroupSpec};
use crate::crds::ocm::LabelSelector;
use crate::error::Result;
use k8s_openapi::api::core::v1::PersistentVolume;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use std::collections::BTreeMap;

/// Name of the roles bundle; one per managed cluster.
pub const VRG_ROLES_WORK_NAME: &str = "ramendr-vrg-roles";

const VRG_EDIT_ROLE: &str = "open-cluster-management:klusterlet-work-sa:agent:volrepgroup-edit";
const WORK_AGENT_SERVICE_ACCOUNT: &str = "klusterlet-work-sa";
const WORK_AGENT_NAMESPACE: &str = "open-cluster-management-agent";
const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

const VOLUME_REPLICATION_CLASS: &str = "volume-rep-class";
const REPLICATION_STATE_PRIMARY: &str = "Primary";

/// The per-subscription bundle kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkKind {
    Vrg,
    Pv,
}

impl WorkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkKind::Vrg => "vrg",
            WorkKind::Pv => "pv",
        }
    }

    fn app_label(self) -> &'static str {
        match self {
            WorkKind::Vrg => "VRG",
            WorkKind::Pv => "PV",
        }
    }
}

/// `"{name}-{namespace}-{kind}-mw"`.
pub fn manifest_work_name(name: &str, namespace: &str, kind: WorkKind) -> String {
    format!("{}-{}-{}-mw", name, namespace, kind.as_str())
}

fn kind_labels(kind: WorkKind) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), kind.app_label().to_string())])
}

/// Serializes any Kubernetes object into a ManifestWork payload.
pub fn to_manifest<T: Serialize>(obj: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(obj)?)
}

fn vrg_cluster_role() -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(VRG_EDIT_ROLE.to_string()),
            ..Default::default()
        },
        rules: Some(vec![PolicyRule {
            api_groups: Some(vec!["ramendr.openshift.io".to_string()]),
            resources: Some(vec!["volumereplicationgroups".to_string()]),
            verbs: ["create", "get", "list", "update", "delete"]
                .iter()
                .map(|v| v.to_string())
                .collect(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn vrg_cluster_role_binding() -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(VRG_EDIT_ROLE.to_string()),
            ..Default::default()
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: WORK_AGENT_SERVICE_ACCOUNT.to_string(),
            namespace: Some(WORK_AGENT_NAMESPACE.to_string()),
            ..Default::default()
        }]),
        role_ref: RoleRef {
            api_group: RBAC_API_GROUP.to_string(),
            kind: "ClusterRole".to_string(),
            name: VRG_EDIT_ROLE.to_string(),
        },
    }
}

/// The roles bundle for managed cluster `cluster`.
pub fn vrg_roles_manifest_work(cluster: &str) -> Result<ManifestWork> {
    // k8s-openapi objects carry apiVersion/kind through their Serialize impls.
    let manifests = vec![
        to_manifest(&vrg_cluster_role())?,
        to_manifest(&vrg_cluster_role_binding())?,
    ];
    Ok(ManifestWork::for_cluster(
        VRG_ROLES_WORK_NAME,
        cluster,
        BTreeMap::new(),
        manifests,
    ))
}

fn volume_replication_group(
    name: &str,
    namespace: &str,
    s3_endpoint: &str,
    s3_secret_name: &str,
) -> VolumeReplicationGroup {
    // TODO: derive the PVC selector and replication class from the AVR once
    // it carries a replication policy.
    let mut vrg = VolumeReplicationGroup::new(
        name,
        VolumeReplicationGroupSpec {
            pvc_selector: LabelSelector {
                match_labels: BTreeMap::from([
                    ("appclass".to_string(), "gold".to_string()),
                    ("environment".to_string(), "dev.AZ1".to_string()),
                ]),
                ..Default::default()
            },
            volume_replication_class: VOLUME_REPLICATION_CLASS.to_string(),
            replication_state: REPLICATION_STATE_PRIMARY.to_string(),
            s3_endpoint: s3_endpoint.to_string(),
            s3_secret_name: s3_secret_name.to_string(),
        },
    );
    vrg.metadata.namespace = Some(namespace.to_string());
    vrg
}

/// The VRG bundle of subscription `namespace/name`, placed on `home_cluster`.
pub fn vrg_manifest_work(
    name: &str,
    namespace: &str,
    home_cluster: &str,
    s3_endpoint: &str,
    s3_secret_name: &str,
) -> Result<ManifestWork> {
    let vrg = volume_replication_group(name, namespace, s3_endpoint, s3_secret_name);
    Ok(ManifestWork::for_cluster(
        &manifest_work_name(name, namespace, WorkKind::Vrg),
        home_cluster,
        kind_labels(WorkKind::Vrg),
        vec![to_manifest(&vrg)?],
    ))
}

/// The PV bundle of subscription `namespace/name`. Either every volume
/// serializes or no bundle is produced.
pub fn pv_manifest_work(
    name: &str,
    namespace: &str,
    home_cluster: &str,
    volumes: &[PersistentVolume],
) -> Result<ManifestWork> {
    let manifests = volumes
        .iter()
        .map(to_manifest)
        .collect::<Result<Vec<_>>>()?;
    Ok(ManifestWork::for_cluster(
        &manifest_work_name(name, namespace, WorkKind::Pv),
        home_cluster,
        kind_labels(WorkKind::Pv),
        manifests,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::ResourceExt;

    fn volume(name: &str) -> PersistentVolume {
        PersistentVolume {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_manifest_work_name_format() {
        assert_eq!(
            manifest_work_name("busybox-sub", "busybox-ns", WorkKind::Vrg),
            "busybox-sub-busybox-ns-vrg-mw"
        );
        assert_eq!(
            manifest_work_name("busybox-sub", "busybox-ns", WorkKind::Pv),
            "busybox-sub-busybox-ns-pv-mw"
        );
    }

    #[test]
    fn test_roles_bundle_is_constant() {
        let east = vrg_roles_manifest_work("east").unwrap();
        let west = vrg_roles_manifest_work("west").unwrap();

        assert_eq!(east.name_any(), VRG_ROLES_WORK_NAME);
        assert_eq!(east.namespace().as_deref(), Some("east"));
        assert_eq!(east.spec, west.spec);

        let manifests = &east.spec.workload.manifests;
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0]["kind"], "ClusterRole");
        assert_eq!(manifests[0]["rules"][0]["resources"][0], "volumereplicationgroups");
        assert_eq!(manifests[1]["kind"], "ClusterRoleBinding");
        assert_eq!(manifests[1]["subjects"][0]["name"], WORK_AGENT_SERVICE_ACCOUNT);
        assert_eq!(manifests[1]["roleRef"]["name"], VRG_EDIT_ROLE);
    }

    #[test]
    fn test_vrg_bundle_carries_s3_location() {
        let work = vrg_manifest_work("app1", "apps", "east", "https://s3.local", "s3-creds").unwrap();

        assert_eq!(work.name_any(), "app1-apps-vrg-mw");
        assert_eq!(work.namespace().as_deref(), Some("east"));
        assert_eq!(work.labels().get("app").map(String::as_str), Some("VRG"));

        let vrg = &work.spec.workload.manifests[0];
        assert_eq!(vrg["kind"], "VolumeReplicationGroup");
        assert_eq!(vrg["apiVersion"], "ramendr.openshift.io/v1alpha1");
        assert_eq!(vrg["metadata"]["namespace"], "apps");
        assert_eq!(vrg["spec"]["replicationState"], "Primary");
        assert_eq!(vrg["spec"]["s3Endpoint"], "https://s3.local");
        assert_eq!(vrg["spec"]["s3SecretName"], "s3-creds");
        assert_eq!(vrg["spec"]["pvcSelector"]["matchLabels"]["appclass"], "gold");
    }

    #[test]
    fn test_pv_bundle_preserves_volume_order() {
        let volumes = vec![volume("pv-c"), volume("pv-a"), volume("pv-b")];
        let work = pv_manifest_work("app1", "apps", "west", &volumes).unwrap();

        assert_eq!(work.name_any(), "app1-apps-pv-mw");
        assert_eq!(work.labels().get("app").map(String::as_str), Some("PV"));
        let names: Vec<&str> = work
            .spec
            .workload
            .manifests
            .iter()
            .map(|m| m["metadata"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["pv-c", "pv-a", "pv-b"]);
        assert_eq!(work.spec.workload.manifests[0]["kind"], "PersistentVolume");
    }
}
