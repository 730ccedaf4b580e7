/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/testing.rs
*
* In-memory stand-ins for the object store, the placement resolver and the
* backup store, shared by the unit tests of the controllers. They record every
* write so tests can assert on the exact remote calls a pass issued, and they
* can be told to fail selected operations.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::backup::{BackupStore, SecretRef};
use crate::controllers::placement::PlacementResolver;
use crate::crds::ocm::{GenericClusterReference, PlacementRef};
use crate::crds::{
    ApplicationVolumeReplication, ApplicationVolumeReplicationSpec,
    ApplicationVolumeReplicationStatus, ManagedCluster, ManagedClusterSpec, ManifestWork,
    PlacementRule, PlacementRuleSpec, Subscription, SubscriptionPhase, SubscriptionPlacement,
    SubscriptionPlacementDecision, SubscriptionSpec, SubscriptionStatus,
};
use crate::error::{Error, Result};
use crate::store::ObjectStore;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolume;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::ErrorResponse;
use kube::ResourceExt;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

pub const TEST_NAMESPACE: &str = "apps";

pub fn api_failure(message: &str) -> Error {
    Error::KubeError(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message: message.to_string(),
        reason: "InternalError".to_string(),
        code: 500,
    }))
}

/// Every write the fake store received, in order.
#[derive(Clone, Debug, Default)]
pub struct Calls {
    pub creates: Vec<(String, String)>,
    pub updates: Vec<(String, String)>,
    pub deletes: Vec<(String, String)>,
    pub label_patches: Vec<(String, BTreeMap<String, String>)>,
    pub status_writes: Vec<ApplicationVolumeReplicationStatus>,
}

#[derive(Default)]
struct Failures {
    list_subscriptions: bool,
    status_write: bool,
    label_patch: bool,
    read_clusters: BTreeSet<String>,
    placement_rules: BTreeSet<String>,
}

#[derive(Default)]
pub struct FakeStore {
    subscriptions: Mutex<Vec<Subscription>>,
    placement_rules: Mutex<BTreeMap<(String, String), PlacementRule>>,
    works: Mutex<BTreeMap<(String, String), ManifestWork>>,
    calls: Mutex<Calls>,
    failures: Mutex<Failures>,
    next_version: Mutex<u64>,
}

impl FakeStore {
    pub fn calls(&self) -> Calls {
        self.calls.lock().unwrap().clone()
    }

    pub fn add_subscription(&self, subscription: Subscription) {
        self.subscriptions.lock().unwrap().push(subscription);
    }

    pub fn add_placement_rule(&self, rule: PlacementRule) {
        let key = (rule.namespace().unwrap_or_default(), rule.name_any());
        self.placement_rules.lock().unwrap().insert(key, rule);
    }

    /// Seeds a work as if it had been created by an earlier pass.
    pub fn add_work(&self, mut work: ManifestWork) {
        work.metadata.resource_version = Some(self.bump_version());
        let key = (work.namespace().unwrap_or_default(), work.name_any());
        self.works.lock().unwrap().insert(key, work);
    }

    pub fn work(&self, cluster: &str, name: &str) -> Option<ManifestWork> {
        self.works
            .lock()
            .unwrap()
            .get(&(cluster.to_string(), name.to_string()))
            .cloned()
    }

    pub fn subscription(&self, name: &str) -> Option<Subscription> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.name_any() == name)
            .cloned()
    }

    pub fn fail_list_subscriptions(&self) {
        self.failures.lock().unwrap().list_subscriptions = true;
    }

    pub fn fail_status_write(&self) {
        self.failures.lock().unwrap().status_write = true;
    }

    pub fn fail_label_patch(&self) {
        self.failures.lock().unwrap().label_patch = true;
    }

    pub fn fail_reads_of_cluster(&self, cluster: &str) {
        self.failures
            .lock()
            .unwrap()
            .read_clusters
            .insert(cluster.to_string());
    }

    pub fn fail_placement_rule(&self, name: &str) {
        self.failures
            .lock()
            .unwrap()
            .placement_rules
            .insert(name.to_string());
    }

    fn bump_version(&self) -> String {
        let mut version = self.next_version.lock().unwrap();
        *version += 1;
        version.to_string()
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn list_subscriptions(&self, namespace: &str) -> Result<Vec<Subscription>> {
        if self.failures.lock().unwrap().list_subscriptions {
            return Err(api_failure("list subscriptions"));
        }
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.namespace().as_deref() == Some(namespace))
            .cloned()
            .collect())
    }

    async fn patch_subscription_labels(
        &self,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        if self.failures.lock().unwrap().label_patch {
            return Err(api_failure("patch subscription"));
        }
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .iter_mut()
            .find(|s| s.name_any() == name && s.namespace().as_deref() == Some(namespace))
            .ok_or_else(|| api_failure("subscription not found"))?;
        subscription.labels_mut().extend(labels.clone());
        self.calls
            .lock()
            .unwrap()
            .label_patches
            .push((name.to_string(), labels.clone()));
        Ok(())
    }

    async fn get_placement_rule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PlacementRule>> {
        if self.failures.lock().unwrap().placement_rules.contains(name) {
            return Err(api_failure("get placement rule"));
        }
        Ok(self
            .placement_rules
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn get_manifest_work(&self, cluster: &str, name: &str) -> Result<Option<ManifestWork>> {
        if self.failures.lock().unwrap().read_clusters.contains(cluster) {
            return Err(api_failure("get manifest work"));
        }
        Ok(self.work(cluster, name))
    }

    async fn create_manifest_work(&self, work: &ManifestWork) -> Result<()> {
        let key = (work.namespace().unwrap_or_default(), work.name_any());
        let mut stored = work.clone();
        stored.metadata.resource_version = Some(self.bump_version());
        self.works.lock().unwrap().insert(key.clone(), stored);
        self.calls.lock().unwrap().creates.push(key);
        Ok(())
    }

    async fn update_manifest_work(&self, work: &ManifestWork) -> Result<()> {
        let key = (work.namespace().unwrap_or_default(), work.name_any());
        let mut stored = work.clone();
        stored.metadata.resource_version = Some(self.bump_version());
        self.works.lock().unwrap().insert(key.clone(), stored);
        self.calls.lock().unwrap().updates.push(key);
        Ok(())
    }

    async fn delete_manifest_work(&self, cluster: &str, name: &str) -> Result<()> {
        let key = (cluster.to_string(), name.to_string());
        self.works.lock().unwrap().remove(&key);
        self.calls.lock().unwrap().deletes.push(key);
        Ok(())
    }

    async fn write_avr_status(
        &self,
        _avr: &ApplicationVolumeReplication,
        status: &ApplicationVolumeReplicationStatus,
    ) -> Result<()> {
        if self.failures.lock().unwrap().status_write {
            return Err(api_failure("write status"));
        }
        self.calls.lock().unwrap().status_writes.push(status.clone());
        Ok(())
    }
}

/// Resolves PlacementRules by name to a fixed cluster set.
#[derive(Default)]
pub struct FakeResolver {
    clusters: Mutex<BTreeMap<String, Vec<String>>>,
    resolved: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub fn with_rule(self, rule: &str, clusters: &[&str]) -> Self {
        self.clusters.lock().unwrap().insert(
            rule.to_string(),
            clusters.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    pub fn resolved_rules(&self) -> Vec<String> {
        self.resolved.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlacementResolver for FakeResolver {
    async fn resolve(&self, rule: &PlacementRule) -> Result<BTreeMap<String, ManagedCluster>> {
        self.resolved.lock().unwrap().push(rule.name_any());
        let names = self
            .clusters
            .lock()
            .unwrap()
            .get(&rule.name_any())
            .cloned()
            .unwrap_or_default();
        Ok(names
            .into_iter()
            .map(|name| (name.clone(), managed_cluster(&name)))
            .collect())
    }
}

#[derive(Default)]
pub struct FakeBackup {
    volumes: Mutex<BTreeMap<String, Vec<PersistentVolume>>>,
    downloads: Mutex<Vec<(String, String)>>,
    fail: Mutex<bool>,
}

impl FakeBackup {
    pub fn with_volumes(self, bucket: &str, names: &[&str]) -> Self {
        self.volumes.lock().unwrap().insert(
            bucket.to_string(),
            names.iter().map(|name| persistent_volume(name)).collect(),
        );
        self
    }

    pub fn failing(self) -> Self {
        *self.fail.lock().unwrap() = true;
        self
    }

    /// `(bucket, caller_tag)` of every download.
    pub fn downloads(&self) -> Vec<(String, String)> {
        self.downloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackupStore for FakeBackup {
    async fn download_volumes(
        &self,
        _endpoint: &str,
        _secret: &SecretRef,
        caller_tag: &str,
        bucket: &str,
    ) -> Result<Vec<PersistentVolume>> {
        self.downloads
            .lock()
            .unwrap()
            .push((bucket.to_string(), caller_tag.to_string()));
        if *self.fail.lock().unwrap() {
            return Err(Error::BackupError("object store unreachable".to_string()));
        }
        Ok(self
            .volumes
            .lock()
            .unwrap()
            .get(bucket)
            .cloned()
            .unwrap_or_default())
    }
}

// --- Builders ---

pub fn persistent_volume(name: &str) -> PersistentVolume {
    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn managed_cluster(name: &str) -> ManagedCluster {
    ManagedCluster::new(
        name,
        ManagedClusterSpec {
            hub_accepts_client: true,
        },
    )
}

pub fn avr(failover: &[(&str, &str)], decisions: &[(&str, &str, &str)]) -> ApplicationVolumeReplication {
    let mut avr = ApplicationVolumeReplication::new(
        "busybox-avr",
        ApplicationVolumeReplicationSpec {
            failover_clusters: failover
                .iter()
                .map(|(sub, cluster)| (sub.to_string(), cluster.to_string()))
                .collect(),
            s3_endpoint: "https://s3.example.com".to_string(),
            s3_secret_name: "s3-secret".to_string(),
        },
    );
    avr.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    if !decisions.is_empty() {
        avr.status = Some(ApplicationVolumeReplicationStatus {
            decisions: decisions
                .iter()
                .map(|(sub, home, peer)| {
                    (sub.to_string(), SubscriptionPlacementDecision::new(*home, *peer))
                })
                .collect(),
        });
    }
    avr
}

/// A hub-side subscription propagated to `status_clusters`, placed by rule `<name>-pr`.
pub fn subscription(name: &str, status_clusters: &[&str]) -> Subscription {
    let mut sub = Subscription::new(
        name,
        SubscriptionSpec {
            channel: "apps/busybox-channel".to_string(),
            placement: Some(SubscriptionPlacement {
                local: None,
                placement_ref: Some(PlacementRef {
                    name: format!("{}-pr", name),
                    namespace: None,
                    kind: Some("PlacementRule".to_string()),
                }),
            }),
        },
    );
    sub.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    sub.status = Some(SubscriptionStatus {
        phase: SubscriptionPhase::Propagated,
        statuses: Some(
            status_clusters
                .iter()
                .map(|c| (c.to_string(), serde_json::json!({ "packages": {} })))
                .collect(),
        ),
    });
    sub
}

pub fn paused_subscription(name: &str, status_clusters: &[&str]) -> Subscription {
    let mut sub = subscription(name, status_clusters);
    sub.labels_mut().extend([
        ("ramendr".to_string(), "protected".to_string()),
        (
            "apps.open-cluster-management.io/paused".to_string(),
            "true".to_string(),
        ),
    ]);
    sub
}

/// The PlacementRule that `subscription(name, ..)` points at.
pub fn placement_rule(subscription: &str, replicas: Option<i32>) -> PlacementRule {
    let mut rule = PlacementRule::new(
        &format!("{}-pr", subscription),
        PlacementRuleSpec {
            clusters: Some(vec![
                GenericClusterReference {
                    name: "east".to_string(),
                },
                GenericClusterReference {
                    name: "west".to_string(),
                },
            ]),
            cluster_selector: None,
            cluster_replicas: replicas,
        },
    );
    rule.metadata.namespace = Some(TEST_NAMESPACE.to_string());
    rule
}
