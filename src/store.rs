/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/store.rs
*
* This module provides the interface through which the reconciliation engine
* reads and writes cluster state. It abstracts away the details of the
* Kubernetes API so the engine can be driven by an in-memory store in tests.
*
* The `ObjectStore` trait carries exactly the operations the engine needs:
* - listing Subscriptions and patching their labels,
* - fetching the PlacementRule a Subscription points at,
* - get / create / update / delete of ManifestWorks in a cluster namespace,
* - writing the decision map into the AVR status.
*
* "Not found" is reported as `None` (or as success for deletions); every other
* API failure surfaces as `Error::KubeError`.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::crds::{
    ApplicationVolumeReplication, ApplicationVolumeReplicationStatus, ManifestWork,
    PlacementRule, Subscription,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams},
    Client, ResourceExt,
};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::debug;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Lists every Subscription in `namespace`.
    async fn list_subscriptions(&self, namespace: &str) -> Result<Vec<Subscription>>;

    /// Merges `labels` into the labels of the Subscription `namespace/name`.
    async fn patch_subscription_labels(
        &self,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn get_placement_rule(&self, namespace: &str, name: &str)
        -> Result<Option<PlacementRule>>;

    /// Fetches the ManifestWork `name` from the namespace of managed cluster `cluster`.
    async fn get_manifest_work(&self, cluster: &str, name: &str) -> Result<Option<ManifestWork>>;

    async fn create_manifest_work(&self, work: &ManifestWork) -> Result<()>;

    /// Replaces an existing ManifestWork. `work` must carry the resourceVersion
    /// it was read with.
    async fn update_manifest_work(&self, work: &ManifestWork) -> Result<()>;

    /// Deletes a ManifestWork; deleting an absent one succeeds.
    async fn delete_manifest_work(&self, cluster: &str, name: &str) -> Result<()>;

    /// Replaces the status of `avr` with `status` in a single write.
    async fn write_avr_status(
        &self,
        avr: &ApplicationVolumeReplication,
        status: &ApplicationVolumeReplicationStatus,
    ) -> Result<()>;
}

/// `ObjectStore` backed by the hub cluster's API server.
#[derive(Clone)]
pub struct KubeObjectStore {
    client: Client,
    field_manager: String,
}

impl KubeObjectStore {
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn manifest_works(&self, cluster: &str) -> Api<ManifestWork> {
        Api::namespaced(self.client.clone(), cluster)
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(response) if response.code == 404)
}

#[async_trait]
impl ObjectStore for KubeObjectStore {
    async fn list_subscriptions(&self, namespace: &str) -> Result<Vec<Subscription>> {
        let api: Api<Subscription> = Api::namespaced(self.client.clone(), namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn patch_subscription_labels(
        &self,
        namespace: &str,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<Subscription> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({ "metadata": { "labels": labels } });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_placement_rule(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PlacementRule>> {
        let api: Api<PlacementRule> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get_opt(name).await?)
    }

    async fn get_manifest_work(&self, cluster: &str, name: &str) -> Result<Option<ManifestWork>> {
        Ok(self.manifest_works(cluster).get_opt(name).await?)
    }

    async fn create_manifest_work(&self, work: &ManifestWork) -> Result<()> {
        let cluster = work
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        self.manifest_works(&cluster)
            .create(&PostParams::default(), work)
            .await?;
        Ok(())
    }

    async fn update_manifest_work(&self, work: &ManifestWork) -> Result<()> {
        let cluster = work
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        self.manifest_works(&cluster)
            .replace(&work.name_any(), &PostParams::default(), work)
            .await?;
        Ok(())
    }

    async fn delete_manifest_work(&self, cluster: &str, name: &str) -> Result<()> {
        match self
            .manifest_works(cluster)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if is_not_found(&err) => {
                debug!(cluster, work = name, "ManifestWork already absent");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn write_avr_status(
        &self,
        avr: &ApplicationVolumeReplication,
        status: &ApplicationVolumeReplicationStatus,
    ) -> Result<()> {
        let namespace = avr
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let api: Api<ApplicationVolumeReplication> =
            Api::namespaced(self.client.clone(), &namespace);

        // Server-side apply of the whole status: entries this manager owned and
        // left out of `status` are dropped by the API server.
        let patch = Patch::Apply(json!({
            "apiVersion": "ramendr.openshift.io/v1alpha1",
            "kind": "ApplicationVolumeReplication",
            "status": status,
        }));
        let ps = PatchParams::apply(&self.field_manager).force();
        api.patch_status(&avr.name_any(), &ps, &patch).await?;
        Ok(())
    }
}
