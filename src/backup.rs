/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/backup.rs
*
* This file defines how the operator retrieves the PersistentVolume records
* that the managed clusters persist to object storage, and provides the
* concrete HTTP implementation used in production.
*
* Architecture:
* 1. `BackupStore`: the capability the failover sequence depends on. One call
*    returns every PersistentVolume recorded in one bucket.
* 2. `HttpBackupStore`: reads the access key pair from the credential Secret
*    referenced by the AVR and fetches `{endpoint}/{bucket}/persistentvolumes.json`
*    with `reqwest`. A 404 means nothing was backed up yet.
* 3. `bucket_name`: the deterministic bucket of a subscription.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::error::{Error, Result};
use anyhow::{bail, Context};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, Secret};
use kube::{Api, Client};
use std::time::Duration;
use tracing::{debug, info};

const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const VOLUMES_OBJECT: &str = "persistentvolumes.json";

/// Reference to the Secret holding object-storage credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecretRef {
    pub name: String,
    pub namespace: String,
}

#[async_trait]
pub trait BackupStore: Send + Sync {
    /// Returns every PersistentVolume recorded in `bucket`, in stored order.
    /// `caller_tag` identifies the requesting AVR in logs.
    async fn download_volumes(
        &self,
        endpoint: &str,
        secret: &SecretRef,
        caller_tag: &str,
        bucket: &str,
    ) -> Result<Vec<PersistentVolume>>;
}

/// The bucket holding the volume records of subscription `namespace/name`.
pub fn bucket_name(namespace: &str, name: &str) -> String {
    format!("{}-{}", namespace, name).to_lowercase()
}

struct Credentials {
    access_key_id: String,
    secret_access_key: String,
}

/// A `BackupStore` talking to an S3-compatible HTTP endpoint.
pub struct HttpBackupStore {
    kube_client: Client,
    http: reqwest::Client,
}

impl HttpBackupStore {
    pub fn new(kube_client: Client, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build reqwest HTTP client for the backup store")?;
        Ok(Self { kube_client, http })
    }

    async fn credentials(&self, secret: &SecretRef) -> anyhow::Result<Credentials> {
        let secrets: Api<Secret> = Api::namespaced(self.kube_client.clone(), &secret.namespace);
        let found = secrets.get(&secret.name).await.with_context(|| {
            format!(
                "Failed to get object-storage secret '{}/{}'",
                secret.namespace, secret.name
            )
        })?;
        let mut data = found.data.unwrap_or_default();
        let mut take = |key: &str| -> anyhow::Result<String> {
            let bytes = data.remove(key).with_context(|| {
                format!("Key '{}' not found in secret '{}'", key, secret.name)
            })?;
            String::from_utf8(bytes.0)
                .with_context(|| format!("Key '{}' in secret '{}' is not UTF-8", key, secret.name))
        };
        Ok(Credentials {
            access_key_id: take(ACCESS_KEY_ID)?,
            secret_access_key: take(SECRET_ACCESS_KEY)?,
        })
    }

    async fn fetch(
        &self,
        endpoint: &str,
        secret: &SecretRef,
        caller_tag: &str,
        bucket: &str,
    ) -> anyhow::Result<Vec<PersistentVolume>> {
        let credentials = self.credentials(secret).await?;
        let url = format!(
            "{}/{}/{}",
            endpoint.trim_end_matches('/'),
            bucket,
            VOLUMES_OBJECT
        );
        debug!(caller = caller_tag, %url, "Downloading PersistentVolume records");

        let response = self
            .http
            .get(&url)
            .basic_auth(&credentials.access_key_id, Some(&credentials.secret_access_key))
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to '{}'", url))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            info!(caller = caller_tag, bucket, "No PersistentVolume records stored yet");
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body.".to_string());
            bail!(
                "Object store returned an error for bucket '{}'. Status: {}. Body: {}",
                bucket,
                status,
                body
            );
        }

        response
            .json::<Vec<PersistentVolume>>()
            .await
            .with_context(|| format!("Failed to parse PersistentVolume records from '{}'", url))
    }
}

#[async_trait]
impl BackupStore for HttpBackupStore {
    async fn download_volumes(
        &self,
        endpoint: &str,
        secret: &SecretRef,
        caller_tag: &str,
        bucket: &str,
    ) -> Result<Vec<PersistentVolume>> {
        self.fetch(endpoint, secret, caller_tag, bucket)
            .await
            .map_err(|e| Error::BackupError(format!("{:#}", e)))
    }
}
