/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/manifest_work.rs
*
* Idempotent convergence of a desired ManifestWork onto a managed cluster.
*
* The protocol reads the work by name from the cluster namespace, creates it
* when absent, and otherwise rewrites it only if its spec differs from the
* desired one. Repeating the call with the same content is a read-only no-op,
* and the comparison is always made against the latest observed object, so
* competing writers converge on the last applied content.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::crds::ManifestWork;
use crate::error::{Error, Result};
use crate::metrics::DR_MANIFEST_WORK_OPS_TOTAL;
use crate::store::ObjectStore;
use kube::ResourceExt;
use tracing::{debug, info};

/// What `create_or_update_manifest_work` had to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Converged {
    Created,
    Updated,
    Unchanged,
}

pub async fn create_or_update_manifest_work(
    store: &dyn ObjectStore,
    desired: ManifestWork,
) -> Result<Converged> {
    let cluster = desired
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let name = desired.name_any();

    let Some(mut found) = store.get_manifest_work(&cluster, &name).await? else {
        info!(work = %name, %cluster, "Creating ManifestWork");
        store.create_manifest_work(&desired).await?;
        DR_MANIFEST_WORK_OPS_TOTAL.with_label_values(&["create"]).inc();
        return Ok(Converged::Created);
    };

    if found.spec == desired.spec {
        debug!(work = %name, %cluster, "ManifestWork is up to date");
        return Ok(Converged::Unchanged);
    }

    info!(work = %name, %cluster, "ManifestWork exists. Updating");
    found.spec = desired.spec;
    store.update_manifest_work(&found).await?;
    DR_MANIFEST_WORK_OPS_TOTAL.with_label_values(&["update"]).inc();
    Ok(Converged::Updated)
}
