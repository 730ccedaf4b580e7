/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/classifier.rs
*
* Decides which path a Subscription takes through a reconciliation pass.
* The checks run in a fixed priority order and the first match wins:
* child copies and local subscriptions are skipped, DR-paused ones go to the
* failover sequencer, ones whose VRG bundle already sits on the recorded home
* cluster are left alone, and everything else is converged.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::controllers::manifests::{manifest_work_name, WorkKind};
use crate::crds::{ApplicationVolumeReplication, Subscription, SubscriptionPhase};
use crate::error::{Error, Result};
use crate::store::ObjectStore;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::debug;

pub const DR_STATE_LABEL: &str = "ramendr";
pub const DR_STATE_PROTECTED: &str = "protected";
pub const PAUSED_LABEL: &str = "apps.open-cluster-management.io/paused";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// Not a hub-side parent subscription.
    Skip,
    PausedForDr,
    /// The VRG bundle is already on `home`; nothing to do this pass.
    AlreadyConverged { home: String },
    NeedsConvergence,
}

/// The propagated copy on a managed cluster reports `Subscribed`; the hub
/// parent never does.
pub fn is_managed_cluster_copy(subscription: &Subscription) -> bool {
    subscription
        .status
        .as_ref()
        .is_some_and(|status| status.phase == SubscriptionPhase::Subscribed)
}

pub fn is_local(subscription: &Subscription) -> bool {
    subscription
        .spec
        .placement
        .as_ref()
        .and_then(|placement| placement.local)
        .unwrap_or(false)
}

fn label_equals(labels: &BTreeMap<String, String>, key: &str, expected: &str) -> bool {
    labels
        .get(key)
        .is_some_and(|value| value.eq_ignore_ascii_case(expected))
}

pub fn is_paused_for_dr(labels: &BTreeMap<String, String>) -> bool {
    label_equals(labels, DR_STATE_LABEL, DR_STATE_PROTECTED) && label_equals(labels, PAUSED_LABEL, "true")
}

pub async fn classify(
    store: &dyn ObjectStore,
    avr: &ApplicationVolumeReplication,
    subscription: &Subscription,
) -> Result<Classification> {
    if is_managed_cluster_copy(subscription) || is_local(subscription) {
        return Ok(Classification::Skip);
    }

    if is_paused_for_dr(subscription.labels()) {
        return Ok(Classification::PausedForDr);
    }

    let name = subscription.name_any();
    if let Some(decision) = avr.decision_for(&name) {
        let namespace = subscription
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let work_name = manifest_work_name(&name, &namespace, WorkKind::Vrg);
        if store
            .get_manifest_work(&decision.home_cluster, &work_name)
            .await?
            .is_some()
        {
            debug!(subscription = %name, home = %decision.home_cluster, "VRG bundle already placed");
            return Ok(Classification::AlreadyConverged {
                home: decision.home_cluster.clone(),
            });
        }
    }

    Ok(Classification::NeedsConvergence)
}
