/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/avr_controller.rs
*
* This file implements the reconciliation logic for the
* `ApplicationVolumeReplication` (AVR) custom resource. One AVR declares the DR
* configuration of the Subscriptions in its namespace; a pass decides, for each
* of them, which managed cluster holds the primary copy and makes sure that
* cluster carries the VRG bundles.
*
* Architecture:
* - A pass lists the Subscriptions once and handles them one after the other.
*   Each Subscription is classified and then dispatched to one of three paths:
*   skip, the failover sequencer, or direct convergence (placement decision,
*   roles bundle, VRG bundle).
* - Every Subscription ends the pass with a `SubscriptionOutcome`. Errors are
*   caught per Subscription and turned into `Requeue`, so one broken
*   Subscription never stops the others.
* - Decisions are folded into the AVR status with a single write at the end of
*   the pass. The base is the status read at the start of the pass, minus the
*   entries of Subscriptions that no longer exist; this pass's decisions
*   overlay it.
* - The controller glue (`reconcile`, `on_error`) maps the pass result onto
*   kube-rs `Action`s using the intervals from `OperatorConfig`.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::backup::BackupStore;
use crate::config::OperatorConfig;
use crate::controllers::classifier::{classify, Classification};
use crate::controllers::failover::FailoverSequencer;
use crate::controllers::manifest_work::create_or_update_manifest_work;
use crate::controllers::manifests::{vrg_manifest_work, vrg_roles_manifest_work};
use crate::controllers::placement::{select_placement_decision, ClusterFilter, PlacementResolver};
use crate::crds::{
    ApplicationVolumeReplication, ApplicationVolumeReplicationStatus, Subscription,
    SubscriptionPlacementDecision, SubscriptionPlacementDecisionMap,
};
use crate::error::{Error, Result};
use crate::metrics::{record_error, DR_RECONCILE_TOTAL, DR_SUBSCRIPTION_OUTCOMES_TOTAL};
use crate::store::ObjectStore;
use kube::{runtime::controller::Action, ResourceExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Shared state for the AVR controller.
pub struct Context {
    pub store: Arc<dyn ObjectStore>,
    pub backup: Arc<dyn BackupStore>,
    pub placement: Arc<dyn PlacementResolver>,
    pub filter: Arc<dyn ClusterFilter>,
    pub config: OperatorConfig,
}

/// What one Subscription contributed to a pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    Skip,
    Requeue,
    Decision(SubscriptionPlacementDecision),
}

impl SubscriptionOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SubscriptionOutcome::Skip => "skip",
            SubscriptionOutcome::Requeue => "requeue",
            SubscriptionOutcome::Decision(_) => "decision",
        }
    }
}

/// The folded outcomes of every Subscription in a pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassSummary {
    pub decisions: SubscriptionPlacementDecisionMap,
    pub requeue: bool,
}

/// The main reconciliation function for the `ApplicationVolumeReplication` resource.
pub async fn reconcile(
    avr: Arc<ApplicationVolumeReplication>,
    ctx: Arc<Context>,
) -> Result<Action, Error> {
    info!(avr = %avr.name_any(), "Reconciling ApplicationVolumeReplication");

    match reconcile_pass(&ctx, &avr).await {
        Ok(true) => {
            DR_RECONCILE_TOTAL.with_label_values(&["requeue"]).inc();
            Ok(Action::requeue(ctx.config.requeue_interval))
        }
        Ok(false) => {
            DR_RECONCILE_TOTAL.with_label_values(&["success"]).inc();
            Ok(Action::await_change())
        }
        Err(e) => {
            DR_RECONCILE_TOTAL.with_label_values(&["error"]).inc();
            Err(e)
        }
    }
}

/// Error policy: log, count, and retry after the configured back-off.
pub fn on_error(avr: Arc<ApplicationVolumeReplication>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(avr = %avr.name_any(), "Reconciliation failed: {}", error);
    record_error(error);
    Action::requeue(ctx.config.error_requeue_interval)
}

/// Runs one pass over the Subscriptions of `avr`. Returns whether the pass
/// wants to be requeued.
pub async fn reconcile_pass(ctx: &Context, avr: &ApplicationVolumeReplication) -> Result<bool> {
    let namespace = avr
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let subscriptions = ctx.store.list_subscriptions(&namespace).await?;
    debug!(avr = %avr.name_any(), count = subscriptions.len(), "Listed subscriptions");

    let summary = process_subscriptions(ctx, avr, &subscriptions).await;
    if summary.decisions.is_empty() {
        return Ok(summary.requeue);
    }

    let status = ApplicationVolumeReplicationStatus {
        decisions: merge_decisions(avr, &subscriptions, summary.decisions),
    };

    match ctx.store.write_avr_status(avr, &status).await {
        Ok(()) => {
            info!(avr = %avr.name_any(), decisions = status.decisions.len(), "AVR status updated");
            Ok(summary.requeue)
        }
        Err(e) => {
            warn!(avr = %avr.name_any(), error = %e, "Failed to update AVR status");
            record_error(&e);
            Ok(true)
        }
    }
}

/// The decision map to write: recorded decisions of Subscriptions that still
/// exist, overlaid with this pass's decisions. Entries of deleted
/// Subscriptions are dropped.
fn merge_decisions(
    avr: &ApplicationVolumeReplication,
    subscriptions: &[Subscription],
    new_decisions: SubscriptionPlacementDecisionMap,
) -> SubscriptionPlacementDecisionMap {
    let listed: BTreeSet<String> = subscriptions.iter().map(|s| s.name_any()).collect();
    let mut decisions: SubscriptionPlacementDecisionMap = avr
        .status
        .as_ref()
        .map(|status| {
            status
                .decisions
                .iter()
                .filter(|(name, _)| listed.contains(*name))
                .map(|(name, decision)| (name.clone(), decision.clone()))
                .collect()
        })
        .unwrap_or_default();
    decisions.extend(new_decisions);
    decisions
}

/// Handles each Subscription in turn and folds their outcomes.
pub async fn process_subscriptions(
    ctx: &Context,
    avr: &ApplicationVolumeReplication,
    subscriptions: &[Subscription],
) -> PassSummary {
    let mut summary = PassSummary::default();

    for subscription in subscriptions {
        match process_subscription(ctx, avr, subscription).await {
            SubscriptionOutcome::Skip => {}
            SubscriptionOutcome::Requeue => summary.requeue = true,
            SubscriptionOutcome::Decision(decision) => {
                summary
                    .decisions
                    .insert(subscription.name_any(), decision);
            }
        }
    }

    summary
}

pub async fn process_subscription(
    ctx: &Context,
    avr: &ApplicationVolumeReplication,
    subscription: &Subscription,
) -> SubscriptionOutcome {
    let name = subscription.name_any();

    let outcome = match classify(ctx.store.as_ref(), avr, subscription).await {
        Err(e) => {
            warn!(subscription = %name, error = %e, "Failed to classify subscription");
            record_error(&e);
            SubscriptionOutcome::Requeue
        }
        Ok(Classification::Skip) => SubscriptionOutcome::Skip,
        Ok(Classification::AlreadyConverged { home }) => {
            debug!(subscription = %name, %home, "Subscription already converged");
            SubscriptionOutcome::Skip
        }
        Ok(Classification::PausedForDr) => {
            let run = FailoverSequencer::new(ctx.store.as_ref(), ctx.backup.as_ref(), avr, subscription)
                .run()
                .await;
            let trace: Vec<&str> = run.trace.iter().map(|state| state.as_str()).collect();
            match run.result {
                Ok(progress) => {
                    info!(subscription = %name, ?progress, ?trace, "Failover pass complete");
                }
                Err(e) => {
                    warn!(subscription = %name, error = %e, ?trace, "Failover sequence failed");
                    record_error(&e);
                }
            }
            SubscriptionOutcome::Requeue
        }
        Ok(Classification::NeedsConvergence) => match converge_subscription(ctx, avr, subscription).await {
            Ok(decision) => SubscriptionOutcome::Decision(decision),
            Err(e) => {
                warn!(subscription = %name, error = %e, "Failed to converge subscription");
                record_error(&e);
                SubscriptionOutcome::Requeue
            }
        },
    };

    DR_SUBSCRIPTION_OUTCOMES_TOTAL
        .with_label_values(&[outcome.as_str()])
        .inc();
    outcome
}

/// Selects home and peer, then places the roles and VRG bundles on home.
/// The decision is only returned once both bundles were written.
async fn converge_subscription(
    ctx: &Context,
    avr: &ApplicationVolumeReplication,
    subscription: &Subscription,
) -> Result<SubscriptionPlacementDecision> {
    let name = subscription.name_any();
    let namespace = subscription
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;

    let decision = select_placement_decision(
        ctx.store.as_ref(),
        ctx.placement.as_ref(),
        ctx.filter.as_ref(),
        subscription,
    )
    .await?;
    let home = &decision.home_cluster;

    create_or_update_manifest_work(ctx.store.as_ref(), vrg_roles_manifest_work(home)?).await?;
    let vrg = vrg_manifest_work(
        &name,
        &namespace,
        home,
        &avr.spec.s3_endpoint,
        &avr.spec.s3_secret_name,
    )?;
    create_or_update_manifest_work(ctx.store.as_ref(), vrg).await?;

    info!(subscription = %name, %home, peer = %decision.peer_cluster, "Subscription converged");
    Ok(decision)
}
