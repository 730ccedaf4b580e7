/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/placement.rs
*
* Selects the two clusters of a subscription's DR pair and decides which of
* them is currently home.
*
* Architecture:
* - `PlacementResolver` turns a PlacementRule into candidate ManagedClusters.
*   `KubePlacementResolver` is the production implementation; it evaluates the
*   rule's cluster list and label selector against the ManagedClusters known
*   to the hub.
* - `ClusterFilter` is a post-resolution hook. The default `PassThroughFilter`
*   only rejects an empty candidate set.
* - `resolve_cluster_pair` enforces the DR pair invariants: one replica, and
*   exactly two candidates after filtering.
* - `select_home_and_peer` picks as home the candidate that the subscription
*   reports status for. The candidates come back in no meaningful order, so
*   the subscription status is the only tie-breaker.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::crds::ocm::{LabelSelector, LabelSelectorRequirement};
use crate::crds::{
    ManagedCluster, PlacementRule, Subscription, SubscriptionPhase, SubscriptionPlacementDecision,
};
use crate::error::{Error, Result};
use crate::store::ObjectStore;
use async_trait::async_trait;
use kube::{
    api::{Api, ListParams},
    Client, ResourceExt,
};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// A DR pair places the application on exactly one cluster at a time.
pub const REQUIRED_CLUSTER_REPLICAS: i32 = 1;
/// Number of clusters forming a DR pair.
pub const DR_PAIR_SIZE: usize = 2;

#[async_trait]
pub trait PlacementResolver: Send + Sync {
    /// Resolves the candidate clusters of `rule`, keyed by cluster name.
    async fn resolve(&self, rule: &PlacementRule) -> Result<BTreeMap<String, ManagedCluster>>;
}

pub trait ClusterFilter: Send + Sync {
    fn filter(
        &self,
        rule: &PlacementRule,
        clusters: &mut BTreeMap<String, ManagedCluster>,
    ) -> Result<()>;
}

/// Keeps every candidate; only an empty candidate set is rejected.
#[derive(Clone, Copy, Debug, Default)]
pub struct PassThroughFilter;

impl ClusterFilter for PassThroughFilter {
    fn filter(
        &self,
        rule: &PlacementRule,
        clusters: &mut BTreeMap<String, ManagedCluster>,
    ) -> Result<()> {
        if clusters.is_empty() {
            return Err(Error::PlacementMismatch(format!(
                "no clusters found for PlacementRule '{}'",
                rule.name_any()
            )));
        }
        Ok(())
    }
}

/// Resolves PlacementRules against the ManagedClusters registered on the hub.
#[derive(Clone)]
pub struct KubePlacementResolver {
    client: Client,
}

impl KubePlacementResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PlacementResolver for KubePlacementResolver {
    async fn resolve(&self, rule: &PlacementRule) -> Result<BTreeMap<String, ManagedCluster>> {
        let api: Api<ManagedCluster> = Api::all(self.client.clone());
        let clusters = api.list(&ListParams::default()).await?;
        Ok(select_candidates(rule, clusters.items))
    }
}

/// Applies the cluster list and cluster selector of `rule` to `clusters`.
/// Clusters being deleted are never candidates.
pub fn select_candidates(
    rule: &PlacementRule,
    clusters: Vec<ManagedCluster>,
) -> BTreeMap<String, ManagedCluster> {
    let named: Option<Vec<&str>> = rule
        .spec
        .clusters
        .as_ref()
        .filter(|list| !list.is_empty())
        .map(|list| list.iter().map(|c| c.name.as_str()).collect());

    clusters
        .into_iter()
        .filter(|cluster| cluster.metadata.deletion_timestamp.is_none())
        .filter(|cluster| {
            named
                .as_ref()
                .map_or(true, |names| names.contains(&cluster.name_any().as_str()))
        })
        .filter(|cluster| {
            rule.spec
                .cluster_selector
                .as_ref()
                .map_or(true, |selector| selector_matches(selector, cluster.labels()))
        })
        .map(|cluster| (cluster.name_any(), cluster))
        .collect()
}

/// Evaluates a label selector. An empty selector matches everything.
pub fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector
        .match_labels
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value));

    labels_match
        && selector
            .match_expressions
            .iter()
            .all(|requirement| requirement_matches(requirement, labels))
}

fn requirement_matches(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let value = labels.get(&requirement.key);
    match requirement.operator.as_str() {
        "In" => value.is_some_and(|v| requirement.values.contains(v)),
        "NotIn" => value.map_or(true, |v| !requirement.values.contains(v)),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        _ => false,
    }
}

/// Resolves `rule` into the two clusters of the DR pair, in resolver order.
pub async fn resolve_cluster_pair(
    resolver: &dyn PlacementResolver,
    filter: &dyn ClusterFilter,
    rule: &PlacementRule,
) -> Result<[ManagedCluster; DR_PAIR_SIZE]> {
    if let Some(replicas) = rule.spec.cluster_replicas {
        if replicas != REQUIRED_CLUSTER_REPLICAS {
            return Err(Error::PlacementMismatch(format!(
                "PlacementRule '{}' requires {} cluster replicas, expected {}",
                rule.name_any(),
                replicas,
                REQUIRED_CLUSTER_REPLICAS
            )));
        }
    }

    let mut clusters = resolver.resolve(rule).await?;
    filter.filter(rule, &mut clusters)?;

    let found = clusters.len();
    clusters
        .into_values()
        .collect::<Vec<_>>()
        .try_into()
        .map_err(|_| {
            Error::PlacementMismatch(format!(
                "PlacementRule '{}' should have made {} decisions. Found {}",
                rule.name_any(),
                DR_PAIR_SIZE,
                found
            ))
        })
}

/// Splits a resolved pair into (home, peer) using the subscription's per-cluster status.
pub fn select_home_and_peer(
    subscription: &Subscription,
    pair: &[ManagedCluster; DR_PAIR_SIZE],
) -> Result<SubscriptionPlacementDecision> {
    let statuses = subscription
        .status
        .as_ref()
        .and_then(|status| status.statuses.as_ref())
        .ok_or_else(|| {
            Error::InvariantViolation(format!(
                "subscription '{}' has no per-cluster statuses",
                subscription.name_any()
            ))
        })?;

    let [first, second] = pair;
    let (first, second) = (first.name_any(), second.name_any());
    match (statuses.contains_key(&first), statuses.contains_key(&second)) {
        (true, false) => Ok(SubscriptionPlacementDecision::new(first, second)),
        (false, true) => Ok(SubscriptionPlacementDecision::new(second, first)),
        (true, true) => Err(Error::InvariantViolation(format!(
            "subscription '{}' reports status for both '{}' and '{}'",
            subscription.name_any(),
            first,
            second
        ))),
        (false, false) => Err(Error::InvariantViolation(format!(
            "mismatch between placement decisions ['{}', '{}'] and subscription '{}' statuses",
            first,
            second,
            subscription.name_any()
        ))),
    }
}

/// Determines the home and peer cluster of a propagated hub subscription.
pub async fn select_placement_decision(
    store: &dyn ObjectStore,
    resolver: &dyn PlacementResolver,
    filter: &dyn ClusterFilter,
    subscription: &Subscription,
) -> Result<SubscriptionPlacementDecision> {
    let name = subscription.name_any();
    info!(subscription = %name, "Selecting placement decision");

    let ready = subscription.status.as_ref().is_some_and(|status| {
        status.phase == SubscriptionPhase::Propagated
            && status.statuses.as_ref().is_some_and(|s| !s.is_empty())
    });
    if !ready {
        return Err(Error::InvariantViolation(format!(
            "subscription '{}' not ready",
            name
        )));
    }

    let placement_ref = subscription
        .spec
        .placement
        .as_ref()
        .and_then(|placement| placement.placement_ref.as_ref())
        .ok_or_else(|| {
            Error::InvariantViolation(format!("placement not set for subscription '{}'", name))
        })?;
    let subscription_namespace = subscription
        .namespace()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    let rule_namespace = placement_ref
        .namespace
        .as_deref()
        .filter(|ns| !ns.is_empty())
        .unwrap_or(&subscription_namespace);

    let rule = store
        .get_placement_rule(rule_namespace, &placement_ref.name)
        .await?
        .ok_or_else(|| {
            Error::InvariantViolation(format!(
                "PlacementRule '{}/{}' referenced by subscription '{}' not found",
                rule_namespace, placement_ref.name, name
            ))
        })?;

    let pair = resolve_cluster_pair(resolver, filter, &rule).await?;
    let decision = select_home_and_peer(subscription, &pair)?;
    debug!(
        subscription = %name,
        home = %decision.home_cluster,
        peer = %decision.peer_cluster,
        "Placement decision selected"
    );
    Ok(decision)
}
