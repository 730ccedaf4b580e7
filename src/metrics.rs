/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/metrics.rs
*
* This module defines and registers the custom Prometheus metrics that the
* DR operator exposes. They describe how reconciliation passes end, what each
* subscription's outcome was, how far failover sequences progress and how
* often ManifestWorks are created or rewritten.
*
* Using `lazy_static`, we ensure that the metrics are created only once and are
* available globally and safely across all concurrent reconciliation loops and
* web server threads.
*
* SPDX-License-Identifier: Apache-2.0
*/

use lazy_static::lazy_static;
use prometheus::{opts, IntCounterVec, Registry};

// --- Metric Definitions ---

lazy_static! {
    /// Reconciliation passes, labeled by how they ended.
    pub static ref DR_RECONCILE_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!("ph_dr_reconcile_total", "Total number of AVR reconciliation passes."),
        &["result"]
    )
    .expect("metric can be created");

    /// Per-subscription outcomes of each pass.
    pub static ref DR_SUBSCRIPTION_OUTCOMES_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!(
            "ph_dr_subscription_outcomes_total",
            "Total number of subscription outcomes, by outcome."
        ),
        &["outcome"]
    )
    .expect("metric can be created");

    /// States entered by failover sequences.
    pub static ref DR_FAILOVER_STEPS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!("ph_dr_failover_steps_total", "Total number of failover states entered."),
        &["step"]
    )
    .expect("metric can be created");

    /// Writes issued against ManifestWorks (create, update, delete).
    pub static ref DR_MANIFEST_WORK_OPS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!("ph_dr_manifest_work_ops_total", "Total number of ManifestWork writes."),
        &["op"]
    )
    .expect("metric can be created");

    /// Subscription-level and pass-level errors, by kind.
    pub static ref DR_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        opts!("ph_dr_errors_total", "Total number of reconciliation errors."),
        &["kind"]
    )
    .expect("metric can be created");
}

/// Creates a new Prometheus registry and registers all custom metrics.
///
/// This function is intended to be called once at operator startup.
pub fn create_and_register_metrics() -> Result<Registry, prometheus::Error> {
    let r = Registry::new();
    r.register(Box::new(DR_RECONCILE_TOTAL.clone()))?;
    r.register(Box::new(DR_SUBSCRIPTION_OUTCOMES_TOTAL.clone()))?;
    r.register(Box::new(DR_FAILOVER_STEPS_TOTAL.clone()))?;
    r.register(Box::new(DR_MANIFEST_WORK_OPS_TOTAL.clone()))?;
    r.register(Box::new(DR_ERRORS_TOTAL.clone()))?;
    Ok(r)
}

pub fn record_error(err: &crate::Error) {
    DR_ERRORS_TOTAL.with_label_values(&[err.metric_label()]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_exposes_all_families() {
        DR_RECONCILE_TOTAL.with_label_values(&["success"]).inc();
        DR_SUBSCRIPTION_OUTCOMES_TOTAL.with_label_values(&["skip"]).inc();
        DR_FAILOVER_STEPS_TOTAL.with_label_values(&["locate_target"]).inc();
        DR_MANIFEST_WORK_OPS_TOTAL.with_label_values(&["create"]).inc();
        DR_ERRORS_TOTAL.with_label_values(&["kube"]).inc();

        let registry = create_and_register_metrics().unwrap();
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"ph_dr_reconcile_total".to_string()));
        assert!(names.contains(&"ph_dr_failover_steps_total".to_string()));
        assert!(names.contains(&"ph_dr_errors_total".to_string()));
    }
}
