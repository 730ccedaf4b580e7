/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/conditions.rs
*
* Decides from the conditions a managed cluster reported on a ManifestWork
* whether the work is currently applied. Only the most recent transition
* counts: every condition sharing the newest timestamp is considered, and a
* Degraded condition in that group overrides an Applied one.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::crds::ocm::{ConditionStatus, WorkCondition, WORK_APPLIED, WORK_DEGRADED};

/// Returns the conditions carrying the newest `lastTransitionTime`.
/// Several conditions may share it when they were set by one transition.
pub fn most_recent_conditions(conditions: &[WorkCondition]) -> Vec<&WorkCondition> {
    let Some(newest) = conditions.iter().map(|c| c.last_transition_time).max() else {
        return Vec::new();
    };
    conditions
        .iter()
        .filter(|c| c.last_transition_time == newest)
        .collect()
}

/// True when the newest conditions include `Applied=True` and no `Degraded=True`.
pub fn is_manifest_work_applied(conditions: &[WorkCondition]) -> bool {
    let mut applied = false;
    let mut degraded = false;

    for condition in most_recent_conditions(conditions)
        .into_iter()
        .filter(|c| c.status == ConditionStatus::True)
    {
        match condition.type_.as_str() {
            WORK_APPLIED => applied = true,
            WORK_DEGRADED => degraded = true,
            _ => {}
        }
    }

    applied && !degraded
}
