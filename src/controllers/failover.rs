/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/controllers/failover.rs
*
* The failover sequence for a DR-paused Subscription: move the primary role
* to the operator-chosen cluster, restore the subscription's volumes there,
* wait for the restore to be applied and finally unpause the subscription.
*
* Architecture:
* - The sequence is a state machine. Each `Step` carries the data the next
*   state needs, so no state can run without its inputs. `FailoverSequencer::run`
*   drives it until it finishes or a step fails.
* - A run never produces a placement decision. Whether the restore is still
*   pending or the subscription was just unpaused, the next pass reclassifies
*   the subscription from scratch.
* - Every step is idempotent. A pass that finds the restore bundle already on
*   the target only waits on it; it never re-issues the restore.
* - The order delete stale VRG -> restore -> wait -> unpause is fixed. It is
*   what keeps two clusters from acting as primary at the same time.
*
* SPDX-License-Identifier: Apache-2.0
*/

use crate::backup::{bucket_name, BackupStore, SecretRef};
use crate::controllers::classifier::PAUSED_LABEL;
use crate::controllers::conditions::is_manifest_work_applied;
use crate::controllers::manifest_work::create_or_update_manifest_work;
use crate::controllers::manifests::{manifest_work_name, pv_manifest_work, WorkKind};
use crate::crds::{ApplicationVolumeReplication, ManifestWork, Subscription};
use crate::error::{Error, Result};
use crate::metrics::{DR_FAILOVER_STEPS_TOTAL, DR_MANIFEST_WORK_OPS_TOTAL};
use crate::store::ObjectStore;
use kube::ResourceExt;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// The states a failover sequence passes through, as recorded in its trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailoverState {
    LocateTarget,
    CheckExistingRestore,
    DeleteStaleRoleWork,
    IssueRestore,
    WaitApplied,
    Unpause,
    Done,
    Error,
}

impl FailoverState {
    pub fn as_str(self) -> &'static str {
        match self {
            FailoverState::LocateTarget => "locate_target",
            FailoverState::CheckExistingRestore => "check_existing_restore",
            FailoverState::DeleteStaleRoleWork => "delete_stale_role_work",
            FailoverState::IssueRestore => "issue_restore",
            FailoverState::WaitApplied => "wait_applied",
            FailoverState::Unpause => "unpause",
            FailoverState::Done => "done",
            FailoverState::Error => "error",
        }
    }
}

/// How far a successful run got.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailoverProgress {
    /// The restore bundle is on the target but not applied yet.
    RestorePending,
    /// The subscription was unpaused.
    Unpaused,
}

#[derive(Debug)]
pub struct FailoverRun {
    pub trace: Vec<FailoverState>,
    pub result: Result<FailoverProgress>,
}

enum Step {
    LocateTarget,
    CheckExistingRestore { target: String },
    DeleteStaleRoleWork { target: String },
    IssueRestore { target: String },
    WaitApplied { target: String, restore: Option<ManifestWork> },
    Unpause,
    Done(FailoverProgress),
}

impl Step {
    fn state(&self) -> FailoverState {
        match self {
            Step::LocateTarget => FailoverState::LocateTarget,
            Step::CheckExistingRestore { .. } => FailoverState::CheckExistingRestore,
            Step::DeleteStaleRoleWork { .. } => FailoverState::DeleteStaleRoleWork,
            Step::IssueRestore { .. } => FailoverState::IssueRestore,
            Step::WaitApplied { .. } => FailoverState::WaitApplied,
            Step::Unpause => FailoverState::Unpause,
            Step::Done(_) => FailoverState::Done,
        }
    }
}

pub struct FailoverSequencer<'a> {
    store: &'a dyn ObjectStore,
    backup: &'a dyn BackupStore,
    avr: &'a ApplicationVolumeReplication,
    subscription: &'a Subscription,
}

impl<'a> FailoverSequencer<'a> {
    pub fn new(
        store: &'a dyn ObjectStore,
        backup: &'a dyn BackupStore,
        avr: &'a ApplicationVolumeReplication,
        subscription: &'a Subscription,
    ) -> Self {
        Self {
            store,
            backup,
            avr,
            subscription,
        }
    }

    pub async fn run(&self) -> FailoverRun {
        let name = self.subscription.name_any();
        let mut trace = Vec::new();
        let mut step = Step::LocateTarget;

        loop {
            let state = step.state();
            trace.push(state);
            DR_FAILOVER_STEPS_TOTAL
                .with_label_values(&[state.as_str()])
                .inc();

            if let Step::Done(progress) = step {
                info!(subscription = %name, ?progress, "Failover sequence finished for this pass");
                return FailoverRun {
                    trace,
                    result: Ok(progress),
                };
            }

            step = match self.advance(step).await {
                Ok(next) => next,
                Err(e) => {
                    warn!(subscription = %name, state = state.as_str(), error = %e, "Failover step failed");
                    trace.push(FailoverState::Error);
                    DR_FAILOVER_STEPS_TOTAL
                        .with_label_values(&[FailoverState::Error.as_str()])
                        .inc();
                    return FailoverRun {
                        trace,
                        result: Err(e),
                    };
                }
            };
        }
    }

    async fn advance(&self, step: Step) -> Result<Step> {
        match step {
            Step::LocateTarget => self.locate_target(),
            Step::CheckExistingRestore { target } => self.check_existing_restore(target).await,
            Step::DeleteStaleRoleWork { target } => self.delete_stale_role_work(target).await,
            Step::IssueRestore { target } => self.issue_restore(target).await,
            Step::WaitApplied { target, restore } => self.wait_applied(target, restore).await,
            Step::Unpause => self.unpause().await,
            Step::Done(progress) => Ok(Step::Done(progress)),
        }
    }

    fn names(&self) -> Result<(String, String)> {
        let namespace = self
            .subscription
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        Ok((self.subscription.name_any(), namespace))
    }

    fn restore_work_name(&self) -> Result<String> {
        let (name, namespace) = self.names()?;
        Ok(manifest_work_name(&name, &namespace, WorkKind::Pv))
    }

    fn locate_target(&self) -> Result<Step> {
        let name = self.subscription.name_any();
        let target = self
            .avr
            .failover_cluster_for(&name)
            .ok_or_else(|| Error::NoFailoverTarget(name.clone()))?
            .to_string();
        info!(subscription = %name, %target, "Failing over subscription");
        Ok(Step::CheckExistingRestore { target })
    }

    async fn check_existing_restore(&self, target: String) -> Result<Step> {
        let work_name = self.restore_work_name()?;
        match self.store.get_manifest_work(&target, &work_name).await? {
            Some(existing) => {
                debug!(work = %work_name, cluster = %target, "Restore already issued");
                Ok(Step::WaitApplied {
                    target,
                    restore: Some(existing),
                })
            }
            None => Ok(Step::DeleteStaleRoleWork { target }),
        }
    }

    async fn delete_stale_role_work(&self, target: String) -> Result<Step> {
        let (name, namespace) = self.names()?;
        if let Some(decision) = self.avr.decision_for(&name) {
            let work_name = manifest_work_name(&name, &namespace, WorkKind::Vrg);
            info!(work = %work_name, cluster = %decision.home_cluster, "Deleting VRG bundle on previous home");
            self.store
                .delete_manifest_work(&decision.home_cluster, &work_name)
                .await?;
            DR_MANIFEST_WORK_OPS_TOTAL.with_label_values(&["delete"]).inc();
        }
        Ok(Step::IssueRestore { target })
    }

    async fn issue_restore(&self, target: String) -> Result<Step> {
        let (name, namespace) = self.names()?;
        let avr_namespace = self
            .avr
            .namespace()
            .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
        let secret = SecretRef {
            name: self.avr.spec.s3_secret_name.clone(),
            namespace: avr_namespace,
        };

        let volumes = self
            .backup
            .download_volumes(
                &self.avr.spec.s3_endpoint,
                &secret,
                &self.avr.name_any(),
                &bucket_name(&namespace, &name),
            )
            .await?;

        if volumes.is_empty() {
            info!(subscription = %name, "No volumes to restore");
            return Ok(Step::Unpause);
        }

        info!(subscription = %name, cluster = %target, volumes = volumes.len(), "Restoring volumes");
        let work = pv_manifest_work(&name, &namespace, &target, &volumes)?;
        create_or_update_manifest_work(self.store, work).await?;
        Ok(Step::WaitApplied {
            target,
            restore: None,
        })
    }

    async fn wait_applied(&self, target: String, restore: Option<ManifestWork>) -> Result<Step> {
        let restore = match restore {
            Some(work) => Some(work),
            None => {
                let work_name = self.restore_work_name()?;
                self.store.get_manifest_work(&target, &work_name).await?
            }
        };

        match restore {
            Some(work) if is_manifest_work_applied(work.conditions()) => Ok(Step::Unpause),
            _ => {
                debug!(subscription = %self.subscription.name_any(), cluster = %target, "Restore not applied yet");
                Ok(Step::Done(FailoverProgress::RestorePending))
            }
        }
    }

    async fn unpause(&self) -> Result<Step> {
        let (name, namespace) = self.names()?;
        let labels = BTreeMap::from([(PAUSED_LABEL.to_string(), "false".to_string())]);
        self.store
            .patch_subscription_labels(&namespace, &name, &labels)
            .await?;
        info!(subscription = %name, "Subscription unpaused");
        Ok(Step::Done(FailoverProgress::Unpaused))
    }
}
