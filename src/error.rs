/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/error.rs
*
* Error taxonomy of the DR reconciliation engine. "Not found" is never an
* error here: lookups return `Option` and deletions of absent objects succeed.
* Every variant is scoped to a single subscription or a single pass and is
* retried on a later pass.
*
* SPDX-License-Identifier: Apache-2.0
*/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Backup store error: {0}")]
    BackupError(String),

    #[error("Placement mismatch: {0}")]
    PlacementMismatch(String),

    #[error("No failover cluster configured for subscription '{0}'")]
    NoFailoverTarget(String),

    #[error("Failed to serialize manifest: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Object is missing required key: {0}")]
    MissingObjectKey(&'static str),
}

impl Error {
    /// A stable, low-cardinality name for metrics labels.
    pub fn metric_label(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::BackupError(_) => "backup",
            Error::PlacementMismatch(_) => "placement_mismatch",
            Error::NoFailoverTarget(_) => "no_failover_target",
            Error::SerializationError(_) => "serialization",
            Error::InvariantViolation(_) => "invariant_violation",
            Error::MissingObjectKey(_) => "missing_object_key",
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_subscription() {
        let err = Error::NoFailoverTarget("busybox-sub".to_string());
        assert_eq!(
            err.to_string(),
            "No failover cluster configured for subscription 'busybox-sub'"
        );
        assert_eq!(err.metric_label(), "no_failover_target");
    }
}
