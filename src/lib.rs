/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/lib.rs
*
* Library root of the DR operator. The reconciliation engine lives here,
* behind the `ObjectStore`, `PlacementResolver` and `BackupStore` capability
* traits, so that it can run against the API server in `main.rs` and against
* in-memory stores in the unit tests.
*
* SPDX-License-Identifier: Apache-2.0
*/

pub mod backup;
pub mod config;
pub mod crds;
pub mod error;
pub mod metrics;
pub mod store;

pub mod controllers {
    pub mod avr_controller;
    pub mod classifier;
    pub mod conditions;
    pub mod failover;
    pub mod manifest_work;
    pub mod manifests;
    pub mod placement;
}

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
