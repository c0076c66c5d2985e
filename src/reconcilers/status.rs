// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `Driver` status reporting.
//!
//! The status is a coarse summary of the last reconcile: `phase` is `Ready` or
//! `Failed`, `reason` is a `CamelCase` identifier from [`crate::status_reasons`] and
//! `message` carries the error text on failure. It is written with a merge patch on the
//! status subresource, and only when it differs from what is already stored.

use crate::crd::{Driver, DriverStatus};
use crate::errors::status_reason_for;
use crate::reconcilers::status_changed;
use crate::status_reasons::{PHASE_FAILED, PHASE_READY, REASON_RECONCILE_SUCCEEDED};
use anyhow::Result;
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use serde_json::json;
use tracing::debug;

/// Summarize a reconcile outcome as a `DriverStatus`.
#[must_use]
pub fn driver_status(outcome: &Result<()>) -> DriverStatus {
    match outcome {
        Ok(()) => DriverStatus {
            phase: Some(PHASE_READY.to_string()),
            reason: Some(REASON_RECONCILE_SUCCEEDED.to_string()),
            message: None,
        },
        Err(e) => DriverStatus {
            phase: Some(PHASE_FAILED.to_string()),
            reason: Some(status_reason_for(e).to_string()),
            message: Some(format!("{e:#}")),
        },
    }
}

/// Patch the status of `driver` when it changed.
///
/// Returns `true` if a patch was sent.
///
/// # Errors
///
/// Returns an error if the status patch fails.
pub async fn update_driver_status(api: &Api<Driver>, driver: &Driver, status: DriverStatus) -> Result<bool> {
    let new_status = Some(status);
    if !status_changed(&driver.status, &new_status) {
        debug!(driver = %driver.name_any(), "Status unchanged, skipping update");
        return Ok(false);
    }

    // `message` is cleared explicitly: a merge patch leaves absent keys untouched.
    let status = new_status.unwrap_or_default();
    let patch = json!({
        "status": {
            "phase": status.phase,
            "reason": status.reason,
            "message": status.message,
        }
    });
    api.patch_status(&driver.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    debug!(driver = %driver.name_any(), phase = ?status.phase, "Updated status");
    Ok(true)
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod status_tests;
