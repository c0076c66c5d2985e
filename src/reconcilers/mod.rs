// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Reconciliation logic for the Ceph CSI custom resources.
//!
//! Each reconciler drives one kind of resource towards its desired state. The
//! controllers in [`crate::controller`] decide *when* a reconciler runs; the functions
//! here decide *what* it does.
//!
//! # Reconciliation Architecture
//!
//! 1. **Resolve** - Layer the `Driver` spec over the operator-wide defaults
//! 2. **Compose** - Build every child object from the resolved spec
//! 3. **Apply** - Create or update each child, writing only when it changed
//! 4. **Status** - Report the outcome back on the `Driver`
//!
//! `ClientProfile` and `ClientProfileMapping` objects do not own workloads; they
//! contribute records to the shared `ceph-csi-config` `ConfigMap` of their namespace.
//!
//! # Available Reconcilers
//!
//! - [`reconcile_driver`] - Deploys a CSI driver and reports its phase
//! - [`reconcile_client_profile`] - Publishes a profile's `config.json` record
//! - [`cleanup_client_profile`] - Retracts a profile's record before deletion
//! - [`reconcile_client_profile_mappings`] - Rebuilds `cluster-mapping.json` for a namespace
//!
//! # Example: Using a Reconciler
//!
//! ```rust,no_run
//! use ceph_csi_operator::context::Context;
//! use ceph_csi_operator::crd::Driver;
//! use ceph_csi_operator::reconcilers::reconcile_driver;
//! use std::sync::Arc;
//!
//! async fn reconcile(ctx: Arc<Context>, driver: Driver) -> anyhow::Result<()> {
//!     reconcile_driver(ctx, driver).await
//! }
//! ```

pub mod clientprofile;
pub mod clientprofilemapping;
pub mod driver;
pub mod resources;
pub mod status;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use clientprofile::{cleanup_client_profile, reconcile_client_profile};
pub use clientprofilemapping::reconcile_client_profile_mappings;
pub use driver::reconcile_driver;

use anyhow::{anyhow, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{Resource, ResourceExt};

/// Check if a status value has actually changed compared to the current status.
///
/// This helper prevents unnecessary status updates that would trigger reconciliation loops.
/// It compares a new status value with the existing status and returns `true` only if
/// they differ, indicating an update is needed.
///
/// # Arguments
///
/// * `current_value` - The current status value (from existing resource)
/// * `new_value` - The new status value to potentially set
///
/// # Returns
///
/// * `true` - Status has changed and needs updating
/// * `false` - Status is unchanged, skip the update
///
/// # Example
///
/// ```rust,ignore
/// use ceph_csi_operator::reconcilers::status_changed;
///
/// let current = driver.status.clone();
/// let new = Some(driver_status(&outcome));
///
/// if status_changed(&current, &new) {
///     patch_status(&api, &driver, new).await?;
/// }
/// ```
///
/// # Why This Matters
///
/// Status updates produce "object updated" events which cause new reconciliations.
/// Without this check, updating status on every reconciliation creates a tight loop:
///
/// 1. Reconcile → Update status
/// 2. Status update → "object updated" event
/// 3. Event → New reconciliation
/// 4. Repeat from step 1
#[must_use]
pub fn status_changed<T: PartialEq>(current_value: &Option<T>, new_value: &Option<T>) -> bool {
    current_value != new_value
}

/// A plain (non-controller) owner reference to `obj`.
///
/// Shared objects such as `ceph-csi-config` carry one of these per contributing owner,
/// so the garbage collector removes them only once every owner is gone.
///
/// # Errors
///
/// Fails if `obj` has not been persisted yet and so has no UID.
pub fn plain_owner_reference<K>(obj: &K) -> Result<OwnerReference>
where
    K: Resource<DynamicType = ()>,
{
    if obj.meta().uid.is_none() {
        return Err(anyhow!(
            "{} {} has no UID, cannot reference it as an owner",
            K::kind(&()),
            obj.name_any()
        ));
    }
    obj.owner_ref(&())
        .ok_or_else(|| anyhow!("{} {} cannot be referenced as an owner", K::kind(&()), obj.name_any()))
}
